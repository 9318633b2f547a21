// Copyright 2025 the dropship authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::endpoint::Endpoint;

/// Deploy a local directory to a remote host over SSH.
#[derive(Parser, Debug)]
#[command(name = "dropship", version, about)]
pub struct Cli {
    /// Local directory to deploy
    pub source: PathBuf,

    /// Destination in the form user@host[:path]
    pub destination: String,

    /// Log in as this user instead of the one in DESTINATION
    #[arg(short = 'l', long = "login-name")]
    pub login_name: Option<String>,

    /// SSH port
    #[arg(short = 'p', long, default_value_t = 22)]
    pub port: u16,

    /// Private key file (defaults to the first conventional ~/.ssh key)
    #[arg(short = 'i', long = "identity")]
    pub identity: Option<PathBuf>,

    /// Prompt for the key passphrase before connecting
    #[arg(long)]
    pub ask_passphrase: bool,

    /// Skip known_hosts verification
    #[arg(long)]
    pub no_host_check: bool,

    /// File listing patterns to exclude from the archive
    #[arg(long, default_value = ".shipignore")]
    pub ignore_file: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Resolve the destination string and flags into an [`Endpoint`].
    pub fn endpoint(&self) -> Result<Endpoint, String> {
        let (user, host, path) = parse_destination(&self.destination)?;
        let user = match (&self.login_name, user) {
            (Some(login), _) => login.clone(),
            (None, Some(user)) => user,
            (None, None) => return Err(format!(
                "no user in '{}'; use user@host or --login-name",
                self.destination
            )),
        };
        Ok(Endpoint::new(user, host, self.port).with_remote_path(path))
    }
}

/// Split `user@host:path` into its parts. User and path are optional;
/// the colon split looks for the first colon after the host so Windows
/// drive letters in the path survive (`host:C:/site`).
fn parse_destination(dest: &str) -> Result<(Option<String>, String, Option<String>), String> {
    let (user, rest) = match dest.split_once('@') {
        Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
        Some(_) => return Err(format!("empty user in '{dest}'")),
        None => (None, dest),
    };

    let (host, path) = match rest.split_once(':') {
        Some((host, path)) if !path.is_empty() => (host, Some(path.to_string())),
        Some((host, _)) => (host, None),
        None => (rest, None),
    };

    if host.is_empty() {
        return Err(format!("empty host in '{dest}'"));
    }

    Ok((user, host.to_string(), path))
}
