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

use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use zeroize::Zeroizing;

use dropship::cli::Cli;
use dropship::deploy::{run_steps, DeploymentSession, Step};
use dropship::ssh::{default_key_candidate, ServerCheck};
use dropship::utils::{ignore, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", "deploy:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let endpoint = cli.endpoint().map_err(|e| anyhow::anyhow!(e))?;

    if !cli.source.is_dir() {
        anyhow::bail!("{} is not a directory", cli.source.display());
    }

    let patterns = ignore::load_or_create(&cli.ignore_file)?;
    if !patterns.is_empty() {
        tracing::info!(count = patterns.len(), "ignore patterns loaded");
    }

    let key = default_key_candidate(cli.identity.clone());
    let passphrase = if cli.ask_passphrase {
        Some(Zeroizing::new(rpassword::prompt_password(
            "Key passphrase: ",
        )?))
    } else {
        None
    };
    let server_check = if cli.no_host_check {
        ServerCheck::AcceptAny
    } else {
        ServerCheck::KnownHosts
    };

    println!(
        "{} Connecting to {}",
        "deploy:".yellow().bold(),
        endpoint.to_string().bold()
    );
    let session = DeploymentSession::connect(
        endpoint,
        key.as_deref(),
        passphrase.as_ref().map(|p| p.as_str()),
        server_check,
    )
    .await?;

    let source = cli.source.as_path();
    let session_ref = &session;
    let steps = vec![Step::new(
        format!("Deploy {} to {}", source.display(), session.remote_path()),
        move || async move { Ok(session_ref.transfer(source).await?) },
    )];

    let outcome = run_steps(steps).await;

    // The session closes whether or not the steps succeeded.
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "session close failed");
    }
    outcome?;

    println!("{} Deployment completed", "deploy:".green().bold());
    Ok(())
}
