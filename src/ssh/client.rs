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

//! The authenticated SSH session.
//!
//! One [`Session`] is created per deployment run and is the sole handle
//! used for every remote operation: command execution, SFTP upload and the
//! final disconnect. Closing consumes the session, so it can only happen
//! once.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use russh::client::{Config, Handle, Handler};
use russh_sftp::{client::SftpSession, protocol::OpenFlags};
use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

use crate::endpoint::Endpoint;
use crate::error::DeployError;

/// Result of a remote command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    /// The unix exit status (`$?` in bash).
    pub exit_status: u32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// How the server's host key is verified during connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCheck {
    /// Verify against ~/.ssh/known_hosts.
    KnownHosts,
    /// Accept any host key. Useful for first contact and test rigs.
    AcceptAny,
}

/// Credentials resolved by the auth layer.
#[derive(Debug)]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    Key(Box<russh::keys::PrivateKey>),
}

/// An authenticated SSH connection to one remote host.
pub struct Session {
    handle: Handle<ClientHandler>,
    user: String,
    host: String,
}

impl Session {
    /// Connect to the endpoint and authenticate.
    ///
    /// Network and handshake failures map to [`DeployError::Connection`];
    /// credential rejection maps to [`DeployError::AuthenticationFailed`].
    pub async fn connect(
        endpoint: &Endpoint,
        auth: AuthMethod,
        server_check: ServerCheck,
    ) -> Result<Self, DeployError> {
        let config = Arc::new(Config::default());

        let addrs: Vec<SocketAddr> = std::net::ToSocketAddrs::to_socket_addrs(&(
            endpoint.host.as_str(),
            endpoint.port,
        ))
        .map_err(|e| DeployError::Connection(format!("resolving {}: {e}", endpoint.host)))?
        .collect();
        if addrs.is_empty() {
            return Err(DeployError::Connection(format!(
                "{} did not resolve to any address",
                endpoint.host
            )));
        }

        // Try each resolved address until one connects; keep the last error.
        let mut connect_res: Result<Handle<ClientHandler>, DeployError> = Err(
            DeployError::Connection("could not resolve to any addresses".to_string()),
        );
        for addr in addrs {
            let handler = ClientHandler {
                hostname: endpoint.host.clone(),
                port: endpoint.port,
                server_check,
            };
            match russh::client::connect(config.clone(), addr, handler).await {
                Ok(handle) => {
                    connect_res = Ok(handle);
                    break;
                }
                Err(e) => {
                    connect_res = Err(match e {
                        DeployError::Ssh(russh::Error::IO(io_err)) => {
                            DeployError::Connection(format!("{addr}: {io_err}"))
                        }
                        other => DeployError::Connection(other.to_string()),
                    });
                }
            }
        }
        let mut handle = connect_res?;

        authenticate_handle(&mut handle, &endpoint.user, &endpoint.host, auth).await?;

        Ok(Self {
            handle,
            user: endpoint.user.clone(),
            host: endpoint.host.clone(),
        })
    }

    /// Execute a remote command and wait for its exit status.
    ///
    /// Every invocation is a fresh shell context. There is no deadline on
    /// completion; a hung remote command blocks the run.
    pub async fn execute(&self, command: &str) -> Result<CommandResult, DeployError> {
        tracing::debug!(command, "executing remote command");

        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status: Option<u32> = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                // An exit report can precede trailing data; keep draining.
                russh::ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                _ => {}
            }
        }

        match exit_status {
            Some(exit_status) => Ok(CommandResult {
                stdout: String::from_utf8_lossy(&stdout).to_string(),
                stderr: String::from_utf8_lossy(&stderr).to_string(),
                exit_status,
            }),
            None => Err(DeployError::CommandDidntExit),
        }
    }

    /// Stream a local file to `remote_path` over SFTP.
    ///
    /// Requires the sshd to have an sftp subsystem configured, which every
    /// stock OpenSSH install does.
    pub async fn upload(&self, local: &Path, remote_path: &str) -> Result<(), DeployError> {
        let channel = self.handle.channel_open_session().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| DeployError::Transfer(format!("sftp subsystem request failed: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| DeployError::Transfer(format!("sftp session failed: {e}")))?;

        let mut local_file = tokio::fs::File::open(local)
            .await
            .map_err(|e| DeployError::Transfer(format!("opening {}: {e}", local.display())))?;

        let mut remote_file = sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| DeployError::Transfer(format!("opening remote {remote_path}: {e}")))?;

        tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| DeployError::Transfer(format!("writing {remote_path}: {e}")))?;
        remote_file
            .flush()
            .await
            .map_err(|e| DeployError::Transfer(e.to_string()))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| DeployError::Transfer(e.to_string()))?;

        Ok(())
    }

    /// The remote user's current working directory.
    pub async fn current_dir(&self) -> Result<String, DeployError> {
        let result = self.execute("pwd").await?;
        if !result.success() {
            return Err(DeployError::Connection(format!(
                "could not determine remote working directory: {}",
                result.stderr.trim()
            )));
        }
        Ok(result.stdout.trim().to_string())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Disconnect from the remote host. Consumes the session so a close
    /// can happen at most once.
    pub async fn close(self) -> Result<(), DeployError> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("host", &self.host)
            .finish()
    }
}

async fn authenticate_handle(
    handle: &mut Handle<ClientHandler>,
    user: &str,
    host: &str,
    auth: AuthMethod,
) -> Result<(), DeployError> {
    let rejected = || DeployError::AuthenticationFailed {
        user: user.to_string(),
        host: host.to_string(),
    };

    match auth {
        AuthMethod::Password(password) => {
            let result = handle
                .authenticate_password(user, &**password)
                .await
                .map_err(|e| DeployError::Connection(e.to_string()))?;
            if !result.success() {
                return Err(rejected());
            }
        }
        AuthMethod::Key(key) => {
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| DeployError::Connection(e.to_string()))?
                .flatten();
            let result = handle
                .authenticate_publickey(
                    user,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(*key), hash_alg),
                )
                .await
                .map_err(|e| DeployError::Connection(e.to_string()))?;
            if !result.success() {
                return Err(rejected());
            }
        }
    }
    Ok(())
}

/// Client handler performing server host key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheck,
}

impl Handler for ClientHandler {
    type Error = DeployError;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.server_check {
            ServerCheck::AcceptAny => Ok(true),
            ServerCheck::KnownHosts => {
                let known = russh::keys::check_known_hosts(
                    &self.hostname,
                    self.port,
                    server_public_key,
                )
                .map_err(|_| DeployError::ServerCheckFailed {
                    host: self.hostname.clone(),
                })?;
                Ok(known)
            }
        }
    }
}
