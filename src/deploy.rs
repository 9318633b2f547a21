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

//! Deployment orchestration.
//!
//! [`DeploymentSession`] owns the authenticated session for one run and
//! sequences the pipeline: probe local tools, select a strategy, build the
//! archive, upload it, probe the remote side, synthesize and execute the
//! extraction command. The local archive is a scoped resource removed on
//! every exit path; the session is closed exactly once because closing
//! consumes it.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use owo_colors::OwoColorize;

use crate::archive;
use crate::endpoint::Endpoint;
use crate::error::DeployError;
use crate::os::local_os_family;
use crate::remote;
use crate::ssh::{authenticate, CommandResult, ServerCheck, Session};
use crate::transfer;
use crate::utils::shell::sh_quote;

/// One deployment run against one endpoint.
#[derive(Debug)]
pub struct DeploymentSession {
    session: Session,
    endpoint: Endpoint,
    remote_path: String,
}

impl DeploymentSession {
    /// Authenticate and resolve the remote target path.
    ///
    /// When the endpoint carries no target path the remote user's working
    /// directory is used, matching what a bare `scp` destination would
    /// mean.
    pub async fn connect(
        endpoint: Endpoint,
        key: Option<&Path>,
        passphrase: Option<&str>,
        server_check: ServerCheck,
    ) -> Result<Self, DeployError> {
        let session = authenticate(&endpoint, key, passphrase, server_check).await?;

        let remote_path = match &endpoint.remote_path {
            Some(path) => path.clone(),
            None => {
                let cwd = session.current_dir().await?;
                tracing::info!(path = %cwd, "no target path given, using remote working directory");
                cwd
            }
        };

        Ok(Self {
            session,
            endpoint,
            remote_path,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Transfer `source` so its contents land at the remote target path.
    ///
    /// Archive and transfer failures abort before the remote target is
    /// touched; extraction failures propagate after local cleanup.
    pub async fn transfer(&self, source: &Path) -> Result<(), DeployError> {
        let tools = archive::probe_local_tools();
        let strategy = archive::select_strategy(local_os_family(), &tools);
        tracing::info!(?strategy, "archive strategy selected");

        let archive_path = archive::build(source, &strategy).await?;
        // From here on the archive is removed no matter how we exit.
        let _guard = ArchiveGuard::new(archive_path.clone());

        let remote_archive = transfer::send(&self.session, &archive_path, &self.remote_path).await?;

        let toolset = remote::probe_remote(&self.session).await?;
        let command =
            remote::plan_extraction(&remote_archive, &self.remote_path, strategy.format, &toolset);

        let result = self.session.execute(&command).await?;
        if !result.success() {
            return Err(DeployError::Extraction {
                status: result.exit_status,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        tracing::info!(
            source = %source.display(),
            target = %self.remote_path,
            "transfer complete"
        );
        Ok(())
    }

    /// Run an arbitrary command on the remote host.
    pub async fn exec(&self, command: &str) -> Result<CommandResult, DeployError> {
        self.session.execute(command).await
    }

    /// Create a directory under the remote target path.
    pub async fn make_directory(&self, name: &str) -> Result<(), DeployError> {
        let path = format!("{}/{name}", self.remote_path.trim_end_matches('/'));
        let result = self
            .session
            .execute(&format!("mkdir -p {}", sh_quote(&path)))
            .await?;
        if !result.success() {
            return Err(DeployError::Extraction {
                status: result.exit_status,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }
        Ok(())
    }

    /// Close the session. Consuming `self` makes a second close
    /// impossible.
    pub async fn close(self) -> Result<(), DeployError> {
        self.session.close().await
    }
}

/// Removes the local archive when the job ends, success or failure.
/// Removal failure is a warning, never an error.
struct ArchiveGuard {
    path: PathBuf,
}

impl ArchiveGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "local archive removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not remove local archive");
            }
        }
    }
}

/// A named deployment action.
pub struct Step<'a> {
    pub description: String,
    pub action: StepAction<'a>,
}

pub type StepAction<'a> =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + 'a>> + 'a>;

impl<'a> Step<'a> {
    pub fn new<F, Fut>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = anyhow::Result<()>> + 'a,
    {
        Self {
            description: description.into(),
            action: Box::new(move || Box::pin(action())),
        }
    }
}

/// Execute deployment steps in order, stopping at the first failure.
///
/// The caller is responsible for closing any open session afterwards,
/// whether or not the steps all ran.
pub async fn run_steps(steps: Vec<Step<'_>>) -> anyhow::Result<()> {
    let total = steps.len();
    for (index, step) in steps.into_iter().enumerate() {
        println!(
            "{} Step {}/{}: {}",
            "deploy:".yellow().bold(),
            index + 1,
            total,
            step.description
        );
        if let Err(e) = (step.action)().await {
            eprintln!(
                "{} step '{}' failed: {e:#}",
                "deploy:".red().bold(),
                step.description
            );
            return Err(e);
        }
    }
    Ok(())
}
