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

//! Error types for the deployment pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during a deployment run.
///
/// Authentication and connection variants are fatal: the binary prints a
/// diagnostic and exits non-zero. Archive and transfer failures abort the
/// job before the remote target is touched. Extraction failures propagate
/// after local cleanup; the remote side may be left with a stray archive
/// or partial staging directory in that case.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The server rejected the supplied credentials.
    #[error("authentication failed for {user}@{host}")]
    AuthenticationFailed { user: String, host: String },

    /// No supported key family could parse the key file.
    #[error("unsupported key format: no key family could parse '{}'", path.display())]
    UnsupportedKeyFormat { path: PathBuf },

    /// The key is passphrase-protected but no passphrase was supplied.
    #[error(
        "key '{}' is passphrase-protected; re-run with --ask-passphrase to supply one",
        path.display()
    )]
    KeyPassphraseRequired { path: PathBuf },

    /// Network-level failure establishing or using the SSH connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Every archiver, including the built-in fallback, failed.
    #[error("archive creation failed: {0}")]
    ArchiveCreation(String),

    /// Copying the archive to the remote host failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// A synthesized remote command (unpack-and-flatten, mkdir) exited
    /// non-zero.
    #[error("remote command failed (exit {status}): {stderr}")]
    Extraction {
        status: u32,
        stdout: String,
        stderr: String,
    },

    /// A remote command's channel closed without reporting an exit status.
    #[error("remote command did not report an exit status")]
    CommandDidntExit,

    /// The server's host key did not verify against known_hosts.
    #[error("host key verification failed for {host}")]
    ServerCheckFailed { host: String },

    /// SSH protocol error from the underlying transport.
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    /// Local filesystem or prompt I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Whether this error should terminate the process rather than be
    /// handed back to the step harness.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. }
                | Self::UnsupportedKeyFormat { .. }
                | Self::KeyPassphraseRequired { .. }
                | Self::Connection(_)
                | Self::ServerCheckFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(DeployError::Connection("refused".into()).is_fatal());
        assert!(DeployError::AuthenticationFailed {
            user: "deploy".into(),
            host: "example.com".into(),
        }
        .is_fatal());
        assert!(!DeployError::Transfer("broken pipe".into()).is_fatal());
        assert!(!DeployError::Extraction {
            status: 1,
            stdout: String::new(),
            stderr: "unzip: not found".into(),
        }
        .is_fatal());
    }

    #[test]
    fn messages_name_the_offending_path() {
        let err = DeployError::UnsupportedKeyFormat {
            path: PathBuf::from("/home/deploy/.ssh/id_rsa"),
        };
        assert!(err.to_string().contains("/home/deploy/.ssh/id_rsa"));
    }
}
