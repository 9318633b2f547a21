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

//! Credential resolution for the SSH session.
//!
//! A key file, when present, is parsed by trying each supported key family
//! in a fixed order: RSA, then ECDSA, then Ed25519. A family that fails
//! because the key is passphrase-protected is terminal — the user needs to
//! supply a passphrase, not a different parser. A family that simply does
//! not match advances the chain. When no key is available at all, a
//! password is prompted for synchronously.

use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::endpoint::Endpoint;
use crate::error::DeployError;
use crate::ssh::client::{AuthMethod, ServerCheck, Session};

/// Supported private key families, in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ecdsa,
    Ed25519,
}

impl KeyFamily {
    /// The fixed trial order.
    pub const ALL: [KeyFamily; 3] = [KeyFamily::Rsa, KeyFamily::Ecdsa, KeyFamily::Ed25519];

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ecdsa => "ecdsa",
            Self::Ed25519 => "ed25519",
        }
    }

    fn matches(self, algorithm: &russh::keys::ssh_key::Algorithm) -> bool {
        use russh::keys::ssh_key::Algorithm;
        match self {
            Self::Rsa => matches!(algorithm, Algorithm::Rsa { .. }),
            Self::Ecdsa => matches!(algorithm, Algorithm::Ecdsa { .. }),
            Self::Ed25519 => matches!(algorithm, Algorithm::Ed25519),
        }
    }
}

/// Outcome of one family's attempt at parsing a key file.
#[derive(Debug)]
pub enum TrialOutcome {
    /// This family parsed the key.
    Parsed(Box<russh::keys::PrivateKey>),
    /// Not this family's format; the chain advances.
    WrongFormat,
    /// The key is encrypted and no passphrase was supplied. Terminal.
    PassphraseRequired,
}

/// Default key files probed when no explicit key is given, in priority
/// order. Absence is not an error; it defers to password authentication.
const DEFAULT_KEY_FILES: [&str; 3] = ["id_rsa", "id_ecdsa", "id_ed25519"];

/// Resolve the key file to use: an explicit path wins unchanged, otherwise
/// the first conventional `~/.ssh` key that exists, otherwise `None`.
pub fn default_key_candidate(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    for name in DEFAULT_KEY_FILES {
        let candidate = ssh_dir.join(name);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "using default key");
            return Some(candidate);
        }
    }
    None
}

/// Try to parse key material as one specific family.
pub fn try_family(
    family: KeyFamily,
    key_data: &str,
    passphrase: Option<&str>,
) -> TrialOutcome {
    // Encrypted OpenSSH keys parse at the envelope level even without the
    // passphrase, which lets us distinguish "needs input" from "not this
    // format".
    if passphrase.is_none() {
        if let Ok(envelope) = russh::keys::ssh_key::PrivateKey::from_openssh(key_data) {
            if envelope.is_encrypted() {
                return TrialOutcome::PassphraseRequired;
            }
        }
    }

    match russh::keys::decode_secret_key(key_data, passphrase) {
        Ok(key) if family.matches(&key.algorithm()) => TrialOutcome::Parsed(Box::new(key)),
        Ok(_) => TrialOutcome::WrongFormat,
        Err(russh::keys::Error::KeyIsEncrypted) => TrialOutcome::PassphraseRequired,
        Err(e) => {
            tracing::trace!(family = family.name(), error = %e, "key family did not parse");
            TrialOutcome::WrongFormat
        }
    }
}

/// Parse a private key file by walking the family chain in order.
pub fn load_private_key(
    path: &Path,
    passphrase: Option<&str>,
) -> Result<Box<russh::keys::PrivateKey>, DeployError> {
    let key_data = std::fs::read_to_string(path)?;

    for family in KeyFamily::ALL {
        match try_family(family, &key_data, passphrase) {
            TrialOutcome::Parsed(key) => {
                tracing::debug!(family = family.name(), path = %path.display(), "key parsed");
                return Ok(key);
            }
            TrialOutcome::WrongFormat => {
                tracing::debug!(family = family.name(), "wrong format, trying next family");
            }
            TrialOutcome::PassphraseRequired => {
                return Err(DeployError::KeyPassphraseRequired {
                    path: path.to_path_buf(),
                });
            }
        }
    }

    Err(DeployError::UnsupportedKeyFormat {
        path: path.to_path_buf(),
    })
}

/// Establish an authenticated session for the endpoint.
///
/// With a key candidate the family chain decides; without one the user is
/// prompted for a password. The returned [`Session`] is the sole handle
/// for all subsequent remote operations.
pub async fn authenticate(
    endpoint: &Endpoint,
    key: Option<&Path>,
    passphrase: Option<&str>,
    server_check: ServerCheck,
) -> Result<Session, DeployError> {
    let method = match key {
        Some(path) => {
            tracing::debug!(path = %path.display(), "authenticating with key");
            AuthMethod::Key(load_private_key(path, passphrase)?)
        }
        None => {
            tracing::debug!("no key candidate, falling back to password authentication");
            let password = Zeroizing::new(rpassword::prompt_password(format!(
                "Password for {}@{}: ",
                endpoint.user, endpoint.host
            ))?);
            AuthMethod::Password(password)
        }
    };

    Session::connect(endpoint, method, server_check).await
}
