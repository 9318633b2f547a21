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

//! Archive transport over the session's SFTP channel.

use std::path::Path;

use crate::error::DeployError;
use crate::ssh::Session;
use crate::utils::fs::format_bytes;

/// Stream the archive to `remote_dir/<archive file name>`.
///
/// Returns the remote archive path. On failure the job aborts before any
/// extraction is attempted; the remote target directory stays untouched.
pub async fn send(
    session: &Session,
    archive: &Path,
    remote_dir: &str,
) -> Result<String, DeployError> {
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            DeployError::Transfer(format!("{} has no usable file name", archive.display()))
        })?;
    let remote_path = join_remote(remote_dir, file_name);

    let size = std::fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
    tracing::info!(
        archive = %archive.display(),
        remote = %remote_path,
        size = %format_bytes(size),
        "uploading archive"
    );

    session.upload(archive, &remote_path).await?;
    Ok(remote_path)
}

/// Join a remote directory and file name without doubling separators.
/// Remote paths always use forward slashes; sftp servers on Windows
/// accept them too.
fn join_remote(dir: &str, name: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{name}")
    } else {
        format!("{trimmed}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_handles_trailing_slash() {
        assert_eq!(join_remote("/srv/app", "a.zip"), "/srv/app/a.zip");
        assert_eq!(join_remote("/srv/app/", "a.zip"), "/srv/app/a.zip");
        assert_eq!(join_remote("/", "a.zip"), "/a.zip");
    }
}
