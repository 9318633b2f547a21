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

//! Ignore-file bookkeeping.
//!
//! A flat text file, one pattern per line. Blank lines and lines starting
//! with `#` are skipped. When the file is missing it is created with a
//! single comment line so the user has somewhere to add patterns.
//!
//! The patterns are surfaced to the caller but are not applied to archive
//! contents; the archive pipeline ships the full source tree.

use std::io::Write;
use std::path::Path;

use crate::error::DeployError;

const DEFAULT_HEADER: &str = "# Add file patterns to ignore during deployment\n";

/// Load the exclusion patterns from `path`, creating the file with a
/// default comment line when it does not exist.
pub fn load_or_create(path: &Path) -> Result<Vec<String>, DeployError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no ignore file found, creating a default one");
        let mut file = std::fs::File::create(path)?;
        file.write_all(DEFAULT_HEADER.as_bytes())?;
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(path)?;
    Ok(parse(&contents))
}

fn parse(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".shipignore");

        let patterns = load_or_create(&path).unwrap();
        assert!(patterns.is_empty());
        assert!(path.exists());

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with('#'));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let parsed = parse("# header\n\nnode_modules\n  target  \n# trailing\n.git\n");
        assert_eq!(parsed, vec!["node_modules", "target", ".git"]);
    }

    #[test]
    fn existing_file_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".shipignore");
        std::fs::write(&path, "dist\n").unwrap();

        let patterns = load_or_create(&path).unwrap();
        assert_eq!(patterns, vec!["dist"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "dist\n");
    }
}
