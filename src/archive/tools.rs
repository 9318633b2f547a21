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

//! Local packaging tool detection.

use std::collections::HashSet;

use crate::utils::fs::find_in_path;

/// Packaging tools probed for on the local machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalTool {
    /// Parallel gzip.
    Pigz,
    SevenZip,
    Tar,
    Gzip,
    Zip,
}

impl LocalTool {
    pub const ALL: [LocalTool; 5] = [
        LocalTool::Pigz,
        LocalTool::SevenZip,
        LocalTool::Tar,
        LocalTool::Gzip,
        LocalTool::Zip,
    ];

    /// The executable name looked up on PATH.
    pub fn command(self) -> &'static str {
        match self {
            Self::Pigz => "pigz",
            Self::SevenZip => "7z",
            Self::Tar => "tar",
            Self::Gzip => "gzip",
            Self::Zip => "zip",
        }
    }
}

/// Detect which packaging tools exist on this machine.
pub fn probe_local_tools() -> HashSet<LocalTool> {
    let mut found = HashSet::new();
    for tool in LocalTool::ALL {
        if let Some(path) = find_in_path(tool.command()) {
            tracing::debug!(tool = tool.command(), path = %path.display(), "local tool found");
            found.insert(tool);
        }
    }
    found
}
