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

//! Operating-system family classification.
//!
//! Both the local archive strategy table and the remote extraction planner
//! branch on the same three families. Linux and macOS share the Unix tool
//! chain; only Windows gets a different one.

/// Operating-system family, local or remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

impl OsFamily {
    pub fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Classify `uname -s` output. Anything that is not Darwin is treated
    /// as the Linux branch of the Unix family.
    pub fn from_uname(stdout: &str) -> Self {
        if stdout.trim().eq_ignore_ascii_case("darwin") {
            Self::Macos
        } else {
            Self::Linux
        }
    }
}

/// The family of the machine running this process.
pub fn local_os_family() -> OsFamily {
    if cfg!(windows) {
        OsFamily::Windows
    } else if cfg!(target_os = "macos") {
        OsFamily::Macos
    } else {
        OsFamily::Linux
    }
}
