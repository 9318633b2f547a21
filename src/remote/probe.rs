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

//! Remote tool detection.
//!
//! Issues read-only probe commands over the session: an OS family query
//! first, then a presence check per extraction tool. Never mutates remote
//! state. An empty tool set is a valid result — the planner then routes
//! to the portable interpreter fallback. The result is derived fresh per
//! transfer and never cached; the remote may change between runs.

use std::collections::HashSet;

use crate::error::DeployError;
use crate::os::OsFamily;
use crate::ssh::Session;

/// Extraction tools probed for on the remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteTool {
    Unzip,
    Tar,
    Pigz,
    Gzip,
    SevenZip,
    /// Windows only; implies Expand-Archive is available.
    PowerShell,
}

impl RemoteTool {
    pub fn command(self) -> &'static str {
        match self {
            Self::Unzip => "unzip",
            Self::Tar => "tar",
            Self::Pigz => "pigz",
            Self::Gzip => "gzip",
            Self::SevenZip => "7z",
            Self::PowerShell => "powershell",
        }
    }
}

/// What the remote host can extract with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteToolSet {
    pub os_family: OsFamily,
    pub tools: HashSet<RemoteTool>,
}

impl RemoteToolSet {
    pub fn has(&self, tool: RemoteTool) -> bool {
        self.tools.contains(&tool)
    }
}

const UNIX_TOOLS: [RemoteTool; 5] = [
    RemoteTool::Unzip,
    RemoteTool::Tar,
    RemoteTool::Pigz,
    RemoteTool::Gzip,
    RemoteTool::SevenZip,
];

/// Detect the remote OS family and its available extraction tools.
pub async fn probe_remote(session: &Session) -> Result<RemoteToolSet, DeployError> {
    let uname = session.execute("uname -s").await?;
    if uname.success() {
        let os_family = OsFamily::from_uname(&uname.stdout);
        let mut tools = HashSet::new();
        for tool in UNIX_TOOLS {
            let check = session
                .execute(&format!("command -v {} >/dev/null 2>&1", tool.command()))
                .await?;
            if check.success() {
                tools.insert(tool);
            }
        }
        tracing::debug!(?os_family, ?tools, "remote probe complete");
        return Ok(RemoteToolSet { os_family, tools });
    }

    // No uname: likely Windows. Confirm via PowerShell before assuming.
    let ps = session
        .execute("powershell -NoProfile -NonInteractive -Command \"$PSVersionTable.PSVersion.Major\"")
        .await?;
    if ps.success() {
        let mut tools = HashSet::from([RemoteTool::PowerShell]);
        for tool in [RemoteTool::SevenZip, RemoteTool::Tar] {
            let check = session
                .execute(&format!("where.exe {} >NUL 2>&1", tool.command()))
                .await?;
            if check.success() {
                tools.insert(tool);
            }
        }
        tracing::debug!(?tools, "remote probe complete (windows)");
        return Ok(RemoteToolSet {
            os_family: OsFamily::Windows,
            tools,
        });
    }

    // Unclassifiable host. Treat it as a bare Unix box so the planner
    // falls through to the portable interpreter.
    tracing::warn!("could not classify remote OS, assuming bare unix");
    Ok(RemoteToolSet {
        os_family: OsFamily::Linux,
        tools: HashSet::new(),
    })
}
