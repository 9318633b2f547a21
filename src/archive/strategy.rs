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

//! Archive strategy selection.
//!
//! A fixed priority table maps (OS family, available tools) to exactly one
//! (format, tool) pair. First match wins; the branches are disjoint, so
//! the same inputs always produce the same strategy.

use std::collections::HashSet;

use crate::os::OsFamily;

use super::tools::LocalTool;

/// Archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

/// How the archive gets built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveTool {
    /// `7z a -tzip -mx=9` (zip).
    SevenZip,
    /// `zip -r -9` (zip).
    NativeZip,
    /// `tar -cf - | pigz` (tar.gz), the fastest Unix chain.
    TarPigz,
    /// `tar -czf` with gzip available to back `-z` (tar.gz).
    TarGzip,
    /// tar alone produces the stream; gzip compression happens in-process
    /// (tar.gz, for machines with tar but no gzip).
    TarExternalGzip,
    /// The built-in packer; always available.
    Builtin,
}

/// A chosen (format, tool) pair. Selected once per transfer, never
/// mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStrategy {
    pub format: ArchiveFormat,
    pub tool: ArchiveTool,
}

impl ArchiveStrategy {
    const fn new(format: ArchiveFormat, tool: ArchiveTool) -> Self {
        Self { format, tool }
    }
}

/// Pick the archive strategy for this machine.
///
/// Windows priority: 7z > native zip > builtin, always producing zip.
/// Unix priority: tar+pigz > 7z > tar with gzip > tar alone > native zip >
/// builtin, preferring tar.gz where the tar chain is involved.
pub fn select_strategy(family: OsFamily, tools: &HashSet<LocalTool>) -> ArchiveStrategy {
    use ArchiveFormat::{TarGz, Zip};
    use ArchiveTool::*;
    use LocalTool as T;

    let has = |t: T| tools.contains(&t);

    if family.is_windows() {
        return if has(T::SevenZip) {
            ArchiveStrategy::new(Zip, SevenZip)
        } else if has(T::Zip) {
            ArchiveStrategy::new(Zip, NativeZip)
        } else {
            ArchiveStrategy::new(Zip, Builtin)
        };
    }

    if has(T::Tar) && has(T::Pigz) {
        ArchiveStrategy::new(TarGz, TarPigz)
    } else if has(T::SevenZip) {
        ArchiveStrategy::new(Zip, SevenZip)
    } else if has(T::Tar) && has(T::Gzip) {
        ArchiveStrategy::new(TarGz, TarGzip)
    } else if has(T::Tar) {
        ArchiveStrategy::new(TarGz, TarExternalGzip)
    } else if has(T::Zip) {
        ArchiveStrategy::new(Zip, NativeZip)
    } else {
        ArchiveStrategy::new(TarGz, Builtin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tools: &[LocalTool]) -> HashSet<LocalTool> {
        tools.iter().copied().collect()
    }

    #[test]
    fn windows_prefers_sevenzip() {
        let strategy = select_strategy(
            OsFamily::Windows,
            &set(&[LocalTool::SevenZip, LocalTool::Zip, LocalTool::Tar]),
        );
        assert_eq!(strategy.tool, ArchiveTool::SevenZip);
        assert_eq!(strategy.format, ArchiveFormat::Zip);
    }

    #[test]
    fn windows_falls_back_to_zip_then_builtin() {
        let strategy = select_strategy(OsFamily::Windows, &set(&[LocalTool::Zip]));
        assert_eq!(strategy.tool, ArchiveTool::NativeZip);

        let strategy = select_strategy(OsFamily::Windows, &set(&[]));
        assert_eq!(strategy.tool, ArchiveTool::Builtin);
        assert_eq!(strategy.format, ArchiveFormat::Zip);
    }

    #[test]
    fn unix_prefers_pigz_pipe() {
        let strategy = select_strategy(
            OsFamily::Linux,
            &set(&[
                LocalTool::Tar,
                LocalTool::Pigz,
                LocalTool::Gzip,
                LocalTool::SevenZip,
            ]),
        );
        assert_eq!(strategy.tool, ArchiveTool::TarPigz);
        assert_eq!(strategy.format, ArchiveFormat::TarGz);
    }

    #[test]
    fn unix_sevenzip_beats_plain_tar() {
        let strategy = select_strategy(
            OsFamily::Linux,
            &set(&[LocalTool::Tar, LocalTool::Gzip, LocalTool::SevenZip]),
        );
        assert_eq!(strategy.tool, ArchiveTool::SevenZip);
        assert_eq!(strategy.format, ArchiveFormat::Zip);
    }

    #[test]
    fn unix_tar_chain() {
        let strategy =
            select_strategy(OsFamily::Linux, &set(&[LocalTool::Tar, LocalTool::Gzip]));
        assert_eq!(strategy.tool, ArchiveTool::TarGzip);

        let strategy = select_strategy(OsFamily::Linux, &set(&[LocalTool::Tar]));
        assert_eq!(strategy.tool, ArchiveTool::TarExternalGzip);
        assert_eq!(strategy.format, ArchiveFormat::TarGz);
    }

    #[test]
    fn unix_zip_then_builtin() {
        let strategy = select_strategy(OsFamily::Linux, &set(&[LocalTool::Zip]));
        assert_eq!(strategy.tool, ArchiveTool::NativeZip);
        assert_eq!(strategy.format, ArchiveFormat::Zip);

        let strategy = select_strategy(OsFamily::Macos, &set(&[]));
        assert_eq!(strategy.tool, ArchiveTool::Builtin);
        assert_eq!(strategy.format, ArchiveFormat::TarGz);
    }

    #[test]
    fn selection_is_deterministic() {
        let tools = set(&[LocalTool::Tar, LocalTool::Pigz]);
        let first = select_strategy(OsFamily::Linux, &tools);
        for _ in 0..10 {
            assert_eq!(select_strategy(OsFamily::Linux, &tools), first);
        }
    }

    // Every subset of the candidate tool list maps to exactly one branch.
    #[test]
    fn total_order_over_all_tool_sets() {
        for mask in 0u32..(1 << LocalTool::ALL.len()) {
            let tools: HashSet<LocalTool> = LocalTool::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, t)| *t)
                .collect();
            // Must not panic, and must be stable.
            let a = select_strategy(OsFamily::Linux, &tools);
            let b = select_strategy(OsFamily::Linux, &tools);
            assert_eq!(a, b);
            let w = select_strategy(OsFamily::Windows, &tools);
            assert_eq!(w.format, ArchiveFormat::Zip);
        }
    }
}
