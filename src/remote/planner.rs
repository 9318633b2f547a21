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

//! Extraction-command synthesis.
//!
//! One remote command is produced that unpacks the archive into a staging
//! directory next to it, flattens the single wrapper directory written by
//! the builder, overwrites same-named entries at the target
//! (last-writer-wins) and removes both the staging directory and the
//! archive. The flattening step runs regardless of which tool performed
//! the unpack.
//!
//! Unpack tool choice follows a fixed priority table, mirroring the local
//! strategy table: native tools first, archiver CLI second, a portable
//! interpreter last. Paths enter the command only through the quoting
//! functions in [`crate::utils::shell`].

use crate::archive::ArchiveFormat;
use crate::utils::shell::{ps_quote, sh_quote};

use super::probe::{RemoteTool, RemoteToolSet};

/// Synthesize the remote unpack-and-flatten command.
pub fn plan_extraction(
    remote_archive: &str,
    remote_target: &str,
    format: ArchiveFormat,
    remote: &RemoteToolSet,
) -> String {
    if remote.os_family.is_windows() {
        plan_windows(remote_archive, remote_target, format, remote)
    } else {
        plan_unix(remote_archive, remote_target, format, remote)
    }
}

fn plan_unix(
    remote_archive: &str,
    remote_target: &str,
    format: ArchiveFormat,
    remote: &RemoteToolSet,
) -> String {
    let unpack = match format {
        ArchiveFormat::Zip => {
            if remote.has(RemoteTool::Unzip) {
                r#"unzip -oq "$arc" -d "$stage""#.to_string()
            } else if remote.has(RemoteTool::SevenZip) {
                r#"7z x -y -o"$stage" "$arc" >/dev/null"#.to_string()
            } else {
                // Portable interpreter fallback.
                r#"python3 -c 'import sys,zipfile; zipfile.ZipFile(sys.argv[1]).extractall(sys.argv[2])' "$arc" "$stage""#
                    .to_string()
            }
        }
        ArchiveFormat::TarGz => {
            if remote.has(RemoteTool::Tar) && remote.has(RemoteTool::Pigz) {
                r#"pigz -dc "$arc" | tar -xf - -C "$stage""#.to_string()
            } else if remote.has(RemoteTool::Tar) && remote.has(RemoteTool::Gzip) {
                r#"gzip -dc "$arc" | tar -xf - -C "$stage""#.to_string()
            } else if remote.has(RemoteTool::Tar) {
                r#"tar -xzf "$arc" -C "$stage""#.to_string()
            } else {
                r#"python3 -c 'import sys,tarfile; tarfile.open(sys.argv[1], "r:gz").extractall(sys.argv[2])' "$arc" "$stage""#
                    .to_string()
            }
        }
    };

    // The staging directory lives next to the archive, whose name is
    // unique per run. The flatten test counts top-level entries through
    // globs rather than parsing ls, so names with embedded newlines count
    // correctly; exactly one directory means its contents move up,
    // anything else moves staging contents as-is.
    format!(
        concat!(
            "set -e; ",
            "arc={arc}; stage=\"$arc.stage\"; tgt={tgt}; ",
            "mkdir -p \"$stage\" \"$tgt\"; ",
            "{unpack}; ",
            "set -- \"$stage\"/* \"$stage\"/.[!.]* \"$stage\"/..?*; ",
            "n=0; one=; ",
            "for p in \"$@\"; do ",
            "{{ [ -e \"$p\" ] || [ -L \"$p\" ]; }} || continue; ",
            "n=$((n+1)); one=\"$p\"; ",
            "done; ",
            "if [ \"$n\" -eq 1 ] && [ -d \"$one\" ]; ",
            "then cp -a \"$one/.\" \"$tgt/\"; ",
            "else cp -a \"$stage/.\" \"$tgt/\"; fi; ",
            "rm -rf \"$stage\"; rm -f \"$arc\"",
        ),
        arc = sh_quote(remote_archive),
        tgt = sh_quote(remote_target),
        unpack = unpack,
    )
}

fn plan_windows(
    remote_archive: &str,
    remote_target: &str,
    format: ArchiveFormat,
    remote: &RemoteToolSet,
) -> String {
    let unpack = match format {
        ArchiveFormat::Zip => {
            if remote.has(RemoteTool::Tar) {
                // Windows 10+ ships bsdtar, which reads zip directly.
                "tar -xf $arc -C $stage".to_string()
            } else if remote.has(RemoteTool::SevenZip) {
                "& 7z x -y ('-o'+$stage) $arc | Out-Null".to_string()
            } else {
                "Expand-Archive -LiteralPath $arc -DestinationPath $stage -Force".to_string()
            }
        }
        ArchiveFormat::TarGz => {
            if remote.has(RemoteTool::Tar) {
                "tar -xzf $arc -C $stage".to_string()
            } else if remote.has(RemoteTool::SevenZip) {
                // 7z needs two passes for .tar.gz: gunzip, then untar.
                concat!(
                    "& 7z x -y ('-o'+$stage+'.tmp') $arc | Out-Null; ",
                    "& 7z x -y ('-o'+$stage) ($stage+'.tmp\\*.tar') | Out-Null; ",
                    "Remove-Item -Recurse -Force ($stage+'.tmp')",
                )
                .to_string()
            } else {
                // Best effort; stock PowerShell cannot read tar.gz.
                "tar -xzf $arc -C $stage".to_string()
            }
        }
    };

    let script = format!(
        concat!(
            "$ErrorActionPreference='Stop'; ",
            "$arc={arc}; $stage=$arc+'.stage'; $tgt={tgt}; ",
            "New-Item -ItemType Directory -Force -Path $stage,$tgt | Out-Null; ",
            "{unpack}; ",
            "$e=@(Get-ChildItem -LiteralPath $stage); ",
            "if ($e.Count -eq 1 -and $e[0].PSIsContainer) ",
            "{{ Copy-Item -Path ($e[0].FullName+'\\*') -Destination $tgt -Recurse -Force }} ",
            "else {{ Copy-Item -Path ($stage+'\\*') -Destination $tgt -Recurse -Force }}; ",
            "Remove-Item -LiteralPath $stage -Recurse -Force; ",
            "Remove-Item -LiteralPath $arc -Force",
        ),
        arc = ps_quote(remote_archive),
        tgt = ps_quote(remote_target),
        unpack = unpack,
    );

    format!("powershell -NoProfile -NonInteractive -Command \"{script}\"")
}
