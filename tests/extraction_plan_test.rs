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

use std::collections::HashSet;
use std::fs;
use std::process::Command;

use dropship::archive::{build, ArchiveFormat, ArchiveStrategy, ArchiveTool};
use dropship::os::OsFamily;
use dropship::remote::{plan_extraction, RemoteTool, RemoteToolSet};
use dropship::utils::fs::find_in_path;
use tempfile::TempDir;

/// Builds a real archive, runs the synthesized extraction command through
/// a local shell and checks the flatten-and-cleanup contract. Requires
/// `sh` and `tar`; silently passes where they are missing.
#[tokio::test]
async fn test_unix_plan_flattens_and_cleans_up() {
    if find_in_path("sh").is_none() || find_in_path("tar").is_none() {
        return;
    }

    let local = TempDir::new().unwrap();
    fs::create_dir_all(local.path().join("site/assets")).unwrap();
    fs::write(local.path().join("site/index.html"), "<html></html>").unwrap();
    fs::write(local.path().join("site/assets/app.js"), "x").unwrap();

    let strategy = ArchiveStrategy {
        format: ArchiveFormat::TarGz,
        tool: ArchiveTool::Builtin,
    };
    let archive = build(&local.path().join("site"), &strategy).await.unwrap();

    // Stand-in for the remote host: archive uploaded next to the target.
    let remote = TempDir::new().unwrap();
    let remote_archive = remote.path().join("site.tar.gz");
    fs::copy(&archive, &remote_archive).unwrap();
    fs::remove_file(&archive).unwrap();
    let target = remote.path().join("deployed app");

    let toolset = RemoteToolSet {
        os_family: OsFamily::Linux,
        tools: HashSet::from([RemoteTool::Tar]),
    };
    let cmd = plan_extraction(
        &remote_archive.to_string_lossy(),
        &target.to_string_lossy(),
        ArchiveFormat::TarGz,
        &toolset,
    );

    let status = Command::new("sh").arg("-c").arg(&cmd).status().unwrap();
    assert!(status.success(), "extraction command failed: {cmd}");

    // Wrapper directory flattened away: contents land directly in target.
    assert_eq!(
        fs::read_to_string(target.join("index.html")).unwrap(),
        "<html></html>"
    );
    assert!(target.join("assets/app.js").exists());
    assert!(!target.join("site").exists());

    // Staging directory and archive are gone.
    assert!(!remote_archive.exists());
    assert!(!remote.path().join("site.tar.gz.stage").exists());
}

#[tokio::test]
async fn test_flatten_handles_newline_in_wrapper_name() {
    if find_in_path("sh").is_none() || find_in_path("tar").is_none() {
        return;
    }

    let local = TempDir::new().unwrap();
    // A legal Unix directory name that breaks line-oriented counting.
    let name = "app\ndir";
    fs::create_dir_all(local.path().join(name)).unwrap();
    fs::write(local.path().join(name).join("index.html"), "x").unwrap();

    let strategy = ArchiveStrategy {
        format: ArchiveFormat::TarGz,
        tool: ArchiveTool::Builtin,
    };
    let archive = build(&local.path().join(name), &strategy).await.unwrap();

    let remote = TempDir::new().unwrap();
    let remote_archive = remote.path().join("app.tar.gz");
    fs::copy(&archive, &remote_archive).unwrap();
    fs::remove_file(&archive).unwrap();
    let target = remote.path().join("deployed");

    let toolset = RemoteToolSet {
        os_family: OsFamily::Linux,
        tools: HashSet::from([RemoteTool::Tar]),
    };
    let cmd = plan_extraction(
        &remote_archive.to_string_lossy(),
        &target.to_string_lossy(),
        ArchiveFormat::TarGz,
        &toolset,
    );
    let status = Command::new("sh").arg("-c").arg(&cmd).status().unwrap();
    assert!(status.success(), "extraction command failed: {cmd}");

    // The single wrapper still flattens; its contents land in the target.
    assert!(target.join("index.html").exists());
    assert!(!target.join(name).exists());
}

#[tokio::test]
async fn test_unix_plan_overwrites_existing_files() {
    if find_in_path("sh").is_none() || find_in_path("tar").is_none() {
        return;
    }

    let local = TempDir::new().unwrap();
    fs::create_dir_all(local.path().join("site")).unwrap();
    fs::write(local.path().join("site/index.html"), "new").unwrap();

    let strategy = ArchiveStrategy {
        format: ArchiveFormat::TarGz,
        tool: ArchiveTool::Builtin,
    };
    let archive = build(&local.path().join("site"), &strategy).await.unwrap();

    let remote = TempDir::new().unwrap();
    let remote_archive = remote.path().join("site.tar.gz");
    fs::copy(&archive, &remote_archive).unwrap();
    fs::remove_file(&archive).unwrap();

    // Target pre-populated with a same-named file and an unrelated one.
    let target = remote.path().join("app");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("index.html"), "old").unwrap();
    fs::write(target.join("keep.txt"), "keep").unwrap();

    let toolset = RemoteToolSet {
        os_family: OsFamily::Linux,
        tools: HashSet::from([RemoteTool::Tar]),
    };
    let cmd = plan_extraction(
        &remote_archive.to_string_lossy(),
        &target.to_string_lossy(),
        ArchiveFormat::TarGz,
        &toolset,
    );
    let status = Command::new("sh").arg("-c").arg(&cmd).status().unwrap();
    assert!(status.success());

    // Last writer wins; unrelated entries survive.
    assert_eq!(fs::read_to_string(target.join("index.html")).unwrap(), "new");
    assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "keep");
}
