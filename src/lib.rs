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

//! dropship moves a local directory tree to a remote host over SSH and
//! unpacks it at a target path, picking the fastest packaging tools
//! available on either end and falling back to a built-in packer when
//! nothing usable is installed.
//!
//! The pipeline is strictly sequential: authenticate, probe local tools,
//! build the archive, upload it, probe the remote side, extract and
//! flatten, then clean up. The observable contract is that the remote
//! target directory ends up with exactly the contents of the local source
//! directory, no matter which tool chain did the work.

pub mod archive;
pub mod cli;
pub mod deploy;
pub mod endpoint;
pub mod error;
pub mod os;
pub mod remote;
pub mod ssh;
pub mod transfer;
pub mod utils;

pub use deploy::DeploymentSession;
pub use endpoint::Endpoint;
pub use error::DeployError;
