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

//! Local archive creation: tool probing, strategy selection and the
//! builder with its built-in fallback packer.

pub mod builder;
pub mod strategy;
pub mod tools;

pub use builder::build;
pub use strategy::{select_strategy, ArchiveFormat, ArchiveStrategy, ArchiveTool};
pub use tools::{probe_local_tools, LocalTool};
