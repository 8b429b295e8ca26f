// Copyright 2025 eraflo
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

use crate::renderer::api::{ProgramId, ShaderProgramKey};
use std::fmt::Debug;

/// Resolves shader permutations to linked programs.
///
/// The library is the boundary to the shader compilation front-end. A missing
/// permutation is reported as `None`, never as an error; callers skip the draw.
pub trait ShaderLibrary: Send + Sync + Debug {
    /// Looks up the program compiled for `key`.
    fn lookup_program(&self, key: &ShaderProgramKey) -> Option<ProgramId>;
}
