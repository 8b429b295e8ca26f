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

//! Memoized shader-program lookups.

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use ember_core::renderer::{
    BaseShader, GlobalShaderFlags, ProgramId, RenderError, ShaderLibrary, ShaderProgramKey,
};

/// Remembers every permutation it has resolved, including the missing ones.
///
/// Shared between a renderer and the selectors it hands out, so a permutation
/// reaches the [`ShaderLibrary`] at most once per cache.
#[derive(Debug)]
pub struct ShaderProgramCache {
    library: Arc<dyn ShaderLibrary>,
    programs: RwLock<AHashMap<ShaderProgramKey, Option<ProgramId>>>,
}

impl ShaderProgramCache {
    /// Creates an empty cache in front of `library`.
    pub fn new(library: Arc<dyn ShaderLibrary>) -> Self {
        Self {
            library,
            programs: RwLock::new(AHashMap::new()),
        }
    }

    /// Resolves `key`, asking the library only the first time.
    pub fn lookup(&self, key: &ShaderProgramKey) -> Option<ProgramId> {
        if let Some(cached) = self
            .programs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
        {
            return *cached;
        }

        let program = self.library.lookup_program(key);
        if program.is_none() {
            log::debug!("ShaderProgramCache: missing permutation {key:?}");
        }
        self.programs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(*key, program);
        program
    }

    /// Resolves a full-screen pass program.
    pub fn screen_pass(&self, flags: GlobalShaderFlags, base: BaseShader) -> Option<ProgramId> {
        self.lookup(&ShaderProgramKey::screen_pass(flags, base))
    }

    /// Resolves `key` or fails initialization.
    ///
    /// ## Errors
    ///
    /// Returns [`RenderError::InitializationFailed`] naming the base shader if
    /// the permutation does not exist.
    pub fn require(&self, key: &ShaderProgramKey) -> Result<ProgramId, RenderError> {
        self.lookup(key).ok_or_else(|| {
            RenderError::InitializationFailed(format!(
                "missing shader program {:?} ({:?})",
                key.base_shader.ty, key.base_shader.flags
            ))
        })
    }

    /// Number of distinct permutations resolved so far.
    pub fn len(&self) -> usize {
        self.programs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every memoized result.
    pub fn clear(&self) {
        self.programs
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::renderer::BaseShaderType;
    use ember_infra::InMemoryShaderLibrary;

    #[test]
    fn missing_permutation_is_looked_up_once() {
        let library = Arc::new(InMemoryShaderLibrary::new());
        library.deny_base_shader(BaseShaderType::Ssao);
        let cache = ShaderProgramCache::new(library.clone());
        let key = ShaderProgramKey::screen_pass(
            GlobalShaderFlags::empty(),
            BaseShader::new(BaseShaderType::Ssao),
        );

        assert!(cache.lookup(&key).is_none());
        assert!(cache.lookup(&key).is_none());
        assert_eq!(library.lookup_count(), 1);
        assert!(matches!(
            cache.require(&key),
            Err(RenderError::InitializationFailed(_))
        ));
    }

    #[test]
    fn found_permutation_is_memoized() {
        let library = Arc::new(InMemoryShaderLibrary::new());
        let cache = ShaderProgramCache::new(library.clone());
        let base = BaseShader::new(BaseShaderType::ToneMap);
        let first = cache.screen_pass(GlobalShaderFlags::empty(), base);
        let second = cache.screen_pass(GlobalShaderFlags::empty(), base);
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(library.lookup_count(), 1);
        assert_eq!(cache.len(), 1);
    }
}
