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

//! A shader library that "compiles" every permutation on first lookup.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ember_core::renderer::api::{BaseShaderType, ProgramId, ShaderProgramKey};
use ember_core::ShaderLibrary;

#[derive(Debug, Default)]
struct Registry {
    programs: HashMap<ShaderProgramKey, ProgramId>,
    keys: HashMap<ProgramId, ShaderProgramKey>,
    denied_base_shaders: HashSet<BaseShaderType>,
    denied_keys: HashSet<ShaderProgramKey>,
}

/// Hands out a stable [`ProgramId`] per permutation, except for permutations
/// it has been told are missing.
///
/// Every call to [`ShaderLibrary::lookup_program`] is counted, so callers can
/// verify how often they reach the library.
#[derive(Debug, Default)]
pub struct InMemoryShaderLibrary {
    registry: Mutex<Registry>,
    lookups: AtomicUsize,
}

impl InMemoryShaderLibrary {
    /// Creates a library with every permutation available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every permutation of `base` unavailable.
    pub fn deny_base_shader(&self, base: BaseShaderType) {
        self.lock().denied_base_shaders.insert(base);
    }

    /// Makes one exact permutation unavailable.
    pub fn deny_key(&self, key: ShaderProgramKey) {
        self.lock().denied_keys.insert(key);
    }

    /// Makes every permutation available again.
    pub fn allow_all(&self) {
        let mut registry = self.lock();
        registry.denied_base_shaders.clear();
        registry.denied_keys.clear();
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// The permutation a program was created for.
    pub fn key_of(&self, program: ProgramId) -> Option<ShaderProgramKey> {
        self.lock().keys.get(&program).copied()
    }

    /// Every program created for `base`, in creation order.
    pub fn programs_for(&self, base: BaseShaderType) -> Vec<ProgramId> {
        let mut programs: Vec<_> = self
            .lock()
            .keys
            .iter()
            .filter(|(_, key)| key.base_shader.ty == base)
            .map(|(program, _)| *program)
            .collect();
        programs.sort();
        programs
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ShaderLibrary for InMemoryShaderLibrary {
    fn lookup_program(&self, key: &ShaderProgramKey) -> Option<ProgramId> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.lock();
        if registry.denied_base_shaders.contains(&key.base_shader.ty)
            || registry.denied_keys.contains(key)
        {
            log::debug!("InMemoryShaderLibrary: no permutation for {key:?}");
            return None;
        }
        if let Some(program) = registry.programs.get(key) {
            return Some(*program);
        }
        let program = ProgramId(registry.programs.len() as u64 + 1);
        registry.programs.insert(*key, program);
        registry.keys.insert(program, *key);
        Some(program)
    }
}
