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

//! Chooses and binds shader programs with as little work as possible.

use std::sync::Arc;

use bitflags::bitflags;
use ember_core::renderer::{
    BaseShader, BaseShaderType, GlobalShaderFlags, GpuContext, Material, MaterialShaderId,
    ProgramId, ShaderProgramKey, VertexFactoryDesc,
};

use super::program_cache::ShaderProgramCache;

bitflags! {
    /// Which parts of the selection changed since the last `make_active`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SelectorDirty: u8 {
        /// Global flags changed.
        const GLOBAL_FLAGS = 1 << 0;
        /// Base shader type or flags changed.
        const BASE_SHADER = 1 << 1;
        /// Vertex factory changed.
        const VERTEX_FACTORY = 1 << 2;
        /// Material shader or static switches changed.
        const MATERIAL_SHADER = 1 << 3;
        /// Material instance parameters must be rebound.
        const MATERIAL = 1 << 4;
    }
}

impl SelectorDirty {
    /// Bits that require a new program lookup.
    pub const PROGRAM: Self = Self::GLOBAL_FLAGS
        .union(Self::BASE_SHADER)
        .union(Self::VERTEX_FACTORY)
        .union(Self::MATERIAL_SHADER);
}

/// Tracks the current shader selection and binds the matching program only
/// when something that affects it has changed.
///
/// A `None` from [`make_active`](Self::make_active) means the permutation does
/// not exist or the material could not bind; the caller skips the draw.
#[derive(Debug)]
pub struct ShaderProgramSelector {
    cache: Arc<ShaderProgramCache>,
    global_flags: GlobalShaderFlags,
    base_shader: BaseShader,
    vertex_factory: VertexFactoryDesc,
    material: Option<Arc<dyn Material>>,
    material_shader: Option<MaterialShaderId>,
    static_switch_mask: u32,
    dirty: SelectorDirty,
    active: Option<ProgramId>,
}

impl ShaderProgramSelector {
    /// Creates a selector with everything dirty.
    pub fn new(cache: Arc<ShaderProgramCache>) -> Self {
        Self {
            cache,
            global_flags: GlobalShaderFlags::empty(),
            base_shader: BaseShader::new(BaseShaderType::DepthOnly),
            vertex_factory: VertexFactoryDesc::STATIC_MESH,
            material: None,
            material_shader: None,
            static_switch_mask: 0,
            dirty: SelectorDirty::all(),
            active: None,
        }
    }

    /// Sets the frame-wide flags.
    pub fn set_global_flags(&mut self, flags: GlobalShaderFlags) {
        if self.global_flags != flags {
            self.global_flags = flags;
            self.dirty |= SelectorDirty::GLOBAL_FLAGS;
        }
    }

    /// Sets the base shader.
    pub fn set_base_shader(&mut self, base: BaseShader) {
        if self.base_shader != base {
            self.base_shader = base;
            self.dirty |= SelectorDirty::BASE_SHADER;
        }
    }

    /// Sets the base shader type with no flags.
    pub fn set_base_shader_type(&mut self, ty: BaseShaderType) {
        self.set_base_shader(BaseShader::new(ty));
    }

    /// Sets the vertex factory.
    pub fn set_vertex_factory(&mut self, factory: VertexFactoryDesc) {
        if self.vertex_factory != factory {
            self.vertex_factory = factory;
            self.dirty |= SelectorDirty::VERTEX_FACTORY;
        }
    }

    /// Sets the material, or clears it for material-less passes.
    pub fn set_material(&mut self, material: Option<&Arc<dyn Material>>) {
        let same_instance = match (&self.material, material) {
            (Some(current), Some(new)) => Arc::ptr_eq(current, new),
            (None, None) => true,
            _ => false,
        };
        if same_instance {
            return;
        }

        let shader = material.map(|m| m.shader_id());
        let switches = material.map_or(0, |m| m.static_switch_mask());
        if shader != self.material_shader {
            self.dirty |= SelectorDirty::MATERIAL_SHADER;
        } else if switches != self.static_switch_mask {
            self.dirty |= SelectorDirty::MATERIAL_SHADER | SelectorDirty::MATERIAL;
        }
        self.dirty |= SelectorDirty::MATERIAL;

        self.material = material.cloned();
        self.material_shader = shader;
        self.static_switch_mask = switches;
    }

    /// The pending changes.
    pub fn dirty(&self) -> SelectorDirty {
        self.dirty
    }

    /// The program bound by the last successful `make_active`.
    pub fn active_program(&self) -> Option<ProgramId> {
        self.active
    }

    /// The full key for the current selection.
    pub fn key(&self) -> ShaderProgramKey {
        ShaderProgramKey {
            global_flags: self.global_flags,
            base_shader: self.base_shader,
            vertex_factory: self.vertex_factory,
            material_shader: self.material_shader,
            static_switch_mask: self.static_switch_mask,
        }
    }

    /// Binds the program for the current selection and the material's
    /// parameters, doing nothing when nothing changed.
    ///
    /// Returns `None` if the permutation is missing or the material fails to
    /// bind. The dirty state is kept in that case, so the next call retries.
    pub fn make_active(&mut self, gpu: &mut dyn GpuContext) -> Option<ProgramId> {
        if self.dirty.is_empty() {
            return self.active;
        }

        let mut program = self.active;
        if self.dirty.intersects(SelectorDirty::PROGRAM) || program.is_none() {
            let found = self.cache.lookup(&self.key());
            let Some(found) = found else {
                log::trace!(
                    "ShaderProgramSelector: no program for {:?}, skipping draw",
                    self.base_shader
                );
                return None;
            };
            if self.active != Some(found) {
                gpu.bind_program(found);
                self.active = Some(found);
                self.dirty |= SelectorDirty::MATERIAL;
            }
            self.dirty.remove(SelectorDirty::PROGRAM);
            program = Some(found);
        }
        let program = program?;

        if self.dirty.contains(SelectorDirty::MATERIAL) {
            if let Some(material) = &self.material {
                if !material.bind(gpu, program) {
                    log::trace!("ShaderProgramSelector: material {material:?} failed to bind");
                    return None;
                }
            }
            self.dirty.remove(SelectorDirty::MATERIAL);
        }
        Some(program)
    }

    /// Forgets the bound program so the next `make_active` rebinds.
    ///
    /// Called whenever the context may have lost its bindings: after a state
    /// clear, or when the selector moves to another context.
    pub fn invalidate(&mut self) {
        self.active = None;
        self.dirty = SelectorDirty::all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::renderer::{BasicMaterial, BlendMode};
    use ember_infra::{HeadlessGpuContext, InMemoryShaderLibrary};

    fn setup() -> (Arc<InMemoryShaderLibrary>, ShaderProgramSelector, HeadlessGpuContext) {
        let library = Arc::new(InMemoryShaderLibrary::new());
        let cache = Arc::new(ShaderProgramCache::new(library.clone()));
        (library, ShaderProgramSelector::new(cache), HeadlessGpuContext::new())
    }

    fn material(shader: u32) -> Arc<dyn Material> {
        Arc::new(BasicMaterial::new("m", MaterialShaderId(shader)))
    }

    #[test]
    fn second_make_active_is_free() {
        let (library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&material(1)));

        let first = selector.make_active(&mut gpu);
        let lookups = library.lookup_count();
        let second = selector.make_active(&mut gpu);

        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(library.lookup_count(), lookups);
        assert!(selector.dirty().is_empty());
    }

    #[test]
    fn unchanged_setters_leave_selector_clean() {
        let (_library, mut selector, mut gpu) = setup();
        let m = material(1);
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&m));
        selector.make_active(&mut gpu);

        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&m));
        selector.set_vertex_factory(VertexFactoryDesc::STATIC_MESH);
        assert!(selector.dirty().is_empty());
    }

    #[test]
    fn other_instance_of_same_shader_only_rebinds_material() {
        let (_library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&material(1)));
        selector.make_active(&mut gpu);

        selector.set_material(Some(&material(1)));
        assert_eq!(selector.dirty(), SelectorDirty::MATERIAL);
    }

    #[test]
    fn static_switch_change_dirties_shader_and_material() {
        let (_library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&material(1)));
        selector.make_active(&mut gpu);

        let mut switched = BasicMaterial::new("m", MaterialShaderId(1));
        switched.static_switch_mask = 0b10;
        let switched: Arc<dyn Material> = Arc::new(switched);
        selector.set_material(Some(&switched));
        assert_eq!(
            selector.dirty(),
            SelectorDirty::MATERIAL_SHADER | SelectorDirty::MATERIAL
        );
    }

    #[test]
    fn shader_change_triggers_new_lookup() {
        let (library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        selector.set_material(Some(&material(1)));
        let a = selector.make_active(&mut gpu);
        selector.set_material(Some(&material(2)));
        let b = selector.make_active(&mut gpu);
        assert_ne!(a, b);
        assert_eq!(library.lookup_count(), 2);
    }

    #[test]
    fn missing_permutation_returns_none_and_stays_dirty() {
        let (library, mut selector, mut gpu) = setup();
        library.deny_base_shader(BaseShaderType::GBuffer);
        selector.set_base_shader_type(BaseShaderType::GBuffer);
        assert!(selector.make_active(&mut gpu).is_none());
        assert!(selector.dirty().contains(SelectorDirty::BASE_SHADER));
        assert!(selector.active_program().is_none());
    }

    #[test]
    fn invalidate_forces_rebind() {
        let (_library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::DepthOnly);
        let bound = selector.make_active(&mut gpu);
        selector.invalidate();
        assert_eq!(selector.dirty(), SelectorDirty::all());
        assert_eq!(selector.make_active(&mut gpu), bound);
        let binds = gpu
            .device()
            .commands()
            .iter()
            .filter(|c| matches!(c, ember_infra::GpuCommand::BindProgram(_)))
            .count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn blend_mode_does_not_affect_selection() {
        let (_library, mut selector, mut gpu) = setup();
        selector.set_base_shader_type(BaseShaderType::ForwardBase);
        let opaque = material(3);
        let blended: Arc<dyn Material> =
            Arc::new(BasicMaterial::new("b", MaterialShaderId(3)).with_blend_mode(BlendMode::Translucent));
        selector.set_material(Some(&opaque));
        let a = selector.make_active(&mut gpu);
        selector.set_material(Some(&blended));
        let b = selector.make_active(&mut gpu);
        assert_eq!(a, b);
    }
}
