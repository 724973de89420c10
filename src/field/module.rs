// Copyright 2024 OctoFHIR Team
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

//! Field module: the arena owning every field of a region
//!
//! The module hands out [`FieldHandle`]s, keeps names unique, maintains the
//! source graph and is the entry point for evaluation and assignment through
//! a [`FieldCache`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::context::EvaluationContext;
use super::{Field, FieldDefinition, FieldDescription, FieldHandle};
use crate::cache::{FieldCache, MeshLocationValueCache, RealValueCache, StringValueCache, ValueCache};
use crate::config::EvaluationConfig;
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::model::{
    CoordinateSystem, ElementId, InterpolationKernel, MAXIMUM_ELEMENT_XI_DIMENSIONS, MeshTopology,
    Revision, SharedMesh, StandardKernel, StoredFieldRef, Xi,
};

static NEXT_MODULE_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug)]
struct Slot {
    generation: u32,
    field: Option<Field>,
}

/// Arena of fields sharing one mesh, kernel and data revision
#[derive(Debug)]
pub struct FieldModule {
    id: u32,
    slots: Vec<Slot>,
    free: Vec<u32>,
    names: FxHashMap<String, FieldHandle>,
    mesh: SharedMesh,
    kernel: Arc<dyn InterpolationKernel>,
    revision: Revision,
    config: EvaluationConfig,
    cmiss_number: Option<FieldHandle>,
    xi: Option<FieldHandle>,
}

impl FieldModule {
    /// Create a module over a mesh using the standard interpolation kernel
    pub fn new(mesh: SharedMesh, revision: Revision, config: EvaluationConfig) -> Self {
        Self::with_kernel(mesh, revision, config, Arc::new(StandardKernel))
    }

    /// Create a module with a custom interpolation kernel
    pub fn with_kernel(
        mesh: SharedMesh,
        revision: Revision,
        config: EvaluationConfig,
        kernel: Arc<dyn InterpolationKernel>,
    ) -> Self {
        Self {
            id: NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            names: FxHashMap::default(),
            mesh,
            kernel,
            revision,
            config,
            cmiss_number: None,
            xi: None,
        }
    }

    /// Unique module identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Mesh the fields are defined over
    pub fn mesh(&self) -> &SharedMesh {
        &self.mesh
    }

    /// Interpolation kernel
    pub fn kernel(&self) -> &dyn InterpolationKernel {
        self.kernel.as_ref()
    }

    /// Shared data revision
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Evaluation settings
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Start an evaluation session
    pub fn create_field_cache(&self) -> FieldCache {
        FieldCache::new(self.id, self.revision.get(), self.config.element_cache_limit)
    }

    // Arena

    /// Field behind a handle
    pub fn field(&self, handle: FieldHandle) -> FieldResult<&Field> {
        if handle.module_id() != self.id {
            return Err(FieldError::InvalidHandle(handle.to_string()));
        }
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.field.as_ref())
            .ok_or_else(|| FieldError::InvalidHandle(handle.to_string()))
    }

    fn field_mut(&mut self, handle: FieldHandle) -> FieldResult<&mut Field> {
        self.field(handle)?;
        self.slots[handle.index()]
            .field
            .as_mut()
            .ok_or_else(|| FieldError::InvalidHandle(handle.to_string()))
    }

    /// Handle of the field with a name
    pub fn find_field_by_name(&self, name: &str) -> Option<FieldHandle> {
        self.names.get(name).copied()
    }

    /// Field with a name
    pub fn field_by_name(&self, name: &str) -> FieldResult<&Field> {
        let handle = self
            .find_field_by_name(name)
            .ok_or_else(|| FieldError::FieldNotFound(name.to_string()))?;
        self.field(handle)
    }

    /// Live fields in arena order
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.slots.iter().filter_map(|slot| slot.field.as_ref())
    }

    /// Number of live fields
    pub fn field_count(&self) -> usize {
        self.names.len()
    }

    fn check_definition(&self, definition: &FieldDefinition) -> FieldResult<()> {
        if definition.component_count == 0 {
            return Err(FieldError::invalid_argument(
                "define field",
                "component count must be positive",
            ));
        }
        for &source in &definition.sources {
            self.field(source)?;
        }
        Ok(())
    }

    /// Point a stored field's modifications at this module's revision so
    /// every cache of the module sees writes through it
    fn adopt_data_source(&self, definition: &FieldDefinition) {
        let Some(stored) = definition.core.data_source() else {
            return;
        };
        if stored.read().revision().same_counter(&self.revision) {
            return;
        }
        let mut stored = stored.write();
        debug!("Stored field '{}' now shares module {} revision", stored.name(), self.id);
        stored.attach_revision(self.revision.clone());
        self.revision.bump();
    }

    fn resolve_coordinate_system(&self, definition: &FieldDefinition) -> CoordinateSystem {
        definition.coordinate_system.unwrap_or_else(|| {
            definition
                .sources
                .first()
                .and_then(|&source| self.field(source).ok())
                .map(|source| source.coordinate_system)
                .unwrap_or_default()
        })
    }

    /// Add a field under a new name
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        definition: FieldDefinition,
    ) -> FieldResult<FieldHandle> {
        let name = name.into();
        if name.is_empty() {
            return Err(FieldError::invalid_argument("add_field", "field name is empty"));
        }
        if self.names.contains_key(&name) {
            return Err(FieldError::DuplicateName(name));
        }
        self.check_definition(&definition)?;
        self.adopt_data_source(&definition);
        let coordinate_system = self.resolve_coordinate_system(&definition);

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    field: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = FieldHandle::new(self.id, index, slot.generation);
        debug!("Adding {} field '{name}'", definition.core.type_name());
        self.names.insert(name.clone(), handle);
        slot.field = Some(Field {
            handle,
            name,
            component_count: definition.component_count,
            coordinate_system,
            sources: definition.sources,
            source_values: definition.source_values,
            core: definition.core,
            definition: 0,
        });
        Ok(handle)
    }

    /// Rename a field
    pub fn rename_field(&mut self, handle: FieldHandle, new_name: impl Into<String>) -> FieldResult<()> {
        let new_name = new_name.into();
        let old_name = self.field(handle)?.name.clone();
        if old_name == new_name {
            return Ok(());
        }
        if new_name.is_empty() {
            return Err(FieldError::invalid_argument("rename_field", "field name is empty"));
        }
        if self.names.contains_key(&new_name) {
            return Err(FieldError::DuplicateName(new_name));
        }
        self.names.remove(&old_name);
        self.names.insert(new_name.clone(), handle);
        self.field_mut(handle)?.name = new_name;
        Ok(())
    }

    /// Fields that use `handle` as a source
    pub fn users_of(&self, handle: FieldHandle) -> Vec<FieldHandle> {
        self.fields()
            .filter(|field| field.handle != handle && field.sources.contains(&handle))
            .map(|field| field.handle)
            .collect()
    }

    /// Whether another field uses this one as a source
    pub fn is_in_use(&self, handle: FieldHandle) -> bool {
        !self.users_of(handle).is_empty()
    }

    /// Whether `target` is reachable from `start` through source edges
    fn reaches(&self, start: FieldHandle, target: FieldHandle) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Ok(field) = self.field(current) {
                stack.extend(field.sources.iter().copied());
            }
        }
        false
    }

    /// Give a field a new core and sources, keeping its name and handle.
    ///
    /// A new source graph that would lead back to the field is rejected, as
    /// is a component count change while other fields use this one.
    pub fn replace_definition(
        &mut self,
        handle: FieldHandle,
        definition: FieldDefinition,
    ) -> FieldResult<()> {
        let field = self.field(handle)?;
        let name = field.name.clone();
        let old_component_count = field.component_count;
        self.check_definition(&definition)?;
        if definition
            .sources
            .iter()
            .any(|&source| self.reaches(source, handle))
        {
            warn!("Rejected redefinition of '{name}': source cycle");
            return Err(FieldError::CycleDetected { field: name });
        }
        if definition.component_count != old_component_count {
            if let Some(&user) = self.users_of(handle).first() {
                return Err(FieldError::FieldInUse {
                    field: name,
                    user: self.field(user)?.name.clone(),
                });
            }
        }
        self.adopt_data_source(&definition);
        let coordinate_system = self.resolve_coordinate_system(&definition);
        let field = self.field_mut(handle)?;
        debug!(
            "Redefining '{}' from {} to {}",
            field.name,
            field.core.type_name(),
            definition.core.type_name()
        );
        field.component_count = definition.component_count;
        field.coordinate_system = coordinate_system;
        field.sources = definition.sources;
        field.source_values = definition.source_values;
        field.core = definition.core;
        field.definition += 1;
        self.revision.bump();
        Ok(())
    }

    /// Remove a field that no other field uses
    pub fn remove_field(&mut self, handle: FieldHandle) -> FieldResult<()> {
        let name = self.field(handle)?.name.clone();
        if let Some(&user) = self.users_of(handle).first() {
            return Err(FieldError::FieldInUse {
                field: name,
                user: self.field(user)?.name.clone(),
            });
        }
        self.release(handle);
        Ok(())
    }

    fn release(&mut self, handle: FieldHandle) {
        let slot = &mut self.slots[handle.index()];
        if let Some(field) = slot.field.take() {
            debug!("Removing field '{}'", field.name);
            self.names.remove(&field.name);
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index() as u32);
        if self.cmiss_number == Some(handle) {
            self.cmiss_number = None;
        }
        if self.xi == Some(handle) {
            self.xi = None;
        }
    }

    /// Remove every field, dependents before their sources; returns how many
    /// were removed
    pub fn teardown(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let live: Vec<FieldHandle> = self.fields().map(|field| field.handle).collect();
            if live.is_empty() {
                break;
            }
            let unused: Vec<FieldHandle> = live
                .iter()
                .copied()
                .filter(|&handle| !self.is_in_use(handle))
                .collect();
            let batch = if unused.is_empty() { live } else { unused };
            for handle in batch {
                self.release(handle);
                removed += 1;
            }
        }
        info!("Tore down {removed} fields in module {}", self.id);
        removed
    }

    /// Existing field with the same core configuration and sources
    pub fn find_equivalent(&self, definition: &FieldDefinition) -> Option<FieldHandle> {
        self.fields()
            .find(|field| {
                field.component_count == definition.component_count
                    && field.sources == definition.sources
                    && field.source_values == definition.source_values
                    && field.core.compare(definition.core.as_ref())
            })
            .map(|field| field.handle)
    }

    // Evaluation

    fn begin(&self, cache: &mut FieldCache, operation: &str) -> FieldResult<()> {
        if cache.module_id() != self.id {
            return Err(FieldError::invalid_argument(
                operation,
                format!(
                    "field cache belongs to module {}, not {}",
                    cache.module_id(),
                    self.id
                ),
            ));
        }
        if let Some(location) = cache.location().element() {
            let dimension = self.mesh.read().element_dimension(location.element);
            if dimension.is_some_and(|dimension| dimension != location.xi.len()) {
                return Err(FieldError::invalid_argument(
                    operation,
                    format!(
                        "element {} is {}-dimensional, location has {} xi",
                        location.element,
                        dimension.unwrap_or_default(),
                        location.xi.len()
                    ),
                ));
            }
        }
        cache.synchronize(self.revision.get());
        Ok(())
    }

    /// Evaluate a field at the cache's location
    pub fn evaluate<'c>(
        &self,
        cache: &'c mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<&'c ValueCache> {
        self.begin(cache, "evaluate")?;
        EvaluationContext::new(self).evaluate(cache, handle)
    }

    /// Real component values at the cache's location
    pub fn evaluate_real(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<SmallVec<[f64; 4]>> {
        self.begin(cache, "evaluate_real")?;
        let real = EvaluationContext::new(self).evaluate_real(cache, handle)?;
        Ok(real.values.clone())
    }

    /// Real values and their xi derivatives, `derivatives[c][d]` flattened
    /// row by row with one entry per element dimension
    pub fn evaluate_real_with_derivatives(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<(SmallVec<[f64; 4]>, Vec<f64>)> {
        self.begin(cache, "evaluate_real_with_derivatives")?;
        let previous = cache.derivatives_requested();
        cache.set_derivatives_requested(true);
        let result = EvaluationContext::new(self)
            .evaluate_real(cache, handle)
            .map(|real| (real.values.clone(), Self::flatten_derivatives(real)));
        cache.set_derivatives_requested(previous);
        let (values, derivatives) = result?;
        let derivatives = derivatives.ok_or_else(|| FieldError::UnsupportedValueType {
            field: self.field(handle).map(|f| f.name.clone()).unwrap_or_default(),
            request: "derivatives at this location".to_string(),
        })?;
        Ok((values, derivatives))
    }

    fn flatten_derivatives(real: &RealValueCache) -> Option<Vec<f64>> {
        if !real.derivatives_valid || real.number_of_xi > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return None;
        }
        let mut flat = Vec::with_capacity(real.component_count() * real.number_of_xi);
        for component in 0..real.component_count() {
            let base = component * MAXIMUM_ELEMENT_XI_DIMENSIONS;
            flat.extend_from_slice(&real.derivatives[base..base + real.number_of_xi]);
        }
        Some(flat)
    }

    /// Value formatted as text; `None` formats every component
    pub fn evaluate_string(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        component: Option<usize>,
    ) -> FieldResult<String> {
        self.evaluate(cache, handle)?.format(component)
    }

    /// Mesh location value
    pub fn evaluate_mesh_location(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<(ElementId, Xi)> {
        let value = self.evaluate(cache, handle)?;
        let name = || self.field(handle).map(|f| f.name.clone()).unwrap_or_default();
        let location = value
            .as_mesh_location()
            .ok_or_else(|| FieldError::UnsupportedValueType {
                field: name(),
                request: "mesh location values".to_string(),
            })?;
        let element = location
            .element
            .ok_or_else(|| FieldError::undefined(name(), "mesh location"))?;
        Ok((element, location.xi.clone()))
    }

    /// Whether a field has a value at the cache's location
    pub fn is_defined_at_location(&self, cache: &mut FieldCache, handle: FieldHandle) -> bool {
        if self.begin(cache, "is_defined_at_location").is_err() {
            return false;
        }
        EvaluationContext::new(self).is_defined(cache, handle)
    }

    /// The cache slot held for a field, allocated if missing
    pub fn get_or_create_value_cache<'c>(
        &self,
        cache: &'c mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<&'c ValueCache> {
        self.begin(cache, "get_or_create_value_cache")?;
        let field = self.field(handle)?;
        let current = cache.is_current(handle, field.definition);
        let value = cache.take_value_cache(handle, field.definition, || {
            field.core.create_value_cache(field)
        });
        cache.store_value_cache(handle, field.definition, value, current);
        cache
            .value_cache(handle)
            .ok_or_else(|| FieldError::InvalidHandle(handle.to_string()))
    }

    fn assign(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        value: ValueCache,
    ) -> FieldResult<AssignResult> {
        self.begin(cache, "assign")?;
        cache.invalidate_values();
        let result = EvaluationContext::new(self).assign(cache, handle, &value);
        if !cache.assign_in_cache_only() {
            cache.synchronize(self.revision.get());
        }
        result
    }

    /// Assign real values through a field at the cache's location
    pub fn assign_real(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        values: &[f64],
    ) -> FieldResult<AssignResult> {
        let field = self.field(handle)?;
        if values.len() != field.component_count {
            return Err(FieldError::invalid_argument(
                "assign_real",
                format!(
                    "field '{}' has {} components, got {} values",
                    field.name,
                    field.component_count,
                    values.len()
                ),
            ));
        }
        let mut real = RealValueCache::new(values.len());
        real.values.copy_from_slice(values);
        self.assign(cache, handle, ValueCache::Real(real))
    }

    /// Assign text through a string field
    pub fn assign_string(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        text: &str,
    ) -> FieldResult<AssignResult> {
        self.assign(
            cache,
            handle,
            ValueCache::String(StringValueCache {
                value: Some(text.to_string()),
            }),
        )
    }

    /// Assign a mesh location through a mesh location field
    pub fn assign_mesh_location(
        &self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        element: ElementId,
        xi: &[f64],
    ) -> FieldResult<AssignResult> {
        self.assign(
            cache,
            handle,
            ValueCache::MeshLocation(MeshLocationValueCache {
                element: Some(element),
                xi: xi.iter().copied().collect(),
            }),
        )
    }

    // Introspection

    /// The module's `cmiss_number` field, created on first use
    pub fn cmiss_number_field(&mut self) -> FieldResult<FieldHandle> {
        if let Some(handle) = self.cmiss_number {
            return Ok(handle);
        }
        let handle = match self.find_field_by_name("cmiss_number") {
            Some(existing) => existing,
            None => self.create_cmiss_number("cmiss_number")?,
        };
        self.cmiss_number = Some(handle);
        Ok(handle)
    }

    /// The module's `xi` field, created on first use
    pub fn xi_field(&mut self) -> FieldResult<FieldHandle> {
        if let Some(handle) = self.xi {
            return Ok(handle);
        }
        let handle = match self.find_field_by_name("xi") {
            Some(existing) => existing,
            None => self.create_xi_coordinates("xi", MAXIMUM_ELEMENT_XI_DIMENSIONS)?,
        };
        self.xi = Some(handle);
        Ok(handle)
    }

    /// Read-only summary of a field
    pub fn describe(&self, handle: FieldHandle) -> FieldResult<FieldDescription> {
        let field = self.field(handle)?;
        let sources = field
            .sources
            .iter()
            .map(|&source| {
                self.field(source)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|_| source.to_string())
            })
            .collect();
        Ok(FieldDescription {
            name: field.name.clone(),
            type_name: field.core.type_name().to_string(),
            value_type: field.value_type(),
            component_count: field.component_count,
            coordinate_system: field.coordinate_system,
            sources,
            source_values: field.source_values.to_vec(),
            details: field.core.describe(),
        })
    }

    /// Summaries of every field in arena order
    pub fn list(&self) -> Vec<FieldDescription> {
        self.fields()
            .filter_map(|field| self.describe(field.handle).ok())
            .collect()
    }

    /// Wrapper field of a stored field, if any
    pub fn wrapper_for(&self, stored: &StoredFieldRef) -> Option<FieldHandle> {
        self.fields()
            .find(|field| {
                field
                    .core
                    .stored_field()
                    .is_some_and(|wrapped| Arc::ptr_eq(wrapped, stored))
            })
            .map(|field| field.handle)
    }

    /// Number of fields wrapping a stored field
    pub fn wrapper_count(&self, stored: &StoredFieldRef) -> usize {
        self.fields()
            .filter(|field| {
                field
                    .core
                    .stored_field()
                    .is_some_and(|wrapped| Arc::ptr_eq(wrapped, stored))
            })
            .count()
    }

    /// Grid divisions a wrapper field is natively sampled at in an element
    pub fn native_discretization(
        &self,
        handle: FieldHandle,
        element: ElementId,
    ) -> FieldResult<Option<SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>>> {
        let field = self.field(handle)?;
        Ok(field
            .core
            .stored_field()
            .and_then(|stored| self.kernel.native_discretization(&stored.read(), element)))
    }
}
