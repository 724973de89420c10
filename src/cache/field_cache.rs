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

//! Field cache: one evaluation session at one location
//!
//! Changing the location never clears stored results. Each slot remembers the
//! location counter it was evaluated at, so results go stale lazily when the
//! counter moves. The counter also moves when the shared data revision
//! changes or an assign happens through this cache.

use log::debug;
use rustc_hash::FxHashMap;

use super::element_values::ElementFieldValueCache;
use super::location::{ElementLocation, Location};
use super::value_cache::ValueCache;
use crate::error::{FieldError, FieldResult};
use crate::field::FieldHandle;
use crate::model::{ElementId, MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeId};

#[derive(Debug, Clone)]
pub(crate) struct ValueSlot {
    value: Option<ValueCache>,
    evaluated_at: Option<u64>,
    definition: u64,
    with_derivatives: bool,
    evaluations: u64,
}

/// Per-session memo table of field values at one current location
#[derive(Debug, Clone)]
pub struct FieldCache {
    module_id: u32,
    location: Location,
    location_counter: u64,
    revision: u64,
    derivatives_requested: bool,
    assign_in_cache_only: bool,
    slots: FxHashMap<FieldHandle, ValueSlot>,
    element_values: FxHashMap<FieldHandle, ElementFieldValueCache>,
    children: FxHashMap<FieldHandle, FieldCache>,
    element_cache_limit: usize,
}

impl FieldCache {
    pub(crate) fn new(module_id: u32, revision: u64, element_cache_limit: usize) -> Self {
        Self {
            module_id,
            location: Location::None,
            location_counter: 0,
            revision,
            derivatives_requested: false,
            assign_in_cache_only: false,
            slots: FxHashMap::default(),
            element_values: FxHashMap::default(),
            children: FxHashMap::default(),
            element_cache_limit,
        }
    }

    /// Identifier of the module that created this cache
    pub fn module_id(&self) -> u32 {
        self.module_id
    }

    /// Current location
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Time of the current location
    pub fn time(&self) -> f64 {
        self.location.time()
    }

    /// Counter that moves whenever cached values may have become stale
    pub fn location_counter(&self) -> u64 {
        self.location_counter
    }

    fn replace_location(&mut self, location: Location) {
        if self.location != location {
            self.location = location;
            self.location_counter += 1;
        }
    }

    /// Move to a node at a time
    pub fn set_node_location(&mut self, node: NodeId, time: f64) {
        self.replace_location(Location::Node { node, time });
    }

    /// Move to xi in an element, optionally preferring an ancestor element
    /// for inherited field definitions.
    ///
    /// Fails without moving if `xi` is empty or has more than
    /// [`MAXIMUM_ELEMENT_XI_DIMENSIONS`] coordinates.
    pub fn set_mesh_location(
        &mut self,
        element: ElementId,
        xi: &[f64],
        top_level: Option<ElementId>,
        time: f64,
    ) -> FieldResult<()> {
        if xi.is_empty() || xi.len() > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(FieldError::invalid_argument(
                "set_mesh_location",
                format!(
                    "element {element} needs 1 to {MAXIMUM_ELEMENT_XI_DIMENSIONS} xi coordinates, got {}",
                    xi.len()
                ),
            ));
        }
        self.replace_location(Location::Element(ElementLocation {
            element,
            xi: xi.iter().copied().collect(),
            top_level,
            time,
        }));
        Ok(())
    }

    /// Change the time, keeping the place
    pub fn set_time(&mut self, time: f64) {
        let mut location = self.location.clone();
        location.set_time(time);
        self.replace_location(location);
    }

    /// Remove the location
    pub fn clear_location(&mut self) {
        self.replace_location(Location::None);
    }

    /// Whether cores are asked for xi derivatives
    pub fn derivatives_requested(&self) -> bool {
        self.derivatives_requested
    }

    /// Ask cores for xi derivatives on subsequent evaluations
    pub fn set_derivatives_requested(&mut self, requested: bool) {
        self.derivatives_requested = requested;
    }

    /// Whether assign writes stop at value caches
    pub fn assign_in_cache_only(&self) -> bool {
        self.assign_in_cache_only
    }

    /// Route assign writes only into value caches, never into stored fields
    pub fn set_assign_in_cache_only(&mut self, cache_only: bool) {
        self.assign_in_cache_only = cache_only;
    }

    /// Last result held for a field, current or not
    pub fn value_cache(&self, field: FieldHandle) -> Option<&ValueCache> {
        self.slots.get(&field).and_then(|slot| slot.value.as_ref())
    }

    /// Number of times a field was evaluated through this cache
    pub fn evaluation_count(&self, field: FieldHandle) -> u64 {
        self.slots.get(&field).map_or(0, |slot| slot.evaluations)
    }

    /// Element interpolation cache held for a field
    pub fn element_cache(&self, field: FieldHandle) -> Option<&ElementFieldValueCache> {
        self.element_values.get(&field)
    }

    /// Child cache held for a location-indirecting field
    pub fn child(&self, field: FieldHandle) -> Option<&FieldCache> {
        self.children.get(&field)
    }

    pub(crate) fn is_current(&self, field: FieldHandle, definition: u64) -> bool {
        self.slots.get(&field).is_some_and(|slot| {
            slot.value.is_some()
                && slot.definition == definition
                && slot.evaluated_at == Some(self.location_counter)
                && (slot.with_derivatives || !self.derivatives_requested)
        })
    }

    /// Take a field's slot out for evaluation, creating it when missing or
    /// left over from a previous definition of the field
    pub(crate) fn take_value_cache<F>(
        &mut self,
        field: FieldHandle,
        definition: u64,
        create: F,
    ) -> ValueCache
    where
        F: FnOnce() -> ValueCache,
    {
        match self.slots.get_mut(&field) {
            Some(slot) if slot.definition == definition => slot.value.take().unwrap_or_else(create),
            _ => create(),
        }
    }

    /// Put a slot back; `evaluated` marks it current at this location
    pub(crate) fn store_value_cache(
        &mut self,
        field: FieldHandle,
        definition: u64,
        value: ValueCache,
        evaluated: bool,
    ) {
        let evaluated_at = evaluated.then_some(self.location_counter);
        let with_derivatives = self.derivatives_requested;
        let slot = self.slots.entry(field).or_insert_with(|| ValueSlot {
            value: None,
            evaluated_at: None,
            definition,
            with_derivatives,
            evaluations: 0,
        });
        if slot.definition != definition {
            slot.evaluations = 0;
        }
        slot.value = Some(value);
        slot.evaluated_at = evaluated_at;
        slot.definition = definition;
        slot.with_derivatives = with_derivatives;
        if evaluated {
            slot.evaluations += 1;
        }
    }

    pub(crate) fn element_field_values(
        &mut self,
        field: FieldHandle,
        differentiation: &[usize],
    ) -> &mut ElementFieldValueCache {
        let limit = self.element_cache_limit;
        let cache = self
            .element_values
            .entry(field)
            .or_insert_with(|| ElementFieldValueCache::with_differentiation(limit, differentiation));
        if cache.differentiation() != differentiation {
            *cache = ElementFieldValueCache::with_differentiation(limit, differentiation);
        }
        cache
    }

    pub(crate) fn child_cache(&mut self, field: FieldHandle) -> &mut FieldCache {
        let module_id = self.module_id;
        let revision = self.revision;
        let limit = self.element_cache_limit;
        self.children
            .entry(field)
            .or_insert_with(|| FieldCache::new(module_id, revision, limit))
    }

    /// Mark every stored result stale without discarding slots
    pub(crate) fn invalidate_values(&mut self) {
        self.location_counter += 1;
        for child in self.children.values_mut() {
            child.invalidate_values();
        }
    }

    /// Drop results computed before the data revision moved to `revision`
    pub(crate) fn synchronize(&mut self, revision: u64) {
        if self.revision == revision {
            return;
        }
        debug!(
            "Field cache revision {} is stale (now {revision}), invalidating",
            self.revision
        );
        self.revision = revision;
        self.location_counter += 1;
        for cache in self.element_values.values_mut() {
            cache.clear();
        }
        for child in self.children.values_mut() {
            child.synchronize(revision);
        }
    }

    /// Forget everything held for a field
    pub(crate) fn forget_field(&mut self, field: FieldHandle) {
        self.slots.remove(&field);
        self.element_values.remove(&field);
        self.children.remove(&field);
        for child in self.children.values_mut() {
            child.forget_field(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValueType;

    fn handle(index: u32) -> FieldHandle {
        FieldHandle::new(1, index, 0)
    }

    #[test]
    fn test_identical_location_keeps_results() {
        let mut cache = FieldCache::new(1, 0, 10);
        cache.set_node_location(NodeId(1), 0.0);
        let counter = cache.location_counter();
        cache.set_node_location(NodeId(1), 0.0);
        assert_eq!(cache.location_counter(), counter);
        cache.set_time(1.0);
        assert_eq!(cache.location_counter(), counter + 1);
        assert_eq!(cache.time(), 1.0);
    }

    #[test]
    fn test_slot_staleness() {
        let mut cache = FieldCache::new(1, 0, 10);
        cache.set_node_location(NodeId(1), 0.0);
        let value = cache.take_value_cache(handle(0), 0, || {
            ValueCache::for_type(FieldValueType::Real, 1)
        });
        cache.store_value_cache(handle(0), 0, value, true);
        assert!(cache.is_current(handle(0), 0));
        assert!(!cache.is_current(handle(0), 1));

        cache.set_derivatives_requested(true);
        assert!(!cache.is_current(handle(0), 0));
        cache.set_derivatives_requested(false);

        cache.synchronize(5);
        assert!(!cache.is_current(handle(0), 0));
        assert!(cache.value_cache(handle(0)).is_some());
    }

    #[test]
    fn test_child_caches_follow_revision() {
        let mut cache = FieldCache::new(1, 0, 10);
        cache.child_cache(handle(3)).set_node_location(NodeId(2), 0.0);
        let before = cache.child(handle(3)).unwrap().location_counter();
        cache.synchronize(1);
        assert_eq!(cache.child(handle(3)).unwrap().location_counter(), before + 1);
        cache.forget_field(handle(3));
        assert!(cache.child(handle(3)).is_none());
    }

    #[test]
    fn test_element_cache_differentiation_replaced() {
        let mut cache = FieldCache::new(1, 0, 10);
        assert!(cache.element_field_values(handle(0), &[]).differentiation().is_empty());
        assert_eq!(
            cache.element_field_values(handle(0), &[1]).differentiation(),
            &[1]
        );
        assert_eq!(cache.element_cache(handle(0)).unwrap().limit(), 10);
    }
}
