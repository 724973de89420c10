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

//! Region: owner of a mesh, its stored fields and the field module over them
//!
//! Stored field changes made through the region are queued and applied to
//! the wrapper fields when the outermost change bracket closes, or at once
//! when no bracket is open.
//!
//! ```rust
//! use computed_field::{EvaluationConfig, Region};
//! use computed_field::model::ValueType;
//!
//! let mut region = Region::new("heart", EvaluationConfig::default());
//! region.create_stored_field("pressure", ValueType::Real, 1).unwrap();
//! assert!(region.module().find_field_by_name("pressure").is_some());
//! ```

pub mod change;
pub mod sync;

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use parking_lot::RwLock;

pub use self::change::StoredFieldChange;
pub use self::sync::{SyncReport, WrapperSync};
use crate::config::EvaluationConfig;
use crate::error::{FieldError, FieldResult};
use crate::field::FieldModule;
use crate::model::{ChangeFlags, Mesh, Revision, SharedMesh, StoredField, StoredFieldRef, ValueType};

/// A mesh with its stored fields and computed fields
#[derive(Debug)]
pub struct Region {
    name: String,
    mesh: SharedMesh,
    revision: Revision,
    stored_fields: IndexMap<String, StoredFieldRef>,
    module: FieldModule,
    sync: WrapperSync,
    change_level: usize,
    last_report: SyncReport,
}

impl Region {
    /// Empty region
    pub fn new(name: impl Into<String>, config: EvaluationConfig) -> Self {
        Self::with_mesh(name, Mesh::new(), config)
    }

    /// Region over an existing mesh
    pub fn with_mesh(name: impl Into<String>, mesh: Mesh, config: EvaluationConfig) -> Self {
        let mesh = mesh.into_shared();
        let revision = Revision::new();
        let module = FieldModule::new(Arc::clone(&mesh), revision.clone(), config);
        Self {
            name: name.into(),
            mesh,
            revision,
            stored_fields: IndexMap::new(),
            module,
            sync: WrapperSync::new(),
            change_level: 0,
            last_report: SyncReport::default(),
        }
    }

    /// Region name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared mesh
    pub fn mesh(&self) -> &SharedMesh {
        &self.mesh
    }

    /// Shared data revision
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Computed fields
    pub fn module(&self) -> &FieldModule {
        &self.module
    }

    /// Computed fields, for defining new ones
    pub fn module_mut(&mut self) -> &mut FieldModule {
        &mut self.module
    }

    /// Edit the mesh; caches see the change on their next use
    pub fn edit_mesh<R>(&mut self, edit: impl FnOnce(&mut Mesh) -> R) -> R {
        let result = edit(&mut self.mesh.write());
        self.revision.bump();
        result
    }

    // Stored fields

    /// Stored field by name
    pub fn stored_field(&self, name: &str) -> Option<&StoredFieldRef> {
        self.stored_fields.get(name)
    }

    /// Stored fields in creation order
    pub fn stored_fields(&self) -> impl Iterator<Item = &StoredFieldRef> + '_ {
        self.stored_fields.values()
    }

    /// Create an empty stored field and its wrapper
    pub fn create_stored_field(
        &mut self,
        name: impl Into<String>,
        value_type: ValueType,
        component_count: usize,
    ) -> FieldResult<StoredFieldRef> {
        let field = StoredField::new(name, value_type, component_count)?;
        self.add_stored_field(field)
    }

    /// Take ownership of a stored field and wrap it
    pub fn add_stored_field(&mut self, mut field: StoredField) -> FieldResult<StoredFieldRef> {
        let name = field.name().to_string();
        if self.stored_fields.contains_key(&name) {
            return Err(FieldError::DuplicateName(name));
        }
        field.attach_revision(self.revision.clone());
        field.record_change(ChangeFlags::ADDED);
        self.revision.bump();
        let field = Arc::new(RwLock::new(field));
        self.stored_fields.insert(name, Arc::clone(&field));
        self.collect_changes(&field);
        self.flush_if_idle();
        Ok(field)
    }

    /// Rename a stored field; its wrapper follows
    pub fn rename_stored_field(&mut self, old_name: &str, new_name: impl Into<String>) -> FieldResult<()> {
        let new_name = new_name.into();
        if old_name == new_name {
            return Ok(());
        }
        if self.stored_fields.contains_key(&new_name) {
            return Err(FieldError::DuplicateName(new_name));
        }
        let field = self
            .stored_fields
            .shift_remove(old_name)
            .ok_or_else(|| FieldError::FieldNotFound(old_name.to_string()))?;
        field.write().set_name(new_name.clone());
        self.stored_fields.insert(new_name, Arc::clone(&field));
        self.collect_changes(&field);
        self.flush_if_idle();
        Ok(())
    }

    /// Change a stored field through a closure, recording what changed
    pub fn modify_stored_field<R>(
        &mut self,
        name: &str,
        modify: impl FnOnce(&mut StoredField) -> FieldResult<R>,
    ) -> FieldResult<R> {
        let field = self
            .stored_fields
            .get(name)
            .cloned()
            .ok_or_else(|| FieldError::FieldNotFound(name.to_string()))?;
        let result = modify(&mut field.write());
        self.collect_changes(&field);
        self.flush_if_idle();
        result
    }

    /// Drop a stored field from the region. Its wrapper, if any, keeps the
    /// data alive.
    pub fn remove_stored_field(&mut self, name: &str) -> FieldResult<StoredFieldRef> {
        let field = self
            .stored_fields
            .shift_remove(name)
            .ok_or_else(|| FieldError::FieldNotFound(name.to_string()))?;
        field.write().take_changes();
        self.sync
            .push(StoredFieldChange::new(&field, ChangeFlags::REMOVED));
        self.flush_if_idle();
        Ok(field)
    }

    fn collect_changes(&mut self, field: &StoredFieldRef) {
        let flags = field.write().take_changes();
        self.sync.push(StoredFieldChange::new(field, flags));
    }

    // Change brackets

    /// Open a change bracket; wrapper updates wait for the matching
    /// [`end_change`](Self::end_change)
    pub fn begin_change(&mut self) {
        self.change_level += 1;
    }

    /// Close a change bracket, synchronizing wrappers when it was the
    /// outermost
    pub fn end_change(&mut self) -> FieldResult<SyncReport> {
        if self.change_level == 0 {
            return Err(FieldError::invalid_argument(
                "end_change",
                "no change bracket is open",
            ));
        }
        self.change_level -= 1;
        if self.change_level > 0 {
            return Ok(SyncReport::default());
        }
        Ok(self.synchronize())
    }

    /// Whether a change bracket is open
    pub fn is_changing(&self) -> bool {
        self.change_level > 0
    }

    /// Collect changes recorded directly on stored fields and apply every
    /// pending change to the wrappers
    pub fn synchronize(&mut self) -> SyncReport {
        let fields: Vec<StoredFieldRef> = self.stored_fields.values().cloned().collect();
        for field in &fields {
            self.collect_changes(field);
        }
        let report = self.sync.process(&mut self.module);
        if !report.is_empty() {
            debug!("Region '{}' wrapper sync: {report:?}", self.name);
        }
        self.last_report.clone_from(&report);
        report
    }

    fn flush_if_idle(&mut self) {
        if self.change_level == 0 {
            self.synchronize();
        }
    }

    /// Report of the most recent synchronization
    pub fn last_sync_report(&self) -> &SyncReport {
        &self.last_report
    }

    /// Remove every computed field; returns how many were removed
    pub fn teardown(&mut self) -> usize {
        self.module.teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wrapper_created_outside_bracket() {
        let mut region = Region::new("test", EvaluationConfig::testing());
        region
            .create_stored_field("coordinates", ValueType::Real, 3)
            .unwrap();
        assert_eq!(region.last_sync_report().added, vec!["coordinates".to_string()]);
        let wrapper = region.module().field_by_name("coordinates").unwrap();
        assert_eq!(wrapper.component_count(), 3);
        assert!(wrapper.is_wrapper());
    }

    #[test]
    fn test_bracket_defers_sync() {
        let mut region = Region::new("test", EvaluationConfig::testing());
        region.begin_change();
        region.create_stored_field("a", ValueType::Real, 1).unwrap();
        region.begin_change();
        region.rename_stored_field("a", "b").unwrap();
        assert!(region.end_change().unwrap().is_empty());
        assert!(region.module().find_field_by_name("a").is_none());
        assert!(region.module().find_field_by_name("b").is_none());

        let report = region.end_change().unwrap();
        assert_eq!(report.added, vec!["b".to_string()]);
        assert!(region.module().find_field_by_name("b").is_some());
        assert!(region.end_change().is_err());
    }

    #[test]
    fn test_duplicate_stored_name_rejected() {
        let mut region = Region::new("test", EvaluationConfig::testing());
        region.create_stored_field("a", ValueType::Real, 1).unwrap();
        assert!(matches!(
            region.create_stored_field("a", ValueType::Int, 1),
            Err(FieldError::DuplicateName(_))
        ));
    }
}
