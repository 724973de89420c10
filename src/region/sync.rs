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

//! Wrapper synchronization
//!
//! Every stored field is exposed in the field module through a wrapper field
//! of the same name. Queued changes are applied as an upsert keyed by name:
//! missing wrappers are created, wrappers that moved or went out of date are
//! renamed or redefined, and a stale wrapper still holding the name is given
//! a fresh definition in place so its dependents follow the new data.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use super::change::StoredFieldChange;
use crate::error::FieldResult;
use crate::field::{Field, FieldDefinition, FieldHandle, FieldModule};
use crate::model::{ChangeFlags, StoredField, StoredFieldRef};

/// What one synchronization pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// Wrappers created
    pub added: Vec<String>,
    /// Wrappers renamed, as (old, new)
    pub renamed: Vec<(String, String)>,
    /// Wrappers given a new definition because they were out of date
    pub redefined: Vec<String>,
    /// Stale wrappers holding the name that now wrap the changed field
    pub replaced: Vec<String>,
    /// Names that could not be synchronized
    pub conflicts: Vec<String>,
    /// Removals, which leave wrappers alone
    pub removed: Vec<String>,
}

impl SyncReport {
    /// Whether the pass changed nothing and hit no conflicts
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.renamed.is_empty()
            && self.redefined.is_empty()
            && self.replaced.is_empty()
            && self.conflicts.is_empty()
            && self.removed.is_empty()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: SyncReport) {
        self.added.extend(other.added);
        self.renamed.extend(other.renamed);
        self.redefined.extend(other.redefined);
        self.replaced.extend(other.replaced);
        self.conflicts.extend(other.conflicts);
        self.removed.extend(other.removed);
    }
}

/// Queue of stored field changes waiting for the end of a change bracket
#[derive(Debug, Default)]
pub struct WrapperSync {
    queue: Vec<StoredFieldChange>,
}

impl WrapperSync {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct stored fields with pending changes
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queue a change, merging it with a pending change to the same field
    pub fn push(&mut self, change: StoredFieldChange) {
        if change.flags.is_empty() {
            return;
        }
        match self.queue.iter_mut().find(|pending| pending.same_field(&change)) {
            Some(pending) => {
                pending.flags |= change.flags;
                pending.name = change.name;
            }
            None => self.queue.push(change),
        }
    }

    /// Apply every pending change to the wrappers in `module`
    pub fn process(&mut self, module: &mut FieldModule) -> SyncReport {
        let mut report = SyncReport::default();
        for change in std::mem::take(&mut self.queue) {
            debug!("Synchronizing wrapper for {change}");
            if change.flags.contains(ChangeFlags::REMOVED) {
                info!(
                    "Stored field '{}' removed; its wrapper is left in place",
                    change.name
                );
                report.removed.push(change.name);
                continue;
            }
            if let Err(error) = upsert(module, &change, &mut report) {
                warn!("Could not synchronize wrapper '{}': {error}", change.name);
                report.conflicts.push(change.name);
            }
        }
        report
    }
}

fn wraps(field: &Field, stored: &StoredFieldRef) -> bool {
    field
        .core()
        .stored_field()
        .is_some_and(|wrapped| Arc::ptr_eq(wrapped, stored))
}

fn is_outdated(field: &Field, stored: &StoredField) -> bool {
    field.component_count() != stored.component_count()
        || field.value_type() != stored.value_type().field_value_type()
        || field.coordinate_system() != stored.coordinate_system()
}

fn refresh(
    module: &mut FieldModule,
    handle: FieldHandle,
    stored: &StoredFieldRef,
    report: &mut SyncReport,
) -> FieldResult<()> {
    let outdated = is_outdated(module.field(handle)?, &stored.read());
    if outdated {
        module.replace_definition(handle, FieldDefinition::finite_element(stored))?;
        report.redefined.push(module.field(handle)?.name().to_string());
    }
    Ok(())
}

fn upsert(
    module: &mut FieldModule,
    change: &StoredFieldChange,
    report: &mut SyncReport,
) -> FieldResult<()> {
    let stored = &change.field;
    let name = stored.read().name().to_string();

    if let Some(holder) = module.find_field_by_name(&name) {
        let field = module.field(holder)?;
        if wraps(field, stored) {
            return refresh(module, holder, stored, report);
        }
        if !field.is_wrapper() {
            warn!("Field '{name}' is not a stored field wrapper; leaving it alone");
            report.conflicts.push(name);
            return Ok(());
        }
        module.replace_definition(holder, FieldDefinition::finite_element(stored))?;
        report.replaced.push(name);
        return Ok(());
    }

    match module.wrapper_for(stored) {
        Some(wrapper) => {
            let old_name = module.field(wrapper)?.name().to_string();
            module.rename_field(wrapper, name.clone())?;
            report.renamed.push((old_name, name));
            refresh(module, wrapper, stored, report)
        }
        None => {
            module.create_finite_element(name.clone(), stored)?;
            report.added.push(name);
            Ok(())
        }
    }
}
