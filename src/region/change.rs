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

use std::fmt;
use std::sync::Arc;

use crate::model::{ChangeFlags, StoredFieldRef};

/// A change to one stored field awaiting wrapper synchronization
#[derive(Debug, Clone)]
pub struct StoredFieldChange {
    /// Field that changed
    pub field: StoredFieldRef,
    /// Name of the field when the change was collected
    pub name: String,
    /// What changed
    pub flags: ChangeFlags,
}

impl StoredFieldChange {
    /// Change record for `field` under its current name
    pub fn new(field: &StoredFieldRef, flags: ChangeFlags) -> Self {
        let name = field.read().name().to_string();
        Self {
            field: Arc::clone(field),
            name,
            flags,
        }
    }

    /// Whether both records are about the same stored field
    pub fn same_field(&self, other: &StoredFieldChange) -> bool {
        Arc::ptr_eq(&self.field, &other.field)
    }
}

impl fmt::Display for StoredFieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' {}", self.name, self.flags)
    }
}
