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

//! One nodal parameter of a stored field

use std::any::Any;
use std::sync::Arc;

use crate::cache::{FieldCache, Location, ValueCache};
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{FieldValueType, NodeValueLabel, StoredFieldRef};

/// Reads and writes the `label` parameter, version `version`, at nodes
#[derive(Debug, Clone)]
pub struct NodeValueCore {
    stored: StoredFieldRef,
    label: NodeValueLabel,
    version: usize,
}

impl NodeValueCore {
    /// Parameter to expose; `version` counts from zero
    pub fn new(stored: StoredFieldRef, label: NodeValueLabel, version: usize) -> Self {
        Self {
            stored,
            label,
            version,
        }
    }

    fn undefined(field: &Field, cache: &FieldCache) -> FieldError {
        FieldError::undefined(field.name(), cache.location())
    }
}

impl FieldCore for NodeValueCore {
    fn type_name(&self) -> &'static str {
        "node_value"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<NodeValueCore>()
            .is_some_and(|other| {
                Arc::ptr_eq(&self.stored, &other.stored)
                    && self.label == other.label
                    && self.version == other.version
            })
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::Real
    }

    fn evaluate(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let Location::Node { node, time } = cache.location() else {
            return Err(Self::undefined(field, cache));
        };
        let real = out
            .as_real_mut()
            .ok_or_else(|| FieldError::invalid_argument("node_value", "real value cache required"))?;
        let stored = self.stored.read();
        for (component, slot) in real.values.iter_mut().enumerate() {
            *slot = stored.node_parameter(*node, component, self.label, self.version, *time)?;
        }
        real.derivatives_valid = false;
        real.number_of_xi = 0;
        Ok(())
    }

    fn assign(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        if cache.assign_in_cache_only() {
            if !self.is_defined_at_location(ctx, cache, field) {
                return Err(FieldError::undefined(field.name(), cache.location()));
            }
            return Ok(AssignResult::AllSet);
        }
        let Location::Node { node, time } = cache.location() else {
            return Err(FieldError::NotAssignable {
                field: field.name().to_string(),
                location: cache.location().to_string(),
            });
        };
        let real = value
            .as_real()
            .ok_or_else(|| FieldError::invalid_argument("node_value", "real value required"))?;
        let mut stored = self.stored.write();
        for (component, v) in real.values.iter().enumerate() {
            stored.set_node_parameter(*node, component, self.label, self.version, *time, *v)?;
        }
        Ok(AssignResult::AllSet)
    }

    fn is_defined_at_location(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        cache
            .location()
            .node()
            .is_some_and(|node| self.stored.read().is_defined_at_node(node))
    }

    fn data_source(&self) -> Option<&StoredFieldRef> {
        Some(&self.stored)
    }

    fn describe(&self) -> String {
        format!(
            "{} version {} of '{}'",
            self.label,
            self.version + 1,
            self.stored.read().name()
        )
    }
}

impl FieldModule {
    /// Create a field exposing one nodal parameter of a numeric stored field
    pub fn create_node_value(
        &mut self,
        name: impl Into<String>,
        stored: &StoredFieldRef,
        label: NodeValueLabel,
        version: usize,
    ) -> FieldResult<FieldHandle> {
        let (component_count, coordinate_system, numeric) = {
            let guard = stored.read();
            (
                guard.component_count(),
                guard.coordinate_system(),
                guard.value_type().is_numeric(),
            )
        };
        if !numeric {
            return Err(FieldError::invalid_argument(
                "create_node_value",
                "node value fields need a numeric stored field",
            ));
        }
        let core = NodeValueCore::new(Arc::clone(stored), label, version);
        self.add_field(
            name,
            FieldDefinition::new(component_count, Box::new(core))
                .with_coordinate_system(coordinate_system),
        )
    }
}
