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

use std::any::Any;

use crate::cache::{FieldCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS};

/// The element chart coordinates of the current location, zero padded
#[derive(Debug, Clone, PartialEq)]
pub struct XiCoordinatesCore;

impl FieldCore for XiCoordinatesCore {
    fn type_name(&self) -> &'static str {
        "xi_coordinates"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<XiCoordinatesCore>().is_some()
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
        let location = cache
            .location()
            .element()
            .ok_or_else(|| FieldError::undefined(field.name(), cache.location()))?;
        let real = out
            .as_real_mut()
            .ok_or_else(|| FieldError::invalid_argument("xi_coordinates", "real value cache required"))?;
        let dimension = location.xi.len().min(MAXIMUM_ELEMENT_XI_DIMENSIONS);
        real.set_zero_derivatives(dimension);
        for (component, value) in real.values.iter_mut().enumerate() {
            *value = location.xi.get(component).copied().unwrap_or(0.0);
            if component < dimension {
                real.derivatives[component * MAXIMUM_ELEMENT_XI_DIMENSIONS + component] = 1.0;
            }
        }
        Ok(())
    }

    fn is_defined_at_location(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        cache.location().element().is_some()
    }
}

impl FieldModule {
    /// Create a field giving xi at element locations
    pub fn create_xi_coordinates(
        &mut self,
        name: impl Into<String>,
        component_count: usize,
    ) -> FieldResult<FieldHandle> {
        self.add_field(name, FieldDefinition::new(component_count, Box::new(XiCoordinatesCore)))
    }
}
