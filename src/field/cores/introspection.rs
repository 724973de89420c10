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

//! Fields reporting on the mesh object at the current location

use std::any::Any;

use crate::cache::{FieldCache, Location, RealValueCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS, MeshTopology};

fn write_scalar(
    out: &mut ValueCache,
    location: &Location,
    value: f64,
    operation: &str,
) -> FieldResult<()> {
    let real: &mut RealValueCache = out
        .as_real_mut()
        .ok_or_else(|| FieldError::invalid_argument(operation, "real value cache required"))?;
    real.values[0] = value;
    match location.element() {
        Some(element) => {
            real.set_zero_derivatives(element.xi.len().min(MAXIMUM_ELEMENT_XI_DIMENSIONS))
        }
        None => {
            real.derivatives_valid = false;
            real.number_of_xi = 0;
        }
    }
    Ok(())
}

/// Identifier of the node or element at the current location
#[derive(Debug, Clone, PartialEq)]
pub struct CmissNumberCore;

impl FieldCore for CmissNumberCore {
    fn type_name(&self) -> &'static str {
        "cmiss_number"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<CmissNumberCore>().is_some()
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
        let location = cache.location();
        let number = match location {
            Location::None => return Err(FieldError::undefined(field.name(), location)),
            Location::Node { node, .. } => node.0,
            Location::Element(element) => element.element.0,
        };
        write_scalar(out, location, f64::from(number), "cmiss_number")
    }

    fn is_defined_at_location(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        !matches!(cache.location(), Location::None)
    }
}

/// Number of live references held to the node or element at the current
/// location
#[derive(Debug, Clone, PartialEq)]
pub struct AccessCountCore;

impl FieldCore for AccessCountCore {
    fn type_name(&self) -> &'static str {
        "access_count"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<AccessCountCore>().is_some()
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::Real
    }

    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let location = cache.location();
        let count = {
            let mesh = ctx.mesh();
            match location {
                Location::None => None,
                Location::Node { node, .. } => mesh.node_access_count(*node),
                Location::Element(element) => mesh.element_access_count(element.element),
            }
        };
        let count = count.ok_or_else(|| FieldError::undefined(field.name(), location))?;
        write_scalar(out, location, count as f64, "access_count")
    }

    fn is_defined_at_location(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        let mesh = ctx.mesh();
        match cache.location() {
            Location::None => false,
            Location::Node { node, .. } => mesh.contains_node(*node),
            Location::Element(element) => mesh.contains_element(element.element),
        }
    }
}

impl FieldModule {
    /// Create a field giving the identifier of the current node or element
    pub fn create_cmiss_number(&mut self, name: impl Into<String>) -> FieldResult<FieldHandle> {
        self.add_field(name, FieldDefinition::new(1, Box::new(CmissNumberCore)))
    }

    /// Create a field giving the reference count of the current node or
    /// element
    pub fn create_access_count(&mut self, name: impl Into<String>) -> FieldResult<FieldHandle> {
        self.add_field(name, FieldDefinition::new(1, Box::new(AccessCountCore)))
    }
}
