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

//! Finite-element wrapper over a stored field
//!
//! At nodes the wrapper reads the value parameter, version 1, at the cache
//! time. In elements it samples the element field values built by the
//! interpolation kernel and kept in the cache's element value cache.

use std::any::Any;
use std::sync::Arc;

use crate::cache::{ElementLocation, FieldCache, Location, ValueCache};
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{
    ComponentRepresentation, ElementValuesRequest, FieldValueType, NodeId, NodeValueLabel,
    StoredField, StoredFieldRef, ValueType,
};

/// Wrapper core over one stored field
#[derive(Debug, Clone)]
pub struct FiniteElementCore {
    stored: StoredFieldRef,
}

impl FiniteElementCore {
    /// Wrap a stored field
    pub fn new(stored: StoredFieldRef) -> Self {
        Self { stored }
    }

    fn check_derivatives(&self, field: &Field, cache: &FieldCache, value_type: ValueType) -> FieldResult<()> {
        if cache.derivatives_requested() && !value_type.supports_derivatives() {
            return Err(FieldError::UnsupportedValueType {
                field: field.name().to_string(),
                request: format!("derivatives of {value_type} values"),
            });
        }
        Ok(())
    }

    fn evaluate_in_element(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        location: &ElementLocation,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let derivatives = cache.derivatives_requested();
        let stored = self.stored.read();
        let request = ElementValuesRequest {
            element: location.element,
            time: location.time,
            top_level: location.top_level,
            derivatives,
        };
        let mesh = ctx.mesh();
        let kernel = ctx.kernel();
        let values = cache
            .element_field_values(field.handle(), &[])
            .fetch_or_build(&request, |request| {
                kernel.calculate_element_values(&stored, &*mesh, request)
            })?;
        match out {
            ValueCache::Real(real) => {
                values.evaluate_real(
                    &location.xi,
                    &mut real.values,
                    derivatives.then_some(&mut real.derivatives[..]),
                )?;
                real.derivatives_valid = derivatives;
                real.number_of_xi = values.dimension;
                Ok(())
            }
            ValueCache::String(text) => {
                text.value = Some(values.component_text(0, &location.xi)?);
                Ok(())
            }
            ValueCache::MeshLocation(_) => Err(FieldError::undefined(
                field.name(),
                format!("element {}", location.element),
            )),
        }
    }

    fn evaluate_at_node(
        stored: &StoredField,
        node: NodeId,
        time: f64,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        match out {
            ValueCache::Real(real) => {
                let values = stored.node_values(node, time)?;
                real.values.copy_from_slice(&values);
                real.derivatives_valid = false;
                real.number_of_xi = 0;
            }
            ValueCache::String(text) => {
                text.value = Some(stored.node_string(node)?.to_string());
            }
            ValueCache::MeshLocation(location) => {
                let (element, xi) = stored.node_mesh_location(node)?;
                location.element = Some(element);
                location.xi = xi.iter().copied().collect();
            }
        }
        Ok(())
    }

    fn assign_in_element(
        &self,
        field: &Field,
        location: &ElementLocation,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        let not_assignable = || FieldError::NotAssignable {
            field: field.name().to_string(),
            location: format!("element {}", location.element),
        };
        let ValueCache::Real(real) = value else {
            return Err(not_assignable());
        };
        let mut stored = self.stored.write();
        let Some(template) = stored.element_template(location.element) else {
            return Err(not_assignable());
        };
        let mut writes = Vec::new();
        for (component, representation) in template.components().iter().enumerate() {
            match representation {
                ComponentRepresentation::Constant(_) => {
                    writes.push((component, None));
                }
                ComponentRepresentation::Grid(grid) => {
                    if let Some(point) = grid.grid_point_at(&location.xi) {
                        writes.push((component, Some(point)));
                    }
                }
                _ => {}
            }
        }
        if writes.is_empty() {
            return Err(not_assignable());
        }
        let all = writes.len() == stored.component_count();
        for (component, point) in writes {
            let value = real.values[component];
            match point {
                None => stored.set_constant(location.element, component, value)?,
                Some(point) => stored.set_grid_value(location.element, component, point, value)?,
            }
        }
        Ok(if all {
            AssignResult::AllSet
        } else {
            AssignResult::PartialSet
        })
    }

    fn assign_at_node(
        &self,
        node: NodeId,
        time: f64,
        value: &ValueCache,
    ) -> FieldResult<()> {
        let mut stored = self.stored.write();
        match value {
            ValueCache::Real(real) => {
                if !stored.is_defined_at_node(node) {
                    return Err(FieldError::undefined(stored.name(), format!("node {node}")));
                }
                for (component, v) in real.values.iter().enumerate() {
                    stored.set_node_parameter(node, component, NodeValueLabel::Value, 0, time, *v)?;
                }
                Ok(())
            }
            ValueCache::String(text) => {
                let text = text.value.as_deref().unwrap_or_default();
                stored.set_node_string(node, text)
            }
            ValueCache::MeshLocation(location) => {
                let element = location
                    .element
                    .ok_or_else(|| FieldError::invalid_argument("assign", "mesh location has no element"))?;
                stored.set_node_mesh_location(node, element, &location.xi)
            }
        }
    }
}

impl FieldCore for FiniteElementCore {
    fn type_name(&self) -> &'static str {
        "finite_element"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<FiniteElementCore>()
            .is_some_and(|other| Arc::ptr_eq(&self.stored, &other.stored))
    }

    fn value_type(&self) -> FieldValueType {
        self.stored.read().value_type().field_value_type()
    }

    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let value_type = self.stored.read().value_type();
        match cache.location().clone() {
            Location::None => Err(FieldError::undefined(field.name(), "no location")),
            Location::Node { node, time } => {
                Self::evaluate_at_node(&self.stored.read(), node, time, out)
            }
            Location::Element(location) => {
                self.check_derivatives(field, cache, value_type)?;
                self.evaluate_in_element(ctx, cache, field, &location, out)
            }
        }
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
        match cache.location() {
            Location::None => Err(FieldError::NotAssignable {
                field: field.name().to_string(),
                location: "no location".to_string(),
            }),
            Location::Node { node, time } => {
                self.assign_at_node(*node, *time, value)?;
                Ok(AssignResult::AllSet)
            }
            Location::Element(location) => self.assign_in_element(field, location, value),
        }
    }

    fn is_defined_at_location(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        let stored = self.stored.read();
        match cache.location() {
            Location::None => false,
            Location::Node { node, .. } => stored.is_defined_at_node(*node),
            Location::Element(location) => {
                stored.value_type() != ValueType::MeshLocation
                    && ctx
                        .kernel()
                        .is_defined_in_element(&stored, &*ctx.mesh(), location.element)
            }
        }
    }

    fn describe(&self) -> String {
        let stored = self.stored.read();
        format!("stored field '{}' ({})", stored.name(), stored.value_type())
    }

    fn stored_field(&self) -> Option<&StoredFieldRef> {
        Some(&self.stored)
    }
}

impl FieldDefinition {
    /// Wrapper over a stored field, taking its shape and coordinate system
    pub fn finite_element(stored: &StoredFieldRef) -> Self {
        let (component_count, coordinate_system) = {
            let guard = stored.read();
            (guard.component_count(), guard.coordinate_system())
        };
        FieldDefinition::new(
            component_count,
            Box::new(FiniteElementCore::new(Arc::clone(stored))),
        )
        .with_coordinate_system(coordinate_system)
    }
}

impl FieldModule {
    /// Create a finite-element wrapper field over a stored field
    pub fn create_finite_element(
        &mut self,
        name: impl Into<String>,
        stored: &StoredFieldRef,
    ) -> FieldResult<FieldHandle> {
        self.add_field(name, FieldDefinition::finite_element(stored))
    }
}
