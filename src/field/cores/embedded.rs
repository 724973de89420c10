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

//! Evaluate a field at a mesh location held by another field
//!
//! The value source is evaluated in a child cache positioned at the
//! location, so the parent cache's own location is left untouched.

use std::any::Any;

use crate::cache::{FieldCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{ElementId, FieldValueType, Xi};

/// Value of `sources[0]` at the location given by `sources[1]`
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedCore {
    value_type: FieldValueType,
}

impl EmbeddedCore {
    fn embedded_location(
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
    ) -> FieldResult<(ElementId, Xi)> {
        let value = ctx.evaluate(cache, field.sources()[1])?;
        value
            .as_mesh_location()
            .and_then(|location| location.element.map(|element| (element, location.xi.clone())))
            .ok_or_else(|| FieldError::undefined(field.name(), "embedded location"))
    }
}

impl FieldCore for EmbeddedCore {
    fn type_name(&self) -> &'static str {
        "embedded"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<EmbeddedCore>().is_some()
    }

    fn value_type(&self) -> FieldValueType {
        self.value_type
    }

    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let (element, xi) = Self::embedded_location(ctx, cache, field)?;
        let time = cache.time();
        let child = cache.child_cache(field.handle());
        child.set_derivatives_requested(false);
        child.set_mesh_location(element, &xi, None, time)?;
        let value = ctx.evaluate(child, field.sources()[0])?;
        out.copy_from(value)?;
        if let Some(real) = out.as_real_mut() {
            real.derivatives_valid = false;
            real.number_of_xi = 0;
        }
        Ok(())
    }

    fn is_defined_at_location(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
    ) -> bool {
        if !ctx.is_defined(cache, field.sources()[1]) {
            return false;
        }
        let Ok((element, xi)) = Self::embedded_location(ctx, cache, field) else {
            return false;
        };
        let time = cache.time();
        let child = cache.child_cache(field.handle());
        if child.set_mesh_location(element, &xi, None, time).is_err() {
            return false;
        }
        ctx.is_defined(child, field.sources()[0])
    }
}

impl FieldModule {
    /// Create a field evaluating `value` at the mesh location held by
    /// `location`
    pub fn create_embedded(
        &mut self,
        name: impl Into<String>,
        value: FieldHandle,
        location: FieldHandle,
    ) -> FieldResult<FieldHandle> {
        let (value_type, component_count) = {
            let value_field = self.field(value)?;
            (value_field.value_type(), value_field.component_count())
        };
        if value_type == FieldValueType::MeshLocation {
            return Err(FieldError::invalid_argument(
                "create_embedded",
                "cannot embed a mesh location valued field",
            ));
        }
        if self.field(location)?.value_type() != FieldValueType::MeshLocation {
            return Err(FieldError::invalid_argument(
                "create_embedded",
                "location source must be mesh location valued",
            ));
        }
        let core = EmbeddedCore { value_type };
        self.add_field(
            name,
            FieldDefinition::new(component_count, Box::new(core)).with_sources(&[value, location]),
        )
    }
}
