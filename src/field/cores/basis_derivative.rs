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

//! Xi derivatives of a finite-element field taken on its basis
//!
//! The source's element field values are differentiated once per entry of
//! `xi_indices` and kept in this field's own element value cache, tagged
//! with the differentiation so they never mix with plain values.

use std::any::Any;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::cache::{FieldCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{
    ElementValuesRequest, FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS, StoredFieldRef,
};

/// d^order(source) / d(xi_indices...)
#[derive(Debug, Clone, PartialEq)]
pub struct BasisDerivativeCore {
    xi_indices: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
}

impl BasisDerivativeCore {
    /// Number of differentiations
    pub fn order(&self) -> usize {
        self.xi_indices.len()
    }

    /// Xi direction of each differentiation, from zero
    pub fn xi_indices(&self) -> &[usize] {
        &self.xi_indices
    }

    fn source_stored(ctx: &EvaluationContext<'_>, field: &Field) -> FieldResult<StoredFieldRef> {
        let source = ctx.module().field(field.sources()[0])?;
        source
            .core()
            .stored_field()
            .map(Arc::clone)
            .ok_or_else(|| {
                FieldError::invalid_argument(
                    "basis_derivative",
                    format!("source '{}' is not a finite element field", source.name()),
                )
            })
    }
}

impl FieldCore for BasisDerivativeCore {
    fn type_name(&self) -> &'static str {
        "basis_derivative"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<BasisDerivativeCore>()
            .is_some_and(|other| other == self)
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
        let location = cache
            .location()
            .element()
            .cloned()
            .ok_or_else(|| FieldError::undefined(field.name(), cache.location()))?;
        let stored = Self::source_stored(ctx, field)?;
        let stored = stored.read();
        let derivatives = cache.derivatives_requested();
        let request = ElementValuesRequest {
            element: location.element,
            time: location.time,
            top_level: location.top_level,
            derivatives,
        };
        let mesh = ctx.mesh();
        let kernel = ctx.kernel();
        let values = cache
            .element_field_values(field.handle(), &self.xi_indices)
            .fetch_or_build(&request, |request| {
                kernel.calculate_element_values(&stored, &*mesh, request)
            })?;
        let real = out.as_real_mut().ok_or_else(|| {
            FieldError::invalid_argument("basis_derivative", "real value cache required")
        })?;
        values.evaluate_real(
            &location.xi,
            &mut real.values,
            derivatives.then_some(&mut real.derivatives[..]),
        )?;
        real.derivatives_valid = derivatives;
        real.number_of_xi = if derivatives { values.dimension } else { 0 };
        Ok(())
    }

    fn is_defined_at_location(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
    ) -> bool {
        let Some(location) = cache.location().element() else {
            return false;
        };
        let Ok(stored) = Self::source_stored(ctx, field) else {
            return false;
        };
        let stored = stored.read();
        let mesh = ctx.mesh();
        location.xi.len() > self.xi_indices.iter().copied().max().unwrap_or(0)
            && ctx
                .kernel()
                .is_defined_in_element(&stored, &*mesh, location.element)
    }

    fn describe(&self) -> String {
        let indices: Vec<String> = self.xi_indices.iter().map(|d| format!("xi{}", d + 1)).collect();
        format!("order {} wrt {}", self.order(), indices.join(" "))
    }
}

impl FieldModule {
    /// Create a field differentiating a finite-element field on its basis
    /// with respect to each xi direction in `xi_indices` in turn
    pub fn create_basis_derivative(
        &mut self,
        name: impl Into<String>,
        source: FieldHandle,
        xi_indices: &[usize],
    ) -> FieldResult<FieldHandle> {
        let source_field = self.field(source)?;
        let Some(stored) = source_field.core().stored_field() else {
            return Err(FieldError::invalid_argument(
                "create_basis_derivative",
                format!("source '{}' is not a finite element field", source_field.name()),
            ));
        };
        let value_type = stored.read().value_type();
        if !value_type.supports_derivatives() {
            return Err(FieldError::invalid_argument(
                "create_basis_derivative",
                format!("cannot differentiate {value_type} field '{}'", source_field.name()),
            ));
        }
        if xi_indices.is_empty() {
            return Err(FieldError::invalid_argument(
                "create_basis_derivative",
                "at least one xi direction is required",
            ));
        }
        if let Some(&bad) = xi_indices.iter().find(|&&d| d >= MAXIMUM_ELEMENT_XI_DIMENSIONS) {
            return Err(FieldError::invalid_argument(
                "create_basis_derivative",
                format!("xi direction {} out of range", bad + 1),
            ));
        }
        let component_count = source_field.component_count();
        let core = BasisDerivativeCore {
            xi_indices: xi_indices.iter().copied().collect(),
        };
        self.add_field(
            name,
            FieldDefinition::new(component_count, Box::new(core)).with_sources(&[source]),
        )
    }
}
