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

//! Identity, component and concatenate fields
//!
//! These reshape the values of their sources without computing anything
//! new, and pass assignments back to the sources.

use std::any::Any;

use crate::cache::{FieldCache, RealValueCache, ValueCache};
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS};

fn real_out<'v>(out: &'v mut ValueCache, operation: &str) -> FieldResult<&'v mut RealValueCache> {
    out.as_real_mut()
        .ok_or_else(|| FieldError::invalid_argument(operation, "real value cache required"))
}

/// Copies its single source verbatim
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityCore {
    value_type: FieldValueType,
}

impl FieldCore for IdentityCore {
    fn type_name(&self) -> &'static str {
        "identity"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<IdentityCore>().is_some()
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
        let source = ctx.evaluate(cache, field.sources()[0])?;
        out.copy_from(source)
    }

    fn assign(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        ctx.assign(cache, field.sources()[0], value)
    }
}

/// Extracts one component of a real source
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentCore {
    index: usize,
}

impl ComponentCore {
    /// Component number counted from zero
    pub fn index(&self) -> usize {
        self.index
    }
}

impl FieldCore for ComponentCore {
    fn type_name(&self) -> &'static str {
        "component"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<ComponentCore>()
            .is_some_and(|other| other.index == self.index)
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
        let source = ctx.evaluate_real(cache, field.sources()[0])?;
        let real = real_out(out, "component")?;
        real.values[0] = source.values[self.index];
        real.derivatives_valid = source.derivatives_valid;
        real.number_of_xi = source.number_of_xi;
        if source.derivatives_valid {
            let base = self.index * MAXIMUM_ELEMENT_XI_DIMENSIONS;
            real.derivatives[..MAXIMUM_ELEMENT_XI_DIMENSIONS]
                .copy_from_slice(&source.derivatives[base..base + MAXIMUM_ELEMENT_XI_DIMENSIONS]);
        }
        Ok(())
    }

    fn assign(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        let source = field.sources()[0];
        let mut full = ValueCache::Real(ctx.evaluate_real(cache, source)?.clone());
        let new_value = value
            .as_real()
            .and_then(|real| real.values.first().copied())
            .ok_or_else(|| FieldError::invalid_argument("component", "real value required"))?;
        if let Some(real) = full.as_real_mut() {
            real.values[self.index] = new_value;
            real.derivatives_valid = false;
        }
        ctx.assign(cache, source, &full)
    }

    fn describe(&self) -> String {
        format!("component {}", self.index + 1)
    }
}

/// Joins the components of its real sources in order
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenateCore;

impl FieldCore for ConcatenateCore {
    fn type_name(&self) -> &'static str {
        "concatenate"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other.as_any().downcast_ref::<ConcatenateCore>().is_some()
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
        let real = real_out(out, "concatenate")?;
        let mut offset = 0;
        let mut derivatives_valid = true;
        let mut number_of_xi: Option<usize> = None;
        for &source in field.sources() {
            let value = ctx.evaluate_real(cache, source)?;
            let count = value.component_count();
            real.values[offset..offset + count].copy_from_slice(&value.values);
            let rows = offset * MAXIMUM_ELEMENT_XI_DIMENSIONS
                ..(offset + count) * MAXIMUM_ELEMENT_XI_DIMENSIONS;
            real.derivatives[rows].copy_from_slice(&value.derivatives);
            derivatives_valid &= value.derivatives_valid
                && number_of_xi.is_none_or(|n| n == value.number_of_xi);
            number_of_xi = Some(value.number_of_xi);
            offset += count;
        }
        real.derivatives_valid = derivatives_valid;
        real.number_of_xi = if derivatives_valid {
            number_of_xi.unwrap_or(0)
        } else {
            0
        };
        Ok(())
    }

    fn assign(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        let values = value
            .as_real()
            .ok_or_else(|| FieldError::invalid_argument("concatenate", "real value required"))?;
        let module = ctx.module();
        let mut offset = 0;
        let mut outcome: Option<AssignResult> = None;
        let mut first_error = None;
        for &source in field.sources() {
            let count = module.field(source)?.component_count();
            let mut part = RealValueCache::new(count);
            part.values
                .copy_from_slice(&values.values[offset..offset + count]);
            offset += count;
            match ctx.assign(cache, source, &ValueCache::Real(part)) {
                Ok(result) => outcome = Some(outcome.map_or(result, |o| o.combine(result))),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        match (outcome, first_error) {
            (Some(result), None) => Ok(result),
            (Some(_), Some(error)) => {
                log::warn!("Partial assign through '{}': {error}", field.name());
                Ok(AssignResult::PartialSet)
            }
            (None, Some(error)) => Err(error),
            (None, None) => Err(FieldError::NotAssignable {
                field: field.name().to_string(),
                location: cache.location().to_string(),
            }),
        }
    }
}

impl FieldModule {
    /// Create a field that copies `source`
    pub fn create_identity(
        &mut self,
        name: impl Into<String>,
        source: FieldHandle,
    ) -> FieldResult<FieldHandle> {
        let definition = self.identity_definition(source)?;
        self.add_field(name, definition)
    }

    /// Definition of an identity field over `source`
    pub fn identity_definition(&self, source: FieldHandle) -> FieldResult<FieldDefinition> {
        let source_field = self.field(source)?;
        let core = IdentityCore {
            value_type: source_field.value_type(),
        };
        Ok(FieldDefinition::new(source_field.component_count(), Box::new(core))
            .with_sources(&[source]))
    }

    /// Create a field holding component `index` (from zero) of `source`
    pub fn create_component(
        &mut self,
        name: impl Into<String>,
        source: FieldHandle,
        index: usize,
    ) -> FieldResult<FieldHandle> {
        let definition = self.component_definition(source, index)?;
        self.add_field(name, definition)
    }

    /// Definition of a component field
    pub fn component_definition(
        &self,
        source: FieldHandle,
        index: usize,
    ) -> FieldResult<FieldDefinition> {
        let source_field = self.field(source)?;
        if source_field.value_type() != FieldValueType::Real {
            return Err(FieldError::invalid_argument(
                "create_component",
                format!("source '{}' is not real valued", source_field.name()),
            ));
        }
        if index >= source_field.component_count() {
            return Err(FieldError::invalid_argument(
                "create_component",
                format!(
                    "component {} out of range for '{}' with {} components",
                    index + 1,
                    source_field.name(),
                    source_field.component_count()
                ),
            ));
        }
        Ok(FieldDefinition::new(1, Box::new(ComponentCore { index })).with_sources(&[source]))
    }

    /// Create a field joining the components of `sources` in order
    pub fn create_concatenate(
        &mut self,
        name: impl Into<String>,
        sources: &[FieldHandle],
    ) -> FieldResult<FieldHandle> {
        let definition = self.concatenate_definition(sources)?;
        self.add_field(name, definition)
    }

    /// Definition of a concatenate field
    pub fn concatenate_definition(&self, sources: &[FieldHandle]) -> FieldResult<FieldDefinition> {
        if sources.is_empty() {
            return Err(FieldError::invalid_argument(
                "create_concatenate",
                "at least one source is required",
            ));
        }
        let mut component_count = 0;
        for &source in sources {
            let source_field = self.field(source)?;
            if source_field.value_type() != FieldValueType::Real {
                return Err(FieldError::invalid_argument(
                    "create_concatenate",
                    format!("source '{}' is not real valued", source_field.name()),
                ));
            }
            component_count += source_field.component_count();
        }
        Ok(FieldDefinition::new(component_count, Box::new(ConcatenateCore)).with_sources(sources))
    }
}
