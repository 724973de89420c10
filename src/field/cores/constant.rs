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

//! Location-independent constant fields

use std::any::Any;

use smallvec::SmallVec;

use crate::cache::{FieldCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::FieldValueType;

/// Real constant; derivatives are zero and always valid
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantCore {
    values: SmallVec<[f64; 4]>,
}

impl ConstantCore {
    /// Constant with the given component values
    pub fn new(values: &[f64]) -> Self {
        Self {
            values: values.iter().copied().collect(),
        }
    }
}

impl FieldCore for ConstantCore {
    fn type_name(&self) -> &'static str {
        "constant"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<ConstantCore>()
            .is_some_and(|other| other == self)
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::Real
    }

    fn evaluate(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        _field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let real = out
            .as_real_mut()
            .ok_or_else(|| FieldError::invalid_argument("constant", "real value cache required"))?;
        real.values.copy_from_slice(&self.values);
        let number_of_xi = cache.location().element().map_or(0, |e| e.xi.len());
        real.set_zero_derivatives(number_of_xi);
        Ok(())
    }

    fn is_defined_at_location(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        _cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        true
    }

    fn describe(&self) -> String {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        values.join(" ")
    }
}

/// Text constant
#[derive(Debug, Clone, PartialEq)]
pub struct StringConstantCore {
    text: String,
}

impl StringConstantCore {
    /// Constant with the given text
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl FieldCore for StringConstantCore {
    fn type_name(&self) -> &'static str {
        "string_constant"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<StringConstantCore>()
            .is_some_and(|other| other == self)
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::String
    }

    fn evaluate(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        _cache: &mut FieldCache,
        _field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        match out {
            ValueCache::String(cache) => {
                cache.value = Some(self.text.clone());
                Ok(())
            }
            _ => Err(FieldError::invalid_argument(
                "string_constant",
                "string value cache required",
            )),
        }
    }

    fn is_defined_at_location(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        _cache: &mut FieldCache,
        _field: &Field,
    ) -> bool {
        true
    }

    fn describe(&self) -> String {
        format!("\"{}\"", self.text)
    }
}

impl FieldModule {
    /// Create a real constant field
    pub fn create_constant(
        &mut self,
        name: impl Into<String>,
        values: &[f64],
    ) -> FieldResult<FieldHandle> {
        self.add_field(
            name,
            FieldDefinition::new(values.len(), Box::new(ConstantCore::new(values)))
                .with_source_values(values),
        )
    }

    /// Create a string constant field
    pub fn create_string_constant(
        &mut self,
        name: impl Into<String>,
        text: &str,
    ) -> FieldResult<FieldHandle> {
        self.add_field(name, FieldDefinition::new(1, Box::new(StringConstantCore::new(text))))
    }
}
