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

//! Field core capability trait

use std::any::Any;
use std::fmt;

use super::Field;
use super::context::EvaluationContext;
use crate::cache::{FieldCache, ValueCache};
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::model::{FieldValueType, StoredFieldRef};

/// Behaviour of one field variant.
///
/// A [`Field`] owns exactly one core. The core computes values at the field
/// cache's current location, writing into a value cache created by
/// [`FieldCore::create_value_cache`]. Source fields are evaluated through the
/// [`EvaluationContext`], which memoizes results in the same cache.
pub trait FieldCore: fmt::Debug + Send + Sync {
    /// Variant name used in listings and comparisons
    fn type_name(&self) -> &'static str;

    /// Downcast support for [`FieldCore::compare`]
    fn as_any(&self) -> &dyn Any;

    /// Same variant with the same configuration
    fn compare(&self, other: &dyn FieldCore) -> bool;

    /// Type of value the field produces
    fn value_type(&self) -> FieldValueType;

    /// Allocate an empty result slot shaped for `field`
    fn create_value_cache(&self, field: &Field) -> ValueCache {
        ValueCache::for_type(self.value_type(), field.component_count())
    }

    /// Compute the value at the cache's location into `out`.
    ///
    /// On error the contents of `out` are unspecified.
    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()>;

    /// Write `value` back through the field at the cache's location
    fn assign(
        &self,
        _ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        _value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        Err(FieldError::NotAssignable {
            field: field.name().to_string(),
            location: cache.location().to_string(),
        })
    }

    /// Whether the field has a value at the cache's location; by default,
    /// wherever all sources do
    fn is_defined_at_location(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
    ) -> bool {
        field
            .sources()
            .iter()
            .all(|&source| ctx.is_defined(cache, source))
    }

    /// Configuration summary for listings
    fn describe(&self) -> String {
        String::new()
    }

    /// Stored field wrapped by this core, for finite-element cores
    fn stored_field(&self) -> Option<&StoredFieldRef> {
        None
    }

    /// Stored field this core reads or assigns, wrapped or not
    fn data_source(&self) -> Option<&StoredFieldRef> {
        self.stored_field()
    }
}
