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

//! Evaluation context passed to field cores

use log::{trace, warn};
use parking_lot::RwLockReadGuard;

use super::FieldHandle;
use super::module::FieldModule;
use crate::cache::{FieldCache, RealValueCache, ValueCache};
use crate::config::EvaluationConfig;
use crate::error::{AssignResult, FieldError, FieldResult};
use crate::model::{InterpolationKernel, Mesh};

/// State shared by one top-level evaluate or assign call
pub struct EvaluationContext<'a> {
    module: &'a FieldModule,
    depth: usize,
}

impl<'a> EvaluationContext<'a> {
    pub(crate) fn new(module: &'a FieldModule) -> Self {
        Self { module, depth: 0 }
    }

    /// Module the evaluated fields belong to
    pub fn module(&self) -> &'a FieldModule {
        self.module
    }

    /// Read access to the mesh
    pub fn mesh(&self) -> RwLockReadGuard<'a, Mesh> {
        self.module.mesh().read()
    }

    /// Interpolation kernel of the module
    pub fn kernel(&self) -> &'a dyn InterpolationKernel {
        self.module.kernel()
    }

    /// Evaluation settings
    pub fn config(&self) -> &'a EvaluationConfig {
        self.module.config()
    }

    /// Current nesting depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn enter(&mut self, name: &str) -> FieldResult<()> {
        let limit = self.module.config().max_recursion_depth;
        if self.depth >= limit {
            warn!("Evaluation of '{name}' exceeded maximum depth {limit}");
            return Err(FieldError::RecursionLimit {
                field: name.to_string(),
                limit,
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Evaluate a field at the cache's location, reusing a current result
    pub fn evaluate<'c>(
        &mut self,
        cache: &'c mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<&'c ValueCache> {
        let field = self.module.field(handle)?;
        if !cache.is_current(handle, field.definition) {
            self.enter(&field.name)?;
            let mut value =
                cache.take_value_cache(handle, field.definition, || field.core.create_value_cache(field));
            let result = field.core.evaluate(self, cache, field, &mut value);
            self.depth -= 1;
            cache.store_value_cache(handle, field.definition, value, result.is_ok());
            result?;
            trace!("Evaluated '{}' at {}", field.name, cache.location());
        }
        cache
            .value_cache(handle)
            .ok_or_else(|| FieldError::InvalidHandle(handle.to_string()))
    }

    /// Evaluate a real-valued field
    pub fn evaluate_real<'c>(
        &mut self,
        cache: &'c mut FieldCache,
        handle: FieldHandle,
    ) -> FieldResult<&'c RealValueCache> {
        let name = self.module.field(handle)?.name.clone();
        self.evaluate(cache, handle)?
            .as_real()
            .ok_or_else(|| FieldError::UnsupportedValueType {
                field: name,
                request: "real values".to_string(),
            })
    }

    /// Whether a field is defined at the cache's location
    pub fn is_defined(&mut self, cache: &mut FieldCache, handle: FieldHandle) -> bool {
        let Ok(field) = self.module.field(handle) else {
            return false;
        };
        if cache.is_current(handle, field.definition) {
            return true;
        }
        if self.enter(&field.name).is_err() {
            return false;
        }
        let defined = field.core.is_defined_at_location(self, cache, field);
        self.depth -= 1;
        defined
    }

    /// Assign a value through a field at the cache's location
    pub fn assign(
        &mut self,
        cache: &mut FieldCache,
        handle: FieldHandle,
        value: &ValueCache,
    ) -> FieldResult<AssignResult> {
        let field = self.module.field(handle)?;
        if value.value_type() != field.value_type() {
            return Err(FieldError::invalid_argument(
                "assign",
                format!(
                    "cannot assign {} value to {} field '{}'",
                    value.value_type(),
                    field.value_type(),
                    field.name
                ),
            ));
        }
        self.enter(&field.name)?;
        let result = field.core.assign(self, cache, field, value);
        self.depth -= 1;
        if result.is_ok() && cache.assign_in_cache_only() {
            let mut slot =
                cache.take_value_cache(handle, field.definition, || field.core.create_value_cache(field));
            slot.copy_from(value)?;
            cache.store_value_cache(handle, field.definition, slot, true);
        }
        if let Err(error) = &result {
            warn!("Assign to '{}' failed: {error}", field.name);
        }
        result
    }
}
