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

//! Inverse evaluation: find where a mesh field takes a given value

use std::any::Any;

use log::debug;
use smallvec::SmallVec;

use crate::cache::{FieldCache, ValueCache};
use crate::error::{FieldError, FieldResult};
use crate::field::context::EvaluationContext;
use crate::field::core::FieldCore;
use crate::field::module::FieldModule;
use crate::field::{Field, FieldDefinition, FieldHandle};
use crate::model::{
    FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS, MeshTopology, SearchMode, locate_point,
};

/// Mesh location where `sources[1]` (the mesh field) matches the value of
/// `sources[0]`, searched over elements of one dimension
#[derive(Debug, Clone, PartialEq)]
pub struct FindMeshLocationCore {
    mesh_dimension: usize,
    mode: SearchMode,
}

impl FindMeshLocationCore {
    /// Search elements of `mesh_dimension` using `mode`
    pub fn new(mesh_dimension: usize, mode: SearchMode) -> Self {
        Self {
            mesh_dimension,
            mode,
        }
    }

    /// Dimension of the searched elements
    pub fn mesh_dimension(&self) -> usize {
        self.mesh_dimension
    }

    /// Search mode
    pub fn mode(&self) -> SearchMode {
        self.mode
    }
}

impl FieldCore for FindMeshLocationCore {
    fn type_name(&self) -> &'static str {
        "find_mesh_location"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn compare(&self, other: &dyn FieldCore) -> bool {
        other
            .as_any()
            .downcast_ref::<FindMeshLocationCore>()
            .is_some_and(|other| other == self)
    }

    fn value_type(&self) -> FieldValueType {
        FieldValueType::MeshLocation
    }

    fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
        cache: &mut FieldCache,
        field: &Field,
        out: &mut ValueCache,
    ) -> FieldResult<()> {
        let target: SmallVec<[f64; 4]> = ctx.evaluate_real(cache, field.sources()[0])?.values.clone();
        let mesh_field = field.sources()[1];
        let elements = ctx.mesh().elements_of_dimension(self.mesh_dimension);
        let search = ctx.config().search.clone();
        let dimension = self.mesh_dimension;
        let time = cache.time();

        let child = cache.child_cache(field.handle());
        child.set_assign_in_cache_only(true);
        child.set_derivatives_requested(true);
        let found = locate_point(&elements, dimension, self.mode, &target, &search, |element, xi| {
            child.set_mesh_location(element, xi, None, time)?;
            let real = ctx.evaluate_real(child, mesh_field)?;
            let mut jacobian = Vec::new();
            if real.derivatives_valid && real.number_of_xi == dimension {
                jacobian.reserve(real.component_count() * dimension);
                for component in 0..real.component_count() {
                    if let Some(row) = real.derivative_row(component) {
                        jacobian.extend_from_slice(row);
                    }
                }
            }
            Ok((real.values.clone(), jacobian))
        });

        let Some(found) = found else {
            debug!(
                "No {} mesh location of '{}' for target {:?}",
                dimension,
                field.name(),
                target.as_slice()
            );
            return Err(FieldError::LocationNotFound {
                field: field.name().to_string(),
            });
        };
        match out {
            ValueCache::MeshLocation(location) => {
                location.element = Some(found.element);
                location.xi = found.xi;
                Ok(())
            }
            _ => Err(FieldError::invalid_argument(
                "find_mesh_location",
                "mesh location value cache required",
            )),
        }
    }

    fn describe(&self) -> String {
        let mode = match self.mode {
            SearchMode::Exact => "exact",
            SearchMode::Nearest => "nearest",
        };
        format!("{mode} in {}D elements", self.mesh_dimension)
    }
}

impl FieldModule {
    /// Create a field locating where `mesh_field` equals `value` among
    /// elements of `mesh_dimension`
    pub fn create_find_mesh_location(
        &mut self,
        name: impl Into<String>,
        value: FieldHandle,
        mesh_field: FieldHandle,
        mesh_dimension: usize,
        mode: SearchMode,
    ) -> FieldResult<FieldHandle> {
        let value_field = self.field(value)?;
        let mesh_value_field = self.field(mesh_field)?;
        if value_field.value_type() != FieldValueType::Real
            || mesh_value_field.value_type() != FieldValueType::Real
        {
            return Err(FieldError::invalid_argument(
                "create_find_mesh_location",
                "source and mesh fields must be real valued",
            ));
        }
        if value_field.component_count() != mesh_value_field.component_count() {
            return Err(FieldError::invalid_argument(
                "create_find_mesh_location",
                format!(
                    "'{}' has {} components but mesh field '{}' has {}",
                    value_field.name(),
                    value_field.component_count(),
                    mesh_value_field.name(),
                    mesh_value_field.component_count()
                ),
            ));
        }
        if mesh_dimension == 0 || mesh_dimension > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(FieldError::invalid_argument(
                "create_find_mesh_location",
                format!("unsupported mesh dimension {mesh_dimension}"),
            ));
        }
        let core = FindMeshLocationCore::new(mesh_dimension, mode);
        self.add_field(
            name,
            FieldDefinition::new(1, Box::new(core)).with_sources(&[value, mesh_field]),
        )
    }
}
