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

//! Typed result slots for one field within one field cache

use smallvec::SmallVec;

use crate::error::{FieldError, FieldResult};
use crate::model::{ElementId, FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS, Xi};

/// Real values with optional xi derivatives.
///
/// Derivatives are stored with a stride of [`MAXIMUM_ELEMENT_XI_DIMENSIONS`]
/// per component; only the first `number_of_xi` entries of each row are
/// meaningful, and only while `derivatives_valid` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct RealValueCache {
    /// Component values
    pub values: SmallVec<[f64; 4]>,
    /// d(component)/d(xi) rows
    pub derivatives: Vec<f64>,
    /// Whether `derivatives` holds results for the current evaluation
    pub derivatives_valid: bool,
    /// Xi directions the derivatives are with respect to
    pub number_of_xi: usize,
}

impl RealValueCache {
    /// Zeroed cache for `component_count` components
    pub fn new(component_count: usize) -> Self {
        Self {
            values: SmallVec::from_elem(0.0, component_count),
            derivatives: vec![0.0; component_count * MAXIMUM_ELEMENT_XI_DIMENSIONS],
            derivatives_valid: false,
            number_of_xi: 0,
        }
    }

    /// Number of components
    pub fn component_count(&self) -> usize {
        self.values.len()
    }

    /// Derivative of one component with respect to one xi, if valid
    pub fn derivative(&self, component: usize, xi: usize) -> Option<f64> {
        if !self.derivatives_valid || xi >= self.number_of_xi {
            return None;
        }
        self.derivatives
            .get(component * MAXIMUM_ELEMENT_XI_DIMENSIONS + xi)
            .copied()
    }

    /// Derivative row of one component, if valid
    pub fn derivative_row(&self, component: usize) -> Option<&[f64]> {
        if !self.derivatives_valid {
            return None;
        }
        let base = component * MAXIMUM_ELEMENT_XI_DIMENSIONS;
        self.derivatives.get(base..base + self.number_of_xi)
    }

    /// Mark derivatives as valid and exactly zero
    pub fn set_zero_derivatives(&mut self, number_of_xi: usize) {
        self.derivatives.fill(0.0);
        self.number_of_xi = number_of_xi.min(MAXIMUM_ELEMENT_XI_DIMENSIONS);
        self.derivatives_valid = true;
    }

    /// Zero everything and invalidate derivatives
    pub fn clear(&mut self) {
        self.values.fill(0.0);
        self.derivatives.fill(0.0);
        self.derivatives_valid = false;
        self.number_of_xi = 0;
    }

    /// Copy values and derivatives from a cache of the same shape
    pub fn copy_from(&mut self, source: &RealValueCache) -> FieldResult<()> {
        if source.component_count() != self.component_count() {
            return Err(FieldError::invalid_argument(
                "RealValueCache::copy_from",
                format!(
                    "cannot copy {} components into {}",
                    source.component_count(),
                    self.component_count()
                ),
            ));
        }
        self.values.copy_from_slice(&source.values);
        self.derivatives.copy_from_slice(&source.derivatives);
        self.derivatives_valid = source.derivatives_valid;
        self.number_of_xi = source.number_of_xi;
        Ok(())
    }
}

/// Text value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringValueCache {
    /// Text, when evaluated
    pub value: Option<String>,
}

/// Element and xi value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshLocationValueCache {
    /// Element, when evaluated
    pub element: Option<ElementId>,
    /// Chart coordinates
    pub xi: Xi,
}

/// Result slot of one field
#[derive(Debug, Clone, PartialEq)]
pub enum ValueCache {
    /// Real components
    Real(RealValueCache),
    /// Text
    String(StringValueCache),
    /// Mesh location
    MeshLocation(MeshLocationValueCache),
}

impl ValueCache {
    /// Empty slot for a value type
    pub fn for_type(value_type: FieldValueType, component_count: usize) -> Self {
        match value_type {
            FieldValueType::Real => ValueCache::Real(RealValueCache::new(component_count)),
            FieldValueType::String => ValueCache::String(StringValueCache::default()),
            FieldValueType::MeshLocation => {
                ValueCache::MeshLocation(MeshLocationValueCache::default())
            }
        }
    }

    /// Value type of the slot
    pub fn value_type(&self) -> FieldValueType {
        match self {
            ValueCache::Real(_) => FieldValueType::Real,
            ValueCache::String(_) => FieldValueType::String,
            ValueCache::MeshLocation(_) => FieldValueType::MeshLocation,
        }
    }

    /// Real slot, if this is one
    pub fn as_real(&self) -> Option<&RealValueCache> {
        match self {
            ValueCache::Real(cache) => Some(cache),
            _ => None,
        }
    }

    /// Mutable real slot, if this is one
    pub fn as_real_mut(&mut self) -> Option<&mut RealValueCache> {
        match self {
            ValueCache::Real(cache) => Some(cache),
            _ => None,
        }
    }

    /// Text, if this is an evaluated string slot
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueCache::String(cache) => cache.value.as_deref(),
            _ => None,
        }
    }

    /// Mesh location slot, if this is one
    pub fn as_mesh_location(&self) -> Option<&MeshLocationValueCache> {
        match self {
            ValueCache::MeshLocation(cache) => Some(cache),
            _ => None,
        }
    }

    /// Reset contents, keeping the shape
    pub fn clear(&mut self) {
        match self {
            ValueCache::Real(cache) => cache.clear(),
            ValueCache::String(cache) => cache.value = None,
            ValueCache::MeshLocation(cache) => {
                cache.element = None;
                cache.xi.clear();
            }
        }
    }

    /// Copy from a cache of the same type and shape
    pub fn copy_from(&mut self, source: &ValueCache) -> FieldResult<()> {
        match (self, source) {
            (ValueCache::Real(target), ValueCache::Real(source)) => target.copy_from(source),
            (ValueCache::String(target), ValueCache::String(source)) => {
                target.value.clone_from(&source.value);
                Ok(())
            }
            (ValueCache::MeshLocation(target), ValueCache::MeshLocation(source)) => {
                target.element = source.element;
                target.xi.clone_from(&source.xi);
                Ok(())
            }
            (target, source) => Err(FieldError::invalid_argument(
                "ValueCache::copy_from",
                format!(
                    "cannot copy {} value into {} value",
                    source.value_type(),
                    target.value_type()
                ),
            )),
        }
    }

    /// Format the value as text; `None` selects all components
    pub fn format(&self, component: Option<usize>) -> FieldResult<String> {
        match self {
            ValueCache::Real(cache) => match component {
                None => Ok(cache
                    .values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")),
                Some(index) => cache.values.get(index).map(|v| v.to_string()).ok_or_else(|| {
                    FieldError::invalid_argument(
                        "ValueCache::format",
                        format!(
                            "component {} out of range for {} components",
                            index + 1,
                            cache.component_count()
                        ),
                    )
                }),
            },
            ValueCache::String(cache) => {
                if component.is_some_and(|c| c > 0) {
                    return Err(FieldError::invalid_argument(
                        "ValueCache::format",
                        "string values have one component",
                    ));
                }
                cache.value.clone().ok_or_else(|| {
                    FieldError::invalid_argument("ValueCache::format", "string value not evaluated")
                })
            }
            ValueCache::MeshLocation(cache) => {
                let element = cache.element.ok_or_else(|| {
                    FieldError::invalid_argument("ValueCache::format", "mesh location not evaluated")
                })?;
                let xi: SmallVec<[String; MAXIMUM_ELEMENT_XI_DIMENSIONS]> =
                    cache.xi.iter().map(|x| x.to_string()).collect();
                Ok(format!("{element} xi ({})", xi.join(", ")))
            }
        }
    }
}
