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

//! Interpolation kernel
//!
//! The kernel turns a stored field's degrees of freedom over one element into
//! per-component state that can be sampled at any xi. Results are cached per
//! element by [`crate::cache::ElementFieldValueCache`].

use std::fmt;

use log::{error, trace};
use smallvec::SmallVec;

use super::basis::{GridValues, MonomialPolynomial};
use super::mesh::MeshTopology;
use super::stored_field::{ComponentRepresentation, StoredField};
use super::types::{ElementId, MAXIMUM_ELEMENT_XI_DIMENSIONS, ValueType};
use crate::error::{FieldError, FieldResult};

/// What element values to compute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementValuesRequest {
    /// Element to evaluate over
    pub element: ElementId,
    /// Time for time-varying node parameters
    pub time: f64,
    /// Preferred ancestor to inherit from when not defined on the element
    pub top_level: Option<ElementId>,
    /// Whether xi derivatives will be sampled
    pub derivatives: bool,
}

/// Per-component state for one element
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentValues {
    /// Monomial coefficients in the element's xi
    Monomial(MonomialPolynomial),
    /// Grid point values interpolated per cell
    Grid(GridValues),
    /// Text constant over the element
    Text(String),
}

impl ComponentValues {
    fn basis_name(&self) -> &'static str {
        match self {
            ComponentValues::Monomial(_) => "monomial",
            ComponentValues::Grid(_) => "grid",
            ComponentValues::Text(_) => "text",
        }
    }
}

/// Interpolation state of one stored field over one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFieldValues {
    /// Element the state is for
    pub element: ElementId,
    /// Time it was computed at
    pub time: f64,
    /// Ancestor requested when it was computed
    pub top_level: Option<ElementId>,
    /// Whether it was computed for derivative sampling
    pub derivatives: bool,
    /// Element dimension
    pub dimension: usize,
    /// Storage type of the stored field
    pub value_type: ValueType,
    /// One entry per component
    pub components: Vec<ComponentValues>,
}

impl ElementFieldValues {
    /// Whether this state can serve `request`
    pub fn matches(&self, request: &ElementValuesRequest) -> bool {
        self.element == request.element
            && self.time.to_bits() == request.time.to_bits()
            && self.top_level == request.top_level
            && (self.derivatives || !request.derivatives)
    }

    /// Copy differentiated with respect to each xi index in turn.
    ///
    /// Only monomial components can be differentiated.
    pub fn differentiate(&self, xi_indices: &[usize]) -> FieldResult<Self> {
        if let Some(bad) = xi_indices.iter().find(|&&d| d >= self.dimension) {
            return Err(FieldError::invalid_argument(
                "ElementFieldValues::differentiate",
                format!(
                    "xi index {} exceeds element dimension {}",
                    bad + 1,
                    self.dimension
                ),
            ));
        }
        let mut components = Vec::with_capacity(self.components.len());
        for component in &self.components {
            match component {
                ComponentValues::Monomial(polynomial) => {
                    let mut derived = polynomial.clone();
                    for &d in xi_indices {
                        derived = derived.differentiate(d);
                    }
                    components.push(ComponentValues::Monomial(derived));
                }
                other => {
                    error!(
                        "Differentiation of {} basis requested in element {}",
                        other.basis_name(),
                        self.element
                    );
                    return Err(FieldError::UnsupportedBasis {
                        basis: other.basis_name().to_string(),
                    });
                }
            }
        }
        Ok(Self {
            components,
            ..self.clone()
        })
    }

    /// Sample real values at xi.
    ///
    /// Derivatives, when requested, are written with a stride of
    /// [`MAXIMUM_ELEMENT_XI_DIMENSIONS`] per component.
    pub fn evaluate_real(
        &self,
        xi: &[f64],
        values: &mut [f64],
        mut derivatives: Option<&mut [f64]>,
    ) -> FieldResult<()> {
        if xi.len() < self.dimension {
            return Err(FieldError::invalid_argument(
                "ElementFieldValues::evaluate_real",
                format!("expected {} xi, got {}", self.dimension, xi.len()),
            ));
        }
        let integer = self.value_type == ValueType::Int;
        if integer && derivatives.is_some() {
            return Err(FieldError::UnsupportedValueType {
                field: format!("element {}", self.element),
                request: "derivatives of integer values".to_string(),
            });
        }
        for (c, component) in self.components.iter().enumerate() {
            let mut gradient = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
            let want = derivatives.is_some();
            let value = match component {
                ComponentValues::Monomial(polynomial) => {
                    let value = polynomial
                        .evaluate_with_derivatives(xi, want.then_some(&mut gradient[..]));
                    if integer { value.round() } else { value }
                }
                ComponentValues::Grid(grid) => {
                    if integer {
                        grid.nearest_value(xi)
                    } else {
                        grid.evaluate_with_derivatives(xi, want.then_some(&mut gradient[..]))
                    }
                }
                ComponentValues::Text(_) => {
                    return Err(FieldError::UnsupportedValueType {
                        field: format!("element {}", self.element),
                        request: "real values from text components".to_string(),
                    });
                }
            };
            if let Some(slot) = values.get_mut(c) {
                *slot = value;
            }
            if let Some(out) = derivatives.as_deref_mut() {
                let base = c * MAXIMUM_ELEMENT_XI_DIMENSIONS;
                if let Some(row) = out.get_mut(base..base + MAXIMUM_ELEMENT_XI_DIMENSIONS) {
                    row.copy_from_slice(&gradient);
                }
            }
        }
        Ok(())
    }

    /// Text of one component at xi; numeric components are formatted
    pub fn component_text(&self, component: usize, xi: &[f64]) -> FieldResult<String> {
        match self.components.get(component) {
            Some(ComponentValues::Text(text)) => Ok(text.clone()),
            Some(ComponentValues::Monomial(polynomial)) => Ok(polynomial.evaluate(xi).to_string()),
            Some(ComponentValues::Grid(grid)) => {
                Ok(grid.evaluate_with_derivatives(xi, None).to_string())
            }
            None => Err(FieldError::invalid_argument(
                "ElementFieldValues::component_text",
                format!("no component {}", component + 1),
            )),
        }
    }

    /// Grid point index xi lies on for a grid component
    pub fn grid_point(&self, component: usize, xi: &[f64]) -> Option<usize> {
        match self.components.get(component) {
            Some(ComponentValues::Grid(grid)) => grid.grid_point_at(xi),
            _ => None,
        }
    }
}

/// Basis-function subsystem contract
pub trait InterpolationKernel: fmt::Debug + Send + Sync {
    /// Kernel name for listings
    fn name(&self) -> &str;

    /// Whether the field can be evaluated over the element, directly or by
    /// inheritance from an ancestor
    fn is_defined_in_element(
        &self,
        field: &StoredField,
        mesh: &dyn MeshTopology,
        element: ElementId,
    ) -> bool;

    /// Compute per-component state for the field over an element
    fn calculate_element_values(
        &self,
        field: &StoredField,
        mesh: &dyn MeshTopology,
        request: &ElementValuesRequest,
    ) -> FieldResult<ElementFieldValues>;

    /// Grid divisions the field is natively sampled at in an element, for
    /// grid-based fields
    fn native_discretization(
        &self,
        field: &StoredField,
        element: ElementId,
    ) -> Option<SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>>;
}

/// Tensor-product monomial kernel with face inheritance
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardKernel;

impl StandardKernel {
    fn build_components(
        field: &StoredField,
        element: ElementId,
        dimension: usize,
        time: f64,
    ) -> FieldResult<Vec<ComponentValues>> {
        let template = field
            .element_template(element)
            .ok_or_else(|| FieldError::undefined(field.name(), format!("element {element}")))?;
        let mut components = Vec::with_capacity(template.components().len());
        for (c, representation) in template.components().iter().enumerate() {
            let values = match representation {
                ComponentRepresentation::NodeInterpolated {
                    basis,
                    nodes,
                    versions,
                } => {
                    if basis.dimension() != dimension {
                        return Err(FieldError::stored_field(
                            field.name(),
                            format!(
                                "basis of dimension {} used on element {element} of dimension {dimension}",
                                basis.dimension()
                            ),
                        ));
                    }
                    let polynomial = basis.to_monomial(|local, label| {
                        field.node_parameter(nodes[local], c, label, versions[local], time)
                    })?;
                    ComponentValues::Monomial(polynomial)
                }
                ComponentRepresentation::Grid(grid) => {
                    if grid.number_in_xi().len() != dimension {
                        return Err(FieldError::stored_field(
                            field.name(),
                            format!("grid on element {element} does not match its dimension"),
                        ));
                    }
                    ComponentValues::Grid(grid.clone())
                }
                ComponentRepresentation::Constant(value) => {
                    ComponentValues::Monomial(MonomialPolynomial::constant(dimension, *value))
                }
                ComponentRepresentation::Text(text) => ComponentValues::Text(text.clone()),
            };
            components.push(values);
        }
        Ok(components)
    }
}

impl InterpolationKernel for StandardKernel {
    fn name(&self) -> &str {
        "standard"
    }

    fn is_defined_in_element(
        &self,
        field: &StoredField,
        mesh: &dyn MeshTopology,
        element: ElementId,
    ) -> bool {
        field.is_defined_in_element(element)
            || mesh
                .ancestors(element)
                .iter()
                .any(|ancestor| field.is_defined_in_element(ancestor.element))
    }

    fn calculate_element_values(
        &self,
        field: &StoredField,
        mesh: &dyn MeshTopology,
        request: &ElementValuesRequest,
    ) -> FieldResult<ElementFieldValues> {
        let element = request.element;
        let dimension = mesh
            .element_dimension(element)
            .ok_or(FieldError::ElementNotFound(element))?;

        let components = if field.is_defined_in_element(element) {
            Self::build_components(field, element, dimension, request.time)?
        } else {
            let ancestors = mesh.ancestors(element);
            let source = request
                .top_level
                .and_then(|top| ancestors.iter().find(|a| a.element == top))
                .filter(|a| field.is_defined_in_element(a.element))
                .or_else(|| {
                    ancestors
                        .iter()
                        .find(|a| field.is_defined_in_element(a.element))
                })
                .ok_or_else(|| FieldError::undefined(field.name(), format!("element {element}")))?;
            let source_dimension = mesh
                .element_dimension(source.element)
                .ok_or(FieldError::ElementNotFound(source.element))?;
            trace!(
                "Field '{}' inherited on element {element} from element {}",
                field.name(),
                source.element
            );
            Self::build_components(field, source.element, source_dimension, request.time)?
                .into_iter()
                .map(|component| match component {
                    ComponentValues::Monomial(mut polynomial) => {
                        for &face in &source.faces {
                            polynomial = polynomial.restrict(face / 2, (face % 2) as f64);
                        }
                        Ok(ComponentValues::Monomial(polynomial))
                    }
                    ComponentValues::Text(text) => Ok(ComponentValues::Text(text)),
                    ComponentValues::Grid(_) => Err(FieldError::UnsupportedBasis {
                        basis: "grid inherited onto a face".to_string(),
                    }),
                })
                .collect::<FieldResult<Vec<_>>>()?
        };

        Ok(ElementFieldValues {
            element,
            time: request.time,
            top_level: request.top_level,
            derivatives: request.derivatives,
            dimension,
            value_type: field.value_type(),
            components,
        })
    }

    fn native_discretization(
        &self,
        field: &StoredField,
        element: ElementId,
    ) -> Option<SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>> {
        let template = field.element_template(element)?;
        let mut result: Option<SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>> = None;
        for component in template.components() {
            if let ComponentRepresentation::Grid(grid) = component {
                let divisions = grid.number_in_xi();
                result = Some(match result {
                    None => divisions.iter().copied().collect(),
                    Some(current) => current
                        .iter()
                        .zip(divisions)
                        .map(|(a, b)| (*a).max(*b))
                        .collect(),
                });
            }
        }
        result
    }
}
