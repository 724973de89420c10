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

//! JSON description of a region
//!
//! A document lists the mesh, the stored fields with their node and element
//! data, and derived fields by kind. Derived fields may refer to any field
//! defined before them, including the wrappers of stored fields, by name.
//!
//! ```rust
//! use computed_field::{EvaluationConfig, RegionDocument};
//!
//! let document = RegionDocument::from_json(r#"{
//!     "name": "line",
//!     "nodes": [1, 2],
//!     "elements": [{ "id": 1, "dimension": 1, "nodes": [1, 2] }],
//!     "stored_fields": [{
//!         "name": "x",
//!         "value_type": "real",
//!         "nodes": [{ "node": 1, "values": [0.0] }, { "node": 2, "values": [4.0] }],
//!         "elements": [{ "type": "basis", "element": 1, "functions": ["linear_lagrange"] }]
//!     }],
//!     "fields": [{ "kind": "constant", "name": "two", "values": [2.0] }]
//! }"#).unwrap();
//! let region = document.build(EvaluationConfig::default()).unwrap();
//! assert_eq!(region.module().field_count(), 2);
//! ```

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EvaluationConfig;
use crate::error::{FieldError, FieldResult};
use crate::field::{FieldHandle, FieldModule};
use crate::model::{
    BasisFunction, ComponentRepresentation, CoordinateSystem, ElementId, GridValues, Mesh,
    MeshTopology, NodeId, NodeValueLabel, SearchMode, StoredField, TensorBasis, ValueType,
};
use crate::region::Region;

fn one() -> usize {
    1
}

/// Whole region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDocument {
    /// Region name
    pub name: String,
    /// Node identifiers
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    /// Elements, lower dimensions allowed
    #[serde(default)]
    pub elements: Vec<ElementDocument>,
    /// Face connections between elements
    #[serde(default)]
    pub faces: Vec<FaceDocument>,
    /// Stored fields; each gets a wrapper field of the same name
    #[serde(default)]
    pub stored_fields: Vec<StoredFieldDocument>,
    /// Derived fields in definition order
    #[serde(default)]
    pub fields: Vec<DerivedFieldDocument>,
}

/// One element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDocument {
    /// Identifier
    pub id: ElementId,
    /// Number of xi directions
    pub dimension: usize,
    /// Local-to-global node map
    #[serde(default)]
    pub nodes: Vec<NodeId>,
}

/// `element` is face `face` (`2*d + side`) of `parent`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDocument {
    /// Higher dimensional element
    pub parent: ElementId,
    /// Face number on the parent
    pub face: usize,
    /// Face element
    pub element: ElementId,
}

/// Stored field and its data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFieldDocument {
    /// Name, shared with the wrapper field
    pub name: String,
    /// Storage type
    pub value_type: ValueType,
    /// Number of components
    #[serde(default = "one")]
    pub components: usize,
    /// Coordinate system
    #[serde(default)]
    pub coordinate_system: CoordinateSystem,
    /// Node data
    #[serde(default)]
    pub nodes: Vec<NodeDataDocument>,
    /// Element data
    #[serde(default)]
    pub elements: Vec<ElementDataDocument>,
}

/// Data of a stored field at one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDataDocument {
    /// Node
    pub node: NodeId,
    /// Value per component, for fields without time samples
    #[serde(default)]
    pub values: Vec<f64>,
    /// Derivative parameters per component, by label
    #[serde(default)]
    pub derivatives: IndexMap<NodeValueLabel, Vec<f64>>,
    /// Time samples; `time_values` holds one value list per sample
    #[serde(default)]
    pub times: Vec<f64>,
    /// Values per component at each time sample
    #[serde(default)]
    pub time_values: Vec<Vec<f64>>,
    /// Text, for string fields
    #[serde(default)]
    pub text: Option<String>,
    /// Host location, for mesh location fields
    #[serde(default)]
    pub mesh_location: Option<MeshLocationDocument>,
}

/// Element and xi
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshLocationDocument {
    /// Host element
    pub element: ElementId,
    /// Chart coordinates
    pub xi: Vec<f64>,
}

/// Definition of a stored field over one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementDataDocument {
    /// Every component interpolated from node parameters
    Basis {
        /// Element
        element: ElementId,
        /// Basis function per xi direction
        functions: Vec<BasisFunction>,
        /// Local nodes; defaults to the element's nodes
        #[serde(default)]
        nodes: Option<Vec<NodeId>>,
    },
    /// Grid point values, one list per component
    Grid {
        /// Element
        element: ElementId,
        /// Cells per xi direction
        number_in_xi: Vec<usize>,
        /// Point values per component, first direction fastest
        values: Vec<Vec<f64>>,
    },
    /// One value per component
    Constant {
        /// Element
        element: ElementId,
        /// Value per component
        values: Vec<f64>,
    },
    /// Text over the element
    Text {
        /// Element
        element: ElementId,
        /// Text
        text: String,
    },
}

/// Derived field by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedFieldDocument {
    /// Real constant
    Constant {
        /// Field name
        name: String,
        /// Component values
        values: Vec<f64>,
    },
    /// Text constant
    StringConstant {
        /// Field name
        name: String,
        /// Text
        text: String,
    },
    /// Copy of another field
    Identity {
        /// Field name
        name: String,
        /// Source field
        source: String,
    },
    /// One component of another field
    Component {
        /// Field name
        name: String,
        /// Source field
        source: String,
        /// Component index from zero
        index: usize,
    },
    /// Components of several fields joined
    Concatenate {
        /// Field name
        name: String,
        /// Source fields in order
        sources: Vec<String>,
    },
    /// Field evaluated at a location held by another field
    Embedded {
        /// Field name
        name: String,
        /// Evaluated field
        value: String,
        /// Mesh location field
        location: String,
    },
    /// Location where a mesh field matches a value
    FindMeshLocation {
        /// Field name
        name: String,
        /// Target value field
        value: String,
        /// Field searched over the mesh
        mesh_field: String,
        /// Dimension of searched elements
        dimension: usize,
        /// Search mode
        mode: SearchMode,
    },
    /// Element chart coordinates
    XiCoordinates {
        /// Field name
        name: String,
        /// Number of components
        #[serde(default = "default_xi_components")]
        components: usize,
    },
    /// Basis derivative of a finite-element field
    BasisDerivative {
        /// Field name
        name: String,
        /// Finite-element source field
        source: String,
        /// Xi direction of each differentiation, from zero
        xi_indices: Vec<usize>,
    },
    /// One nodal parameter of a stored field
    NodeValue {
        /// Field name
        name: String,
        /// Stored field
        stored: String,
        /// Parameter label
        label: NodeValueLabel,
        /// Version from zero
        #[serde(default)]
        version: usize,
    },
    /// Node or element identifier
    CmissNumber {
        /// Field name
        name: String,
    },
    /// Node or element reference count
    AccessCount {
        /// Field name
        name: String,
    },
}

fn default_xi_components() -> usize {
    crate::model::MAXIMUM_ELEMENT_XI_DIMENSIONS
}

impl RegionDocument {
    /// Parse a document
    pub fn from_json(text: &str) -> FieldResult<Self> {
        serde_json::from_str(text).map_err(|e| FieldError::Document(e.to_string()))
    }

    /// Serialize the document
    pub fn to_json(&self) -> FieldResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| FieldError::Document(e.to_string()))
    }

    /// Build the region the document describes
    pub fn build(&self, config: EvaluationConfig) -> FieldResult<Region> {
        let mesh = self.build_mesh()?;
        let mut region = Region::with_mesh(self.name.clone(), mesh, config);
        region.begin_change();
        for stored in &self.stored_fields {
            let field = {
                let mesh = region.mesh().read();
                stored.build(&mesh)?
            };
            region.add_stored_field(field)?;
        }
        let report = region.end_change()?;
        if !report.conflicts.is_empty() {
            return Err(FieldError::Document(format!(
                "could not wrap stored fields {:?}",
                report.conflicts
            )));
        }
        for field in &self.fields {
            field.build(region.module_mut())?;
        }
        debug!(
            "Built region '{}' with {} fields",
            self.name,
            region.module().field_count()
        );
        Ok(region)
    }

    fn build_mesh(&self) -> FieldResult<Mesh> {
        let mut mesh = Mesh::new();
        for &node in &self.nodes {
            mesh.add_node(node)?;
        }
        for element in &self.elements {
            mesh.add_element(element.id, element.dimension, element.nodes.clone())?;
        }
        for face in &self.faces {
            mesh.set_face(face.parent, face.face, face.element)?;
        }
        Ok(mesh)
    }
}

impl StoredFieldDocument {
    fn build(&self, mesh: &Mesh) -> FieldResult<StoredField> {
        let mut field = StoredField::new(self.name.clone(), self.value_type, self.components)?;
        field.set_coordinate_system(self.coordinate_system);
        for node in &self.nodes {
            self.build_node(&mut field, node)?;
        }
        for element in &self.elements {
            self.build_element(&mut field, mesh, element)?;
        }
        Ok(field)
    }

    fn build_node(&self, field: &mut StoredField, node: &NodeDataDocument) -> FieldResult<()> {
        match self.value_type {
            ValueType::String => {
                let text = node.text.clone().unwrap_or_default();
                return field.set_node_string(node.node, text);
            }
            ValueType::MeshLocation => {
                let location = node.mesh_location.as_ref().ok_or_else(|| {
                    FieldError::Document(format!(
                        "node {} of '{}' needs a mesh_location",
                        node.node, self.name
                    ))
                })?;
                return field.set_node_mesh_location(node.node, location.element, &location.xi);
            }
            _ => {}
        }

        let mut labels = vec![NodeValueLabel::Value];
        labels.extend(node.derivatives.keys().copied().filter(|l| *l != NodeValueLabel::Value));
        let times = (!node.times.is_empty()).then(|| node.times.clone());
        field.define_at_node(node.node, &labels, 1, times)?;

        let mut samples: Vec<(f64, &[f64])> = Vec::new();
        if node.times.is_empty() {
            samples.push((0.0, node.values.as_slice()));
        } else {
            if node.time_values.len() != node.times.len() {
                return Err(FieldError::Document(format!(
                    "node {} of '{}' has {} times but {} value lists",
                    node.node,
                    self.name,
                    node.times.len(),
                    node.time_values.len()
                )));
            }
            samples.extend(
                node.times
                    .iter()
                    .copied()
                    .zip(node.time_values.iter().map(Vec::as_slice)),
            );
        }
        for (time, values) in samples {
            for (component, value) in values.iter().enumerate() {
                field.set_node_parameter(node.node, component, NodeValueLabel::Value, 0, time, *value)?;
            }
            for (label, values) in &node.derivatives {
                for (component, value) in values.iter().enumerate() {
                    field.set_node_parameter(node.node, component, *label, 0, time, *value)?;
                }
            }
        }
        Ok(())
    }

    fn build_element(
        &self,
        field: &mut StoredField,
        mesh: &Mesh,
        element: &ElementDataDocument,
    ) -> FieldResult<()> {
        match element {
            ElementDataDocument::Basis {
                element,
                functions,
                nodes,
            } => {
                let basis = TensorBasis::new(functions)?;
                let nodes = match nodes {
                    Some(nodes) => nodes.clone(),
                    None => mesh
                        .element_nodes(*element)
                        .ok_or(FieldError::ElementNotFound(*element))?
                        .to_vec(),
                };
                field.define_in_element_with_basis(*element, &basis, &nodes)
            }
            ElementDataDocument::Grid {
                element,
                number_in_xi,
                values,
            } => {
                let components = values
                    .iter()
                    .map(|values| {
                        GridValues::new(number_in_xi, values.clone()).map(ComponentRepresentation::Grid)
                    })
                    .collect::<FieldResult<Vec<_>>>()?;
                field.define_in_element(*element, components)
            }
            ElementDataDocument::Constant { element, values } => {
                let components = values
                    .iter()
                    .map(|v| ComponentRepresentation::Constant(*v))
                    .collect();
                field.define_in_element(*element, components)
            }
            ElementDataDocument::Text { element, text } => {
                field.define_in_element(*element, vec![ComponentRepresentation::Text(text.clone())])
            }
        }
    }
}

fn handle(module: &FieldModule, name: &str) -> FieldResult<FieldHandle> {
    module
        .find_field_by_name(name)
        .ok_or_else(|| FieldError::FieldNotFound(name.to_string()))
}

impl DerivedFieldDocument {
    /// Name of the field this entry defines
    pub fn name(&self) -> &str {
        match self {
            DerivedFieldDocument::Constant { name, .. }
            | DerivedFieldDocument::StringConstant { name, .. }
            | DerivedFieldDocument::Identity { name, .. }
            | DerivedFieldDocument::Component { name, .. }
            | DerivedFieldDocument::Concatenate { name, .. }
            | DerivedFieldDocument::Embedded { name, .. }
            | DerivedFieldDocument::FindMeshLocation { name, .. }
            | DerivedFieldDocument::XiCoordinates { name, .. }
            | DerivedFieldDocument::BasisDerivative { name, .. }
            | DerivedFieldDocument::NodeValue { name, .. }
            | DerivedFieldDocument::CmissNumber { name }
            | DerivedFieldDocument::AccessCount { name } => name,
        }
    }

    fn build(&self, module: &mut FieldModule) -> FieldResult<FieldHandle> {
        match self {
            DerivedFieldDocument::Constant { name, values } => {
                module.create_constant(name.clone(), values)
            }
            DerivedFieldDocument::StringConstant { name, text } => {
                module.create_string_constant(name.clone(), text)
            }
            DerivedFieldDocument::Identity { name, source } => {
                let source = handle(module, source)?;
                module.create_identity(name.clone(), source)
            }
            DerivedFieldDocument::Component {
                name,
                source,
                index,
            } => {
                let source = handle(module, source)?;
                module.create_component(name.clone(), source, *index)
            }
            DerivedFieldDocument::Concatenate { name, sources } => {
                let sources = sources
                    .iter()
                    .map(|source| handle(module, source))
                    .collect::<FieldResult<Vec<_>>>()?;
                module.create_concatenate(name.clone(), &sources)
            }
            DerivedFieldDocument::Embedded {
                name,
                value,
                location,
            } => {
                let value = handle(module, value)?;
                let location = handle(module, location)?;
                module.create_embedded(name.clone(), value, location)
            }
            DerivedFieldDocument::FindMeshLocation {
                name,
                value,
                mesh_field,
                dimension,
                mode,
            } => {
                let value = handle(module, value)?;
                let mesh_field = handle(module, mesh_field)?;
                module.create_find_mesh_location(name.clone(), value, mesh_field, *dimension, *mode)
            }
            DerivedFieldDocument::XiCoordinates { name, components } => {
                module.create_xi_coordinates(name.clone(), *components)
            }
            DerivedFieldDocument::BasisDerivative {
                name,
                source,
                xi_indices,
            } => {
                let source = handle(module, source)?;
                module.create_basis_derivative(name.clone(), source, xi_indices)
            }
            DerivedFieldDocument::NodeValue {
                name,
                stored,
                label,
                version,
            } => {
                let wrapper = module.field_by_name(stored)?;
                let stored = wrapper.core().stored_field().cloned().ok_or_else(|| {
                    FieldError::Document(format!("'{stored}' is not a stored field wrapper"))
                })?;
                module.create_node_value(name.clone(), &stored, *label, *version)
            }
            DerivedFieldDocument::CmissNumber { name } => module.create_cmiss_number(name.clone()),
            DerivedFieldDocument::AccessCount { name } => module.create_access_count(name.clone()),
        }
    }
}
