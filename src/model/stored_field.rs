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

//! Stored field data store
//!
//! A stored field holds the degrees of freedom a finite-element field is
//! interpolated from: parameters at nodes and a per-element description of
//! how each component is represented. Every write bumps the shared data
//! revision so field caches drop stale results on their next use.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::basis::{GridValues, TensorBasis};
use super::revision::Revision;
use super::types::{CoordinateSystem, ElementId, NodeId, NodeValueLabel, ValueType, Xi};
use crate::error::{FieldError, FieldResult};

/// Stored field shared between the owning region and its wrapper fields
pub type StoredFieldRef = Arc<RwLock<StoredField>>;

/// Kinds of change recorded against a stored field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
    /// No change
    pub const NONE: ChangeFlags = ChangeFlags(0);
    /// The stored field was created
    pub const ADDED: ChangeFlags = ChangeFlags(1);
    /// Name, shape, value type or coordinate system changed
    pub const IDENTIFIER_CHANGED: ChangeFlags = ChangeFlags(1 << 1);
    /// Node or element data changed
    pub const CONTENTS_CHANGED: ChangeFlags = ChangeFlags(1 << 2);
    /// The stored field was removed from its region
    pub const REMOVED: ChangeFlags = ChangeFlags(1 << 3);

    /// Whether every flag in `other` is set
    pub fn contains(self, other: ChangeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ChangeFlags {
    type Output = ChangeFlags;

    fn bitor(self, rhs: ChangeFlags) -> ChangeFlags {
        ChangeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeFlags {
    fn bitor_assign(&mut self, rhs: ChangeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: SmallVec<[&str; 4]> = [
            (ChangeFlags::ADDED, "added"),
            (ChangeFlags::IDENTIFIER_CHANGED, "identifier_changed"),
            (ChangeFlags::CONTENTS_CHANGED, "contents_changed"),
            (ChangeFlags::REMOVED, "removed"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// Numeric parameters at one node.
///
/// Values are laid out `[time][component][version][label]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericNodeData {
    labels: SmallVec<[NodeValueLabel; 8]>,
    versions: usize,
    times: Option<Vec<f64>>,
    components: usize,
    values: Vec<f64>,
}

impl NumericNodeData {
    fn new(
        components: usize,
        labels: &[NodeValueLabel],
        versions: usize,
        times: Option<Vec<f64>>,
    ) -> Self {
        let samples = times.as_ref().map_or(1, |t| t.len());
        Self {
            labels: labels.iter().copied().collect(),
            versions,
            times,
            components,
            values: vec![0.0; samples * components * versions * labels.len()],
        }
    }

    /// Parameter labels present at the node
    pub fn labels(&self) -> &[NodeValueLabel] {
        &self.labels
    }

    /// Number of versions
    pub fn versions(&self) -> usize {
        self.versions
    }

    /// Time samples, if the node is time varying
    pub fn times(&self) -> Option<&[f64]> {
        self.times.as_deref()
    }

    fn offset(&self, sample: usize, component: usize, version: usize, label: usize) -> usize {
        ((sample * self.components + component) * self.versions + version) * self.labels.len()
            + label
    }

    fn sample_exactly_at(&self, time: f64) -> Option<usize> {
        match &self.times {
            None => Some(0),
            Some(times) => times.iter().position(|t| (t - time).abs() <= 1e-12),
        }
    }

    /// Interpolate one parameter linearly in time, clamped to the sampled range
    fn interpolate(&self, component: usize, version: usize, label: usize, time: f64) -> f64 {
        let Some(times) = &self.times else {
            return self.values[self.offset(0, component, version, label)];
        };
        let last = times.len() - 1;
        if time <= times[0] {
            return self.values[self.offset(0, component, version, label)];
        }
        if time >= times[last] {
            return self.values[self.offset(last, component, version, label)];
        }
        let upper = times.partition_point(|t| *t <= time).min(last);
        let lower = upper - 1;
        let span = times[upper] - times[lower];
        let weight = if span > 0.0 { (time - times[lower]) / span } else { 0.0 };
        let a = self.values[self.offset(lower, component, version, label)];
        let b = self.values[self.offset(upper, component, version, label)];
        a + weight * (b - a)
    }
}

/// Data held at one node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeFieldData {
    /// Numeric parameters
    Numeric(NumericNodeData),
    /// Text of a string field
    Text(String),
    /// Host location of a mesh location field
    MeshLocation {
        /// Host element
        element: ElementId,
        /// Chart coordinates in the host element
        xi: Xi,
    },
}

/// How one component is represented over one element
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentRepresentation {
    /// Interpolated from node parameters by a tensor-product basis
    NodeInterpolated {
        /// Basis over the element
        basis: TensorBasis,
        /// Global node for each local basis node
        nodes: Vec<NodeId>,
        /// Version used at each local basis node
        versions: Vec<usize>,
    },
    /// Values on a regular grid of points
    Grid(GridValues),
    /// One value over the whole element
    Constant(f64),
    /// One text over the whole element
    Text(String),
}

impl ComponentRepresentation {
    /// Node-interpolated representation using version 0 at every node
    pub fn node_interpolated(basis: TensorBasis, nodes: Vec<NodeId>) -> Self {
        let versions = vec![0; nodes.len()];
        Self::NodeInterpolated {
            basis,
            nodes,
            versions,
        }
    }

    /// Short name of the representation
    pub fn kind(&self) -> &'static str {
        match self {
            ComponentRepresentation::NodeInterpolated { .. } => "node_interpolated",
            ComponentRepresentation::Grid(_) => "grid",
            ComponentRepresentation::Constant(_) => "constant",
            ComponentRepresentation::Text(_) => "text",
        }
    }
}

/// Per-component representations of a stored field over one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFieldTemplate {
    components: Vec<ComponentRepresentation>,
}

impl ElementFieldTemplate {
    /// Component representations in component order
    pub fn components(&self) -> &[ComponentRepresentation] {
        &self.components
    }
}

/// Backing store of node and element degrees of freedom
#[derive(Debug)]
pub struct StoredField {
    name: String,
    value_type: ValueType,
    component_count: usize,
    component_names: Vec<String>,
    coordinate_system: CoordinateSystem,
    nodes: FxHashMap<NodeId, NodeFieldData>,
    elements: FxHashMap<ElementId, ElementFieldTemplate>,
    revision: Revision,
    changes: ChangeFlags,
}

impl StoredField {
    /// Create an empty stored field
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        component_count: usize,
    ) -> FieldResult<Self> {
        let name = name.into();
        if component_count == 0 {
            return Err(FieldError::stored_field(name, "component count must be positive"));
        }
        if !value_type.is_numeric() && component_count != 1 {
            return Err(FieldError::stored_field(
                name,
                format!("{value_type} fields have exactly one component"),
            ));
        }
        Ok(Self {
            name,
            value_type,
            component_count,
            component_names: (1..=component_count).map(|c| c.to_string()).collect(),
            coordinate_system: CoordinateSystem::default(),
            nodes: FxHashMap::default(),
            elements: FxHashMap::default(),
            revision: Revision::new(),
            changes: ChangeFlags::ADDED,
        })
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage value type
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Number of components
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Component names, "1", "2", ... unless renamed
    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    /// Coordinate system of the values
    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    /// Revision counter this field bumps on every write
    pub fn revision(&self) -> &Revision {
        &self.revision
    }

    /// Share the owning region's revision counter
    pub(crate) fn attach_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.changes |= ChangeFlags::IDENTIFIER_CHANGED;
        self.revision.bump();
    }

    /// Change the coordinate system
    pub fn set_coordinate_system(&mut self, coordinate_system: CoordinateSystem) {
        if self.coordinate_system != coordinate_system {
            self.coordinate_system = coordinate_system;
            self.changes |= ChangeFlags::IDENTIFIER_CHANGED;
            self.revision.bump();
        }
    }

    /// Rename one component
    pub fn set_component_name(&mut self, component: usize, name: impl Into<String>) -> FieldResult<()> {
        self.check_component(component)?;
        self.component_names[component] = name.into();
        self.changes |= ChangeFlags::IDENTIFIER_CHANGED;
        Ok(())
    }

    /// Return and reset the changes recorded since the last call
    pub fn take_changes(&mut self) -> ChangeFlags {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn record_change(&mut self, flags: ChangeFlags) {
        self.changes |= flags;
    }

    fn touch(&mut self) {
        self.changes |= ChangeFlags::CONTENTS_CHANGED;
        self.revision.bump();
    }

    fn check_component(&self, component: usize) -> FieldResult<()> {
        if component >= self.component_count {
            return Err(FieldError::stored_field(
                &self.name,
                format!(
                    "component {component} out of range for {} components",
                    self.component_count
                ),
            ));
        }
        Ok(())
    }

    fn require_numeric(&self, operation: &str) -> FieldResult<()> {
        if !self.value_type.is_numeric() {
            return Err(FieldError::stored_field(
                &self.name,
                format!("{operation} needs a numeric field, not {}", self.value_type),
            ));
        }
        Ok(())
    }

    // Nodes

    /// Define numeric parameters at a node, replacing any existing data.
    ///
    /// `labels` must include [`NodeValueLabel::Value`]; `times`, when given,
    /// must be strictly increasing.
    pub fn define_at_node(
        &mut self,
        node: NodeId,
        labels: &[NodeValueLabel],
        versions: usize,
        times: Option<Vec<f64>>,
    ) -> FieldResult<()> {
        self.require_numeric("define_at_node")?;
        if !labels.contains(&NodeValueLabel::Value) || versions == 0 {
            return Err(FieldError::stored_field(
                &self.name,
                "node parameters need the value label and at least one version",
            ));
        }
        if let Some(times) = &times {
            if times.is_empty() || times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(FieldError::stored_field(
                    &self.name,
                    "node time samples must be non-empty and strictly increasing",
                ));
            }
        }
        self.nodes.insert(
            node,
            NodeFieldData::Numeric(NumericNodeData::new(
                self.component_count,
                labels,
                versions,
                times,
            )),
        );
        self.touch();
        Ok(())
    }

    /// Whether the field has data at the node
    pub fn is_defined_at_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Raw data at a node
    pub fn node_data(&self, node: NodeId) -> Option<&NodeFieldData> {
        self.nodes.get(&node)
    }

    /// Nodes with data, in no particular order
    pub fn defined_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    fn numeric_node(&self, node: NodeId) -> FieldResult<&NumericNodeData> {
        match self.nodes.get(&node) {
            Some(NodeFieldData::Numeric(data)) => Ok(data),
            Some(_) => Err(FieldError::stored_field(
                &self.name,
                format!("node {node} does not hold numeric parameters"),
            )),
            None => Err(FieldError::undefined(&self.name, format!("node {node}"))),
        }
    }

    /// Set one parameter at a node.
    ///
    /// For time-varying nodes `time` must match one of the time samples.
    pub fn set_node_parameter(
        &mut self,
        node: NodeId,
        component: usize,
        label: NodeValueLabel,
        version: usize,
        time: f64,
        value: f64,
    ) -> FieldResult<()> {
        self.check_component(component)?;
        let value = self.value_type.quantize(value);
        let name = self.name.clone();
        let data = match self.nodes.get_mut(&node) {
            Some(NodeFieldData::Numeric(data)) => data,
            Some(_) => {
                return Err(FieldError::stored_field(
                    name,
                    format!("node {node} does not hold numeric parameters"),
                ));
            }
            None => return Err(FieldError::undefined(name, format!("node {node}"))),
        };
        let label_index = data
            .labels
            .iter()
            .position(|l| *l == label)
            .ok_or_else(|| {
                FieldError::stored_field(&name, format!("node {node} has no {label} parameter"))
            })?;
        if version >= data.versions {
            return Err(FieldError::stored_field(
                &name,
                format!("node {node} has no version {}", version + 1),
            ));
        }
        let sample = data.sample_exactly_at(time).ok_or_else(|| {
            FieldError::stored_field(&name, format!("node {node} has no time sample at {time}"))
        })?;
        let offset = data.offset(sample, component, version, label_index);
        data.values[offset] = value;
        self.touch();
        Ok(())
    }

    /// Set the value parameter, version 1, of every component at a node,
    /// defining plain value parameters first if the node has no data
    pub fn set_node_values(&mut self, node: NodeId, time: f64, values: &[f64]) -> FieldResult<()> {
        self.require_numeric("set_node_values")?;
        if values.len() != self.component_count {
            return Err(FieldError::stored_field(
                &self.name,
                format!(
                    "expected {} values, got {}",
                    self.component_count,
                    values.len()
                ),
            ));
        }
        if !self.nodes.contains_key(&node) {
            self.define_at_node(node, &[NodeValueLabel::Value], 1, None)?;
        }
        for (component, value) in values.iter().enumerate() {
            self.set_node_parameter(node, component, NodeValueLabel::Value, 0, time, *value)?;
        }
        Ok(())
    }

    /// One parameter at a node, interpolated in time.
    ///
    /// Labels the node does not carry read as zero.
    pub fn node_parameter(
        &self,
        node: NodeId,
        component: usize,
        label: NodeValueLabel,
        version: usize,
        time: f64,
    ) -> FieldResult<f64> {
        self.check_component(component)?;
        let data = self.numeric_node(node)?;
        if version >= data.versions {
            return Err(FieldError::stored_field(
                &self.name,
                format!("node {node} has no version {}", version + 1),
            ));
        }
        Ok(match data.labels.iter().position(|l| *l == label) {
            Some(label_index) => data.interpolate(component, version, label_index, time),
            None => 0.0,
        })
    }

    /// Value parameters, version 1, of every component at a node
    pub fn node_values(&self, node: NodeId, time: f64) -> FieldResult<SmallVec<[f64; 4]>> {
        (0..self.component_count)
            .map(|c| self.node_parameter(node, c, NodeValueLabel::Value, 0, time))
            .collect()
    }

    /// Set the text at a node of a string field
    pub fn set_node_string(&mut self, node: NodeId, text: impl Into<String>) -> FieldResult<()> {
        if self.value_type != ValueType::String {
            return Err(FieldError::stored_field(&self.name, "not a string field"));
        }
        self.nodes.insert(node, NodeFieldData::Text(text.into()));
        self.touch();
        Ok(())
    }

    /// Text at a node of a string field
    pub fn node_string(&self, node: NodeId) -> FieldResult<&str> {
        match self.nodes.get(&node) {
            Some(NodeFieldData::Text(text)) => Ok(text),
            Some(_) => Err(FieldError::stored_field(
                &self.name,
                format!("node {node} does not hold text"),
            )),
            None => Err(FieldError::undefined(&self.name, format!("node {node}"))),
        }
    }

    /// Set the host location at a node of a mesh location field
    pub fn set_node_mesh_location(
        &mut self,
        node: NodeId,
        element: ElementId,
        xi: &[f64],
    ) -> FieldResult<()> {
        if self.value_type != ValueType::MeshLocation {
            return Err(FieldError::stored_field(&self.name, "not a mesh location field"));
        }
        self.nodes.insert(
            node,
            NodeFieldData::MeshLocation {
                element,
                xi: xi.iter().copied().collect(),
            },
        );
        self.touch();
        Ok(())
    }

    /// Host location at a node of a mesh location field
    pub fn node_mesh_location(&self, node: NodeId) -> FieldResult<(ElementId, &[f64])> {
        match self.nodes.get(&node) {
            Some(NodeFieldData::MeshLocation { element, xi }) => Ok((*element, xi)),
            Some(_) => Err(FieldError::stored_field(
                &self.name,
                format!("node {node} does not hold a mesh location"),
            )),
            None => Err(FieldError::undefined(&self.name, format!("node {node}"))),
        }
    }

    // Elements

    /// Define the field over an element, one representation per component
    pub fn define_in_element(
        &mut self,
        element: ElementId,
        components: Vec<ComponentRepresentation>,
    ) -> FieldResult<()> {
        if components.len() != self.component_count {
            return Err(FieldError::stored_field(
                &self.name,
                format!(
                    "expected {} component representations, got {}",
                    self.component_count,
                    components.len()
                ),
            ));
        }
        for component in &components {
            match component {
                ComponentRepresentation::Text(_) if self.value_type != ValueType::String => {
                    return Err(FieldError::stored_field(
                        &self.name,
                        "text components need a string field",
                    ));
                }
                ComponentRepresentation::NodeInterpolated {
                    basis,
                    nodes,
                    versions,
                } => {
                    self.require_numeric("node interpolation")?;
                    if nodes.len() != basis.number_of_nodes() || versions.len() != nodes.len() {
                        return Err(FieldError::stored_field(
                            &self.name,
                            format!(
                                "basis over element {element} needs {} nodes, got {}",
                                basis.number_of_nodes(),
                                nodes.len()
                            ),
                        ));
                    }
                }
                ComponentRepresentation::Grid(_) | ComponentRepresentation::Constant(_) => {
                    self.require_numeric("grid and constant components")?;
                }
                ComponentRepresentation::Text(_) => {}
            }
        }
        let value_type = self.value_type;
        let components = components
            .into_iter()
            .map(|component| match component {
                ComponentRepresentation::Constant(value) => {
                    ComponentRepresentation::Constant(value_type.quantize(value))
                }
                ComponentRepresentation::Grid(mut grid) => {
                    for value in grid.values_mut() {
                        *value = value_type.quantize(*value);
                    }
                    ComponentRepresentation::Grid(grid)
                }
                other => other,
            })
            .collect();
        self.elements
            .insert(element, ElementFieldTemplate { components });
        self.touch();
        Ok(())
    }

    /// Define every component over an element with the same basis and nodes
    pub fn define_in_element_with_basis(
        &mut self,
        element: ElementId,
        basis: &TensorBasis,
        nodes: &[NodeId],
    ) -> FieldResult<()> {
        let components = (0..self.component_count)
            .map(|_| ComponentRepresentation::node_interpolated(basis.clone(), nodes.to_vec()))
            .collect();
        self.define_in_element(element, components)
    }

    /// Whether the field has a template on the element itself
    pub fn is_defined_in_element(&self, element: ElementId) -> bool {
        self.elements.contains_key(&element)
    }

    /// Template on an element
    pub fn element_template(&self, element: ElementId) -> Option<&ElementFieldTemplate> {
        self.elements.get(&element)
    }

    /// Number of elements with a template
    pub fn defined_element_count(&self) -> usize {
        self.elements.len()
    }

    fn component_mut(
        &mut self,
        element: ElementId,
        component: usize,
    ) -> FieldResult<&mut ComponentRepresentation> {
        self.check_component(component)?;
        let name = self.name.clone();
        self.elements
            .get_mut(&element)
            .map(|template| &mut template.components[component])
            .ok_or_else(|| FieldError::undefined(name, format!("element {element}")))
    }

    /// Set one grid point value of a grid component
    pub fn set_grid_value(
        &mut self,
        element: ElementId,
        component: usize,
        point: usize,
        value: f64,
    ) -> FieldResult<()> {
        let value = self.value_type.quantize(value);
        let name = self.name.clone();
        match self.component_mut(element, component)? {
            ComponentRepresentation::Grid(grid) => grid.set_value(point, value)?,
            other => {
                return Err(FieldError::stored_field(
                    name,
                    format!("component {component} in element {element} is {}", other.kind()),
                ));
            }
        }
        self.touch();
        Ok(())
    }

    /// Set the value of a constant component
    pub fn set_constant(&mut self, element: ElementId, component: usize, value: f64) -> FieldResult<()> {
        let value = self.value_type.quantize(value);
        let name = self.name.clone();
        match self.component_mut(element, component)? {
            ComponentRepresentation::Constant(slot) => *slot = value,
            other => {
                return Err(FieldError::stored_field(
                    name,
                    format!("component {component} in element {element} is {}", other.kind()),
                ));
            }
        }
        self.touch();
        Ok(())
    }
}
