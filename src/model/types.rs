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

//! Identifiers and value type definitions shared by the data model

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Highest element dimension supported by the mesh and the basis kernel
pub const MAXIMUM_ELEMENT_XI_DIMENSIONS: usize = 3;

/// Element chart coordinates, one entry per element dimension
pub type Xi = SmallVec<[f64; MAXIMUM_ELEMENT_XI_DIMENSIONS]>;

/// Node identifier (the node's cmiss number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element identifier (the element's cmiss number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage type of a stored field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Double precision real
    Real,
    /// Single precision real
    Float,
    /// 16-bit integer, interpolated like a real
    Short,
    /// Integer; no derivatives
    Int,
    /// Text, one component
    String,
    /// Host mesh location, one component
    MeshLocation,
}

impl ValueType {
    /// The value cache type a field of this storage type evaluates to
    pub fn field_value_type(self) -> FieldValueType {
        match self {
            ValueType::Real | ValueType::Float | ValueType::Short | ValueType::Int => {
                FieldValueType::Real
            }
            ValueType::String => FieldValueType::String,
            ValueType::MeshLocation => FieldValueType::MeshLocation,
        }
    }

    /// Whether values of this type can be stored as numbers
    pub fn is_numeric(self) -> bool {
        self.field_value_type() == FieldValueType::Real
    }

    /// Whether xi derivatives can be computed for this type
    pub fn supports_derivatives(self) -> bool {
        matches!(self, ValueType::Real | ValueType::Float | ValueType::Short)
    }

    /// Round a real to what this storage type can hold
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            ValueType::Float => value as f32 as f64,
            ValueType::Short => value.round().clamp(i16::MIN as f64, i16::MAX as f64),
            ValueType::Int => value.round().clamp(i32::MIN as f64, i32::MAX as f64),
            _ => value,
        }
    }

    /// Lower-case name used in listings
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Real => "real",
            ValueType::Float => "float",
            ValueType::Short => "short",
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::MeshLocation => "mesh_location",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type of value a field produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValueType {
    /// Real components with optional xi derivatives
    Real,
    /// Text
    String,
    /// Element and xi
    MeshLocation,
}

impl fmt::Display for FieldValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldValueType::Real => "real",
            FieldValueType::String => "string",
            FieldValueType::MeshLocation => "mesh_location",
        })
    }
}

/// Coordinate system a field's components are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum CoordinateSystem {
    /// x, y, z
    #[default]
    RectangularCartesian,
    /// r, theta, z
    CylindricalPolar,
    /// r, theta, phi
    SphericalPolar,
    /// lambda, mu, theta with focus
    ProlateSpheroidal {
        /// Focus distance
        focus: f64,
    },
    /// lambda, mu, theta with focus
    OblateSpheroidal {
        /// Focus distance
        focus: f64,
    },
    /// Fibre angles
    Fibre,
    /// No geometric interpretation
    NotApplicable,
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinateSystem::RectangularCartesian => f.write_str("rectangular_cartesian"),
            CoordinateSystem::CylindricalPolar => f.write_str("cylindrical_polar"),
            CoordinateSystem::SphericalPolar => f.write_str("spherical_polar"),
            CoordinateSystem::ProlateSpheroidal { focus } => {
                write!(f, "prolate_spheroidal focus={focus}")
            }
            CoordinateSystem::OblateSpheroidal { focus } => {
                write!(f, "oblate_spheroidal focus={focus}")
            }
            CoordinateSystem::Fibre => f.write_str("fibre"),
            CoordinateSystem::NotApplicable => f.write_str("not_applicable"),
        }
    }
}

/// Label of a nodal parameter: the value or one of its xi-derivatives.
///
/// The declaration order matches a bit mask over xi directions: bit `d` set
/// means "differentiated with respect to s(d+1)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeValueLabel {
    /// Field value
    Value,
    /// d/ds1
    DDs1,
    /// d/ds2
    DDs2,
    /// d2/ds1ds2
    D2Ds1Ds2,
    /// d/ds3
    DDs3,
    /// d2/ds1ds3
    D2Ds1Ds3,
    /// d2/ds2ds3
    D2Ds2Ds3,
    /// d3/ds1ds2ds3
    D3Ds1Ds2Ds3,
}

impl NodeValueLabel {
    /// All labels in mask order
    pub const ALL: [NodeValueLabel; 8] = [
        NodeValueLabel::Value,
        NodeValueLabel::DDs1,
        NodeValueLabel::DDs2,
        NodeValueLabel::D2Ds1Ds2,
        NodeValueLabel::DDs3,
        NodeValueLabel::D2Ds1Ds3,
        NodeValueLabel::D2Ds2Ds3,
        NodeValueLabel::D3Ds1Ds2Ds3,
    ];

    /// Label for a derivative direction mask (bit d = derivative in s(d+1))
    pub fn from_derivative_mask(mask: usize) -> Option<NodeValueLabel> {
        Self::ALL.get(mask).copied()
    }

    /// Derivative direction mask of this label
    pub fn derivative_mask(self) -> usize {
        self as usize
    }

    /// Conventional name, e.g. `d2/ds1ds2`
    pub fn name(self) -> &'static str {
        match self {
            NodeValueLabel::Value => "value",
            NodeValueLabel::DDs1 => "d/ds1",
            NodeValueLabel::DDs2 => "d/ds2",
            NodeValueLabel::D2Ds1Ds2 => "d2/ds1ds2",
            NodeValueLabel::DDs3 => "d/ds3",
            NodeValueLabel::D2Ds1Ds3 => "d2/ds1ds3",
            NodeValueLabel::D2Ds2Ds3 => "d2/ds2ds3",
            NodeValueLabel::D3Ds1Ds2Ds3 => "d3/ds1ds2ds3",
        }
    }
}

impl fmt::Display for NodeValueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
