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

//! Data model consumed by field evaluation: mesh topology, stored fields and
//! the interpolation kernel

pub mod basis;
pub mod kernel;
pub mod mesh;
pub mod revision;
pub mod stored_field;
pub mod types;

pub use basis::{BasisFunction, GridValues, MonomialPolynomial, TensorBasis};
pub use kernel::{
    ComponentValues, ElementFieldValues, ElementValuesRequest, InterpolationKernel, StandardKernel,
};
pub use mesh::{
    Ancestor, Element, FaceParent, Mesh, MeshTopology, PointLocation, SearchMode, SharedMesh,
    face_xi_to_parent, locate_point,
};
pub use revision::Revision;
pub use stored_field::{
    ChangeFlags, ComponentRepresentation, ElementFieldTemplate, NodeFieldData, NumericNodeData,
    StoredField, StoredFieldRef,
};
pub use types::{
    CoordinateSystem, ElementId, FieldValueType, MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeId,
    NodeValueLabel, ValueType, Xi,
};
