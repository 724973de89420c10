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

//! Field core variants
//!
//! Each submodule adds its `create_*` constructors to
//! [`FieldModule`](crate::field::FieldModule).

pub mod basis_derivative;
pub mod composite;
pub mod constant;
pub mod embedded;
pub mod find_mesh_location;
pub mod finite_element;
pub mod introspection;
pub mod node_value;
pub mod xi_coordinates;

pub use basis_derivative::BasisDerivativeCore;
pub use composite::{ComponentCore, ConcatenateCore, IdentityCore};
pub use constant::{ConstantCore, StringConstantCore};
pub use embedded::EmbeddedCore;
pub use find_mesh_location::FindMeshLocationCore;
pub use finite_element::FiniteElementCore;
pub use introspection::{AccessCountCore, CmissNumberCore};
pub use node_value::NodeValueCore;
pub use xi_coordinates::XiCoordinatesCore;
