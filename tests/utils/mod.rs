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

//! Shared regions for integration tests

#![allow(dead_code)]

use computed_field::model::{
    BasisFunction, ElementId, Mesh, NodeId, TensorBasis, ValueType,
};
use computed_field::{EvaluationConfig, FieldHandle, Region};

pub const EPS: f64 = 1e-9;

/// Assert two value lists agree within [`EPS`]
pub fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: {actual:?} vs {expected:?}"
    );
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < EPS, "{actual:?} differs from {expected:?}");
    }
}

/// Handle of a field that must exist
pub fn field(region: &Region, name: &str) -> FieldHandle {
    region
        .module()
        .find_field_by_name(name)
        .unwrap_or_else(|| panic!("no field named '{name}'"))
}

/// Unit square element 1 over nodes 1..=4 (xi1 varies fastest) with its
/// top edge as line element 2 on face 3
pub fn square_mesh() -> Mesh {
    let mut mesh = Mesh::new();
    for n in 1..=4 {
        mesh.add_node(NodeId(n)).unwrap();
    }
    mesh.add_element(ElementId(1), 2, (1..=4).map(NodeId).collect())
        .unwrap();
    mesh.add_element(ElementId(2), 1, vec![NodeId(3), NodeId(4)])
        .unwrap();
    mesh.set_face(ElementId(1), 3, ElementId(2)).unwrap();
    mesh
}

/// Add a bilinear stored field over element 1 of [`square_mesh`]
pub fn add_bilinear_field(region: &mut Region, name: &str, node_values: [&[f64]; 4]) {
    let components = node_values[0].len();
    region
        .create_stored_field(name, ValueType::Real, components)
        .unwrap();
    region
        .modify_stored_field(name, |field| {
            for (n, values) in node_values.iter().enumerate() {
                field.set_node_values(NodeId(n as u32 + 1), 0.0, values)?;
            }
            let basis = TensorBasis::uniform(BasisFunction::LinearLagrange, 2)?;
            let nodes: Vec<NodeId> = (1..=4).map(NodeId).collect();
            field.define_in_element_with_basis(ElementId(1), &basis, &nodes)
        })
        .unwrap();
}

/// Square region with two wrapped stored fields:
///
/// - `coordinates`: x = 2 xi1, y = 3 xi2
/// - `temperature`: node values 0, 1, 2, 4, so t = xi1 + 2 xi2 + xi1 xi2
pub fn square_region() -> Region {
    let mut region = Region::with_mesh("square", square_mesh(), EvaluationConfig::testing());
    add_bilinear_field(
        &mut region,
        "coordinates",
        [&[0.0, 0.0], &[2.0, 0.0], &[0.0, 3.0], &[2.0, 3.0]],
    );
    add_bilinear_field(&mut region, "temperature", [&[0.0], &[1.0], &[2.0], &[4.0]]);
    region
}

/// Analytic temperature of [`square_region`]
pub fn temperature_at(xi1: f64, xi2: f64) -> f64 {
    xi1 + 2.0 * xi2 + xi1 * xi2
}

/// Single node 1 holding a 3-component `coordinates` field (1, 2, 3)
pub fn node_coordinates_region() -> Region {
    let mut mesh = Mesh::new();
    mesh.add_node(NodeId(1)).unwrap();
    let mut region = Region::with_mesh("node", mesh, EvaluationConfig::testing());
    region
        .create_stored_field("coordinates", ValueType::Real, 3)
        .unwrap();
    region
        .modify_stored_field("coordinates", |field| {
            field.set_node_values(NodeId(1), 0.0, &[1.0, 2.0, 3.0])
        })
        .unwrap();
    region
}

/// Chain of `count` unit line elements with `x` equal to the distance from
/// node 1
pub fn line_region(count: u32, config: EvaluationConfig) -> Region {
    let mut mesh = Mesh::new();
    for n in 1..=count + 1 {
        mesh.add_node(NodeId(n)).unwrap();
    }
    for e in 1..=count {
        mesh.add_element(ElementId(e), 1, vec![NodeId(e), NodeId(e + 1)])
            .unwrap();
    }
    let mut region = Region::with_mesh("line", mesh, config);
    region.create_stored_field("x", ValueType::Real, 1).unwrap();
    region
        .modify_stored_field("x", |field| {
            let basis = TensorBasis::uniform(BasisFunction::LinearLagrange, 1)?;
            for n in 1..=count + 1 {
                field.set_node_values(NodeId(n), 0.0, &[f64::from(n - 1)])?;
            }
            for e in 1..=count {
                field.define_in_element_with_basis(
                    ElementId(e),
                    &basis,
                    &[NodeId(e), NodeId(e + 1)],
                )?;
            }
            Ok(())
        })
        .unwrap();
    region
}
