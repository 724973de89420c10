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

//! Evaluation and assignment through the field graph

use std::sync::Arc;

use computed_field::model::{
    BasisFunction, ComponentRepresentation, ElementId, GridValues, Mesh, NodeId, NodeValueLabel,
    Revision, StoredField, StoredFieldRef, TensorBasis, ValueType,
};
use computed_field::{AssignResult, EvaluationConfig, FieldError, FieldModule, Region};
use parking_lot::RwLock;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod utils;
use utils::*;

#[test]
fn test_component_and_identity_at_node_follow_assign() {
    let mut region = node_coordinates_region();
    let coordinates = field(&region, "coordinates");
    let module = region.module_mut();
    let y = module.create_component("y", coordinates, 1).unwrap();
    let copy = module.create_identity("copy", coordinates).unwrap();

    let mut cache = module.create_field_cache();
    cache.set_node_location(NodeId(1), 0.0);
    assert_eq!(module.evaluate_real(&mut cache, y).unwrap().as_slice(), &[2.0]);
    assert_eq!(
        module.evaluate_real(&mut cache, copy).unwrap().as_slice(),
        &[1.0, 2.0, 3.0]
    );

    assert_eq!(
        module.assign_real(&mut cache, y, &[5.0]).unwrap(),
        AssignResult::AllSet
    );
    assert_eq!(module.evaluate_real(&mut cache, y).unwrap().as_slice(), &[5.0]);
    assert_eq!(
        module.evaluate_real(&mut cache, copy).unwrap().as_slice(),
        &[1.0, 5.0, 3.0]
    );

    let stored = region.stored_field("coordinates").unwrap().read();
    assert_eq!(
        stored.node_values(NodeId(1), 0.0).unwrap().as_slice(),
        &[1.0, 5.0, 3.0]
    );
}

#[test]
fn test_repeated_evaluation_is_memoized() {
    let region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module();
    let mut cache = module.create_field_cache();

    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    let first = module.evaluate_real(&mut cache, temperature).unwrap();
    let second = module.evaluate_real(&mut cache, temperature).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.evaluation_count(temperature), 1);

    // returning to an earlier location evaluates again
    cache.set_mesh_location(ElementId(1), &[0.25, 0.5], None, 0.0).unwrap();
    module.evaluate_real(&mut cache, temperature).unwrap();
    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    module.evaluate_real(&mut cache, temperature).unwrap();
    assert_eq!(cache.evaluation_count(temperature), 3);

    let stats = cache.element_cache(temperature).unwrap().stats();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn test_assign_through_standalone_module_reaches_every_cache() {
    let mut mesh = Mesh::new();
    mesh.add_node(NodeId(1)).unwrap();
    let mut module = FieldModule::new(
        mesh.into_shared(),
        Revision::new(),
        EvaluationConfig::testing(),
    );
    let mut load = StoredField::new("load", ValueType::Real, 1).unwrap();
    load.set_node_values(NodeId(1), 0.0, &[1.0]).unwrap();
    let load: StoredFieldRef = Arc::new(RwLock::new(load));
    let wrapper = module.create_finite_element("load", &load).unwrap();
    let value = module
        .create_node_value("load_value", &load, NodeValueLabel::Value, 0)
        .unwrap();
    assert!(load.read().revision().same_counter(module.revision()));

    let mut reader = module.create_field_cache();
    let mut writer = module.create_field_cache();
    reader.set_node_location(NodeId(1), 0.0);
    writer.set_node_location(NodeId(1), 0.0);
    assert_eq!(module.evaluate_real(&mut reader, wrapper).unwrap().as_slice(), &[1.0]);
    assert_eq!(module.evaluate_real(&mut reader, value).unwrap().as_slice(), &[1.0]);

    module.assign_real(&mut writer, wrapper, &[5.0]).unwrap();
    assert_eq!(module.evaluate_real(&mut reader, wrapper).unwrap().as_slice(), &[5.0]);
    assert_eq!(module.evaluate_real(&mut reader, value).unwrap().as_slice(), &[5.0]);

    module.assign_real(&mut writer, value, &[6.0]).unwrap();
    assert_eq!(module.evaluate_real(&mut reader, wrapper).unwrap().as_slice(), &[6.0]);
}

#[test]
fn test_stored_change_invalidates_results() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let mut cache = region.module().create_field_cache();

    cache.set_mesh_location(ElementId(1), &[1.0, 0.0], None, 0.0).unwrap();
    let before = region.module().evaluate_real(&mut cache, temperature).unwrap();
    assert_close(&before, &[1.0]);

    region
        .modify_stored_field("temperature", |field| {
            field.set_node_values(NodeId(2), 0.0, &[10.0])
        })
        .unwrap();

    let after = region.module().evaluate_real(&mut cache, temperature).unwrap();
    assert_close(&after, &[10.0]);
    assert_eq!(cache.evaluation_count(temperature), 2);
}

#[rstest]
#[case(0, 1.0)]
#[case(1, 2.0)]
#[case(2, 3.0)]
fn test_component_selects_value(#[case] index: usize, #[case] expected: f64) {
    let mut region = Region::new("components", EvaluationConfig::testing());
    let module = region.module_mut();
    let source = module.create_constant("source", &[1.0, 2.0, 3.0]).unwrap();
    let component = module.create_component("c", source, index).unwrap();
    let mut cache = module.create_field_cache();
    assert_eq!(
        module.evaluate_real(&mut cache, component).unwrap().as_slice(),
        &[expected]
    );
}

#[rstest]
#[case(3)]
#[case(10)]
fn test_component_out_of_range_is_rejected(#[case] index: usize) {
    let mut region = Region::new("components", EvaluationConfig::testing());
    let module = region.module_mut();
    let source = module.create_constant("source", &[1.0, 2.0, 3.0]).unwrap();
    assert!(matches!(
        module.create_component("c", source, index),
        Err(FieldError::InvalidArgument { .. })
    ));
    assert!(module.find_field_by_name("c").is_none());
}

#[test]
fn test_concatenate_joins_components_and_derivatives() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    let a = module.create_constant("a", &[1.0, 2.0]).unwrap();
    let b = module.create_constant("b", &[3.0]).unwrap();
    let joined = module.create_concatenate("joined", &[a, b]).unwrap();
    assert_eq!(module.field(joined).unwrap().component_count(), 3);

    let xi = module.xi_field().unwrap();
    let mixed = module
        .create_concatenate("mixed", &[temperature, xi])
        .unwrap();

    let mut cache = module.create_field_cache();
    assert_eq!(
        module.evaluate_real(&mut cache, joined).unwrap().as_slice(),
        &[1.0, 2.0, 3.0]
    );

    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, mixed)
        .unwrap();
    assert_close(&values, &[temperature_at(0.5, 0.5), 0.5, 0.5, 0.0]);
    assert_close(&derivatives, &[1.5, 2.5, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn test_concatenate_undefined_where_any_source_is() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    let xi = module.xi_field().unwrap();
    let mixed = module
        .create_concatenate("mixed", &[temperature, xi])
        .unwrap();

    let mut cache = module.create_field_cache();
    cache.set_node_location(NodeId(1), 0.0);
    assert!(module.is_defined_at_location(&mut cache, temperature));
    assert!(!module.is_defined_at_location(&mut cache, mixed));
    assert!(
        module
            .evaluate_real(&mut cache, mixed)
            .unwrap_err()
            .is_undefined()
    );
}

#[test]
fn test_concatenate_assign_reports_partial_set() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let coordinates = field(&region, "coordinates");
    let module = region.module_mut();
    let writable = module
        .create_concatenate("writable", &[temperature, coordinates])
        .unwrap();
    let offset = module.create_constant("offset", &[0.0]).unwrap();
    let partial = module
        .create_concatenate("partial", &[temperature, offset])
        .unwrap();

    let mut cache = module.create_field_cache();
    cache.set_node_location(NodeId(2), 0.0);
    assert_eq!(
        module
            .assign_real(&mut cache, writable, &[7.0, 8.0, 9.0])
            .unwrap(),
        AssignResult::AllSet
    );
    assert_eq!(
        module.evaluate_real(&mut cache, writable).unwrap().as_slice(),
        &[7.0, 8.0, 9.0]
    );

    assert_eq!(
        module.assign_real(&mut cache, partial, &[11.0, 1.0]).unwrap(),
        AssignResult::PartialSet
    );
    assert_eq!(
        module.evaluate_real(&mut cache, partial).unwrap().as_slice(),
        &[11.0, 0.0]
    );
}

#[test]
fn test_xi_coordinates_padded_with_identity_derivatives() {
    let mut region = square_region();
    let module = region.module_mut();
    let xi = module.xi_field().unwrap();
    assert_eq!(module.xi_field().unwrap(), xi);

    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.25, 0.75], None, 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, xi)
        .unwrap();
    assert_eq!(values.as_slice(), &[0.25, 0.75, 0.0]);
    assert_eq!(derivatives, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    cache.set_node_location(NodeId(1), 0.0);
    assert!(!module.is_defined_at_location(&mut cache, xi));
    assert!(module.evaluate_real(&mut cache, xi).unwrap_err().is_undefined());
}

#[test]
fn test_xi_coordinates_truncated_to_component_count() {
    let mut region = square_region();
    let module = region.module_mut();
    let xi1 = module.create_xi_coordinates("xi1", 1).unwrap();

    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.25, 0.75], None, 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, xi1)
        .unwrap();
    assert_eq!(values.as_slice(), &[0.25]);
    assert_eq!(derivatives, vec![1.0, 0.0]);
}

#[rstest]
#[case(&[])]
#[case(&[0.1, 0.2, 0.3, 0.4])]
fn test_mesh_location_needs_one_to_three_xi(#[case] xi: &[f64]) {
    let region = square_region();
    let mut cache = region.module().create_field_cache();
    assert!(matches!(
        cache.set_mesh_location(ElementId(1), xi, None, 0.0),
        Err(FieldError::InvalidArgument { .. })
    ));
    assert_eq!(cache.location_counter(), 0);
}

#[test]
fn test_xi_count_must_match_element_dimension() {
    let mut region = square_region();
    let module = region.module_mut();
    let xi = module.xi_field().unwrap();
    let number = module.cmiss_number_field().unwrap();

    let mut cache = module.create_field_cache();
    cache
        .set_mesh_location(ElementId(1), &[0.1, 0.2, 0.3], None, 0.0)
        .unwrap();
    for handle in [xi, number] {
        assert!(matches!(
            module.evaluate_real_with_derivatives(&mut cache, handle),
            Err(FieldError::InvalidArgument { .. })
        ));
        assert!(!module.is_defined_at_location(&mut cache, handle));
    }

    cache.set_mesh_location(ElementId(2), &[0.5], None, 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, number)
        .unwrap();
    assert_eq!(values.as_slice(), &[2.0]);
    assert_eq!(derivatives, vec![0.0]);
}

#[test]
fn test_assign_in_cache_only_leaves_stored_data() {
    let region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module();

    let mut cache = module.create_field_cache();
    cache.set_assign_in_cache_only(true);
    cache.set_node_location(NodeId(2), 0.0);
    module.assign_real(&mut cache, temperature, &[42.0]).unwrap();
    assert_eq!(
        module.evaluate_real(&mut cache, temperature).unwrap().as_slice(),
        &[42.0]
    );

    let mut fresh = module.create_field_cache();
    fresh.set_node_location(NodeId(2), 0.0);
    assert_eq!(
        module.evaluate_real(&mut fresh, temperature).unwrap().as_slice(),
        &[1.0]
    );
    let stored = region.stored_field("temperature").unwrap().read();
    assert_eq!(stored.node_values(NodeId(2), 0.0).unwrap().as_slice(), &[1.0]);
}

#[test]
fn test_assign_in_cache_only_needs_a_defined_location() {
    let mut region = square_region();
    let pending = region
        .create_stored_field("pending", ValueType::Real, 1)
        .unwrap();
    let wrapper = field(&region, "pending");
    let module = region.module_mut();
    let value = module
        .create_node_value("pending_value", &pending, NodeValueLabel::Value, 0)
        .unwrap();

    let mut cache = module.create_field_cache();
    cache.set_assign_in_cache_only(true);
    cache.set_node_location(NodeId(2), 0.0);
    for handle in [wrapper, value] {
        assert!(
            module
                .assign_real(&mut cache, handle, &[3.0])
                .unwrap_err()
                .is_undefined()
        );
        assert!(
            module
                .evaluate_real(&mut cache, handle)
                .unwrap_err()
                .is_undefined()
        );
    }

    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    assert!(
        module
            .assign_real(&mut cache, wrapper, &[3.0])
            .unwrap_err()
            .is_undefined()
    );
}

#[test]
fn test_element_assign_writes_grid_points_only() {
    let mut region = square_region();
    region
        .create_stored_field("material", ValueType::Real, 2)
        .unwrap();
    region
        .modify_stored_field("material", |field| {
            for n in 1..=4 {
                field.set_node_values(NodeId(n), 0.0, &[0.0, 5.0])?;
            }
            let basis = TensorBasis::uniform(BasisFunction::LinearLagrange, 2)?;
            let nodes: Vec<NodeId> = (1..=4).map(NodeId).collect();
            field.define_in_element(
                ElementId(1),
                vec![
                    ComponentRepresentation::Grid(GridValues::new(
                        &[1, 1],
                        vec![0.0, 1.0, 2.0, 3.0],
                    )?),
                    ComponentRepresentation::node_interpolated(basis, nodes),
                ],
            )
        })
        .unwrap();
    let material = field(&region, "material");
    let module = region.module();
    let mut cache = module.create_field_cache();

    let divisions = module.native_discretization(material, ElementId(1)).unwrap();
    assert_eq!(divisions.map(|d| d.to_vec()), Some(vec![1, 1]));
    let temperature = field(&region, "temperature");
    assert!(
        module
            .native_discretization(temperature, ElementId(1))
            .unwrap()
            .is_none()
    );

    cache.set_mesh_location(ElementId(1), &[1.0, 0.0], None, 0.0).unwrap();
    assert_eq!(
        module.assign_real(&mut cache, material, &[9.0, 9.0]).unwrap(),
        AssignResult::PartialSet
    );
    assert_close(
        &module.evaluate_real(&mut cache, material).unwrap(),
        &[9.0, 5.0],
    );

    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    assert!(matches!(
        module.assign_real(&mut cache, material, &[1.0, 1.0]),
        Err(FieldError::NotAssignable { .. })
    ));
}

#[test]
fn test_integer_field_refuses_derivatives() {
    let mut region = square_region();
    region.create_stored_field("label", ValueType::Int, 1).unwrap();
    region
        .modify_stored_field("label", |field| {
            for n in 1..=4 {
                field.set_node_values(NodeId(n), 0.0, &[f64::from(n)])?;
            }
            let basis = TensorBasis::uniform(BasisFunction::LinearLagrange, 2)?;
            let nodes: Vec<NodeId> = (1..=4).map(NodeId).collect();
            field.define_in_element_with_basis(ElementId(1), &basis, &nodes)
        })
        .unwrap();
    let label = field(&region, "label");
    let module = region.module();
    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.0, 0.0], None, 0.0).unwrap();

    assert!(matches!(
        module.evaluate_real_with_derivatives(&mut cache, label),
        Err(FieldError::UnsupportedValueType { .. })
    ));
    assert_close(&module.evaluate_real(&mut cache, label).unwrap(), &[1.0]);
}

#[test]
fn test_basis_derivative_matches_analytic() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    let d1 = module
        .create_basis_derivative("dt_dxi1", temperature, &[0])
        .unwrap();
    let d12 = module
        .create_basis_derivative("d2t_dxi1dxi2", temperature, &[0, 1])
        .unwrap();

    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.3, 0.6], None, 0.0).unwrap();
    assert_close(&module.evaluate_real(&mut cache, d1).unwrap(), &[1.6]);
    assert_close(&module.evaluate_real(&mut cache, d12).unwrap(), &[1.0]);

    let (_, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, temperature)
        .unwrap();
    assert!((derivatives[0] - 1.6).abs() < EPS);

    cache.set_node_location(NodeId(1), 0.0);
    assert!(!module.is_defined_at_location(&mut cache, d1));
}

#[test]
fn test_basis_derivative_of_grid_fails() {
    let mut region = square_region();
    region.create_stored_field("grid", ValueType::Real, 1).unwrap();
    region
        .modify_stored_field("grid", |field| {
            field.define_in_element(
                ElementId(1),
                vec![ComponentRepresentation::Grid(GridValues::new(
                    &[1, 1],
                    vec![0.0, 1.0, 2.0, 3.0],
                )?)],
            )
        })
        .unwrap();
    let grid = field(&region, "grid");
    let module = region.module_mut();
    let derivative = module.create_basis_derivative("dgrid", grid, &[0]).unwrap();

    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.5, 0.5], None, 0.0).unwrap();
    assert_close(&module.evaluate_real(&mut cache, grid).unwrap(), &[1.5]);
    assert!(matches!(
        module.evaluate_real(&mut cache, derivative),
        Err(FieldError::UnsupportedBasis { .. })
    ));
}

#[test]
fn test_cubic_hermite_line() {
    let mut mesh = Mesh::new();
    mesh.add_node(NodeId(1)).unwrap();
    mesh.add_node(NodeId(2)).unwrap();
    mesh.add_element(ElementId(1), 1, vec![NodeId(1), NodeId(2)])
        .unwrap();
    let mut region = Region::with_mesh("hermite", mesh, EvaluationConfig::testing());
    let stored = region.create_stored_field("cube", ValueType::Real, 1).unwrap();
    // f(xi) = xi^3
    region
        .modify_stored_field("cube", |field| {
            let labels = [NodeValueLabel::Value, NodeValueLabel::DDs1];
            for (node, value, slope) in [(1, 0.0, 0.0), (2, 1.0, 3.0)] {
                field.define_at_node(NodeId(node), &labels, 1, None)?;
                field.set_node_parameter(NodeId(node), 0, NodeValueLabel::Value, 0, 0.0, value)?;
                field.set_node_parameter(NodeId(node), 0, NodeValueLabel::DDs1, 0, 0.0, slope)?;
            }
            let basis = TensorBasis::new(&[BasisFunction::CubicHermite])?;
            field.define_in_element_with_basis(ElementId(1), &basis, &[NodeId(1), NodeId(2)])
        })
        .unwrap();
    let cube = field(&region, "cube");
    let module = region.module_mut();
    let slope = module
        .create_node_value("slope", &stored, NodeValueLabel::DDs1, 0)
        .unwrap();

    let mut cache = module.create_field_cache();
    cache.set_mesh_location(ElementId(1), &[0.5], None, 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, cube)
        .unwrap();
    assert_close(&values, &[0.125]);
    assert_close(&derivatives, &[0.75]);

    cache.set_node_location(NodeId(2), 0.0);
    assert_eq!(module.evaluate_real(&mut cache, slope).unwrap().as_slice(), &[3.0]);
    module.assign_real(&mut cache, slope, &[0.0]).unwrap();
    assert_eq!(module.evaluate_real(&mut cache, slope).unwrap().as_slice(), &[0.0]);
}

#[test]
fn test_node_values_interpolate_in_time() {
    let mut region = node_coordinates_region();
    region
        .create_stored_field("pressure", ValueType::Real, 1)
        .unwrap();
    region
        .modify_stored_field("pressure", |field| {
            field.define_at_node(NodeId(1), &[NodeValueLabel::Value], 1, Some(vec![0.0, 2.0]))?;
            field.set_node_parameter(NodeId(1), 0, NodeValueLabel::Value, 0, 0.0, 10.0)?;
            field.set_node_parameter(NodeId(1), 0, NodeValueLabel::Value, 0, 2.0, 20.0)
        })
        .unwrap();
    let pressure = field(&region, "pressure");
    let module = region.module();
    let mut cache = module.create_field_cache();

    cache.set_node_location(NodeId(1), 1.0);
    assert_close(&module.evaluate_real(&mut cache, pressure).unwrap(), &[15.0]);
    cache.set_time(1.5);
    assert_close(&module.evaluate_real(&mut cache, pressure).unwrap(), &[17.5]);
    cache.set_time(9.0);
    assert_close(&module.evaluate_real(&mut cache, pressure).unwrap(), &[20.0]);
}

#[test]
fn test_embedded_evaluates_at_stored_location() {
    let mut region = square_region();
    region
        .create_stored_field("host", ValueType::MeshLocation, 1)
        .unwrap();
    region
        .modify_stored_field("host", |field| {
            field.set_node_mesh_location(NodeId(1), ElementId(1), &[0.5, 0.5])
        })
        .unwrap();
    let temperature = field(&region, "temperature");
    let host = field(&region, "host");
    let module = region.module_mut();
    let embedded = module
        .create_embedded("host_temperature", temperature, host)
        .unwrap();
    assert!(module.create_embedded("bad", host, host).is_err());

    let mut cache = module.create_field_cache();
    cache.set_node_location(NodeId(1), 0.0);
    assert_close(
        &module.evaluate_real(&mut cache, embedded).unwrap(),
        &[temperature_at(0.5, 0.5)],
    );
    assert_eq!(cache.location().node(), Some(NodeId(1)));

    cache.set_node_location(NodeId(2), 0.0);
    assert!(!module.is_defined_at_location(&mut cache, embedded));
    assert!(module.evaluate_real(&mut cache, embedded).is_err());
}

#[test]
fn test_deep_chain_hits_recursion_limit() {
    let mut region = Region::new("deep", EvaluationConfig::strict());
    let module = region.module_mut();
    let mut chain = vec![module.create_constant("link0", &[1.0]).unwrap()];
    for i in 1..=40 {
        let previous = chain[i - 1];
        chain.push(module.create_identity(format!("link{i}"), previous).unwrap());
    }

    let mut cache = module.create_field_cache();
    assert!(matches!(
        module.evaluate_real(&mut cache, chain[40]),
        Err(FieldError::RecursionLimit { limit: 32, .. })
    ));
    assert_eq!(
        module.evaluate_real(&mut cache, chain[20]).unwrap().as_slice(),
        &[1.0]
    );
}

#[test]
fn test_redefinition_cycle_is_rejected() {
    let mut region = Region::new("cycles", EvaluationConfig::testing());
    let module = region.module_mut();
    let base = module.create_constant("base", &[1.0]).unwrap();
    let a = module.create_identity("a", base).unwrap();
    let b = module.create_identity("b", a).unwrap();

    let back_to_b = module.identity_definition(b).unwrap();
    assert!(matches!(
        module.replace_definition(a, back_to_b),
        Err(FieldError::CycleDetected { .. })
    ));
    let to_self = module.identity_definition(a).unwrap();
    assert!(matches!(
        module.replace_definition(a, to_self),
        Err(FieldError::CycleDetected { .. })
    ));

    let mut cache = module.create_field_cache();
    assert_eq!(module.evaluate_real(&mut cache, b).unwrap().as_slice(), &[1.0]);
}

#[test]
fn test_redefinition_updates_dependents() {
    let mut region = Region::new("redefine", EvaluationConfig::testing());
    let module = region.module_mut();
    let one = module.create_constant("one", &[1.0]).unwrap();
    let two = module.create_constant("two", &[2.0]).unwrap();
    let a = module.create_identity("a", one).unwrap();
    let b = module.create_identity("b", a).unwrap();

    let mut cache = module.create_field_cache();
    assert_eq!(module.evaluate_real(&mut cache, b).unwrap().as_slice(), &[1.0]);

    let definition = module.identity_definition(two).unwrap();
    module.replace_definition(a, definition).unwrap();
    assert_eq!(module.evaluate_real(&mut cache, b).unwrap().as_slice(), &[2.0]);
}

#[test]
fn test_field_in_use_cannot_be_removed() {
    let mut region = Region::new("removal", EvaluationConfig::testing());
    let module = region.module_mut();
    let source = module.create_constant("source", &[1.0, 2.0]).unwrap();
    let first = module.create_component("first", source, 0).unwrap();

    assert_eq!(
        module.remove_field(source),
        Err(FieldError::FieldInUse {
            field: "source".to_string(),
            user: "first".to_string(),
        })
    );
    module.remove_field(first).unwrap();
    module.remove_field(source).unwrap();
    assert!(matches!(
        module.field(source),
        Err(FieldError::InvalidHandle(_))
    ));

    let reused = module.create_constant("again", &[3.0]).unwrap();
    assert_ne!(reused, source);
    assert_eq!(module.field_count(), 1);
}

#[test]
fn test_names_are_unique() {
    let mut region = Region::new("names", EvaluationConfig::testing());
    let module = region.module_mut();
    let a = module.create_constant("a", &[1.0]).unwrap();
    module.create_constant("b", &[2.0]).unwrap();
    assert_eq!(
        module.create_constant("a", &[3.0]),
        Err(FieldError::DuplicateName("a".to_string()))
    );
    assert!(module.rename_field(a, "b").is_err());
    module.rename_field(a, "c").unwrap();
    assert_eq!(module.find_field_by_name("c"), Some(a));
    assert!(module.find_field_by_name("a").is_none());
}

#[test]
fn test_introspection_fields() {
    let mut region = square_region();
    let module = region.module_mut();
    let number = module.cmiss_number_field().unwrap();
    let access = module.create_access_count("access").unwrap();
    let label = module.create_string_constant("label", "apex").unwrap();

    let mut cache = module.create_field_cache();
    cache.set_node_location(NodeId(3), 0.0);
    assert_eq!(module.evaluate_real(&mut cache, number).unwrap().as_slice(), &[3.0]);
    assert_eq!(module.evaluate_real(&mut cache, access).unwrap().as_slice(), &[3.0]);
    assert_eq!(module.evaluate_string(&mut cache, label, None).unwrap(), "apex");

    cache.set_mesh_location(ElementId(2), &[0.5], None, 0.0).unwrap();
    assert_eq!(module.evaluate_real(&mut cache, number).unwrap().as_slice(), &[2.0]);
    assert_eq!(module.evaluate_real(&mut cache, access).unwrap().as_slice(), &[2.0]);

    cache.clear_location();
    assert!(!module.is_defined_at_location(&mut cache, number));
}

#[test]
fn test_cache_from_another_module_is_rejected() {
    let region = square_region();
    let other = Region::new("other", EvaluationConfig::testing());
    let temperature = field(&region, "temperature");
    let mut foreign = other.module().create_field_cache();
    assert!(matches!(
        region.module().evaluate_real(&mut foreign, temperature),
        Err(FieldError::InvalidArgument { .. })
    ));
}

#[test]
fn test_listing_describes_fields() {
    let mut region = square_region();
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    module.create_component("t", temperature, 0).unwrap();

    let listing = module.list();
    let names: Vec<&str> = listing.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["coordinates", "temperature", "t"]);
    let component = &listing[2];
    assert_eq!(component.type_name, "component");
    assert_eq!(component.sources, vec!["temperature".to_string()]);
    assert_eq!(component.details, "component 1");
}

#[test]
fn test_find_equivalent_matches_configuration_and_sources() {
    let mut region = square_region();
    let coordinates = field(&region, "coordinates");
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    let y = module.create_component("y", coordinates, 1).unwrap();
    let both = module
        .create_concatenate("both", &[coordinates, temperature])
        .unwrap();

    let same = module.component_definition(coordinates, 1).unwrap();
    assert_eq!(module.find_equivalent(&same), Some(y));
    let other_index = module.component_definition(coordinates, 0).unwrap();
    assert_eq!(module.find_equivalent(&other_index), None);

    let joined = module
        .concatenate_definition(&[coordinates, temperature])
        .unwrap();
    assert_eq!(module.find_equivalent(&joined), Some(both));
    let reversed = module
        .concatenate_definition(&[temperature, coordinates])
        .unwrap();
    assert_eq!(module.find_equivalent(&reversed), None);
}
