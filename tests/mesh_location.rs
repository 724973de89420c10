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

//! Finding mesh locations by value and evaluating on faces

use computed_field::model::{ElementId, SearchMode};
use computed_field::{FieldError, FieldHandle, Region};
use pretty_assertions::assert_eq;
use rstest::rstest;

mod utils;
use utils::*;

fn find_field(region: &mut Region, target: &[f64], dimension: usize, mode: SearchMode) -> FieldHandle {
    let coordinates = field(region, "coordinates");
    let module = region.module_mut();
    let target = module.create_constant("target", target).unwrap();
    module
        .create_find_mesh_location("found", target, coordinates, dimension, mode)
        .unwrap()
}

#[test]
fn test_exact_search_inside_element() {
    let mut region = square_region();
    let found = find_field(&mut region, &[0.5, 1.5], 2, SearchMode::Exact);
    let module = region.module();
    let mut cache = module.create_field_cache();

    let (element, xi) = module.evaluate_mesh_location(&mut cache, found).unwrap();
    assert_eq!(element, ElementId(1));
    assert_close(&xi, &[0.25, 0.5]);
}

#[rstest]
#[case(&[0.0, 0.0], &[0.0, 0.0])]
#[case(&[2.0, 3.0], &[1.0, 1.0])]
#[case(&[1.0, 0.75], &[0.5, 0.25])]
fn test_exact_search_recovers_xi(#[case] target: &[f64], #[case] expected: &[f64]) {
    let mut region = square_region();
    let found = find_field(&mut region, target, 2, SearchMode::Exact);
    let module = region.module();
    let mut cache = module.create_field_cache();

    let (element, xi) = module.evaluate_mesh_location(&mut cache, found).unwrap();
    assert_eq!(element, ElementId(1));
    for (actual, wanted) in xi.iter().zip(expected) {
        assert!((actual - wanted).abs() < 1e-6, "{xi:?} vs {expected:?}");
    }
}

#[test]
fn test_exact_search_outside_mesh_fails() {
    let mut region = square_region();
    let found = find_field(&mut region, &[5.0, 1.5], 2, SearchMode::Exact);
    let module = region.module();
    let mut cache = module.create_field_cache();

    assert_eq!(
        module.evaluate_mesh_location(&mut cache, found).unwrap_err(),
        FieldError::LocationNotFound {
            field: "found".to_string()
        }
    );
}

#[test]
fn test_nearest_search_clamps_to_boundary() {
    let mut region = square_region();
    let found = find_field(&mut region, &[5.0, 1.5], 2, SearchMode::Nearest);
    let module = region.module();
    let mut cache = module.create_field_cache();

    let (element, xi) = module.evaluate_mesh_location(&mut cache, found).unwrap();
    assert_eq!(element, ElementId(1));
    assert!((xi[0] - 1.0).abs() < 1e-9);
    assert!((xi[1] - 0.5).abs() < 1e-6);
}

#[test]
fn test_embedded_at_found_location() {
    let mut region = square_region();
    let found = find_field(&mut region, &[0.5, 1.5], 2, SearchMode::Exact);
    let temperature = field(&region, "temperature");
    let module = region.module_mut();
    let sampled = module
        .create_embedded("sampled", temperature, found)
        .unwrap();

    let mut cache = module.create_field_cache();
    let value = module.evaluate_real(&mut cache, sampled).unwrap();
    assert!((value[0] - temperature_at(0.25, 0.5)).abs() < 1e-6);
}

#[test]
fn test_search_over_face_elements() {
    let mut region = square_region();
    let found = find_field(&mut region, &[1.0, 3.0], 1, SearchMode::Exact);
    let module = region.module();
    let mut cache = module.create_field_cache();

    let (element, xi) = module.evaluate_mesh_location(&mut cache, found).unwrap();
    assert_eq!(element, ElementId(2));
    assert!((xi[0] - 0.5).abs() < 1e-6);
}

#[test]
fn test_find_mesh_location_validates_sources() {
    let mut region = square_region();
    let coordinates = field(&region, "coordinates");
    let module = region.module_mut();
    let scalar = module.create_constant("scalar", &[1.0]).unwrap();
    assert!(matches!(
        module.create_find_mesh_location("bad", scalar, coordinates, 2, SearchMode::Exact),
        Err(FieldError::InvalidArgument { .. })
    ));
    let pair = module.create_constant("pair", &[1.0, 1.0]).unwrap();
    assert!(
        module
            .create_find_mesh_location("bad", pair, coordinates, 4, SearchMode::Exact)
            .is_err()
    );
}

#[test]
fn test_face_inherits_parent_values() {
    let region = square_region();
    let temperature = field(&region, "temperature");
    let coordinates = field(&region, "coordinates");
    let module = region.module();
    let mut cache = module.create_field_cache();

    cache.set_mesh_location(ElementId(2), &[0.5], None, 0.0).unwrap();
    assert!(module.is_defined_at_location(&mut cache, temperature));
    assert_close(
        &module.evaluate_real(&mut cache, temperature).unwrap(),
        &[temperature_at(0.5, 1.0)],
    );
    assert_close(
        &module.evaluate_real(&mut cache, coordinates).unwrap(),
        &[1.0, 3.0],
    );

    cache.set_mesh_location(ElementId(2), &[0.25], Some(ElementId(1)), 0.0).unwrap();
    let (values, derivatives) = module
        .evaluate_real_with_derivatives(&mut cache, temperature)
        .unwrap();
    assert_close(&values, &[temperature_at(0.25, 1.0)]);
    // along the top edge t = 2 + 2 xi1
    assert_close(&derivatives, &[2.0]);
}
