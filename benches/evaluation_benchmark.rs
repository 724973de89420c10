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

use std::hint::black_box;

use computed_field::model::{BasisFunction, Mesh, SearchMode, TensorBasis, ValueType};
use computed_field::{ElementId, EvaluationConfig, NodeId, Region};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

fn line_region(count: u32) -> Region {
    let mut mesh = Mesh::new();
    for n in 1..=count + 1 {
        mesh.add_node(NodeId(n)).unwrap();
    }
    for e in 1..=count {
        mesh.add_element(ElementId(e), 1, vec![NodeId(e), NodeId(e + 1)])
            .unwrap();
    }
    let mut region = Region::with_mesh("line", mesh, EvaluationConfig::default());
    region.create_stored_field("x", ValueType::Real, 1).unwrap();
    region
        .modify_stored_field("x", |field| {
            let basis = TensorBasis::uniform(BasisFunction::LinearLagrange, 1)?;
            for n in 1..=count + 1 {
                field.set_node_values(NodeId(n), 0.0, &[f64::from(n - 1)])?;
            }
            for e in 1..=count {
                field.define_in_element_with_basis(ElementId(e), &basis, &[NodeId(e), NodeId(e + 1)])?;
            }
            Ok(())
        })
        .unwrap();
    region
}

fn benchmark_memoized_evaluation(c: &mut Criterion) {
    let mut region = Region::new("bench", EvaluationConfig::default());
    let module = region.module_mut();
    let a = module.create_constant("a", &[1.0, 2.0, 3.0]).unwrap();
    let y = module.create_component("y", a, 1).unwrap();
    let both = module.create_concatenate("both", &[a, y]).unwrap();
    let module = &*module;
    let mut cache = module.create_field_cache();

    c.bench_function("memoized_concatenate", |b| {
        b.iter(|| black_box(module.evaluate_real(&mut cache, black_box(both)).unwrap()))
    });

    c.bench_function("fresh_location_concatenate", |b| {
        let mut time = 0.0;
        b.iter(|| {
            time += 1.0;
            cache.set_node_location(NodeId(1), time);
            black_box(module.evaluate_real(&mut cache, both).unwrap())
        })
    });
}

fn benchmark_element_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("element_sweep");
    for count in [100u32, 2000] {
        let region = line_region(count);
        let module = region.module();
        let x = module.find_field_by_name("x").unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut cache = module.create_field_cache();
            b.iter(|| {
                for e in 1..=count {
                    cache.set_mesh_location(ElementId(e), &[0.5], None, 0.0).unwrap();
                    black_box(module.evaluate_real(&mut cache, x).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn benchmark_find_mesh_location(c: &mut Criterion) {
    let mut region = line_region(200);
    let module = region.module_mut();
    let x = module.find_field_by_name("x").unwrap();
    let target = module.create_constant("target", &[150.25]).unwrap();
    let exact = module
        .create_find_mesh_location("exact", target, x, 1, SearchMode::Exact)
        .unwrap();
    let nearest = module
        .create_find_mesh_location("nearest", target, x, 1, SearchMode::Nearest)
        .unwrap();
    let module = &*module;

    let mut group = c.benchmark_group("find_mesh_location");
    group.sample_size(20);
    for (name, handle) in [("exact", exact), ("nearest", nearest)] {
        group.bench_function(name, |b| {
            let mut cache = module.create_field_cache();
            let mut time = 0.0;
            b.iter(|| {
                time += 1.0;
                cache.set_node_location(NodeId(1), time);
                black_box(module.evaluate_mesh_location(&mut cache, handle).unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_memoized_evaluation,
    benchmark_element_sweep,
    benchmark_find_mesh_location
);
criterion_main!(benches);
