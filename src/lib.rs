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

//! Computed field evaluation engine
//!
//! A graph of composable, typed fields evaluated over finite-element meshes
//! at nodes, at element chart (xi) locations and in time, with memoized
//! evaluation through field caches, a per-element interpolation cache,
//! assignment back into stored data, and wrapper fields kept in step with
//! the stored fields of a region.
//!
//! ```rust
//! use computed_field::{EvaluationConfig, Region};
//!
//! let mut region = Region::new("demo", EvaluationConfig::default());
//! let module = region.module_mut();
//! let a = module.create_constant("a", &[1.0, 2.0, 3.0]).unwrap();
//! let y = module.create_component("y", a, 1).unwrap();
//!
//! let mut cache = module.create_field_cache();
//! assert_eq!(module.evaluate_real(&mut cache, y).unwrap().as_slice(), &[2.0]);
//! ```

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod field;
pub mod model;
pub mod region;

// Re-export main types
pub use cache::{ELEMENT_FIELD_VALUES_CACHE_LIMIT, FieldCache, Location, ValueCache};
pub use config::{EvaluationConfig, SearchConfig};
pub use document::RegionDocument;
pub use error::{AssignResult, FieldError, FieldResult};
pub use field::{Field, FieldCore, FieldDefinition, FieldDescription, FieldHandle, FieldModule};
pub use model::{ElementId, NodeId, SearchMode};
pub use region::{Region, SyncReport};
