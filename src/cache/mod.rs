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

//! Evaluation caches
//!
//! A [`FieldCache`] holds the current location and one [`ValueCache`] per
//! evaluated field. Finite-element fields additionally keep an
//! [`ElementFieldValueCache`] of per-element interpolation state.

pub mod element_values;
pub mod field_cache;
pub mod location;
pub mod value_cache;

pub use element_values::{
    ELEMENT_FIELD_VALUES_CACHE_LIMIT, ElementCacheStats, ElementFieldValueCache,
};
pub use field_cache::FieldCache;
pub use location::{ElementLocation, Location};
pub use value_cache::{MeshLocationValueCache, RealValueCache, StringValueCache, ValueCache};
