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

//! Per-element interpolation cache
//!
//! Sampling a finite-element field at many xi in the same element reuses one
//! [`ElementFieldValues`] per element. The cache never holds more than its
//! limit: when a new element arrives at the limit, every entry is dropped and
//! the cache starts over. This is a bulk reset, not least-recently-used
//! eviction.

use std::collections::hash_map::Entry;

use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::FieldResult;
use crate::model::{ElementFieldValues, ElementId, ElementValuesRequest, MAXIMUM_ELEMENT_XI_DIMENSIONS};

/// Default number of element entries kept before a bulk reset
pub const ELEMENT_FIELD_VALUES_CACHE_LIMIT: usize = 1000;

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementCacheStats {
    /// Requests served from an existing entry
    pub hits: u64,
    /// Entries built by the kernel
    pub builds: u64,
    /// Bulk resets at the limit
    pub resets: u64,
}

/// Element interpolation entries for one field, optionally post-differentiated
#[derive(Debug, Clone)]
pub struct ElementFieldValueCache {
    entries: FxHashMap<ElementId, ElementFieldValues>,
    limit: usize,
    differentiation: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
    stats: ElementCacheStats,
}

impl ElementFieldValueCache {
    /// Cache holding at most `limit` entries
    pub fn new(limit: usize) -> Self {
        Self::with_differentiation(limit, &[])
    }

    /// Cache whose entries are differentiated by each xi index in turn
    pub fn with_differentiation(limit: usize, xi_indices: &[usize]) -> Self {
        Self {
            entries: FxHashMap::default(),
            limit: limit.max(1),
            differentiation: xi_indices.iter().copied().collect(),
            stats: ElementCacheStats::default(),
        }
    }

    /// Xi indices entries are differentiated by
    pub fn differentiation(&self) -> &[usize] {
        &self.differentiation
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Hit, build and reset counters
    pub fn stats(&self) -> ElementCacheStats {
        self.stats
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Return the entry for `request.element` if its tags match the request,
    /// otherwise build, differentiate and store a new one
    pub fn fetch_or_build<F>(
        &mut self,
        request: &ElementValuesRequest,
        build: F,
    ) -> FieldResult<&ElementFieldValues>
    where
        F: FnOnce(&ElementValuesRequest) -> FieldResult<ElementFieldValues>,
    {
        let element = request.element;
        if self
            .entries
            .get(&element)
            .is_some_and(|entry| entry.matches(request))
        {
            self.stats.hits += 1;
            return Ok(&self.entries[&element]);
        }

        let mut values = build(request)?;
        if !self.differentiation.is_empty() {
            values = values.differentiate(&self.differentiation)?;
        }

        if !self.entries.contains_key(&element) && self.entries.len() >= self.limit {
            debug!(
                "Element field value cache reached {} entries, clearing",
                self.limit
            );
            self.entries.clear();
            self.stats.resets += 1;
        }
        self.stats.builds += 1;
        trace!("Built element field values for element {element}");

        Ok(match self.entries.entry(element) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(values);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::model::{ComponentValues, GridValues, MonomialPolynomial, ValueType};

    fn request(element: u32, time: f64) -> ElementValuesRequest {
        ElementValuesRequest {
            element: ElementId(element),
            time,
            top_level: None,
            derivatives: false,
        }
    }

    fn constant(request: &ElementValuesRequest) -> FieldResult<ElementFieldValues> {
        Ok(ElementFieldValues {
            element: request.element,
            time: request.time,
            top_level: request.top_level,
            derivatives: request.derivatives,
            dimension: 1,
            value_type: ValueType::Real,
            components: vec![ComponentValues::Monomial(
                MonomialPolynomial::from_coefficients(&[1], vec![1.0, 2.0])?,
            )],
        })
    }

    #[test]
    fn test_reuses_matching_entry() {
        let mut cache = ElementFieldValueCache::new(10);
        cache.fetch_or_build(&request(1, 0.0), constant).unwrap();
        cache
            .fetch_or_build(&request(1, 0.0), |_| panic!("should reuse"))
            .unwrap();
        assert_eq!(cache.stats().hits, 1);
        cache.fetch_or_build(&request(1, 1.0), constant).unwrap();
        assert_eq!(cache.stats().builds, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bulk_reset_at_limit() {
        let mut cache = ElementFieldValueCache::new(ELEMENT_FIELD_VALUES_CACHE_LIMIT);
        for element in 1..=1000 {
            cache.fetch_or_build(&request(element, 0.0), constant).unwrap();
        }
        assert_eq!(cache.len(), 1000);
        // rebuilding a known element does not reset
        cache.fetch_or_build(&request(500, 2.0), constant).unwrap();
        assert_eq!(cache.len(), 1000);
        cache.fetch_or_build(&request(1001, 0.0), constant).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().resets, 1);
    }

    #[test]
    fn test_differentiated_entries() {
        let mut cache = ElementFieldValueCache::with_differentiation(10, &[0]);
        let values = cache.fetch_or_build(&request(1, 0.0), constant).unwrap();
        let mut out = [0.0];
        values.evaluate_real(&[0.3], &mut out, None).unwrap();
        assert_eq!(out[0], 2.0);
    }

    #[test]
    fn test_differentiating_grid_fails() {
        let mut cache = ElementFieldValueCache::with_differentiation(10, &[0]);
        let result = cache.fetch_or_build(&request(1, 0.0), |request| {
            Ok(ElementFieldValues {
                components: vec![ComponentValues::Grid(GridValues::new(&[2], vec![0.0; 3])?)],
                ..constant(request)?
            })
        });
        assert!(matches!(result, Err(FieldError::UnsupportedBasis { .. })));
        assert!(cache.is_empty());
    }
}
