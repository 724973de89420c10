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

//! Shared data revision counter
//!
//! Every mutation of data that evaluation depends on (stored field DOFs, mesh
//! topology, field definitions) bumps the region's revision. Field caches
//! remember the revision they were filled at and discard their contents when it
//! moves on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic modification counter shared by everything in one region
#[derive(Debug, Clone, Default)]
pub struct Revision(Arc<AtomicU64>);

impl Revision {
    /// Create a new counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Record a modification and return the new value
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether two handles share the same counter
    pub fn same_counter(&self, other: &Revision) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_shared_between_clones() {
        let revision = Revision::new();
        let clone = revision.clone();
        assert_eq!(revision.get(), 0);
        assert_eq!(clone.bump(), 1);
        assert_eq!(revision.get(), 1);
        assert!(revision.same_counter(&clone));
        assert!(!revision.same_counter(&Revision::new()));
    }
}
