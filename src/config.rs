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

//! Evaluation configuration options

use serde::{Deserialize, Serialize};

use crate::cache::ELEMENT_FIELD_VALUES_CACHE_LIMIT;

/// Configuration for field evaluation.
///
/// # Examples
///
/// ```rust
/// use computed_field::EvaluationConfig;
///
/// let config = EvaluationConfig {
///     max_recursion_depth: 200,
///     ..EvaluationConfig::default()
/// };
/// assert_eq!(config.element_cache_limit, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Maximum depth of nested source evaluation before failing fast
    pub max_recursion_depth: usize,
    /// Number of per-element interpolation entries kept per field before the
    /// element cache is cleared in bulk
    pub element_cache_limit: usize,
    /// Mesh location search settings
    pub search: SearchConfig,
}

impl EvaluationConfig {
    /// Configuration with small limits, for exercising guard paths in tests
    pub fn strict() -> Self {
        Self {
            max_recursion_depth: 32,
            element_cache_limit: 16,
            search: SearchConfig::default(),
        }
    }

    /// Configuration for testing
    pub fn testing() -> Self {
        Self {
            max_recursion_depth: 100,
            element_cache_limit: ELEMENT_FIELD_VALUES_CACHE_LIMIT,
            search: SearchConfig {
                tolerance: 1e-9,
                max_iterations: 100,
            },
        }
    }

    /// Parse a configuration from JSON, filling missing keys with defaults
    pub fn from_json(text: &str) -> crate::FieldResult<Self> {
        serde_json::from_str(text).map_err(|e| crate::FieldError::Document(e.to_string()))
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            element_cache_limit: ELEMENT_FIELD_VALUES_CACHE_LIMIT,
            search: SearchConfig::default(),
        }
    }
}

/// Settings for finding mesh locations by field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Distance below which an exact search accepts a location, relative to
    /// the magnitude of the target value (at least 1)
    pub tolerance: f64,
    /// Iterations of the per-element xi solve
    pub max_iterations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 50,
        }
    }
}
