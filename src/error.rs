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

//! Error types for field evaluation and field graph maintenance

use thiserror::Error;

use crate::model::{ElementId, NodeId};

/// Result type for field operations
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors raised by field evaluation, assignment and graph maintenance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Null, mismatched or out-of-range inputs to an operation
    #[error("Invalid argument to {operation}: {message}")]
    InvalidArgument {
        /// Operation that rejected the input
        operation: String,
        /// What was wrong with it
        message: String,
    },

    /// The value type of the field cannot satisfy the request
    #[error("Field '{field}' does not support {request}")]
    UnsupportedValueType {
        /// Field name
        field: String,
        /// Unsupported request, e.g. "derivatives of integer values"
        request: String,
    },

    /// The field has no value at the current location
    #[error("Field '{field}' is not defined at {location}")]
    UndefinedAtLocation {
        /// Field name
        field: String,
        /// Human readable location
        location: String,
    },

    /// The field cannot be assigned at the current location
    #[error("Field '{field}' cannot be assigned at {location}")]
    NotAssignable {
        /// Field name
        field: String,
        /// Human readable location
        location: String,
    },

    /// Differentiation requested on a basis that is not a monomial
    #[error("Cannot differentiate {basis} basis: only monomial bases support differentiation")]
    UnsupportedBasis {
        /// Description of the offending basis
        basis: String,
    },

    /// No field with the given name
    #[error("Field '{0}' not found")]
    FieldNotFound(String),

    /// Handle refers to a destroyed field or another module
    #[error("Invalid field handle {0}")]
    InvalidHandle(String),

    /// Name already used by another field
    #[error("Field name '{0}' is already in use")]
    DuplicateName(String),

    /// Field is still a source of another field
    #[error("Field '{field}' is in use by '{user}'")]
    FieldInUse {
        /// Field that was to be removed or reshaped
        field: String,
        /// A field that depends on it
        user: String,
    },

    /// A source edge would close a cycle in the field graph
    #[error("Source cycle detected through field '{field}'")]
    CycleDetected {
        /// Field on the cycle
        field: String,
    },

    /// Evaluation recursed deeper than the configured limit
    #[error("Evaluation of '{field}' exceeded maximum depth {limit}")]
    RecursionLimit {
        /// Field being evaluated when the limit was hit
        field: String,
        /// Configured limit
        limit: usize,
    },

    /// Mesh location search found nothing acceptable
    #[error("No mesh location found for field '{field}'")]
    LocationNotFound {
        /// Searching field
        field: String,
    },

    /// Element missing from the mesh
    #[error("Element {0} not found")]
    ElementNotFound(ElementId),

    /// Node missing from the mesh
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    /// Stored field data store error
    #[error("Stored field '{field}': {message}")]
    StoredField {
        /// Stored field name
        field: String,
        /// Error message
        message: String,
    },

    /// Region document could not be read or built
    #[error("Document error: {0}")]
    Document(String),
}

impl FieldError {
    /// Create an invalid argument error
    pub fn invalid_argument(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a stored field error
    pub fn stored_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoredField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an undefined-at-location result
    pub fn undefined(field: impl Into<String>, location: impl ToString) -> Self {
        Self::UndefinedAtLocation {
            field: field.into(),
            location: location.to_string(),
        }
    }

    /// True for the expected negative result "not defined here"
    ///
    /// Conditional consumers (graphics sampling, conditional fields) treat this
    /// as "skip this point" rather than as a failure.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::UndefinedAtLocation { .. })
    }
}

/// Outcome of a successful assign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignResult {
    /// Every component was written
    AllSet,
    /// Some components were written, others could not be
    PartialSet,
}

impl AssignResult {
    /// Merge the outcomes of assigning to several targets
    pub fn combine(self, other: AssignResult) -> AssignResult {
        match (self, other) {
            (AssignResult::AllSet, AssignResult::AllSet) => AssignResult::AllSet,
            _ => AssignResult::PartialSet,
        }
    }
}
