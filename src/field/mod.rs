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

//! Field graph
//!
//! Fields live in an arena inside a [`FieldModule`] and refer to their
//! sources by [`FieldHandle`]. Each field owns one [`FieldCore`] that defines
//! what the field computes.

pub mod context;
pub mod core;
pub mod cores;
pub mod module;

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

pub use self::context::EvaluationContext;
pub use self::core::FieldCore;
pub use self::module::FieldModule;
use crate::model::{CoordinateSystem, FieldValueType};

/// Stable reference to a field in one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldHandle {
    module: u32,
    index: u32,
    generation: u32,
}

impl FieldHandle {
    pub(crate) fn new(module: u32, index: u32, generation: u32) -> Self {
        Self {
            module,
            index,
            generation,
        }
    }

    /// Identifier of the owning module
    pub fn module_id(&self) -> u32 {
        self.module
    }

    pub(crate) fn index(&self) -> usize {
        self.index as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.module, self.index, self.generation)
    }
}

/// Everything that defines a field apart from its name
#[derive(Debug)]
pub struct FieldDefinition {
    /// Number of components, fixed for the field's lifetime while in use
    pub component_count: usize,
    /// Coordinate system; `None` takes the first source's
    pub coordinate_system: Option<CoordinateSystem>,
    /// Source fields in order
    pub sources: SmallVec<[FieldHandle; 4]>,
    /// Source constants in order
    pub source_values: SmallVec<[f64; 4]>,
    /// Behaviour
    pub core: Box<dyn FieldCore>,
}

impl FieldDefinition {
    /// Definition without sources
    pub fn new(component_count: usize, core: Box<dyn FieldCore>) -> Self {
        Self {
            component_count,
            coordinate_system: None,
            sources: SmallVec::new(),
            source_values: SmallVec::new(),
            core,
        }
    }

    /// Set the source fields
    pub fn with_sources(mut self, sources: &[FieldHandle]) -> Self {
        self.sources = sources.iter().copied().collect();
        self
    }

    /// Set the source constants
    pub fn with_source_values(mut self, values: &[f64]) -> Self {
        self.source_values = values.iter().copied().collect();
        self
    }

    /// Set the coordinate system
    pub fn with_coordinate_system(mut self, coordinate_system: CoordinateSystem) -> Self {
        self.coordinate_system = Some(coordinate_system);
        self
    }
}

/// Named node of the field graph
#[derive(Debug)]
pub struct Field {
    pub(crate) handle: FieldHandle,
    pub(crate) name: String,
    pub(crate) component_count: usize,
    pub(crate) coordinate_system: CoordinateSystem,
    pub(crate) sources: SmallVec<[FieldHandle; 4]>,
    pub(crate) source_values: SmallVec<[f64; 4]>,
    pub(crate) core: Box<dyn FieldCore>,
    pub(crate) definition: u64,
}

impl Field {
    /// Handle of this field
    pub fn handle(&self) -> FieldHandle {
        self.handle
    }

    /// Name, unique within the module
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of components
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// Coordinate system of the values
    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coordinate_system
    }

    /// Source fields in order
    pub fn sources(&self) -> &[FieldHandle] {
        &self.sources
    }

    /// Source constants in order
    pub fn source_values(&self) -> &[f64] {
        &self.source_values
    }

    /// Behaviour
    pub fn core(&self) -> &dyn FieldCore {
        self.core.as_ref()
    }

    /// Type of value produced
    pub fn value_type(&self) -> FieldValueType {
        self.core.value_type()
    }

    /// Generation of the definition; moves on every redefinition
    pub fn definition(&self) -> u64 {
        self.definition
    }

    /// Whether the field wraps a stored field
    pub fn is_wrapper(&self) -> bool {
        self.core.stored_field().is_some()
    }
}

/// Read-only summary of a field for listings and export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescription {
    /// Field name
    pub name: String,
    /// Core variant
    pub type_name: String,
    /// Value type
    pub value_type: FieldValueType,
    /// Number of components
    pub component_count: usize,
    /// Coordinate system
    pub coordinate_system: CoordinateSystem,
    /// Names of source fields
    pub sources: Vec<String>,
    /// Source constants
    pub source_values: Vec<f64>,
    /// Variant configuration
    pub details: String,
}

impl fmt::Display for FieldDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} x{}",
            self.name, self.type_name, self.value_type, self.component_count
        )?;
        if !self.sources.is_empty() {
            write!(f, " of ({})", self.sources.join(", "))?;
        }
        if !self.details.is_empty() {
            write!(f, " [{}]", self.details)?;
        }
        Ok(())
    }
}
