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

//! Domain locations a field cache can be positioned at

use std::fmt;

use crate::model::{ElementId, NodeId, Xi};

/// Point in an element's chart
#[derive(Debug, Clone, PartialEq)]
pub struct ElementLocation {
    /// Element
    pub element: ElementId,
    /// Chart coordinates, one per element dimension
    pub xi: Xi,
    /// Ancestor element to prefer when inheriting field definitions
    pub top_level: Option<ElementId>,
    /// Time
    pub time: f64,
}

/// Current location of a field cache
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Location {
    /// No location; only location-independent fields evaluate
    #[default]
    None,
    /// At a node
    Node {
        /// Node
        node: NodeId,
        /// Time
        time: f64,
    },
    /// In an element
    Element(ElementLocation),
}

impl Location {
    /// Time of the location, zero when there is none
    pub fn time(&self) -> f64 {
        match self {
            Location::None => 0.0,
            Location::Node { time, .. } => *time,
            Location::Element(location) => location.time,
        }
    }

    /// Node, for node locations
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Location::Node { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Element location, for element locations
    pub fn element(&self) -> Option<&ElementLocation> {
        match self {
            Location::Element(location) => Some(location),
            _ => None,
        }
    }

    pub(crate) fn set_time(&mut self, new_time: f64) {
        match self {
            Location::None => {}
            Location::Node { time, .. } => *time = new_time,
            Location::Element(location) => location.time = new_time,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::None => f.write_str("no location"),
            Location::Node { node, time } => write!(f, "node {node} time {time}"),
            Location::Element(location) => {
                write!(f, "element {} xi (", location.element)?;
                for (i, x) in location.xi.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, ") time {}", location.time)
            }
        }
    }
}
