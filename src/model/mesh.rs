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

//! Mesh topology and point location
//!
//! Elements are unit xi-cubes of dimension 1 to 3. Faces are numbered
//! `2 * d + side`: face `2 * d` lies at `xi[d] = 0` and face `2 * d + 1` at
//! `xi[d] = 1`. A face element's xi maps onto the parent's remaining xi
//! directions in increasing order.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use log::trace;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::types::{ElementId, MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeId, Xi};
use crate::config::SearchConfig;
use crate::error::{FieldError, FieldResult};

/// Mesh shared between a region and its field module
pub type SharedMesh = Arc<RwLock<Mesh>>;

/// Parent of a face element and the face it occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceParent {
    /// Parent element
    pub element: ElementId,
    /// Face number on the parent
    pub face: usize,
}

/// Ancestor of an element with the face chain leading down to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    /// Ancestor element
    pub element: ElementId,
    /// Face numbers from the ancestor down to the element
    pub faces: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
}

/// One element of the mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    id: ElementId,
    dimension: usize,
    nodes: Vec<NodeId>,
    faces: Vec<Option<ElementId>>,
    parents: Vec<FaceParent>,
}

impl Element {
    /// Element identifier
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Number of xi directions
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Local-to-global node map
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Face elements by face number
    pub fn faces(&self) -> &[Option<ElementId>] {
        &self.faces
    }

    /// Elements this element is a face of
    pub fn parents(&self) -> &[FaceParent] {
        &self.parents
    }
}

/// Topology queries used by field evaluation
pub trait MeshTopology: Send + Sync {
    /// Dimension of an element, if it exists
    fn element_dimension(&self, element: ElementId) -> Option<usize>;

    /// Local-to-global node map of an element
    fn element_nodes(&self, element: ElementId) -> Option<&[NodeId]>;

    /// Whether the node exists
    fn contains_node(&self, node: NodeId) -> bool;

    /// Ancestors in breadth-first order, nearest first
    fn ancestors(&self, element: ElementId) -> Vec<Ancestor>;

    /// All elements of one dimension, in creation order
    fn elements_of_dimension(&self, dimension: usize) -> Vec<ElementId>;

    /// Live references to a node: the mesh itself plus each referencing element
    fn node_access_count(&self, node: NodeId) -> Option<usize>;

    /// Live references to an element: the mesh itself plus each parent
    fn element_access_count(&self, element: ElementId) -> Option<usize>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NodeRecord {
    element_references: usize,
}

/// In-memory mesh of nodes and elements
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    nodes: IndexMap<NodeId, NodeRecord>,
    elements: IndexMap<ElementId, Element>,
}

impl Mesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into a shared handle
    pub fn into_shared(self) -> SharedMesh {
        Arc::new(RwLock::new(self))
    }

    /// Add a node
    pub fn add_node(&mut self, node: NodeId) -> FieldResult<()> {
        if self.nodes.contains_key(&node) {
            return Err(FieldError::invalid_argument(
                "Mesh::add_node",
                format!("node {node} already exists"),
            ));
        }
        self.nodes.insert(node, NodeRecord::default());
        Ok(())
    }

    /// Add an element over existing nodes
    pub fn add_element(
        &mut self,
        element: ElementId,
        dimension: usize,
        nodes: Vec<NodeId>,
    ) -> FieldResult<()> {
        if !(1..=MAXIMUM_ELEMENT_XI_DIMENSIONS).contains(&dimension) {
            return Err(FieldError::invalid_argument(
                "Mesh::add_element",
                format!("element dimension {dimension} is not supported"),
            ));
        }
        if self.elements.contains_key(&element) {
            return Err(FieldError::invalid_argument(
                "Mesh::add_element",
                format!("element {element} already exists"),
            ));
        }
        if let Some(missing) = nodes.iter().find(|n| !self.nodes.contains_key(*n)) {
            return Err(FieldError::NodeNotFound(*missing));
        }
        for node in &nodes {
            if let Some(record) = self.nodes.get_mut(node) {
                record.element_references += 1;
            }
        }
        self.elements.insert(
            element,
            Element {
                id: element,
                dimension,
                nodes,
                faces: vec![None; 2 * dimension],
                parents: Vec::new(),
            },
        );
        Ok(())
    }

    /// Make `face` the element on face `face_number` of `parent`
    pub fn set_face(
        &mut self,
        parent: ElementId,
        face_number: usize,
        face: ElementId,
    ) -> FieldResult<()> {
        let parent_dimension = self
            .elements
            .get(&parent)
            .ok_or(FieldError::ElementNotFound(parent))?
            .dimension;
        let face_dimension = self
            .elements
            .get(&face)
            .ok_or(FieldError::ElementNotFound(face))?
            .dimension;
        if face_dimension + 1 != parent_dimension || face_number >= 2 * parent_dimension {
            return Err(FieldError::invalid_argument(
                "Mesh::set_face",
                format!(
                    "element {face} (dimension {face_dimension}) cannot be face {face_number} of \
                     element {parent} (dimension {parent_dimension})"
                ),
            ));
        }
        let previous = self
            .elements
            .get_mut(&parent)
            .and_then(|p| p.faces[face_number].replace(face));
        if let Some(previous_face) = previous.and_then(|id| self.elements.get_mut(&id)) {
            previous_face
                .parents
                .retain(|p| !(p.element == parent && p.face == face_number));
        }
        if let Some(face_element) = self.elements.get_mut(&face) {
            face_element.parents.push(FaceParent {
                element: parent,
                face: face_number,
            });
        }
        Ok(())
    }

    /// Element by identifier
    pub fn element(&self, element: ElementId) -> Option<&Element> {
        self.elements.get(&element)
    }

    /// Node identifiers in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Element identifiers in creation order
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.keys().copied()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Whether the element exists
    pub fn contains_element(&self, element: ElementId) -> bool {
        self.elements.contains_key(&element)
    }
}

impl MeshTopology for Mesh {
    fn element_dimension(&self, element: ElementId) -> Option<usize> {
        self.elements.get(&element).map(|e| e.dimension)
    }

    fn element_nodes(&self, element: ElementId) -> Option<&[NodeId]> {
        self.elements.get(&element).map(|e| e.nodes.as_slice())
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn ancestors(&self, element: ElementId) -> Vec<Ancestor> {
        let mut result = Vec::new();
        let mut visited = FxHashSet::default();
        visited.insert(element);
        let mut queue: VecDeque<(ElementId, SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>)> =
            VecDeque::new();
        queue.push_back((element, SmallVec::new()));
        while let Some((current, faces_below)) = queue.pop_front() {
            let Some(record) = self.elements.get(&current) else {
                continue;
            };
            for parent in &record.parents {
                if !visited.insert(parent.element) {
                    continue;
                }
                let mut faces: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> =
                    SmallVec::with_capacity(faces_below.len() + 1);
                faces.push(parent.face);
                faces.extend_from_slice(&faces_below);
                result.push(Ancestor {
                    element: parent.element,
                    faces: faces.clone(),
                });
                queue.push_back((parent.element, faces));
            }
        }
        result
    }

    fn elements_of_dimension(&self, dimension: usize) -> Vec<ElementId> {
        self.elements
            .values()
            .filter(|e| e.dimension == dimension)
            .map(|e| e.id)
            .collect()
    }

    fn node_access_count(&self, node: NodeId) -> Option<usize> {
        self.nodes.get(&node).map(|r| 1 + r.element_references)
    }

    fn element_access_count(&self, element: ElementId) -> Option<usize> {
        self.elements.get(&element).map(|e| 1 + e.parents.len())
    }
}

/// Map xi on a face element to xi on its parent
pub fn face_xi_to_parent(face_number: usize, face_xi: &[f64]) -> Xi {
    let fixed = face_number / 2;
    let side = (face_number % 2) as f64;
    let mut xi = Xi::new();
    let mut remaining = face_xi.iter();
    for d in 0..=face_xi.len() {
        if d == fixed {
            xi.push(side);
        } else {
            xi.push(remaining.next().copied().unwrap_or(0.0));
        }
    }
    xi
}

/// How a point location search accepts a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Location where the mesh field equals the target within tolerance
    Exact,
    /// Location where the mesh field is closest to the target
    Nearest,
}

/// Result of a point location search
#[derive(Debug, Clone, PartialEq)]
pub struct PointLocation {
    /// Element containing the location
    pub element: ElementId,
    /// Chart coordinates within the element
    pub xi: Xi,
    /// Distance between the mesh field value there and the target
    pub distance: f64,
}

/// Values and xi Jacobian (row per component) of a mesh field at one xi
pub type SampledValues = (SmallVec<[f64; 4]>, Vec<f64>);

/// Search `elements` for the xi where the sampled field best matches `target`.
///
/// Each element is solved by projected Gauss-Newton from its centre with xi
/// kept inside the unit cube: directions pinned at a bound whose gradient
/// points outward are held fixed for that step. Elements on which
/// `evaluate` fails are skipped.
pub fn locate_point<F>(
    elements: &[ElementId],
    dimension: usize,
    mode: SearchMode,
    target: &[f64],
    config: &SearchConfig,
    mut evaluate: F,
) -> Option<PointLocation>
where
    F: FnMut(ElementId, &[f64]) -> FieldResult<SampledValues>,
{
    let magnitude = target.iter().map(|v| v * v).sum::<f64>().sqrt();
    let acceptance = config.tolerance * magnitude.max(1.0);
    let mut best: Option<PointLocation> = None;

    for &element in elements {
        let Some(candidate) =
            solve_in_element(element, dimension, target, config, acceptance, &mut evaluate)
        else {
            continue;
        };
        trace!(
            "Point search in element {} ended at distance {}",
            element, candidate.distance
        );
        match mode {
            SearchMode::Exact => {
                if candidate.distance <= acceptance {
                    return Some(candidate);
                }
            }
            SearchMode::Nearest => {
                if best
                    .as_ref()
                    .is_none_or(|current| candidate.distance < current.distance)
                {
                    best = Some(candidate);
                }
            }
        }
    }
    best
}

fn solve_in_element<F>(
    element: ElementId,
    dimension: usize,
    target: &[f64],
    config: &SearchConfig,
    acceptance: f64,
    evaluate: &mut F,
) -> Option<PointLocation>
where
    F: FnMut(ElementId, &[f64]) -> FieldResult<SampledValues>,
{
    let mut xi: Xi = SmallVec::from_elem(0.5, dimension);
    let mut best: Option<PointLocation> = None;

    for _ in 0..config.max_iterations.max(1) {
        let (values, jacobian) = match evaluate(element, &xi) {
            Ok(sample) => sample,
            Err(error) => {
                trace!("Skipping element {element} in point search: {error}");
                break;
            }
        };
        let components = values.len().min(target.len());
        let residual: SmallVec<[f64; 4]> =
            (0..components).map(|c| target[c] - values[c]).collect();
        let distance = residual.iter().map(|r| r * r).sum::<f64>().sqrt();
        if best.as_ref().is_none_or(|b| distance < b.distance) {
            best = Some(PointLocation {
                element,
                xi: xi.clone(),
                distance,
            });
        }
        if distance <= acceptance || jacobian.len() < components * dimension {
            break;
        }

        // gradient of half the squared distance is -J^T r
        let mut descent = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for (d, slot) in descent.iter_mut().enumerate().take(dimension) {
            *slot = (0..components)
                .map(|c| jacobian[c * dimension + d] * residual[c])
                .sum();
        }
        let free: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = (0..dimension)
            .filter(|&d| {
                !((xi[d] <= 0.0 && descent[d] < 0.0) || (xi[d] >= 1.0 && descent[d] > 0.0))
            })
            .collect();
        if free.is_empty() {
            break;
        }

        let n = free.len();
        let mut normal = [[0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS]; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        let mut rhs = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for (i, &di) in free.iter().enumerate() {
            rhs[i] = descent[di];
            for (j, &dj) in free.iter().enumerate() {
                normal[i][j] = (0..components)
                    .map(|c| jacobian[c * dimension + di] * jacobian[c * dimension + dj])
                    .sum();
            }
        }
        if !solve_linear(&mut normal, &mut rhs, n) {
            break;
        }

        let mut step_size: f64 = 0.0;
        for (i, &d) in free.iter().enumerate() {
            let updated = (xi[d] + rhs[i]).clamp(0.0, 1.0);
            step_size = step_size.max((updated - xi[d]).abs());
            xi[d] = updated;
        }
        if step_size < 1e-14 {
            break;
        }
    }
    best
}

/// Solve the leading `n`x`n` block in place by Gaussian elimination with
/// partial pivoting; false when singular
fn solve_linear(
    a: &mut [[f64; MAXIMUM_ELEMENT_XI_DIMENSIONS]; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    b: &mut [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS],
    n: usize,
) -> bool {
    let scale = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .map(|(i, j)| a[i][j].abs())
        .fold(0.0, f64::max);
    if scale == 0.0 {
        return false;
    }
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= scale * 1e-14 {
            return false;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * b[k];
        }
        b[row] = sum / a[row][row];
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn square_with_edges() -> Mesh {
        let mut mesh = Mesh::new();
        for n in 1..=4 {
            mesh.add_node(NodeId(n)).unwrap();
        }
        mesh.add_element(ElementId(1), 2, (1..=4).map(NodeId).collect())
            .unwrap();
        mesh.add_element(ElementId(2), 1, vec![NodeId(3), NodeId(4)])
            .unwrap();
        mesh.set_face(ElementId(1), 3, ElementId(2)).unwrap();
        mesh
    }

    #[test]
    fn test_access_counts() {
        let mesh = square_with_edges();
        assert_eq!(mesh.node_access_count(NodeId(1)), Some(2));
        assert_eq!(mesh.node_access_count(NodeId(3)), Some(3));
        assert_eq!(mesh.element_access_count(ElementId(2)), Some(2));
        assert_eq!(mesh.element_access_count(ElementId(1)), Some(1));
        assert_eq!(mesh.node_access_count(NodeId(99)), None);
    }

    #[test]
    fn test_ancestors_with_face_chain() {
        let mut mesh = square_with_edges();
        mesh.add_node(NodeId(5)).unwrap();
        mesh.add_element(ElementId(3), 3, (1..=4).map(NodeId).collect())
            .unwrap();
        mesh.set_face(ElementId(3), 5, ElementId(1)).unwrap();
        let ancestors = mesh.ancestors(ElementId(2));
        assert_eq!(ancestors.len(), 2);
        assert_eq!(ancestors[0].element, ElementId(1));
        assert_eq!(ancestors[0].faces.as_slice(), &[3]);
        assert_eq!(ancestors[1].element, ElementId(3));
        assert_eq!(ancestors[1].faces.as_slice(), &[5, 3]);
    }

    #[test]
    fn test_set_face_rejects_wrong_dimension() {
        let mut mesh = square_with_edges();
        assert!(mesh.set_face(ElementId(2), 0, ElementId(1)).is_err());
        assert!(mesh.set_face(ElementId(1), 4, ElementId(2)).is_err());
    }

    #[test]
    fn test_add_element_requires_nodes() {
        let mut mesh = Mesh::new();
        let result = mesh.add_element(ElementId(1), 1, vec![NodeId(7)]);
        assert_eq!(result, Err(FieldError::NodeNotFound(NodeId(7))));
    }

    #[test]
    fn test_face_xi_to_parent() {
        assert_eq!(face_xi_to_parent(3, &[0.25]).as_slice(), &[0.25, 1.0]);
        assert_eq!(face_xi_to_parent(0, &[0.25]).as_slice(), &[0.0, 0.25]);
        assert_eq!(face_xi_to_parent(4, &[0.1, 0.2]).as_slice(), &[0.1, 0.2, 0.0]);
    }

    fn scaled_square(_: ElementId, xi: &[f64]) -> FieldResult<SampledValues> {
        // x = 2 xi1, y = 3 xi2
        Ok((
            SmallVec::from_slice(&[2.0 * xi[0], 3.0 * xi[1]]),
            vec![2.0, 0.0, 0.0, 3.0],
        ))
    }

    #[test]
    fn test_locate_point_exact_inside() {
        let config = SearchConfig::default();
        let found = locate_point(
            &[ElementId(1)],
            2,
            SearchMode::Exact,
            &[0.5, 1.5],
            &config,
            scaled_square,
        )
        .unwrap();
        assert_eq!(found.element, ElementId(1));
        assert!((found.xi[0] - 0.25).abs() < 1e-9);
        assert!((found.xi[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_locate_point_exact_outside_fails() {
        let config = SearchConfig::default();
        let found = locate_point(
            &[ElementId(1)],
            2,
            SearchMode::Exact,
            &[5.0, 1.5],
            &config,
            scaled_square,
        );
        assert!(found.is_none());
    }

    #[test]
    fn test_locate_point_nearest_clamps_to_boundary() {
        let config = SearchConfig::default();
        let found = locate_point(
            &[ElementId(1)],
            2,
            SearchMode::Nearest,
            &[5.0, 1.5],
            &config,
            scaled_square,
        )
        .unwrap();
        assert!((found.xi[0] - 1.0).abs() < 1e-12);
        assert!((found.xi[1] - 0.5).abs() < 1e-9);
        assert!((found.distance - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_locate_point_skips_failing_elements() {
        let config = SearchConfig::default();
        let found = locate_point(
            &[ElementId(1), ElementId(2)],
            2,
            SearchMode::Exact,
            &[0.5, 1.5],
            &config,
            |element, xi| {
                if element == ElementId(1) {
                    Err(FieldError::undefined("f", "element 1"))
                } else {
                    scaled_square(element, xi)
                }
            },
        )
        .unwrap();
        assert_eq!(found.element, ElementId(2));
    }
}
