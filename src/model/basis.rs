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

//! Tensor-product bases, monomial polynomials and element grids
//!
//! Node-interpolated element field components are converted to monomial
//! coefficients once per element. Evaluating at xi, differentiating with
//! respect to xi and restricting to a face then all work on the same
//! representation.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::types::{MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeValueLabel};
use crate::error::{FieldError, FieldResult};

/// One-dimensional basis function family used along one xi direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasisFunction {
    /// Single value over the direction
    Constant,
    /// Two nodes, linear
    LinearLagrange,
    /// Three nodes, quadratic
    QuadraticLagrange,
    /// Two nodes with value and first derivative
    CubicHermite,
}

impl BasisFunction {
    /// Nodes along this direction
    pub fn number_of_nodes(self) -> usize {
        match self {
            BasisFunction::Constant => 1,
            BasisFunction::LinearLagrange | BasisFunction::CubicHermite => 2,
            BasisFunction::QuadraticLagrange => 3,
        }
    }

    /// Polynomial degree along this direction
    pub fn degree(self) -> usize {
        match self {
            BasisFunction::Constant => 0,
            BasisFunction::LinearLagrange => 1,
            BasisFunction::QuadraticLagrange => 2,
            BasisFunction::CubicHermite => 3,
        }
    }

    /// Whether nodes carry a first derivative along this direction
    pub fn is_hermite(self) -> bool {
        matches!(self, BasisFunction::CubicHermite)
    }

    /// Monomial coefficients (ascending powers) of the function for a local
    /// node, either its value or derivative parameter
    fn coefficients(self, node: usize, derivative: bool) -> &'static [f64] {
        match (self, node, derivative) {
            (BasisFunction::Constant, 0, false) => &[1.0],
            (BasisFunction::LinearLagrange, 0, false) => &[1.0, -1.0],
            (BasisFunction::LinearLagrange, 1, false) => &[0.0, 1.0],
            (BasisFunction::QuadraticLagrange, 0, false) => &[1.0, -3.0, 2.0],
            (BasisFunction::QuadraticLagrange, 1, false) => &[0.0, 4.0, -4.0],
            (BasisFunction::QuadraticLagrange, 2, false) => &[0.0, -1.0, 2.0],
            (BasisFunction::CubicHermite, 0, false) => &[1.0, 0.0, -3.0, 2.0],
            (BasisFunction::CubicHermite, 0, true) => &[0.0, 1.0, -2.0, 1.0],
            (BasisFunction::CubicHermite, 1, false) => &[0.0, 0.0, 3.0, -2.0],
            (BasisFunction::CubicHermite, 1, true) => &[0.0, 0.0, -1.0, 1.0],
            _ => &[],
        }
    }
}

/// Tensor product of one basis function per xi direction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TensorBasis {
    functions: SmallVec<[BasisFunction; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
}

impl TensorBasis {
    /// Create a basis from per-direction functions
    pub fn new(functions: &[BasisFunction]) -> FieldResult<Self> {
        if functions.is_empty() || functions.len() > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(FieldError::invalid_argument(
                "TensorBasis::new",
                format!("basis needs 1 to 3 directions, got {}", functions.len()),
            ));
        }
        Ok(Self {
            functions: functions.iter().copied().collect(),
        })
    }

    /// Same function along every direction
    pub fn uniform(function: BasisFunction, dimension: usize) -> FieldResult<Self> {
        let functions: SmallVec<[BasisFunction; MAXIMUM_ELEMENT_XI_DIMENSIONS]> =
            std::iter::repeat_n(function, dimension).collect();
        Self::new(&functions)
    }

    /// Number of xi directions
    pub fn dimension(&self) -> usize {
        self.functions.len()
    }

    /// Per-direction functions
    pub fn functions(&self) -> &[BasisFunction] {
        &self.functions
    }

    /// Local nodes, ordered with xi1 varying fastest
    pub fn number_of_nodes(&self) -> usize {
        self.functions.iter().map(|f| f.number_of_nodes()).product()
    }

    /// Nodal parameter labels each local node contributes, in mask order
    pub fn node_labels(&self) -> SmallVec<[NodeValueLabel; 8]> {
        let hermite_mask: usize = self
            .functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_hermite())
            .map(|(d, _)| 1 << d)
            .sum();
        NodeValueLabel::ALL
            .iter()
            .copied()
            .filter(|label| label.derivative_mask() & !hermite_mask == 0)
            .collect()
    }

    /// Convert nodal parameters into monomial coefficients.
    ///
    /// `parameter(local_node, label)` supplies each nodal parameter.
    pub fn to_monomial<F>(&self, mut parameter: F) -> FieldResult<MonomialPolynomial>
    where
        F: FnMut(usize, NodeValueLabel) -> FieldResult<f64>,
    {
        let dimension = self.dimension();
        let degrees: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> =
            self.functions.iter().map(|f| f.degree()).collect();
        let mut polynomial = MonomialPolynomial::zero(&degrees);
        let labels = self.node_labels();
        let mut node_index = [0usize; MAXIMUM_ELEMENT_XI_DIMENSIONS];

        for local_node in 0..self.number_of_nodes() {
            let mut remainder = local_node;
            for (d, function) in self.functions.iter().enumerate() {
                node_index[d] = remainder % function.number_of_nodes();
                remainder /= function.number_of_nodes();
            }
            for &label in &labels {
                let value = parameter(local_node, label)?;
                if value == 0.0 {
                    continue;
                }
                let mask = label.derivative_mask();
                let factors: SmallVec<[&[f64]; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = (0..dimension)
                    .map(|d| self.functions[d].coefficients(node_index[d], mask & (1 << d) != 0))
                    .collect();
                polynomial.accumulate_outer_product(value, &factors);
            }
        }
        Ok(polynomial)
    }
}

/// Visit every multi-index `m` with `0 <= m[d] <= limits[d]`, first index fastest
pub(crate) fn for_each_multi_index<F>(limits: &[usize], mut visit: F)
where
    F: FnMut(&[usize]),
{
    let mut index: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> =
        SmallVec::from_elem(0, limits.len());
    loop {
        visit(&index);
        let mut d = 0;
        loop {
            if d == limits.len() {
                return;
            }
            index[d] += 1;
            if index[d] <= limits[d] {
                break;
            }
            index[d] = 0;
            d += 1;
        }
    }
}

/// Polynomial in xi stored as a dense tensor of monomial coefficients.
///
/// Coefficient `m` multiplies `xi1^m[0] * xi2^m[1] * xi3^m[2]`; the layout
/// has the first power varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct MonomialPolynomial {
    degrees: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
    coefficients: Vec<f64>,
}

impl MonomialPolynomial {
    /// All-zero polynomial of the given per-direction degrees
    pub fn zero(degrees: &[usize]) -> Self {
        let size = degrees.iter().map(|d| d + 1).product();
        Self {
            degrees: degrees.iter().copied().collect(),
            coefficients: vec![0.0; size],
        }
    }

    /// Polynomial that is `value` everywhere
    pub fn constant(dimension: usize, value: f64) -> Self {
        let mut polynomial = Self::zero(&vec![0; dimension]);
        polynomial.coefficients[0] = value;
        polynomial
    }

    /// Build from explicit coefficients
    pub fn from_coefficients(degrees: &[usize], coefficients: Vec<f64>) -> FieldResult<Self> {
        let size: usize = degrees.iter().map(|d| d + 1).product();
        if coefficients.len() != size {
            return Err(FieldError::invalid_argument(
                "MonomialPolynomial::from_coefficients",
                format!("expected {size} coefficients, got {}", coefficients.len()),
            ));
        }
        Ok(Self {
            degrees: degrees.iter().copied().collect(),
            coefficients,
        })
    }

    /// Number of xi directions
    pub fn dimension(&self) -> usize {
        self.degrees.len()
    }

    /// Per-direction degrees
    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    /// Coefficients, first power fastest
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    fn index(&self, powers: &[usize]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (d, &power) in powers.iter().enumerate() {
            index += power * stride;
            stride *= self.degrees[d] + 1;
        }
        index
    }

    fn accumulate_outer_product(&mut self, scale: f64, factors: &[&[f64]]) {
        let degrees = self.degrees.clone();
        let mut updates: SmallVec<[(usize, f64); 64]> = SmallVec::new();
        for_each_multi_index(&degrees, |m| {
            let mut product = scale;
            for (d, factor) in factors.iter().enumerate() {
                product *= factor.get(m[d]).copied().unwrap_or(0.0);
            }
            if product != 0.0 {
                updates.push((self.index(m), product));
            }
        });
        for (index, value) in updates {
            self.coefficients[index] += value;
        }
    }

    /// Value at xi
    pub fn evaluate(&self, xi: &[f64]) -> f64 {
        self.evaluate_with_derivatives(xi, None)
    }

    /// Value at xi, writing first derivatives with respect to each xi
    /// direction into `derivatives` when given
    pub fn evaluate_with_derivatives(&self, xi: &[f64], derivatives: Option<&mut [f64]>) -> f64 {
        let dimension = self.dimension();
        debug_assert!(xi.len() >= dimension);
        let mut powers: [SmallVec<[f64; 4]>; MAXIMUM_ELEMENT_XI_DIMENSIONS] = Default::default();
        let mut derivative_powers: [SmallVec<[f64; 4]>; MAXIMUM_ELEMENT_XI_DIMENSIONS] =
            Default::default();
        for d in 0..dimension {
            let x = xi[d];
            for p in 0..=self.degrees[d] {
                powers[d].push(x.powi(p as i32));
                derivative_powers[d].push(if p == 0 {
                    0.0
                } else {
                    p as f64 * x.powi(p as i32 - 1)
                });
            }
        }

        let want_derivatives = derivatives.is_some();
        let mut value = 0.0;
        let mut gradient = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        let mut m = [0usize; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for &coefficient in &self.coefficients {
            if coefficient != 0.0 {
                let mut term = coefficient;
                for d in 0..dimension {
                    term *= powers[d][m[d]];
                }
                value += term;
                if want_derivatives {
                    for (k, slot) in gradient.iter_mut().enumerate().take(dimension) {
                        let mut t = coefficient * derivative_powers[k][m[k]];
                        for d in 0..dimension {
                            if d != k {
                                t *= powers[d][m[d]];
                            }
                        }
                        *slot += t;
                    }
                }
            }
            for d in 0..dimension {
                m[d] += 1;
                if m[d] <= self.degrees[d] {
                    break;
                }
                m[d] = 0;
            }
        }

        if let Some(out) = derivatives {
            for (k, slot) in out.iter_mut().enumerate() {
                *slot = if k < dimension { gradient[k] } else { 0.0 };
            }
        }
        value
    }

    /// Partial derivative with respect to one xi direction
    pub fn differentiate(&self, direction: usize) -> Self {
        if direction >= self.dimension() || self.degrees[direction] == 0 {
            return Self::zero(&self.degrees);
        }
        let mut degrees = self.degrees.clone();
        degrees[direction] -= 1;
        let mut result = Self::zero(&degrees);
        let mut source_powers: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = SmallVec::new();
        let mut values: Vec<f64> = Vec::with_capacity(result.coefficients.len());
        for_each_multi_index(&degrees, |m| {
            source_powers.clear();
            source_powers.extend_from_slice(m);
            source_powers[direction] += 1;
            let factor = source_powers[direction] as f64;
            values.push(factor * self.coefficients[self.index(&source_powers)]);
        });
        result.coefficients = values;
        result
    }

    /// Polynomial over the face where xi `direction` is fixed at `value`; the
    /// remaining directions keep their order
    pub fn restrict(&self, direction: usize, value: f64) -> Self {
        let degrees: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = self
            .degrees
            .iter()
            .enumerate()
            .filter(|(d, _)| *d != direction)
            .map(|(_, &degree)| degree)
            .collect();
        let fixed_degree = self.degrees.get(direction).copied().unwrap_or(0);
        let mut values: Vec<f64> = Vec::new();
        let mut source_powers: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = SmallVec::new();
        for_each_multi_index(&degrees, |m| {
            let mut sum = 0.0;
            for k in 0..=fixed_degree {
                source_powers.clear();
                source_powers.extend_from_slice(&m[..direction.min(m.len())]);
                source_powers.push(k);
                if direction < m.len() {
                    source_powers.extend_from_slice(&m[direction..]);
                }
                sum += value.powi(k as i32) * self.coefficients[self.index(&source_powers)];
            }
            values.push(sum);
        });
        Self {
            degrees,
            coefficients: values,
        }
    }
}

/// Values on a regular grid of points over an element, interpolated
/// multilinearly within each grid cell
#[derive(Debug, Clone, PartialEq)]
pub struct GridValues {
    number_in_xi: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]>,
    values: Vec<f64>,
}

/// Tolerance for deciding that xi lies on a grid point
const GRID_POINT_TOLERANCE: f64 = 1e-9;

impl GridValues {
    /// Create from the number of cells per direction and `(n+1)` point values
    /// per direction, first direction fastest
    pub fn new(number_in_xi: &[usize], values: Vec<f64>) -> FieldResult<Self> {
        if number_in_xi.is_empty()
            || number_in_xi.len() > MAXIMUM_ELEMENT_XI_DIMENSIONS
            || number_in_xi.contains(&0)
        {
            return Err(FieldError::invalid_argument(
                "GridValues::new",
                format!("invalid grid divisions {number_in_xi:?}"),
            ));
        }
        let expected: usize = number_in_xi.iter().map(|n| n + 1).product();
        if values.len() != expected {
            return Err(FieldError::invalid_argument(
                "GridValues::new",
                format!("expected {expected} grid values, got {}", values.len()),
            ));
        }
        Ok(Self {
            number_in_xi: number_in_xi.iter().copied().collect(),
            values,
        })
    }

    /// Grid cells per xi direction
    pub fn number_in_xi(&self) -> &[usize] {
        &self.number_in_xi
    }

    /// Point values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    fn point_index(&self, point: &[usize]) -> usize {
        let mut index = 0;
        let mut stride = 1;
        for (d, &p) in point.iter().enumerate() {
            index += p * stride;
            stride *= self.number_in_xi[d] + 1;
        }
        index
    }

    /// Multilinear value at xi with optional xi derivatives
    pub fn evaluate_with_derivatives(&self, xi: &[f64], derivatives: Option<&mut [f64]>) -> f64 {
        let dimension = self.number_in_xi.len();
        let mut cell = [0usize; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        let mut local = [0.0f64; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for d in 0..dimension {
            let n = self.number_in_xi[d];
            let s = xi[d].clamp(0.0, 1.0) * n as f64;
            let c = (s.floor() as usize).min(n - 1);
            cell[d] = c;
            local[d] = s - c as f64;
        }

        let mut value = 0.0;
        let mut gradient = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        let mut corner = [0usize; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for mask in 0..(1usize << dimension) {
            let mut weight = 1.0;
            for d in 0..dimension {
                let upper = mask & (1 << d) != 0;
                corner[d] = cell[d] + usize::from(upper);
                weight *= if upper { local[d] } else { 1.0 - local[d] };
            }
            let point_value = self.values[self.point_index(&corner[..dimension])];
            value += weight * point_value;
            for (k, slot) in gradient.iter_mut().enumerate().take(dimension) {
                let mut w = if mask & (1 << k) != 0 { 1.0 } else { -1.0 };
                w *= self.number_in_xi[k] as f64;
                for d in 0..dimension {
                    if d != k {
                        w *= if mask & (1 << d) != 0 {
                            local[d]
                        } else {
                            1.0 - local[d]
                        };
                    }
                }
                *slot += w * point_value;
            }
        }
        if let Some(out) = derivatives {
            for (k, slot) in out.iter_mut().enumerate() {
                *slot = if k < dimension { gradient[k] } else { 0.0 };
            }
        }
        value
    }

    /// Value at the grid point nearest to xi
    pub fn nearest_value(&self, xi: &[f64]) -> f64 {
        let point: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = self
            .number_in_xi
            .iter()
            .enumerate()
            .map(|(d, &n)| (xi[d].clamp(0.0, 1.0) * n as f64).round() as usize)
            .collect();
        self.values[self.point_index(&point)]
    }

    /// Index of the grid point xi lies on, if any
    pub fn grid_point_at(&self, xi: &[f64]) -> Option<usize> {
        let mut point: SmallVec<[usize; MAXIMUM_ELEMENT_XI_DIMENSIONS]> = SmallVec::new();
        for (d, &n) in self.number_in_xi.iter().enumerate() {
            let s = xi.get(d).copied()? * n as f64;
            let rounded = s.round();
            if (s - rounded).abs() > GRID_POINT_TOLERANCE || rounded < 0.0 || rounded > n as f64 {
                return None;
            }
            point.push(rounded as usize);
        }
        Some(self.point_index(&point))
    }

    pub(crate) fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Overwrite one point value
    pub fn set_value(&mut self, index: usize, value: f64) -> FieldResult<()> {
        let slot = self.values.get_mut(index).ok_or_else(|| {
            FieldError::invalid_argument("GridValues::set_value", format!("no grid point {index}"))
        })?;
        *slot = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn linear_square(corners: [f64; 4]) -> MonomialPolynomial {
        TensorBasis::uniform(BasisFunction::LinearLagrange, 2)
            .unwrap()
            .to_monomial(|node, _| Ok(corners[node]))
            .unwrap()
    }

    #[test]
    fn test_linear_lagrange_interpolates_nodes() {
        let p = linear_square([1.0, 3.0, 5.0, 11.0]);
        assert!((p.evaluate(&[0.0, 0.0]) - 1.0).abs() < EPS);
        assert!((p.evaluate(&[1.0, 0.0]) - 3.0).abs() < EPS);
        assert!((p.evaluate(&[0.0, 1.0]) - 5.0).abs() < EPS);
        assert!((p.evaluate(&[1.0, 1.0]) - 11.0).abs() < EPS);
        // bilinear centre is the corner average
        assert!((p.evaluate(&[0.5, 0.5]) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_derivatives_match_differentiate() {
        let p = linear_square([1.0, 3.0, 5.0, 11.0]);
        let mut derivatives = [0.0; 3];
        p.evaluate_with_derivatives(&[0.25, 0.75], Some(&mut derivatives));
        let d1 = p.differentiate(0).evaluate(&[0.25, 0.75]);
        let d2 = p.differentiate(1).evaluate(&[0.25, 0.75]);
        assert!((derivatives[0] - d1).abs() < EPS);
        assert!((derivatives[1] - d2).abs() < EPS);
        assert_eq!(derivatives[2], 0.0);
        // d/dxi1 = 2 + 4*xi2
        assert!((d1 - 5.0).abs() < EPS);
    }

    #[test]
    fn test_quadratic_lagrange_reproduces_parabola() {
        let basis = TensorBasis::new(&[BasisFunction::QuadraticLagrange]).unwrap();
        // f(xi) = xi^2 at nodes 0, 0.5, 1
        let p = basis
            .to_monomial(|node, _| Ok([0.0, 0.25, 1.0][node]))
            .unwrap();
        assert!((p.evaluate(&[0.3]) - 0.09).abs() < EPS);
        assert_eq!(p.degrees(), &[2]);
    }

    #[test]
    fn test_cubic_hermite_uses_derivative_parameters() {
        let basis = TensorBasis::new(&[BasisFunction::CubicHermite]).unwrap();
        assert_eq!(
            basis.node_labels().as_slice(),
            &[NodeValueLabel::Value, NodeValueLabel::DDs1]
        );
        // f(xi) = xi^3: f(0)=0, f'(0)=0, f(1)=1, f'(1)=3
        let p = basis
            .to_monomial(|node, label| {
                Ok(match (node, label) {
                    (1, NodeValueLabel::Value) => 1.0,
                    (1, NodeValueLabel::DDs1) => 3.0,
                    _ => 0.0,
                })
            })
            .unwrap();
        assert!((p.evaluate(&[0.5]) - 0.125).abs() < EPS);
    }

    #[test]
    fn test_bicubic_hermite_labels() {
        let basis = TensorBasis::new(&[BasisFunction::CubicHermite, BasisFunction::CubicHermite])
            .unwrap();
        assert_eq!(
            basis.node_labels().as_slice(),
            &[
                NodeValueLabel::Value,
                NodeValueLabel::DDs1,
                NodeValueLabel::DDs2,
                NodeValueLabel::D2Ds1Ds2
            ]
        );
        let mixed = TensorBasis::new(&[BasisFunction::LinearLagrange, BasisFunction::CubicHermite])
            .unwrap();
        assert_eq!(
            mixed.node_labels().as_slice(),
            &[NodeValueLabel::Value, NodeValueLabel::DDs2]
        );
    }

    #[test]
    fn test_restrict_fixes_direction() {
        let p = linear_square([1.0, 3.0, 5.0, 11.0]);
        let face = p.restrict(1, 1.0);
        assert_eq!(face.dimension(), 1);
        assert!((face.evaluate(&[0.0]) - 5.0).abs() < EPS);
        assert!((face.evaluate(&[1.0]) - 11.0).abs() < EPS);
        let face = p.restrict(0, 0.0);
        assert!((face.evaluate(&[1.0]) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_differentiate_constant_is_zero() {
        let p = MonomialPolynomial::constant(2, 4.0);
        let d = p.differentiate(1);
        assert_eq!(d.evaluate(&[0.3, 0.7]), 0.0);
    }

    #[test]
    fn test_grid_multilinear_and_points() {
        // 2 cells along xi1: points at 0, 0.5, 1
        let grid = GridValues::new(&[2], vec![0.0, 10.0, 30.0]).unwrap();
        let mut derivatives = [0.0; 3];
        let value = grid.evaluate_with_derivatives(&[0.75], Some(&mut derivatives));
        assert!((value - 20.0).abs() < EPS);
        assert!((derivatives[0] - 40.0).abs() < EPS);
        assert_eq!(grid.grid_point_at(&[0.5]), Some(1));
        assert_eq!(grid.grid_point_at(&[0.3]), None);
        assert_eq!(grid.nearest_value(&[0.3]), 10.0);
    }

    #[test]
    fn test_grid_rejects_wrong_size() {
        assert!(GridValues::new(&[2, 2], vec![0.0; 8]).is_err());
        assert!(GridValues::new(&[0], vec![0.0]).is_err());
    }
}
