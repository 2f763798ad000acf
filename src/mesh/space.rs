use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Index, Mul, Sub};

use json::{array, JsonValue};

#[derive(Clone, Copy, Debug, PartialEq)]
/// 2D vector in real or reference space
pub struct V2D {
    inner: [f64; 2],
}

impl V2D {
    pub const fn from([x, y]: [f64; 2]) -> Self {
        Self { inner: [x, y] }
    }

    pub const fn zero() -> Self {
        Self { inner: [0.0; 2] }
    }

    pub fn dot_with(&self, other: &Self) -> f64 {
        self[0] * other[0] + self[1] * other[1]
    }

    /// z-component of the 3D cross product `self × other`
    pub fn cross(&self, other: &Self) -> f64 {
        self[0] * other[1] - self[1] * other[0]
    }

    pub fn norm(&self) -> f64 {
        self.dot_with(self).sqrt()
    }

    /// Rotate by -90°: `[y, -x]`
    pub fn rotated_cw(&self) -> Self {
        Self::from([self[1], -self[0]])
    }

    pub fn normalized(&self) -> Self {
        *self / self.norm()
    }

    pub fn as_array(&self) -> [f64; 2] {
        self.inner
    }
}

impl Default for V2D {
    fn default() -> Self {
        Self::zero()
    }
}

impl Index<usize> for V2D {
    type Output = f64;
    fn index(&self, index: usize) -> &Self::Output {
        &self.inner[index]
    }
}

impl Add for V2D {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            inner: [self[0] + other[0], self[1] + other[1]],
        }
    }
}

impl Sub for V2D {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            inner: [self[0] - other[0], self[1] - other[1]],
        }
    }
}

impl Div<f64> for V2D {
    type Output = Self;
    fn div(self, divisor: f64) -> Self {
        Self {
            inner: [self[0] / divisor, self[1] / divisor],
        }
    }
}

impl Mul<f64> for V2D {
    type Output = Self;
    fn mul(self, coefficient: f64) -> Self {
        Self {
            inner: [self[0] * coefficient, self[1] * coefficient],
        }
    }
}

/*
    | [u0, u1] |
    | [v0, v1] |
*/

#[derive(Clone, Copy, Debug, PartialEq)]
/// 2 by 2 Matrix stored by rows. Used for Jacobians of the reference-to-real mapping and for tensor coefficients
pub struct M2D {
    pub u: V2D,
    pub v: V2D,
}

impl M2D {
    pub const fn from(r0: [f64; 2], r1: [f64; 2]) -> Self {
        Self {
            u: V2D::from(r0),
            v: V2D::from(r1),
        }
    }

    pub const fn identity() -> Self {
        Self::from([1.0, 0.0], [0.0, 1.0])
    }

    /// Build a matrix from its two columns
    pub fn from_cols(c0: V2D, c1: V2D) -> Self {
        Self::from([c0[0], c1[0]], [c0[1], c1[1]])
    }

    pub fn col(&self, index: usize) -> V2D {
        V2D::from([self.u[index], self.v[index]])
    }

    pub fn row(&self, index: usize) -> V2D {
        match index {
            0 => self.u,
            1 => self.v,
            _ => panic!("M2D only has 2 rows; cannot get row {}!", index),
        }
    }

    pub fn get(&self, [r, c]: [usize; 2]) -> f64 {
        self.row(r)[c]
    }

    #[inline]
    pub fn det(&self) -> f64 {
        self.u[0] * self.v[1] - self.u[1] * self.v[0]
    }

    pub fn inverse(&self) -> Self {
        Self {
            u: V2D::from([self.v[1], -1.0 * self.u[1]]),
            v: V2D::from([-1.0 * self.v[0], self.u[0]]),
        } / self.det()
    }

    pub fn transpose(&self) -> Self {
        Self {
            u: V2D::from([self.u[0], self.v[0]]),
            v: V2D::from([self.u[1], self.v[1]]),
        }
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        (self.u[1] - self.v[0]).abs() < tol
    }
}

impl Div<f64> for M2D {
    type Output = Self;
    fn div(self, divisor: f64) -> Self {
        Self {
            u: self.u / divisor,
            v: self.v / divisor,
        }
    }
}

impl Mul<Self> for M2D {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        let [c0, c1] = [other.col(0), other.col(1)];
        Self {
            u: V2D::from([self.u.dot_with(&c0), self.u.dot_with(&c1)]),
            v: V2D::from([self.v.dot_with(&c0), self.v.dot_with(&c1)]),
        }
    }
}

impl Mul<V2D> for M2D {
    type Output = V2D;
    fn mul(self, v: V2D) -> V2D {
        V2D::from([self.u.dot_with(&v), self.v.dot_with(&v)])
    }
}

const POINT_UNIQUENESS_ACCURACY: f64 = 1e-12;

#[derive(Clone, Copy, Debug)]
/// Point in 2D Space
///
/// Equality and hashing are computed on a rounded representation of the coordinates, s.t. Points closer than 1e-12 compare equal
pub struct Point {
    pub x: f64,
    pub y: f64,
    x_cmp: FloatRep,
    y_cmp: FloatRep,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            x_cmp: FloatRep::from(x),
            y_cmp: FloatRep::from(y),
        }
    }

    pub fn between(a: &Self, b: &Self) -> Self {
        Self::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn from([x, y]: [f64; 2]) -> Self {
        Self::new(x, y)
    }

    /// Weighted sum of a set of Points: `Σ w_i p_i`
    pub fn weighted_sum<'a>(points: impl Iterator<Item = &'a Point>, weights: &[f64]) -> Self {
        let (x, y) = points
            .zip(weights.iter())
            .fold((0.0, 0.0), |(x, y), (p, w)| (x + w * p.x, y + w * p.y));
        Self::new(x, y)
    }

    /// Arithmetic mean of a set of Points
    pub fn centroid<'a>(points: impl ExactSizeIterator<Item = &'a Point>) -> Self {
        let n = points.len() as f64;
        let (x, y) = points.fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
        Self::new(x / n, y / n)
    }

    pub fn dist(&self, other: &Self) -> f64 {
        let dx = (other.x - self.x).abs();
        let dy = (other.y - self.y).abs();

        (dx.powi(2) + dy.powi(2)).sqrt()
    }

    /// Vector pointing from `self` to `other`
    pub fn vector_to(&self, other: &Self) -> V2D {
        V2D::from([other.x - self.x, other.y - self.y])
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.x_cmp.hash(state);
        self.y_cmp.hash(state);
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.x_cmp.eq(&other.x_cmp) && self.y_cmp.eq(&other.y_cmp)
    }
}

impl Eq for Point {}

impl From<Point> for JsonValue {
    fn from(point: Point) -> Self {
        array![point.x, point.y]
    }
}

#[derive(Hash, PartialEq, Eq, Clone, Copy, Debug)]
struct FloatRep {
    sign: bool,
    bits: u64,
}

impl FloatRep {
    pub fn from(value: f64) -> Self {
        let integer_part = value.abs().trunc();
        let fractional_rounded =
            (value.abs().fract() / POINT_UNIQUENESS_ACCURACY).round() * POINT_UNIQUENESS_ACCURACY;
        let total_rounded = integer_part + fractional_rounded;

        Self {
            // -0.0 and 0.0 must share a representation
            sign: value.is_sign_positive() || total_rounded == 0.0,
            bits: total_rounded.to_bits(),
        }
    }
}
