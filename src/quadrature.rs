use nalgebra::{DMatrix, SymmetricEigen};

/// Barycentric coordinates of a point on a tensor-product (quadrangle) reference cell:
/// a 1D barycentric pair for each of the two reference directions.
///
/// The reference coordinates of the point are `(u[1], v[1])` in the unit square.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TensorBc {
    pub u: [f64; 2],
    pub v: [f64; 2],
}

impl TensorBc {
    pub const fn new(u: [f64; 2], v: [f64; 2]) -> Self {
        Self { u, v }
    }

    /// Build from a point `(ξ, η)` of the unit square
    pub fn from_reference([xi, eta]: [f64; 2]) -> Self {
        Self {
            u: [1.0 - xi, xi],
            v: [1.0 - eta, eta],
        }
    }

    /// Coordinates `(ξ, η)` of this point in the unit square
    pub fn reference_coords(&self) -> [f64; 2] {
        [self.u[1], self.v[1]]
    }
}

/// A set of quadrature points (in barycentric form) and weights over a reference entity.
///
/// Weights are normalized so that they sum to one; integrals over physical entities are
/// obtained by scaling with the entity measure (or the local Jacobian scaled by the reference measure).
#[derive(Clone, Debug)]
pub struct Quadrature<Bc> {
    points: Vec<Bc>,
    weights: Vec<f64>,
}

impl<Bc: Copy> Quadrature<Bc> {
    pub fn new(points: Vec<Bc>, weights: Vec<f64>) -> Self {
        assert_eq!(
            points.len(),
            weights.len(),
            "Number of quadrature points and weights must match!"
        );
        Self { points, weights }
    }

    pub fn number_of_quadrature_points(&self) -> usize {
        self.weights.len()
    }

    pub fn quadrature_points_and_weights(&self) -> (&[Bc], &[f64]) {
        (&self.points, &self.weights)
    }

    pub fn points(&self) -> &[Bc] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bc, f64)> + '_ {
        self.points.iter().zip(self.weights.iter().copied())
    }

    /// Weighted sum of `f` over the quadrature points (the integral over the reference entity, normalized to measure one)
    pub fn integrate<F>(&self, f: F) -> f64
    where
        F: Fn(&Bc) -> f64,
    {
        self.iter().map(|(bc, w)| f(bc) * w).sum()
    }
}

impl Quadrature<[f64; 2]> {
    /// `q` point Gauss-Legendre rule on the unit interval, exact for polynomials up to degree `2q - 1`
    ///
    /// Points are barycentric pairs `[1 - ξ, ξ]`, sorted by ascending `ξ`.
    ///
    /// ```
    /// use fem_mesh_2d::quadrature::Quadrature;
    ///
    /// let quad = Quadrature::gauss_legendre(3);
    /// assert_eq!(quad.number_of_quadrature_points(), 3);
    ///
    /// // integral of x^5 over [0, 1]
    /// let integral = quad.integrate(|bc| bc[1].powi(5));
    /// assert!((integral - 1.0 / 6.0).abs() < 1e-14);
    /// ```
    pub fn gauss_legendre(q: usize) -> Self {
        assert!(q > 0, "Quadrature must have at least one point!");
        let (points, weights) = gauss_quadrature_points(q);
        let (scale, points) = scale_gauss_quad_points(&points, 0.0, 1.0);

        Self::new(
            points.iter().map(|xi| [1.0 - xi, *xi]).collect(),
            weights.iter().map(|w| w * scale).collect(),
        )
    }
}

impl Quadrature<TensorBc> {
    /// Tensor product of two `q` point Gauss-Legendre rules over the unit square (`u` index outer)
    ///
    /// ```
    /// use fem_mesh_2d::quadrature::Quadrature;
    ///
    /// let quad = Quadrature::tensor_product(4);
    /// assert_eq!(quad.number_of_quadrature_points(), 16);
    ///
    /// // integral of x^2 * y^3 over the unit square
    /// let integral = quad.integrate(|bc| bc.u[1].powi(2) * bc.v[1].powi(3));
    /// assert!((integral - 1.0 / 12.0).abs() < 1e-14);
    /// ```
    pub fn tensor_product(q: usize) -> Self {
        let line = Quadrature::gauss_legendre(q);
        let (points, weights) = line
            .iter()
            .flat_map(|(u, wu)| {
                line.iter()
                    .map(move |(v, wv)| (TensorBc::new(*u, *v), wu * wv))
            })
            .unzip();

        Self::new(points, weights)
    }
}

impl Quadrature<[f64; 3]> {
    /// Symmetric quadrature rule on the reference triangle
    ///
    /// Rules `1` through `4` are exact for polynomials of degree `1, 2, 4, 5` respectively;
    /// higher orders use a collapsed (Duffy) Gauss-Legendre rule with `q^2` points.
    ///
    /// ```
    /// use fem_mesh_2d::quadrature::Quadrature;
    ///
    /// let quad = Quadrature::triangle(3);
    /// assert_eq!(quad.number_of_quadrature_points(), 6);
    ///
    /// // the weights are normalized to the measure of the reference triangle
    /// assert!((quad.weights().iter().sum::<f64>() - 1.0).abs() < 1e-14);
    /// ```
    pub fn triangle(q: usize) -> Self {
        assert!(q > 0, "Quadrature must have at least one point!");

        match q {
            1 => Self::new(vec![[1.0 / 3.0; 3]], vec![1.0]),
            2 => {
                let (points, weights) = symmetric_orbit(2.0 / 3.0, 1.0 / 6.0, 1.0 / 3.0).unzip();
                Self::new(points, weights)
            }
            3 => {
                let (points, weights) = symmetric_orbit(
                    0.108103018168070,
                    0.445948490915965,
                    0.223381589678011,
                )
                .chain(symmetric_orbit(
                    0.816847572980459,
                    0.091576213509771,
                    0.109951743655322,
                ))
                .unzip();
                Self::new(points, weights)
            }
            4 => {
                let (points, weights) = std::iter::once(([1.0 / 3.0; 3], 0.225))
                    .chain(symmetric_orbit(
                        0.059715871789770,
                        0.470142064105115,
                        0.132394152788506,
                    ))
                    .chain(symmetric_orbit(
                        0.797426985353087,
                        0.101286507323456,
                        0.125939180544827,
                    ))
                    .unzip();
                Self::new(points, weights)
            }
            _ => {
                let line = Quadrature::gauss_legendre(q);
                let (points, weights) = line
                    .iter()
                    .flat_map(|(s, ws)| {
                        line.iter().map(move |(t, wt)| {
                            let xi = s[1];
                            let eta = t[1] * (1.0 - xi);
                            ([1.0 - xi - eta, xi, eta], 2.0 * ws * wt * (1.0 - xi))
                        })
                    })
                    .unzip();
                Self::new(points, weights)
            }
        }
    }
}

// the three permutations of the barycentric point (a, b, b)
fn symmetric_orbit(a: f64, b: f64, weight: f64) -> impl Iterator<Item = ([f64; 3], f64)> {
    [[a, b, b], [b, a, b], [b, b, a]]
        .into_iter()
        .map(move |bc| (bc, weight))
}

/// Get a set of n Gauss-Legendre-Quadrature Integration points and weights over `(-1, 1)`
///
/// ```
/// use fem_mesh_2d::quadrature::*;
///
/// // generate 10 GLQ points and weights over the range `(-1, 1)`
/// let (points, weights) = gauss_quadrature_points(10);
/// assert_eq!(points.len(), 10);
/// assert_eq!(weights.len(), 10);
/// assert!(points.iter().sum::<f64>().abs() < 1e-12);
/// assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-12);
/// ```
// https://en.wikipedia.org/wiki/Gaussian_quadrature#Gauss%E2%80%93Legendre_quadrature
pub fn gauss_quadrature_points(n: usize) -> (Vec<f64>, Vec<f64>) {
    let betas: Vec<f64> = (1..n)
        .map(|i| 0.5 / (1.0 - (2.0 * i as f64).powi(-2)).sqrt())
        .collect();

    let polymat: DMatrix<f64> = DMatrix::from_fn(n, n, |r, c| {
        if r == c + 1 {
            betas[r - 1]
        } else if c == r + 1 {
            betas[c - 1]
        } else {
            0.0
        }
    });

    let eigen_decomp = SymmetricEigen::new(polymat);

    let mut xw: Vec<(f64, f64)> = eigen_decomp
        .eigenvalues
        .iter()
        .cloned()
        .zip(
            eigen_decomp
                .eigenvectors
                .row(0)
                .iter()
                .map(|weight| (*weight).powi(2) * 2.0),
        )
        .collect();

    xw.sort_by(|a, b| a.0.total_cmp(&b.0));

    xw.into_iter().unzip()
}

/// Scale a set of Gauss-Legendre-Quadrature Integration points to fall within a specific range
///
/// ```
/// use fem_mesh_2d::quadrature::*;
/// let (points, _) = gauss_quadrature_points(2);
///
/// // scale the points to the range `(0, 1)`
/// let (scale, points_scaled) = scale_gauss_quad_points(&points, 0.0, 1.0);
///
/// assert!((0.5 - scale).abs() < 1e-12);
/// assert!((points_scaled[0] - 0.21132486540518713).abs() < 1e-12);
/// ```
pub fn scale_gauss_quad_points(points: &[f64], min: f64, max: f64) -> (f64, Vec<f64>) {
    let scale_factor = (max - min) / 2.0;
    let offset = (max + min) / 2.0;

    (
        scale_factor,
        points
            .iter()
            .map(|x| x * scale_factor + offset)
            .collect::<Vec<f64>>(),
    )
}
