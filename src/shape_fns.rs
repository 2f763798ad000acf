//! Lagrange shape functions on simplices and tensor-product cells
//!
//! Simplex Lagrange functions of degree `p` are indexed by multi-indices `m` with `|m| = p`; the
//! function associated with `m` is `φ_m(λ) = Π_k F_{m_k}(p λ_k)` where `F_l(t) = Π_{s<l} (t - s) / (s + 1)`.

use crate::mesh::space::V2D;
use crate::quadrature::TensorBc;

/// Multi-indices of the degree `p` Lagrange points on an interval: `(p - i, i)` for `i = 0..=p`
///
/// ```
/// use fem_mesh_2d::shape_fns::multi_index_matrix_1d;
///
/// assert_eq!(multi_index_matrix_1d(2), vec![[2, 0], [1, 1], [0, 2]]);
/// ```
pub fn multi_index_matrix_1d(p: usize) -> Vec<[usize; 2]> {
    (0..=p).map(|i| [p - i, i]).collect()
}

/// Multi-indices of the degree `p` Lagrange points on a triangle
///
/// Points are grouped by `m1 + m2`; within a group `m2` increases.
///
/// ```
/// use fem_mesh_2d::shape_fns::multi_index_matrix_2d;
///
/// assert_eq!(
///     multi_index_matrix_2d(2),
///     vec![[2, 0, 0], [1, 1, 0], [1, 0, 1], [0, 2, 0], [0, 1, 1], [0, 0, 2]]
/// );
/// ```
pub fn multi_index_matrix_2d(p: usize) -> Vec<[usize; 3]> {
    (0..=p)
        .flat_map(|level| (0..=level).map(move |m2| [p - level, level - m2, m2]))
        .collect()
}

/// Multi-indices of the degree `p` Lagrange points on the `D - 1` dimensional simplex
///
/// Ordered lexicographically with `m0` decreasing first, which coincides with [multi_index_matrix_1d] and
/// [multi_index_matrix_2d] for `D = 2` and `D = 3`.
///
/// ```
/// use fem_mesh_2d::shape_fns::multi_index_matrix;
///
/// let tet = multi_index_matrix::<4>(1);
/// assert_eq!(tet, vec![[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]);
/// ```
pub fn multi_index_matrix<const D: usize>(p: usize) -> Vec<[usize; D]> {
    assert!(D > 0, "Multi-indices need at least one barycentric component!");
    let mut indices = Vec::new();
    push_multi_indices(&mut [0; D], 0, p, &mut indices);
    indices
}

fn push_multi_indices<const D: usize>(
    m: &mut [usize; D],
    k: usize,
    remaining: usize,
    out: &mut Vec<[usize; D]>,
) {
    if k + 1 == D {
        m[k] = remaining;
        out.push(*m);
        return;
    }
    for mk in (0..=remaining).rev() {
        m[k] = mk;
        push_multi_indices(m, k + 1, remaining - mk, out);
    }
}

/// Local index of a triangle multi-index in [multi_index_matrix_2d] order
pub fn multi_index_2d_position(m: [usize; 3]) -> usize {
    let level = m[1] + m[2];
    level * (level + 1) / 2 + m[2]
}

// F_l(p λ_k) and its derivative with respect to λ_k for each l in 0..=p and each barycentric component k
fn lagrange_factors<const D: usize>(bc: &[f64; D], p: usize) -> (Vec<[f64; D]>, Vec<[f64; D]>) {
    let mut values = vec![[1.0; D]; p + 1];
    let mut derivs = vec![[0.0; D]; p + 1];
    let pf = p as f64;

    for l in 1..=p {
        let lf = l as f64;
        for k in 0..D {
            let t = pf * bc[k];
            values[l][k] = values[l - 1][k] * (t - (lf - 1.0)) / lf;
            derivs[l][k] = (derivs[l - 1][k] * (t - (lf - 1.0)) + pf * values[l - 1][k]) / lf;
        }
    }

    (values, derivs)
}

fn simplex_values<const D: usize>(bc: &[f64; D], p: usize, multi_index: &[[usize; D]]) -> Vec<f64> {
    let (values, _) = lagrange_factors(bc, p);
    multi_index
        .iter()
        .map(|m| (0..D).map(|k| values[m[k]][k]).product())
        .collect()
}

fn simplex_grads<const D: usize>(
    bc: &[f64; D],
    p: usize,
    multi_index: &[[usize; D]],
) -> Vec<[f64; D]> {
    let (values, derivs) = lagrange_factors(bc, p);
    multi_index
        .iter()
        .map(|m| {
            let mut grad = [0.0; D];
            for (k, g) in grad.iter_mut().enumerate() {
                *g = (0..D)
                    .map(|j| {
                        if j == k {
                            derivs[m[j]][j]
                        } else {
                            values[m[j]][j]
                        }
                    })
                    .product();
            }
            grad
        })
        .collect()
}

/// Values of the degree `p` Lagrange functions on a simplex with `D` barycentric components, in [multi_index_matrix] order
pub fn lagrange_shape_function<const D: usize>(bc: &[f64; D], p: usize) -> Vec<f64> {
    simplex_values(bc, p, &multi_index_matrix::<D>(p))
}

/// Derivatives of the degree `p` simplex Lagrange functions with respect to each barycentric variable
pub fn lagrange_grad_shape_function<const D: usize>(bc: &[f64; D], p: usize) -> Vec<[f64; D]> {
    simplex_grads(bc, p, &multi_index_matrix::<D>(p))
}

/// Values of the degree `p` Lagrange functions on an interval at the barycentric point `bc`
///
/// ```
/// use fem_mesh_2d::shape_fns::lagrange_shape_function_1d;
///
/// let phi = lagrange_shape_function_1d(&[0.5, 0.5], 2);
/// assert!((phi[0] - 0.0).abs() < 1e-14);
/// assert!((phi[1] - 1.0).abs() < 1e-14);
/// assert!((phi[2] - 0.0).abs() < 1e-14);
/// ```
pub fn lagrange_shape_function_1d(bc: &[f64; 2], p: usize) -> Vec<f64> {
    simplex_values(bc, p, &multi_index_matrix_1d(p))
}

/// Derivatives of the degree `p` interval Lagrange functions with respect to both barycentric variables
pub fn lagrange_grad_shape_function_1d(bc: &[f64; 2], p: usize) -> Vec<[f64; 2]> {
    simplex_grads(bc, p, &multi_index_matrix_1d(p))
}

/// Values of the degree `p` triangle Lagrange functions at the barycentric point `bc`, in [multi_index_matrix_2d] order
pub fn lagrange_shape_function_2d(bc: &[f64; 3], p: usize) -> Vec<f64> {
    simplex_values(bc, p, &multi_index_matrix_2d(p))
}

/// Derivatives of the degree `p` triangle Lagrange functions with respect to the three barycentric variables
pub fn lagrange_grad_shape_function_2d(bc: &[f64; 3], p: usize) -> Vec<[f64; 3]> {
    simplex_grads(bc, p, &multi_index_matrix_2d(p))
}

/// Gradients of the triangle Lagrange functions with respect to the reference coordinates `(ξ, η) = (λ1, λ2)`
pub fn triangle_reference_grads(bc: &[f64; 3], p: usize) -> Vec<V2D> {
    lagrange_grad_shape_function_2d(bc, p)
        .iter()
        .map(|g| V2D::from([g[1] - g[0], g[2] - g[0]]))
        .collect()
}

/// Tensor product Lagrange functions on the unit square; function `i * (p + 1) + j` is `φ_i(u) φ_j(v)`
///
/// ```
/// use fem_mesh_2d::quadrature::TensorBc;
/// use fem_mesh_2d::shape_fns::tensor_shape_function;
///
/// let phi = tensor_shape_function(&TensorBc::from_reference([0.25, 0.5]), 1);
/// assert!((phi[0] - 0.375).abs() < 1e-14);
/// assert!((phi[1] - 0.375).abs() < 1e-14);
/// assert!((phi[2] - 0.125).abs() < 1e-14);
/// assert!((phi[3] - 0.125).abs() < 1e-14);
/// ```
pub fn tensor_shape_function(bc: &TensorBc, p: usize) -> Vec<f64> {
    let phi_u = lagrange_shape_function_1d(&bc.u, p);
    let phi_v = lagrange_shape_function_1d(&bc.v, p);

    phi_u
        .iter()
        .flat_map(|pu| phi_v.iter().map(move |pv| pu * pv))
        .collect()
}

/// Gradients of the tensor product Lagrange functions with respect to the reference coordinates `(ξ, η)`
pub fn tensor_reference_grads(bc: &TensorBc, p: usize) -> Vec<V2D> {
    let phi_u = lagrange_shape_function_1d(&bc.u, p);
    let phi_v = lagrange_shape_function_1d(&bc.v, p);

    // λ = (1 - ξ, ξ)
    let dphi_u: Vec<f64> = lagrange_grad_shape_function_1d(&bc.u, p)
        .iter()
        .map(|g| g[1] - g[0])
        .collect();
    let dphi_v: Vec<f64> = lagrange_grad_shape_function_1d(&bc.v, p)
        .iter()
        .map(|g| g[1] - g[0])
        .collect();

    (0..=p)
        .flat_map(|i| (0..=p).map(move |j| (i, j)))
        .map(|(i, j)| V2D::from([dphi_u[i] * phi_v[j], phi_u[i] * dphi_v[j]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodal_property_on_triangle() {
        for p in 1..=4 {
            let multi_index = multi_index_matrix_2d(p);
            assert_eq!(multi_index.len(), (p + 1) * (p + 2) / 2);

            for (i, m) in multi_index.iter().enumerate() {
                assert_eq!(multi_index_2d_position(*m), i);

                let bc = m.map(|mk| mk as f64 / p as f64);
                let phi = lagrange_shape_function_2d(&bc, p);
                for (j, phi_j) in phi.iter().enumerate() {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((phi_j - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn partition_of_unity() {
        let bc = [0.2, 0.3, 0.5];
        for p in 1..=5 {
            let sum: f64 = lagrange_shape_function_2d(&bc, p).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12);

            // along the simplex, derivatives w.r.t. (ξ, η) of a partition of unity vanish
            let grad_sum = triangle_reference_grads(&bc, p)
                .into_iter()
                .fold(V2D::zero(), |acc, g| acc + g);
            assert!(grad_sum.norm() < 1e-10);
        }
    }

    #[test]
    fn generic_simplex_functions() {
        for p in 1..=4 {
            assert_eq!(multi_index_matrix::<2>(p), multi_index_matrix_1d(p));
            assert_eq!(multi_index_matrix::<3>(p), multi_index_matrix_2d(p));
        }

        let bc = [0.1, 0.2, 0.3];
        assert_eq!(lagrange_shape_function(&bc, 3), lagrange_shape_function_2d(&bc, 3));

        // quadratic tetrahedron: nodal, and a partition of unity on the simplex
        let p = 2;
        let multi_index = multi_index_matrix::<4>(p);
        assert_eq!(multi_index.len(), 10);
        for (i, m) in multi_index.iter().enumerate() {
            let phi = lagrange_shape_function(&m.map(|mk| mk as f64 / p as f64), p);
            for (j, phi_j) in phi.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((phi_j - expected).abs() < 1e-12);
            }
        }

        let bc = [0.1, 0.2, 0.3, 0.4];
        let sum: f64 = lagrange_shape_function(&bc, 3).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        let grads = lagrange_grad_shape_function(&bc, 3);
        for k in 1..4 {
            let along: f64 = grads.iter().map(|g| g[k] - g[0]).sum();
            assert!(along.abs() < 1e-10);
        }
    }

    #[test]
    fn grads_match_finite_differences() {
        let p = 3;
        let bc = TensorBc::from_reference([0.3, 0.6]);
        let grads = tensor_reference_grads(&bc, p);

        let h = 1e-6;
        let fx = tensor_shape_function(&TensorBc::from_reference([0.3 + h, 0.6]), p);
        let bx = tensor_shape_function(&TensorBc::from_reference([0.3 - h, 0.6]), p);
        let fy = tensor_shape_function(&TensorBc::from_reference([0.3, 0.6 + h]), p);
        let by = tensor_shape_function(&TensorBc::from_reference([0.3, 0.6 - h]), p);

        for k in 0..grads.len() {
            assert!((grads[k][0] - (fx[k] - bx[k]) / (2.0 * h)).abs() < 1e-6);
            assert!((grads[k][1] - (fy[k] - by[k]) / (2.0 * h)).abs() < 1e-6);
        }
    }

    #[test]
    fn bilinear_reference_values() {
        let xi = 0.21132486540518713;
        let bc = TensorBc::from_reference([xi, xi]);

        let phi = tensor_shape_function(&bc, 1);
        let expected = [0.62200847, 0.16666667, 0.16666667, 0.0446582];
        for (a, b) in phi.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-8);
        }

        let grads = tensor_reference_grads(&bc, 1);
        let expected = [
            [-0.78867513, -0.78867513],
            [-0.21132487, 0.78867513],
            [0.78867513, -0.21132487],
            [0.21132487, 0.21132487],
        ];
        for (g, e) in grads.iter().zip(expected.iter()) {
            assert!((g[0] - e[0]).abs() < 1e-8);
            assert!((g[1] - e[1]).abs() < 1e-8);
        }
    }
}
