use crate::dof::LagrangeFESpace;
use crate::linalg::{DenseVector, LinearSystem, SparseMatrix, VectorGroup};
use crate::mesh::space::{Point, M2D, V2D};
use crate::mesh::triangle::TriangleMesh;
use crate::mesh::{EntityKind, Mesh2d};
use crate::quadrature::Quadrature;
use crate::shape_fns::{lagrange_grad_shape_function_2d, lagrange_shape_function_2d};

use nalgebra::DMatrix;
use rayon::prelude::*;
use std::borrow::Cow;
use thiserror::Error;

/// Failures while assembling local or global operators
#[derive(Debug, Clone, Error)]
pub enum AssemblyError {
    #[error("{kind} coefficient has {found} entries along its {axis} axis; expected {expected}")]
    CoefficientShape {
        kind: &'static str,
        axis: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{0} coefficients are not supported by this integrator")]
    UnsupportedCoefficient(&'static str),
    #[error("expected {expected} entries, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

/// Coefficient `c` of the diffusion term `(c ∇u, ∇v)`
///
/// Per quadrature point data is indexed `[quadrature point][cell]`.
pub enum DiffusionCoef {
    Identity,
    Constant(f64),
    PerCell(Vec<f64>),
    /// A degree `degree` Lagrange function given by its local DOF values on each cell (`[cell][local dof]`)
    CellDofs { degree: usize, values: Vec<Vec<f64>> },
    PerQuadPoint(Vec<Vec<f64>>),
    Tensor(M2D),
    PerCellTensor(Vec<M2D>),
    PerQuadPointTensor(Vec<Vec<M2D>>),
    /// A scalar function of the cartesian coordinates
    Function(Box<dyn Fn(&Point) -> f64 + Send + Sync>),
}

impl Default for DiffusionCoef {
    fn default() -> Self {
        Self::Identity
    }
}

impl DiffusionCoef {
    fn kind(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Constant(_) => "constant",
            Self::PerCell(_) => "per-cell",
            Self::CellDofs { .. } => "per-cell dof",
            Self::PerQuadPoint(_) => "per-quadrature-point",
            Self::Tensor(_) => "tensor",
            Self::PerCellTensor(_) => "per-cell tensor",
            Self::PerQuadPointTensor(_) => "per-quadrature-point tensor",
            Self::Function(_) => "function",
        }
    }

    fn check_shape<M: Mesh2d>(&self, mesh: &M, nq: usize) -> Result<(), AssemblyError> {
        let nc = mesh.number_of_cells();
        let shape_error = |axis, expected, found| AssemblyError::CoefficientShape {
            kind: self.kind(),
            axis,
            expected,
            found,
        };

        match self {
            Self::PerCell(values) if values.len() != nc => Err(shape_error("cell", nc, values.len())),
            Self::PerCellTensor(values) if values.len() != nc => {
                Err(shape_error("cell", nc, values.len()))
            }
            Self::CellDofs { degree, values } => {
                if values.len() != nc {
                    return Err(shape_error("cell", nc, values.len()));
                }
                let ldof = mesh.number_of_local_ipoints(*degree);
                match values.iter().find(|v| v.len() != ldof) {
                    Some(v) => Err(shape_error("local dof", ldof, v.len())),
                    None => Ok(()),
                }
            }
            Self::PerQuadPoint(values) => {
                if values.len() != nq {
                    return Err(shape_error("quadrature point", nq, values.len()));
                }
                match values.iter().find(|v| v.len() != nc) {
                    Some(v) => Err(shape_error("cell", nc, v.len())),
                    None => Ok(()),
                }
            }
            Self::PerQuadPointTensor(values) => {
                if values.len() != nq {
                    return Err(shape_error("quadrature point", nq, values.len()));
                }
                match values.iter().find(|v| v.len() != nc) {
                    Some(v) => Err(shape_error("cell", nc, v.len())),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn at<M: Mesh2d>(&self, mesh: &M, cell_id: usize, q_idx: usize, bc: &M::Bc) -> M2D {
        let scalar = |s: f64| M2D::from([s, 0.0], [0.0, s]);

        match self {
            Self::Identity => M2D::identity(),
            Self::Constant(c) => scalar(*c),
            Self::PerCell(values) => scalar(values[cell_id]),
            Self::CellDofs { degree, values } => scalar(
                values[cell_id]
                    .iter()
                    .zip(mesh.shape_function(bc, *degree))
                    .map(|(v, psi)| v * psi)
                    .sum::<f64>(),
            ),
            Self::PerQuadPoint(values) => scalar(values[q_idx][cell_id]),
            Self::Tensor(t) => *t,
            Self::PerCellTensor(values) => values[cell_id],
            Self::PerQuadPointTensor(values) => values[q_idx][cell_id],
            Self::Function(f) => scalar(f(&mesh.bc_to_point(cell_id, bc))),
        }
    }
}

/// Local matrices of `(c ∇u, ∇v)`
#[derive(Default)]
pub struct ScalarDiffusionIntegrator {
    pub coef: DiffusionCoef,
    /// Quadrature order (`p + 1` when unset)
    pub q: Option<usize>,
}

impl ScalarDiffusionIntegrator {
    pub fn new(coef: DiffusionCoef, q: Option<usize>) -> Self {
        Self { coef, q }
    }

    /// Local stiffness matrix of each cell, in local DOF order
    pub fn assembly_cell_matrix<M: Mesh2d>(
        &self,
        space: &LagrangeFESpace<M>,
    ) -> Result<Vec<DMatrix<f64>>, AssemblyError> {
        let mesh = space.mesh();
        let quad = mesh.cell_quadrature(self.q.unwrap_or(space.degree() + 1));
        self.coef.check_shape(mesh, quad.number_of_quadrature_points())?;

        let ldof = space.number_of_local_dofs();
        let matrices: Vec<DMatrix<f64>> = (0..mesh.number_of_cells())
            .into_par_iter()
            .map(|cell_id| {
                let mut k = DMatrix::zeros(ldof, ldof);
                for (q_idx, (bc, w)) in quad.iter().enumerate() {
                    let coef = self.coef.at(mesh, cell_id, q_idx, bc);
                    let scale = w * mesh.cell_measure_at(cell_id, bc);
                    let grads = space.grad_basis(cell_id, bc);
                    let flux: Vec<V2D> = grads.iter().map(|g| coef * *g).collect();

                    for (i, fi) in flux.iter().enumerate() {
                        for (j, gj) in grads.iter().enumerate() {
                            k[(i, j)] += scale * fi.dot_with(gj);
                        }
                    }
                }
                k
            })
            .collect();

        log::debug!(
            "Assembled {} local diffusion matrices of size {}",
            matrices.len(),
            ldof
        );
        Ok(matrices)
    }

    /// Quadrature-free local stiffness matrices on linear triangles
    ///
    /// Integrals of products of barycentric derivatives and coefficient basis functions are tabulated once on the
    /// reference triangle and contracted with each cell's `∇λ`. Scalar coefficients only: constants, per cell values,
    /// per cell Lagrange DOFs, and functions (interpolated into the degree `p` Lagrange space).
    pub fn assembly_cell_matrix_fast(
        &self,
        space: &LagrangeFESpace<TriangleMesh>,
    ) -> Result<Vec<DMatrix<f64>>, AssemblyError> {
        let mesh = space.mesh();
        let nc = mesh.number_of_cells();
        let p = space.degree();

        // coefficient degree and its local DOF values on each cell
        let (cp, coef_dofs): (usize, Cow<[Vec<f64>]>) = match &self.coef {
            DiffusionCoef::Identity => (0, Cow::Owned(vec![vec![1.0]; nc])),
            DiffusionCoef::Constant(c) => (0, Cow::Owned(vec![vec![*c]; nc])),
            DiffusionCoef::PerCell(values) => {
                self.coef.check_shape(mesh, 0)?;
                (0, Cow::Owned(values.iter().map(|v| vec![*v]).collect()))
            }
            DiffusionCoef::CellDofs { degree, values } => {
                self.coef.check_shape(mesh, 0)?;
                (*degree, Cow::Borrowed(values.as_slice()))
            }
            DiffusionCoef::Function(f) => {
                let coef_space = LagrangeFESpace::new(mesh, p);
                let u = coef_space.interpolate(|x: &Point| f(x));
                let dofs = coef_space
                    .cell_to_dof()
                    .iter()
                    .map(|cell_dofs| cell_dofs.iter().map(|d| u[*d]).collect())
                    .collect();
                (p, Cow::Owned(dofs))
            }
            _ => return Err(AssemblyError::UnsupportedCoefficient(self.coef.kind())),
        };

        let ldof = space.number_of_local_dofs();
        let cldof = (cp + 1) * (cp + 2) / 2;
        let q = self
            .q
            .unwrap_or_else(|| triangle_order_for_degree(2 * (p - 1) + cp));
        let reference = barycentric_stiffness_tensor(p, cp, q);
        let grad_lambda = mesh.grad_lambda();
        let area = mesh.entity_measure(EntityKind::Cell);

        Ok((0..nc)
            .into_par_iter()
            .map(|cell_id| {
                let gl = &grad_lambda[cell_id];
                let mut gram = [[0.0; 3]; 3];
                for a in 0..3 {
                    for b in 0..3 {
                        gram[a][b] = gl[a].dot_with(&gl[b]);
                    }
                }
                let coef = &coef_dofs[cell_id];

                DMatrix::from_fn(ldof, ldof, |i, j| {
                    let ij = (i * ldof + j) * cldof;
                    area[cell_id]
                        * coef
                            .iter()
                            .enumerate()
                            .map(|(k, ck)| {
                                let block = &reference[(ij + k) * 9..(ij + k + 1) * 9];
                                ck * block
                                    .iter()
                                    .enumerate()
                                    .map(|(ab, r)| r * gram[ab / 3][ab % 3])
                                    .sum::<f64>()
                            })
                            .sum::<f64>()
                })
            })
            .collect())
    }
}

// ∫ ∂φ_i/∂λ_a ∂φ_j/∂λ_b ψ_k over the reference triangle (normalized to unit area), flattened as [i][j][k][a][b]
//
// φ are the degree `p` Lagrange functions and ψ the degree `cp` ones.
fn barycentric_stiffness_tensor(p: usize, cp: usize, q: usize) -> Vec<f64> {
    let quad = Quadrature::triangle(q);
    let ldof = (p + 1) * (p + 2) / 2;
    let cldof = (cp + 1) * (cp + 2) / 2;
    let mut tensor = vec![0.0; ldof * ldof * cldof * 9];

    for (bc, w) in quad.iter() {
        let grads = lagrange_grad_shape_function_2d(bc, p);
        let psi = lagrange_shape_function_2d(bc, cp);
        for (i, gi) in grads.iter().enumerate() {
            for (j, gj) in grads.iter().enumerate() {
                for (k, psi_k) in psi.iter().enumerate() {
                    let offset = ((i * ldof + j) * cldof + k) * 9;
                    for a in 0..3 {
                        for b in 0..3 {
                            tensor[offset + a * 3 + b] += w * psi_k * gi[a] * gj[b];
                        }
                    }
                }
            }
        }
    }

    tensor
}

// Smallest order of [Quadrature::triangle] that integrates polynomials of the given degree exactly
fn triangle_order_for_degree(degree: usize) -> usize {
    match degree {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 3,
        5 => 4,
        // collapsed Gauss rules with q points are exact up to degree 2q - 2
        _ => ((degree + 3) / 2).max(5),
    }
}

/// Local matrices of `(c u, v)`
pub struct ScalarMassIntegrator {
    pub coef: f64,
    /// Quadrature order (`p + 2` when unset)
    pub q: Option<usize>,
}

impl Default for ScalarMassIntegrator {
    fn default() -> Self {
        Self { coef: 1.0, q: None }
    }
}

impl ScalarMassIntegrator {
    pub fn new(coef: f64, q: Option<usize>) -> Self {
        Self { coef, q }
    }

    pub fn assembly_cell_matrix<M: Mesh2d>(&self, space: &LagrangeFESpace<M>) -> Vec<DMatrix<f64>> {
        let mesh = space.mesh();
        let quad = mesh.cell_quadrature(self.q.unwrap_or(space.degree() + 2));
        let ldof = space.number_of_local_dofs();

        (0..mesh.number_of_cells())
            .into_par_iter()
            .map(|cell_id| {
                let mut m = DMatrix::zeros(ldof, ldof);
                for (bc, w) in quad.iter() {
                    let scale = self.coef * w * mesh.cell_measure_at(cell_id, bc);
                    let phi = space.basis(bc);
                    for (i, pi) in phi.iter().enumerate() {
                        for (j, pj) in phi.iter().enumerate() {
                            m[(i, j)] += scale * pi * pj;
                        }
                    }
                }
                m
            })
            .collect()
    }
}

/// Local load vectors of `(f, v)`
pub struct ScalarSourceIntegrator<F> {
    pub f: F,
    /// Quadrature order (`p + 2` when unset)
    pub q: Option<usize>,
}

impl<F> ScalarSourceIntegrator<F>
where
    F: Fn(&Point) -> f64 + Sync,
{
    pub fn new(f: F, q: Option<usize>) -> Self {
        Self { f, q }
    }

    pub fn assembly_cell_vector<M: Mesh2d>(&self, space: &LagrangeFESpace<M>) -> Vec<Vec<f64>> {
        let mesh = space.mesh();
        let quad = mesh.cell_quadrature(self.q.unwrap_or(space.degree() + 2));
        let ldof = space.number_of_local_dofs();

        (0..mesh.number_of_cells())
            .into_par_iter()
            .map(|cell_id| {
                let mut b = vec![0.0; ldof];
                for (bc, w) in quad.iter() {
                    let scale = w * mesh.cell_measure_at(cell_id, bc) * (self.f)(&mesh.bc_to_point(cell_id, bc));
                    for (bi, phi) in b.iter_mut().zip(space.basis(bc)) {
                        *bi += scale * phi;
                    }
                }
                b
            })
            .collect()
    }
}

/// Penalty on the jump of the normal derivative across interior edges: `γ Σ_e ∫_e [∂ₙu] [∂ₙv]`
pub struct ScalarInteriorPenaltyIntegrator {
    /// Quadrature order (`p + 3` when unset)
    pub q: Option<usize>,
    pub gamma: f64,
}

impl Default for ScalarInteriorPenaltyIntegrator {
    fn default() -> Self {
        Self {
            q: None,
            gamma: 1.0,
        }
    }
}

impl ScalarInteriorPenaltyIntegrator {
    pub fn new(q: Option<usize>, gamma: f64) -> Self {
        Self { q, gamma }
    }

    /// Global penalty matrix
    pub fn assembly_face_matrix<M: Mesh2d>(&self, space: &LagrangeFESpace<M>) -> SparseMatrix {
        let mesh = space.mesh();
        let q = self.q.unwrap_or(space.degree() + 3);
        let quad = mesh.edge_quadrature(q);

        let inner_edges = space.inner_edge_to_cell_dof();
        let jumps = space.grad_normal_jump_basis(q);

        let mut penalty = SparseMatrix::square(space.number_of_global_dofs());
        penalty.par_extend(inner_edges.par_iter().zip(jumps.par_iter()).map(
            |(ie, edge_jumps)| {
                // γ w |dx/dt| at each quadrature point
                let weights: Vec<f64> = quad
                    .iter()
                    .map(|(bc, w)| self.gamma * w * mesh.edge_tangent_at(ie.edge, bc).norm())
                    .collect();
                let mut entries = Vec::with_capacity(ie.dofs.len() * ie.dofs.len());
                for (i, di) in ie.dofs.iter().enumerate() {
                    for (j, dj) in ie.dofs.iter().enumerate() {
                        let value: f64 = edge_jumps
                            .iter()
                            .zip(weights.iter())
                            .map(|(jump, w)| w * jump[i] * jump[j])
                            .sum();
                        entries.push(([*di, *dj], value));
                    }
                }
                entries
            },
        ));

        log::debug!(
            "Assembled interior penalty matrix over {} interior edges",
            inner_edges.len()
        );
        penalty
    }
}

fn scatter_cell_matrix(cell_dofs: &[usize], k: &DMatrix<f64>) -> Vec<([usize; 2], f64)> {
    let mut entries = Vec::with_capacity(cell_dofs.len() * cell_dofs.len());
    for (i, di) in cell_dofs.iter().enumerate() {
        for (j, dj) in cell_dofs.iter().enumerate() {
            entries.push(([*di, *dj], k[(i, j)]));
        }
    }
    entries
}

/// Sum the local matrices into a global sparse matrix
pub fn assemble_global_matrix<M: Mesh2d>(
    space: &LagrangeFESpace<M>,
    cell_matrices: &[DMatrix<f64>],
) -> Result<SparseMatrix, AssemblyError> {
    let cell_to_dof = space.cell_to_dof();
    if cell_matrices.len() != cell_to_dof.len() {
        return Err(AssemblyError::DimensionMismatch {
            expected: cell_to_dof.len(),
            found: cell_matrices.len(),
        });
    }

    let mut global = SparseMatrix::square(space.number_of_global_dofs());
    global.par_extend(
        cell_to_dof
            .par_iter()
            .zip(cell_matrices.par_iter())
            .map(|(dofs, k)| scatter_cell_matrix(dofs, k)),
    );

    Ok(global)
}

/// Sum the local vectors into a global vector
pub fn assemble_global_vector<M: Mesh2d>(
    space: &LagrangeFESpace<M>,
    cell_vectors: &[Vec<f64>],
) -> Result<Vec<f64>, AssemblyError> {
    let cell_to_dof = space.cell_to_dof();
    if cell_vectors.len() != cell_to_dof.len() {
        return Err(AssemblyError::DimensionMismatch {
            expected: cell_to_dof.len(),
            found: cell_vectors.len(),
        });
    }

    let mut global = DenseVector::zeros(space.number_of_global_dofs());
    global.par_extend(
        cell_to_dof
            .par_iter()
            .zip(cell_vectors.par_iter())
            .map(|(dofs, b)| -> VectorGroup {
                dofs.iter().copied().zip(b.iter().copied()).collect()
            }),
    );

    Ok(global.into_inner())
}

/// Global matrix and right hand side from local contributions
pub fn assemble_system<M: Mesh2d>(
    space: &LagrangeFESpace<M>,
    cell_matrices: &[DMatrix<f64>],
    cell_vectors: &[Vec<f64>],
) -> Result<LinearSystem, AssemblyError> {
    let cell_to_dof = space.cell_to_dof();
    for found in [cell_matrices.len(), cell_vectors.len()] {
        if found != cell_to_dof.len() {
            return Err(AssemblyError::DimensionMismatch {
                expected: cell_to_dof.len(),
                found,
            });
        }
    }

    let mut system = LinearSystem::new(space.number_of_global_dofs());
    system.par_extend(
        cell_to_dof
            .par_iter()
            .zip(cell_matrices.par_iter().zip(cell_vectors.par_iter()))
            .map(|(dofs, (k, b))| {
                (
                    scatter_cell_matrix(dofs, k),
                    dofs.iter().copied().zip(b.iter().copied()).collect(),
                )
            }),
    );

    log::debug!(
        "Assembled linear system with {} dofs and {} matrix entries",
        system.num_dofs(),
        system.a.num_entries()
    );
    Ok(system)
}

/// Dirichlet boundary condition `u = g` on (part of) the boundary
#[derive(Debug, Clone)]
pub struct DirichletBC {
    is_boundary_dof: Vec<bool>,
    values: Vec<f64>,
}

impl DirichletBC {
    /// Fix the boundary DOFs (optionally only those on edges whose midpoint satisfies `threshold`) to the values of `g`
    pub fn new<M, F>(
        space: &LagrangeFESpace<M>,
        g: F,
        threshold: Option<&dyn Fn(&Point) -> bool>,
    ) -> Self
    where
        M: Mesh2d,
        F: Fn(&Point) -> f64 + Sync,
    {
        let is_boundary_dof = space.is_boundary_dof(threshold);
        let values = space
            .interpolate(g)
            .into_iter()
            .zip(is_boundary_dof.iter())
            .map(|(v, bd)| if *bd { v } else { 0.0 })
            .collect();

        Self {
            is_boundary_dof,
            values,
        }
    }

    pub fn is_boundary_dof(&self) -> &[bool] {
        &self.is_boundary_dof
    }

    /// Boundary values (zero away from the boundary)
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Eliminate the fixed DOFs: their rows and columns are replaced by the identity and the right hand side is corrected
    pub fn apply(&self, system: &mut LinearSystem) -> Result<(), AssemblyError> {
        if system.num_dofs() != self.values.len() {
            return Err(AssemblyError::DimensionMismatch {
                expected: self.values.len(),
                found: system.num_dofs(),
            });
        }

        let correction = system.a.mul_vec(&self.values);
        for (bi, ci) in system.b.iter_mut().zip(correction) {
            *bi -= ci;
        }

        system.a.zero_rows_and_cols(&self.is_boundary_dof);
        for (dof, value) in self
            .is_boundary_dof
            .iter()
            .zip(self.values.iter())
            .enumerate()
            .filter_map(|(dof, (bd, v))| if *bd { Some((dof, v)) } else { None })
        {
            system.a.set([dof, dof], 1.0);
            system.b[dof] = *value;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::lagrange_quadrangle::LagrangeQuadrangleMesh;
    use crate::mesh::quadrangle::{QuadrangleMesh, QuadrangleShape};
    use crate::mesh::triangle::TriangleShape;

    #[test]
    fn diffusion_matrices_annihilate_constants() {
        let mesh = QuadrangleMesh::from_one_quadrangle(QuadrangleShape::Rhombus);
        let space = LagrangeFESpace::new(&mesh, 2);
        let k = ScalarDiffusionIntegrator::default()
            .assembly_cell_matrix(&space)
            .unwrap();

        assert_eq!(k.len(), 1);
        assert_eq!(k[0].shape(), (9, 9));
        for i in 0..9 {
            assert!(k[0].row(i).sum().abs() < 1e-12);
            for j in 0..9 {
                assert!((k[0][(i, j)] - k[0][(j, i)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn linear_triangle_stiffness() {
        let mesh = TriangleMesh::from_one_triangle(TriangleShape::Isosceles);
        let space = LagrangeFESpace::new(&mesh, 1);
        let k = ScalarDiffusionIntegrator::new(DiffusionCoef::Constant(2.0), None)
            .assembly_cell_matrix(&space)
            .unwrap();

        let expected = [[2.0, -1.0, -1.0], [-1.0, 1.0, 0.0], [-1.0, 0.0, 1.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert!((k[0][(i, j)] - expected[i][j]).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn fast_assembly_matches_quadrature() {
        let mesh = TriangleMesh::from_box([0.0, 1.0, 0.0, 2.0], 2, 3, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 3);
        let coef: Vec<f64> = (0..mesh.number_of_cells()).map(|c| 1.0 + c as f64).collect();

        let integrator = ScalarDiffusionIntegrator::new(DiffusionCoef::PerCell(coef), None);
        let slow = integrator.assembly_cell_matrix(&space).unwrap();
        let fast = integrator.assembly_cell_matrix_fast(&space).unwrap();

        for (ks, kf) in slow.iter().zip(fast.iter()) {
            assert!((ks - kf).abs().max() < 1e-10);
        }

        let tensor = ScalarDiffusionIntegrator::new(DiffusionCoef::Tensor(M2D::identity()), None);
        assert!(matches!(
            tensor.assembly_cell_matrix_fast(&space),
            Err(AssemblyError::UnsupportedCoefficient(_))
        ));
    }

    #[test]
    fn fast_assembly_with_variable_coefficients() {
        let mesh = TriangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 3, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 2);
        let c = |p: &Point| 1.0 + p.x + 2.0 * p.y;

        let slow = ScalarDiffusionIntegrator::new(DiffusionCoef::Function(Box::new(c)), Some(4))
            .assembly_cell_matrix(&space)
            .unwrap();
        let fast = ScalarDiffusionIntegrator::new(DiffusionCoef::Function(Box::new(c)), Some(4))
            .assembly_cell_matrix_fast(&space)
            .unwrap();
        for (ks, kf) in slow.iter().zip(fast.iter()) {
            assert!((ks - kf).abs().max() < 1e-10);
        }

        // the same coefficient as linear DOFs on each cell
        let linear_space = LagrangeFESpace::new(&mesh, 1);
        let c_h = linear_space.interpolate(c);
        let values: Vec<Vec<f64>> = linear_space
            .cell_to_dof()
            .iter()
            .map(|dofs| dofs.iter().map(|d| c_h[*d]).collect())
            .collect();
        let by_dofs = ScalarDiffusionIntegrator::new(
            DiffusionCoef::CellDofs { degree: 1, values },
            Some(4),
        );
        let dofs_slow = by_dofs.assembly_cell_matrix(&space).unwrap();
        let dofs_fast = by_dofs.assembly_cell_matrix_fast(&space).unwrap();
        for ((ks, kd), kf) in slow.iter().zip(dofs_slow.iter()).zip(dofs_fast.iter()) {
            assert!((ks - kd).abs().max() < 1e-10);
            assert!((ks - kf).abs().max() < 1e-10);
        }

        let short = ScalarDiffusionIntegrator::new(
            DiffusionCoef::CellDofs {
                degree: 1,
                values: vec![vec![1.0; 4]; mesh.number_of_cells()],
            },
            None,
        );
        assert!(matches!(
            short.assembly_cell_matrix_fast(&space),
            Err(AssemblyError::CoefficientShape { expected: 3, found: 4, .. })
        ));
    }

    #[test]
    fn coefficient_kinds_agree() {
        let mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 1);
        let nc = mesh.number_of_cells();
        let nq = 4;

        let coefs = vec![
            DiffusionCoef::Constant(3.0),
            DiffusionCoef::PerCell(vec![3.0; nc]),
            DiffusionCoef::PerQuadPoint(vec![vec![3.0; nc]; nq]),
            DiffusionCoef::Tensor(M2D::from([3.0, 0.0], [0.0, 3.0])),
            DiffusionCoef::PerCellTensor(vec![M2D::from([3.0, 0.0], [0.0, 3.0]); nc]),
            DiffusionCoef::PerQuadPointTensor(vec![vec![M2D::from([3.0, 0.0], [0.0, 3.0]); nc]; nq]),
            DiffusionCoef::Function(Box::new(|_| 3.0)),
        ];

        let reference = ScalarDiffusionIntegrator::new(DiffusionCoef::Identity, Some(2))
            .assembly_cell_matrix(&space)
            .unwrap();
        for coef in coefs {
            let k = ScalarDiffusionIntegrator::new(coef, Some(2))
                .assembly_cell_matrix(&space)
                .unwrap();
            for (kc, kr) in k.iter().zip(reference.iter()) {
                assert!((kc - kr * 3.0).abs().max() < 1e-12);
            }
        }
    }

    #[test]
    fn coefficient_shape_errors() {
        let mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 1);

        let bad_cells = ScalarDiffusionIntegrator::new(DiffusionCoef::PerCell(vec![1.0; 3]), None);
        assert!(matches!(
            bad_cells.assembly_cell_matrix(&space),
            Err(AssemblyError::CoefficientShape { expected: 4, found: 3, .. })
        ));

        let bad_points =
            ScalarDiffusionIntegrator::new(DiffusionCoef::PerQuadPoint(vec![vec![1.0; 4]; 9]), Some(2));
        assert!(matches!(
            bad_points.assembly_cell_matrix(&space),
            Err(AssemblyError::CoefficientShape { expected: 4, found: 9, .. })
        ));
    }

    #[test]
    fn mass_and_source() {
        let mesh = QuadrangleMesh::from_one_quadrangle(QuadrangleShape::Rectangle);
        let space = LagrangeFESpace::new(&mesh, 2);

        let m = ScalarMassIntegrator::default().assembly_cell_matrix(&space);
        assert!((m[0].sum() - 2.0).abs() < 1e-12);

        let b = ScalarSourceIntegrator::new(|p: &Point| p.x, None).assembly_cell_vector(&space);
        // ∫ x over [0, 2] x [0, 1]
        assert!((b[0].iter().sum::<f64>() - 2.0).abs() < 1e-12);

        let global = assemble_global_vector(&space, &b).unwrap();
        assert_eq!(global.len(), space.number_of_global_dofs());
        assert!(matches!(
            assemble_global_vector(&space, &[]),
            Err(AssemblyError::DimensionMismatch { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn global_vector_sums_cell_contributions() {
        let mesh = TriangleMesh::from_box([0.0, 2.0, 0.0, 1.0], 4, 3, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 2);
        let b = ScalarSourceIntegrator::new(|_: &Point| 1.0, None).assembly_cell_vector(&space);
        let global = assemble_global_vector(&space, &b).unwrap();

        assert!((global.iter().sum::<f64>() - 2.0).abs() < 1e-12);

        let mut expected = vec![0.0; space.number_of_global_dofs()];
        for (dofs, bc) in space.cell_to_dof().iter().zip(b.iter()) {
            for (d, v) in dofs.iter().zip(bc.iter()) {
                expected[*d] += v;
            }
        }
        for (g, e) in global.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-14);
        }
    }

    #[test]
    fn interior_penalty() {
        let mesh = TriangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 2);
        let penalty = ScalarInteriorPenaltyIntegrator::new(None, 2.0).assembly_face_matrix(&space);

        assert_eq!(penalty.shape(), [space.number_of_global_dofs(); 2]);
        assert!(penalty.is_symmetric(1e-12));

        let uh = space.interpolate(|p| 2.0 * p.x - p.y + 0.5);
        for value in penalty.mul_vec(&uh) {
            assert!(value.abs() < 1e-10);
        }

        let bump = space.interpolate(|p| p.x * p.x + p.y * p.y);
        let energy: f64 = bump
            .iter()
            .zip(penalty.mul_vec(&bump))
            .map(|(u, pu)| u * pu)
            .sum();
        assert!(energy >= -1e-12);
    }

    #[test]
    fn interior_penalty_follows_curved_edges() {
        // two stacked unit squares; the shared edge bulges up into y = 1 + 4 δ x (1 - x)
        let delta = 0.1;
        let quad_mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 2.0], 1, 2, None).unwrap();
        let mut mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 2).unwrap();
        mesh.map_nodes(|p| {
            if (p.x - 0.5).abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12 {
                Point::new(0.5, 1.0 + delta)
            } else {
                *p
            }
        });
        let space = LagrangeFESpace::new(&mesh, 2);
        let q = 8;
        let penalty = ScalarInteriorPenaltyIntegrator::new(Some(q), 1.0).assembly_face_matrix(&space);

        // zero below the shared edge, the upper cell's reference coordinate above it
        let uh = space.interpolate(|p| if p.y < 1.0 + delta + 1e-12 { 0.0 } else { p.y - 1.0 });
        let energy: f64 = uh
            .iter()
            .zip(penalty.mul_vec(&uh))
            .map(|(u, pu)| u * pu)
            .sum();

        // ∂ₙu = |dx/dξ| / (∂y/∂η) along the edge, integrated against |dx/dξ|
        let expected: f64 = mesh
            .edge_quadrature(q)
            .iter()
            .map(|(bc, w)| {
                let xi = bc[1];
                let tangent = (1.0 + (4.0 * delta * (1.0 - 2.0 * xi)).powi(2)).sqrt();
                let stretch = 1.0 - 12.0 * delta * xi * (1.0 - xi);
                w * tangent.powi(3) / (stretch * stretch)
            })
            .sum();
        assert!((energy - expected).abs() < 1e-10);
    }

    #[test]
    fn dirichlet_elimination() {
        let mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 1);
        let k = ScalarDiffusionIntegrator::default()
            .assembly_cell_matrix(&space)
            .unwrap();
        let b = vec![vec![0.0; 4]; 4];

        let mut system = assemble_system(&space, &k, &b).unwrap();
        let bc = DirichletBC::new(&space, |p: &Point| p.x + p.y, None);
        bc.apply(&mut system).unwrap();

        assert!(system.a.is_symmetric(1e-12));
        assert_eq!(bc.is_boundary_dof().iter().filter(|f| **f).count(), 8);

        let u = system.solve_dense().unwrap();
        let exact = space.interpolate(|p| p.x + p.y);
        for (ui, ei) in u.iter().zip(exact.iter()) {
            assert!((ui - ei).abs() < 1e-12);
        }
    }
}
