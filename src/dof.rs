use crate::mesh::space::{Point, V2D};
use crate::mesh::{EntityKind, Mesh2d};
use rayon::prelude::*;

/// Continuous, degree `p` Lagrange finite element space over a mesh
///
/// The global DOFs are the mesh's degree `p` interpolation points: nodes, then edge interiors, then cell interiors.
pub struct LagrangeFESpace<'m, M: Mesh2d> {
    mesh: &'m M,
    p: usize,
    cell_to_dof: Vec<Vec<usize>>,
}

/// DOFs of the two cells sharing an interior edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerEdgeDofs {
    pub edge: usize,
    /// The first cell's DOFs in local order, followed by the second cell's DOFs that are not on the edge
    pub dofs: Vec<usize>,
    /// Position in `dofs` of each local DOF of the first and second cell
    pub positions: [Vec<usize>; 2],
}

impl<'m, M: Mesh2d> LagrangeFESpace<'m, M> {
    pub fn new(mesh: &'m M, p: usize) -> Self {
        assert!(p > 0, "Lagrange spaces are only defined for p >= 1!");
        let cell_to_dof = mesh.cell_to_ipoint(p);
        log::debug!(
            "Degree {} Lagrange space with {} global dofs",
            p,
            mesh.number_of_global_ipoints(p)
        );

        Self {
            mesh,
            p,
            cell_to_dof,
        }
    }

    pub fn mesh(&self) -> &'m M {
        self.mesh
    }

    pub fn degree(&self) -> usize {
        self.p
    }

    pub fn number_of_global_dofs(&self) -> usize {
        self.mesh.number_of_global_ipoints(self.p)
    }

    pub fn number_of_local_dofs(&self) -> usize {
        self.mesh.number_of_local_ipoints(self.p)
    }

    /// Number of DOFs on a single entity (including those on its closure)
    pub fn number_of_entity_dofs(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => 1,
            EntityKind::Edge | EntityKind::Face => self.p + 1,
            EntityKind::Cell => self.number_of_local_dofs(),
        }
    }

    pub fn cell_to_dof(&self) -> &[Vec<usize>] {
        &self.cell_to_dof
    }

    pub fn edge_to_dof(&self) -> Vec<Vec<usize>> {
        self.mesh.edge_to_ipoint(self.p)
    }

    pub fn interpolation_points(&self) -> Vec<Point> {
        self.mesh.interpolation_points(self.p)
    }

    /// Flag the DOFs on boundary edges; with a `threshold`, only edges whose midpoint satisfies it
    pub fn is_boundary_dof(&self, threshold: Option<&dyn Fn(&Point) -> bool>) -> Vec<bool> {
        boundary_dof_flags(self.mesh, self.p, threshold)
    }

    /// Nodal interpolant of `f`
    pub fn interpolate<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(&Point) -> f64 + Sync,
    {
        self.interpolation_points().par_iter().map(&f).collect()
    }

    /// Values of the local basis functions at a point of the reference cell
    pub fn basis(&self, bc: &M::Bc) -> Vec<f64> {
        self.mesh.shape_function(bc, self.p)
    }

    /// Gradients of the local basis functions of a cell with respect to `(x, y)`
    pub fn grad_basis(&self, cell_id: usize, bc: &M::Bc) -> Vec<V2D> {
        self.mesh.grad_shape_function_x(cell_id, bc, self.p)
    }

    /// Value of the finite element function `uh` at a point of a cell
    pub fn value(&self, uh: &[f64], cell_id: usize, bc: &M::Bc) -> f64 {
        assert_eq!(uh.len(), self.number_of_global_dofs());
        self.cell_to_dof[cell_id]
            .iter()
            .zip(self.basis(bc))
            .map(|(dof, phi)| uh[*dof] * phi)
            .sum()
    }

    /// Gradient of the finite element function `uh` at a point of a cell
    pub fn grad_value(&self, uh: &[f64], cell_id: usize, bc: &M::Bc) -> V2D {
        assert_eq!(uh.len(), self.number_of_global_dofs());
        self.cell_to_dof[cell_id]
            .iter()
            .zip(self.grad_basis(cell_id, bc))
            .fold(V2D::zero(), |grad, (dof, g)| grad + g * uh[*dof])
    }

    /// DOFs of the cells on either side of each interior edge, in interior edge order
    pub fn inner_edge_to_cell_dof(&self) -> Vec<InnerEdgeDofs> {
        let topo = self.mesh.topology();

        topo.edge_to_cell()
            .iter()
            .enumerate()
            .filter(|(_, [c0, c1, _, _])| c0 != c1)
            .map(|(edge_id, [c0, c1, _, _])| {
                let dofs0 = &self.cell_to_dof[*c0];
                let dofs1 = &self.cell_to_dof[*c1];

                let mut dofs = dofs0.clone();
                let positions1 = dofs1
                    .iter()
                    .map(|dof| match dofs0.iter().position(|d| d == dof) {
                        Some(pos) => pos,
                        None => {
                            dofs.push(*dof);
                            dofs.len() - 1
                        }
                    })
                    .collect();

                InnerEdgeDofs {
                    edge: edge_id,
                    dofs,
                    positions: [(0..dofs0.len()).collect(), positions1],
                }
            })
            .collect()
    }

    /// Jump of the normal derivative `∇φ|c0 · n - ∇φ|c1 · n` of every union DOF at the points of a `q` point edge rule
    ///
    /// Indexed by `[interior edge][quadrature point][position in InnerEdgeDofs::dofs]`; `n` is the unit normal pointing
    /// out of the edge's first cell at each quadrature point, so curved edges are followed exactly.
    pub fn grad_normal_jump_basis(&self, q: usize) -> Vec<Vec<Vec<f64>>> {
        let topo = self.mesh.topology();
        let quad = self.mesh.edge_quadrature(q);

        self.inner_edge_to_cell_dof()
            .par_iter()
            .map(|ie| {
                let [c0, c1, i0, i1] = topo.edge_to_cell()[ie.edge];

                quad.points()
                    .iter()
                    .map(|edge_bc| {
                        let n = self.mesh.edge_unit_normal_at(ie.edge, edge_bc);
                        let mut jump = vec![0.0; ie.dofs.len()];
                        for (side, (cell_id, local_edge), sign) in [
                            (0, (c0, i0), 1.0),
                            (1, (c1, i1), -1.0),
                        ] {
                            let bc = self.mesh.edge_bc_to_cell_bc(cell_id, local_edge, edge_bc);
                            for (pos, g) in ie.positions[side]
                                .iter()
                                .zip(self.grad_basis(cell_id, &bc))
                            {
                                jump[*pos] += sign * g.dot_with(&n);
                            }
                        }
                        jump
                    })
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn boundary_dof_flags<M: Mesh2d>(
    mesh: &M,
    p: usize,
    threshold: Option<&dyn Fn(&Point) -> bool>,
) -> Vec<bool> {
    let mut flags = vec![false; mesh.number_of_global_ipoints(p)];
    let edge_to_dof = mesh.edge_to_ipoint(p);
    let midpoints = mesh.entity_barycenter(EntityKind::Edge);

    for edge_id in mesh.boundary_edge_index() {
        if threshold.map_or(true, |t| t(&midpoints[edge_id])) {
            for dof in edge_to_dof[edge_id].iter() {
                flags[*dof] = true;
            }
        }
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::quadrangle::QuadrangleMesh;
    use crate::mesh::triangle::{TriangleMesh, TriangleShape};
    use crate::quadrature::TensorBc;

    fn linear(p: &Point) -> f64 {
        1.0 + 2.0 * p.x - 3.0 * p.y
    }

    #[test]
    fn quadratic_space_on_a_triangle() {
        let mesh = TriangleMesh::from_one_triangle(TriangleShape::Isosceles);
        let space = LagrangeFESpace::new(&mesh, 2);

        assert_eq!(space.number_of_global_dofs(), 6);
        assert_eq!(space.number_of_local_dofs(), 6);
        assert_eq!(space.number_of_entity_dofs(EntityKind::Edge), 3);
        assert!(space.is_boundary_dof(None).iter().all(|f| *f));
        assert!(space.inner_edge_to_cell_dof().is_empty());

        let uh = space.interpolate(linear);
        let bc = [0.2, 0.5, 0.3];
        let x = mesh.bc_to_point(0, &bc);
        assert!((space.value(&uh, 0, &bc) - linear(&x)).abs() < 1e-13);

        let grad = space.grad_value(&uh, 0, &bc);
        assert!((grad[0] - 2.0).abs() < 1e-13);
        assert!((grad[1] + 3.0).abs() < 1e-13);
    }

    #[test]
    fn basis_is_a_partition_of_unity() {
        let mesh = QuadrangleMesh::from_box([0.0, 2.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 3);
        let bc = TensorBc::from_reference([0.3, 0.8]);

        assert!((space.basis(&bc).iter().sum::<f64>() - 1.0).abs() < 1e-13);

        let grad_sum = space
            .grad_basis(2, &bc)
            .into_iter()
            .fold(V2D::zero(), |a, b| a + b);
        assert!(grad_sum.norm() < 1e-12);
    }

    #[test]
    fn inner_edge_dofs() {
        let mesh = QuadrangleMesh::from_box([0.0, 2.0, 0.0, 1.0], 2, 1, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 2);
        let inner = space.inner_edge_to_cell_dof();

        assert_eq!(inner.len(), 1);
        let ie = &inner[0];
        let [c0, c1, _, _] = mesh.topology().edge_to_cell()[ie.edge];
        assert_ne!(c0, c1);

        // two cells of nine dofs share the three dofs of the edge
        assert_eq!(ie.dofs.len(), 15);
        for (side, cell_id) in [c0, c1].iter().enumerate() {
            for (local, pos) in ie.positions[side].iter().enumerate() {
                assert_eq!(ie.dofs[*pos], space.cell_to_dof()[*cell_id][local]);
            }
        }
        for dof in space.edge_to_dof()[ie.edge].iter() {
            assert_eq!(ie.dofs.iter().filter(|d| *d == dof).count(), 1);
        }
    }

    #[test]
    fn linear_functions_have_no_normal_jump() {
        let mesh = TriangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let space = LagrangeFESpace::new(&mesh, 2);
        let uh = space.interpolate(linear);

        let inner = space.inner_edge_to_cell_dof();
        let jumps = space.grad_normal_jump_basis(3);
        assert_eq!(jumps.len(), inner.len());

        for (ie, edge_jumps) in inner.iter().zip(jumps.iter()) {
            assert_eq!(edge_jumps.len(), 3);
            for jump in edge_jumps {
                let value: f64 = jump.iter().zip(ie.dofs.iter()).map(|(j, d)| j * uh[*d]).sum();
                assert!(value.abs() < 1e-12);
            }
        }

        // a kink along the diagonal does jump
        let kink = space.interpolate(|p| (p.x - p.y).abs());
        let kink = &kink;
        let total: f64 = inner
            .iter()
            .zip(jumps.iter())
            .flat_map(|(ie, edge_jumps)| {
                edge_jumps.iter().map(move |jump| {
                    jump.iter()
                        .zip(ie.dofs.iter())
                        .map(|(j, d)| j * kink[*d])
                        .sum::<f64>()
                        .abs()
                })
            })
            .sum();
        assert!(total > 1e-3);
    }
}
