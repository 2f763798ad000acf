use super::space::{Point, M2D, V2D};
use super::tensor::{self, IDENTITY_TENSOR_ORDER};
use super::topology::{MeshTopology, TENSOR_QUADRANGLE_LOCAL_EDGE};
use super::{Mesh2d, MeshError};
use crate::linalg::SparseMatrix;
use crate::quadrature::{Quadrature, TensorBc};
use crate::shape_fns::{tensor_reference_grads, tensor_shape_function};

use rayon::prelude::*;

/// Structured mesh of a rectangular grid with spacing `h`
///
/// The grid covers the index range `extent = [i0, i1, j0, j1]`; node `(i, j)` sits at
/// `origin + ((i0 + i) hx, (j0 + j) hy)` and is numbered `i * (ny + 1) + j`.
///
/// Cells are numbered `i * ny + j` and store their vertices in tensor order:
///
/// ```text
///     1 --------- 3
///     |           |
///     |           |
///     0 --------- 2
/// ```
///
/// The `nx * (ny + 1)` x-directed edges come first, followed by the `(nx + 1) * ny` y-directed edges. Boundary edges on
/// the top and left sides are reversed so that the boundary is traversed counter-clockwise.
#[derive(Debug, Clone)]
pub struct UniformMesh2d {
    extent: [isize; 4],
    h: [f64; 2],
    origin: [f64; 2],
    nodes: Vec<Point>,
    topology: MeshTopology,
}

impl UniformMesh2d {
    pub fn new(extent: [isize; 4], h: [f64; 2], origin: [f64; 2]) -> Result<Self, MeshError> {
        if extent[1] <= extent[0] || extent[3] <= extent[2] {
            return Err(MeshError::InvalidParameter(format!(
                "uniform mesh extent {:?} is empty",
                extent
            )));
        }
        if h[0] <= 0.0 || h[1] <= 0.0 {
            return Err(MeshError::InvalidParameter(format!(
                "uniform mesh spacing {:?} must be positive",
                h
            )));
        }

        let nx = (extent[1] - extent[0]) as usize;
        let ny = (extent[3] - extent[2]) as usize;
        let idx = |i: usize, j: usize| i * (ny + 1) + j;

        let nodes: Vec<Point> = (0..=nx)
            .flat_map(|i| {
                (0..=ny).map(move |j| {
                    Point::new(
                        origin[0] + (extent[0] + i as isize) as f64 * h[0],
                        origin[1] + (extent[2] + j as isize) as f64 * h[1],
                    )
                })
            })
            .collect();

        let x_edges = (0..nx).flat_map(|i| {
            (0..=ny).map(move |j| {
                if j == ny {
                    [idx(i + 1, j), idx(i, j)]
                } else {
                    [idx(i, j), idx(i + 1, j)]
                }
            })
        });
        let y_edges = (0..=nx).flat_map(|i| {
            (0..ny).map(move |j| {
                if i == 0 {
                    [idx(i, j + 1), idx(i, j)]
                } else {
                    [idx(i, j), idx(i, j + 1)]
                }
            })
        });
        let edges: Vec<[usize; 2]> = x_edges.chain(y_edges).collect();

        let cells: Vec<usize> = (0..nx)
            .flat_map(|i| {
                (0..ny).flat_map(move |j| [idx(i, j), idx(i, j + 1), idx(i + 1, j), idx(i + 1, j + 1)])
            })
            .collect();

        let topology = MeshTopology::from_parts(
            nodes.len(),
            cells,
            4,
            &TENSOR_QUADRANGLE_LOCAL_EDGE,
            edges,
        )?;

        Ok(Self {
            extent,
            h,
            origin,
            nodes,
            topology,
        })
    }

    pub fn extent(&self) -> [isize; 4] {
        self.extent
    }

    pub fn h(&self) -> [f64; 2] {
        self.h
    }

    pub fn origin(&self) -> [f64; 2] {
        self.origin
    }

    /// Number of cells in the x and y directions
    pub fn shape(&self) -> [usize; 2] {
        [
            (self.extent[1] - self.extent[0]) as usize,
            (self.extent[3] - self.extent[2]) as usize,
        ]
    }

    pub fn quadrature_formula(&self, q: usize) -> Quadrature<TensorBc> {
        self.cell_quadrature(q)
    }

    /// Values of `f` at the nodes
    pub fn interpolate<F>(&self, f: F) -> Vec<f64>
    where
        F: Fn(&Point) -> f64 + Sync,
    {
        self.nodes.par_iter().map(|p| f(p)).collect()
    }

    /// 5-point finite difference discretization of `-Δ` over all nodes (without boundary conditions)
    pub fn laplace_operator(&self) -> SparseMatrix {
        let [nx, ny] = self.shape();
        let (cx, cy) = (1.0 / self.h[0].powi(2), 1.0 / self.h[1].powi(2));
        let idx = |i: usize, j: usize| i * (ny + 1) + j;

        let mut laplace = SparseMatrix::new(self.number_of_nodes(), self.number_of_nodes());
        for i in 0..=nx {
            for j in 0..=ny {
                let node = idx(i, j);
                laplace.insert([node, node], 2.0 * (cx + cy));
                if i > 0 {
                    laplace.insert([node, idx(i - 1, j)], -cx);
                }
                if i < nx {
                    laplace.insert([node, idx(i + 1, j)], -cx);
                }
                if j > 0 {
                    laplace.insert([node, idx(i, j - 1)], -cy);
                }
                if j < ny {
                    laplace.insert([node, idx(i, j + 1)], -cy);
                }
            }
        }

        laplace
    }

    /// Halve the spacing and double the extent `n` times
    pub fn uniform_refine(&mut self, n: usize) -> Result<(), MeshError> {
        for _ in 0..n {
            *self = Self::new(
                self.extent.map(|e| 2 * e),
                [self.h[0] / 2.0, self.h[1] / 2.0],
                self.origin,
            )?;
        }
        log::debug!(
            "Uniformly refined structured mesh {} times: {:?} cells",
            n,
            self.shape()
        );
        Ok(())
    }

    fn tensor_nodes(&self, cell_id: usize) -> [&Point; 4] {
        let cell = self.topology.cell(cell_id);
        [
            &self.nodes[cell[0]],
            &self.nodes[cell[1]],
            &self.nodes[cell[2]],
            &self.nodes[cell[3]],
        ]
    }
}

impl Mesh2d for UniformMesh2d {
    type Bc = TensorBc;

    fn nodes(&self) -> &[Point] {
        &self.nodes
    }

    fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    fn reference_cell_measure(&self) -> f64 {
        1.0
    }

    fn cell_quadrature(&self, q: usize) -> Quadrature<TensorBc> {
        Quadrature::tensor_product(q)
    }

    fn bc_to_point(&self, cell_id: usize, bc: &TensorBc) -> Point {
        tensor::geometry_point(&self.tensor_nodes(cell_id), bc, 1)
    }

    fn jacobi_matrix(&self, _cell_id: usize, _bc: &TensorBc) -> M2D {
        M2D::from([self.h[0], 0.0], [0.0, self.h[1]])
    }

    fn shape_function(&self, bc: &TensorBc, p: usize) -> Vec<f64> {
        tensor_shape_function(bc, p)
    }

    fn grad_shape_function_ref(&self, bc: &TensorBc, p: usize) -> Vec<V2D> {
        tensor_reference_grads(bc, p)
    }

    fn grad_shape_function_x(&self, _cell_id: usize, bc: &TensorBc, p: usize) -> Vec<V2D> {
        tensor_reference_grads(bc, p)
            .into_iter()
            .map(|g| V2D::from([g[0] / self.h[0], g[1] / self.h[1]]))
            .collect()
    }

    fn local_ipoint_bcs(&self, p: usize) -> Vec<TensorBc> {
        tensor::local_ipoint_bcs(p)
    }

    fn number_of_local_ipoints(&self, p: usize) -> usize {
        (p + 1) * (p + 1)
    }

    fn number_of_global_ipoints(&self, p: usize) -> usize {
        tensor::number_of_global_ipoints(&self.topology, p)
    }

    fn cell_to_ipoint(&self, p: usize) -> Vec<Vec<usize>> {
        tensor::cell_to_ipoint(&self.topology, &IDENTITY_TENSOR_ORDER, p)
    }

    fn edge_bc_to_cell_bc(&self, cell_id: usize, local_edge: usize, edge_bc: &[f64; 2]) -> TensorBc {
        tensor::edge_bc_to_cell_bc(
            &self.topology,
            &IDENTITY_TENSOR_ORDER,
            cell_id,
            local_edge,
            edge_bc,
        )
    }

    fn cell_area(&self) -> Vec<f64> {
        vec![self.h[0] * self.h[1]; self.number_of_cells()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::EntityKind;

    fn two_by_one() -> UniformMesh2d {
        UniformMesh2d::new([0, 2, 0, 1], [0.5, 1.0], [0.0, 0.0]).unwrap()
    }

    #[test]
    fn structured_entities() {
        let mesh = two_by_one();

        assert_eq!(mesh.number_of_nodes(), 6);
        assert_eq!(mesh.number_of_edges(), 7);
        assert_eq!(mesh.number_of_cells(), 2);
        assert_eq!(mesh.nodes()[3], Point::new(0.5, 1.0));

        assert_eq!(
            mesh.topology().edges(),
            &[[0, 2], [3, 1], [2, 4], [5, 3], [1, 0], [2, 3], [4, 5]]
        );
        assert_eq!(mesh.topology().cell(1), &[2, 3, 4, 5]);

        // the shared edge [2, 3] is the right edge of cell 0 and the left edge of cell 1
        assert_eq!(mesh.topology().edge_to_cell()[5], [0, 1, 1, 3]);
        assert_eq!(mesh.topology().boundary_edge_index(), vec![0, 1, 2, 3, 4, 6]);
    }

    #[test]
    fn boundary_is_counter_clockwise() {
        let mesh = UniformMesh2d::new([0, 3, 0, 2], [1.0, 1.0], [0.0, 0.0]).unwrap();
        let centers = mesh.entity_barycenter(EntityKind::Cell);

        for (edge_id, [c0, _, _, _]) in mesh.topology().edge_to_cell().iter().enumerate() {
            let normal = mesh.edge_normal()[edge_id];
            let [p0, _] = mesh.edge_points(edge_id);
            assert!(normal.dot_with(&centers[*c0].vector_to(p0)) > 0.0);
        }

        let signs = mesh.topology().cell_to_edge_sign();
        for (edge_id, [c0, c1, i0, i1]) in mesh.topology().edge_to_cell().iter().enumerate() {
            assert!(signs[*c0][*i0], "edge {} disagrees with its first cell", edge_id);
            if c0 != c1 {
                assert!(!signs[*c1][*i1]);
            }
        }
    }

    #[test]
    fn measures() {
        let mesh = two_by_one();
        assert_eq!(mesh.entity_measure(EntityKind::Cell), vec![0.5, 0.5]);
        assert_eq!(
            mesh.entity_measure(EntityKind::Edge),
            vec![0.5, 0.5, 0.5, 0.5, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn laplace_annihilates_linear_functions() {
        let mesh = UniformMesh2d::new([0, 4, 0, 3], [0.25, 0.5], [-1.0, 1.0]).unwrap();
        let laplace = mesh.laplace_operator();
        let u = mesh.interpolate(|p| 2.0 * p.x - p.y + 3.0);
        let lu = laplace.mul_vec(&u);

        let [nx, ny] = mesh.shape();
        for i in 1..nx {
            for j in 1..ny {
                assert!(lu[i * (ny + 1) + j].abs() < 1e-10);
            }
        }
        assert!(laplace.is_symmetric(1e-14));
    }

    #[test]
    fn refinement() {
        let mut mesh = two_by_one();
        mesh.uniform_refine(1).unwrap();

        assert_eq!(mesh.extent(), [0, 4, 0, 2]);
        assert_eq!(mesh.h(), [0.25, 0.5]);
        assert_eq!(mesh.number_of_nodes(), 15);
        assert_eq!(mesh.nodes()[14], Point::new(1.0, 1.0));
    }

    #[test]
    fn physical_gradients_match_jacobian() {
        let mesh = two_by_one();
        let bc = TensorBc::from_reference([0.3, 0.8]);

        let fast = mesh.grad_shape_function_x(1, &bc, 2);
        let jinv_t = mesh.jacobi_matrix(1, &bc).inverse().transpose();
        for (f, r) in fast.iter().zip(mesh.grad_shape_function_ref(&bc, 2)) {
            let g = jinv_t * r;
            assert!((f[0] - g[0]).abs() < 1e-12 && (f[1] - g[1]).abs() < 1e-12);
        }
        assert!((mesh.cell_measure_at(0, &bc) - 0.5).abs() < 1e-14);
    }

    #[test]
    fn empty_extent() {
        assert!(UniformMesh2d::new([0, 0, 0, 1], [1.0, 1.0], [0.0, 0.0]).is_err());
        assert!(UniformMesh2d::new([0, 1, 0, 1], [0.0, 1.0], [0.0, 0.0]).is_err());
    }
}
