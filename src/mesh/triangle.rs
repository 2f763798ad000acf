use super::quadrangle::remove_unused_nodes;
use super::space::{Point, M2D, V2D};
use super::topology::{MeshTopology, TRIANGLE_LOCAL_EDGE};
use super::{EntityKind, Mesh2d, MeshError};
use crate::quadrature::Quadrature;
use crate::shape_fns::{lagrange_shape_function_2d, multi_index_matrix_2d, triangle_reference_grads};

/// Reference shapes for [TriangleMesh::from_one_triangle]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriangleShape {
    /// Unit sides
    Equilateral,
    /// The right triangle `(0, 0), (1, 0), (0, 1)`
    Isosceles,
}

/// Mesh of counter-clockwise, linear triangles. Local edge `i` is opposite to vertex `i`.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    nodes: Vec<Point>,
    topology: MeshTopology,
}

impl TriangleMesh {
    pub fn new(nodes: Vec<Point>, cells: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        let topology = MeshTopology::new(
            nodes.len(),
            cells.into_iter().flatten().collect(),
            3,
            &TRIANGLE_LOCAL_EDGE,
        )?;

        let mesh = Self { nodes, topology };
        let inverted = (0..mesh.number_of_cells())
            .filter(|cell_id| mesh.signed_area(*cell_id) <= 0.0)
            .count();
        if inverted > 0 {
            log::warn!("Triangle mesh has {} cells that are not counter-clockwise", inverted);
        }

        Ok(mesh)
    }

    /// A single-cell mesh
    pub fn from_one_triangle(shape: TriangleShape) -> Self {
        let nodes = match shape {
            TriangleShape::Equilateral => [[0.0, 0.0], [1.0, 0.0], [0.5, 3.0_f64.sqrt() / 2.0]],
            TriangleShape::Isosceles => [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        };

        Self {
            nodes: nodes.into_iter().map(Point::from).collect(),
            topology: MeshTopology::new(3, vec![0, 1, 2], 3, &TRIANGLE_LOCAL_EDGE)
                .expect("a single triangle is a valid mesh"),
        }
    }

    /// Structured mesh of the box `[x0, x1, y0, y1]`: `nx` by `ny` rectangles, each split into two triangles
    ///
    /// Node `i * (ny + 1) + j` sits at `(x_i, y_j)`. The cells come in two blocks of `nx * ny`: rectangle `i * ny + j`
    /// owns the lower-right triangle `i * ny + j` and the upper-left triangle `nx * ny + i * ny + j`. Cells whose
    /// barycenter satisfies the `threshold` are removed.
    pub fn from_box(
        bounds: [f64; 4],
        nx: usize,
        ny: usize,
        threshold: Option<&dyn Fn(&Point) -> bool>,
    ) -> Result<Self, MeshError> {
        if nx == 0 || ny == 0 {
            return Err(MeshError::InvalidParameter(format!(
                "box meshes need at least one cell in each direction (got {} x {})",
                nx, ny
            )));
        }
        let [x0, x1, y0, y1] = bounds;
        let (hx, hy) = ((x1 - x0) / nx as f64, (y1 - y0) / ny as f64);
        let idx = |i: usize, j: usize| i * (ny + 1) + j;

        let mut nodes: Vec<Point> = (0..=nx)
            .flat_map(|i| (0..=ny).map(move |j| Point::new(x0 + i as f64 * hx, y0 + j as f64 * hy)))
            .collect();

        let rectangles: Vec<(usize, usize)> =
            (0..nx).flat_map(|i| (0..ny).map(move |j| (i, j))).collect();
        let mut cells: Vec<[usize; 3]> = rectangles
            .iter()
            .map(|&(i, j)| [idx(i + 1, j), idx(i + 1, j + 1), idx(i, j)])
            .chain(
                rectangles
                    .iter()
                    .map(|&(i, j)| [idx(i, j + 1), idx(i, j), idx(i + 1, j + 1)]),
            )
            .collect();

        if let Some(threshold) = threshold {
            cells.retain(|cell| !threshold(&Point::centroid(cell.iter().map(|v| &nodes[*v]))));
            let (kept_nodes, renumbered) = remove_unused_nodes(&nodes, &cells);
            nodes = kept_nodes;
            cells = renumbered;
        }

        Self::new(nodes, cells)
    }

    /// Red refinement, `n` times: every triangle is split into four through its edge midpoints
    ///
    /// Old nodes keep their numbers and edge midpoints are appended in edge order. The children are stored in four blocks
    /// of `NC` cells: the corner children at vertex 0, 1 and 2, then the central children.
    pub fn uniform_refine(&mut self, n: usize) -> Result<(), MeshError> {
        for _ in 0..n {
            let nn = self.topology.number_of_nodes();
            let nc = self.topology.number_of_cells();

            let mut nodes = self.nodes.clone();
            nodes.extend(self.entity_barycenter(EntityKind::Edge));

            let mut cells = vec![[0; 3]; 4 * nc];
            for cell_id in 0..nc {
                let v = self.topology.cell(cell_id);
                let e = self.topology.cell_to_edge(cell_id);
                let e = [nn + e[0], nn + e[1], nn + e[2]];

                cells[cell_id] = [v[0], e[2], e[1]];
                cells[nc + cell_id] = [e[2], v[1], e[0]];
                cells[2 * nc + cell_id] = [e[1], e[0], v[2]];
                cells[3 * nc + cell_id] = [e[0], e[1], e[2]];
            }

            *self = Self::new(nodes, cells)?;
        }

        log::debug!(
            "Uniformly refined triangle mesh {} times: {} nodes, {} cells",
            n,
            self.number_of_nodes(),
            self.number_of_cells()
        );
        Ok(())
    }

    pub fn cell_points(&self, cell_id: usize) -> [&Point; 3] {
        let cell = self.topology.cell(cell_id);
        [
            &self.nodes[cell[0]],
            &self.nodes[cell[1]],
            &self.nodes[cell[2]],
        ]
    }

    fn signed_area(&self, cell_id: usize) -> f64 {
        let [p0, p1, p2] = self.cell_points(cell_id);
        p0.vector_to(p1).cross(&p0.vector_to(p2)) / 2.0
    }

    /// Gradients of the three barycentric coordinates of each cell (constant over the cell)
    ///
    /// ```
    /// use fem_mesh_2d::mesh::triangle::{TriangleMesh, TriangleShape};
    ///
    /// let mesh = TriangleMesh::from_one_triangle(TriangleShape::Isosceles);
    /// let [d0, d1, d2] = mesh.grad_lambda()[0];
    ///
    /// assert_eq!(d0.as_array(), [-1.0, -1.0]);
    /// assert_eq!(d1.as_array(), [1.0, 0.0]);
    /// assert_eq!(d2.as_array(), [0.0, 1.0]);
    /// ```
    pub fn grad_lambda(&self) -> Vec<[V2D; 3]> {
        (0..self.number_of_cells())
            .map(|cell_id| {
                let [p0, p1, p2] = self.cell_points(cell_id);
                let two_area = 2.0 * self.signed_area(cell_id);

                // the edge opposite to each vertex, rotated counter-clockwise
                [p1.vector_to(p2), p2.vector_to(p0), p0.vector_to(p1)]
                    .map(|v| V2D::from([-v[1], v[0]]) / two_area)
            })
            .collect()
    }
}

impl Mesh2d for TriangleMesh {
    type Bc = [f64; 3];

    fn nodes(&self) -> &[Point] {
        &self.nodes
    }

    fn topology(&self) -> &MeshTopology {
        &self.topology
    }

    fn reference_cell_measure(&self) -> f64 {
        0.5
    }

    fn cell_quadrature(&self, q: usize) -> Quadrature<[f64; 3]> {
        Quadrature::triangle(q)
    }

    fn bc_to_point(&self, cell_id: usize, bc: &[f64; 3]) -> Point {
        Point::weighted_sum(self.cell_points(cell_id).into_iter(), bc)
    }

    fn jacobi_matrix(&self, cell_id: usize, _bc: &[f64; 3]) -> M2D {
        let [p0, p1, p2] = self.cell_points(cell_id);
        M2D::from_cols(p0.vector_to(p1), p0.vector_to(p2))
    }

    fn shape_function(&self, bc: &[f64; 3], p: usize) -> Vec<f64> {
        lagrange_shape_function_2d(bc, p)
    }

    fn grad_shape_function_ref(&self, bc: &[f64; 3], p: usize) -> Vec<V2D> {
        triangle_reference_grads(bc, p)
    }

    fn local_ipoint_bcs(&self, p: usize) -> Vec<[f64; 3]> {
        assert!(p > 0, "Interpolation points are only defined for p >= 1!");
        multi_index_matrix_2d(p)
            .iter()
            .map(|m| m.map(|mk| mk as f64 / p as f64))
            .collect()
    }

    fn number_of_local_ipoints(&self, p: usize) -> usize {
        (p + 1) * (p + 2) / 2
    }

    fn number_of_global_ipoints(&self, p: usize) -> usize {
        assert!(p > 0, "Interpolation points are only defined for p >= 1!");
        let topo = &self.topology;
        topo.number_of_nodes()
            + (p - 1) * topo.number_of_edges()
            + (p - 1) * (p.max(2) - 2) / 2 * topo.number_of_cells()
    }

    fn cell_to_ipoint(&self, p: usize) -> Vec<Vec<usize>> {
        assert!(p > 0, "Interpolation points are only defined for p >= 1!");
        let topo = &self.topology;
        let nn = topo.number_of_nodes();
        let ne = topo.number_of_edges();
        let num_interior = (p - 1) * (p.max(2) - 2) / 2;
        let multi_index = multi_index_matrix_2d(p);

        (0..topo.number_of_cells())
            .map(|cell_id| {
                let cell = topo.cell(cell_id);
                let mut next_interior = nn + ne * (p - 1) + cell_id * num_interior;

                multi_index
                    .iter()
                    .map(|m| {
                        let zeros: Vec<usize> = (0..3).filter(|k| m[*k] == 0).collect();
                        match zeros.as_slice() {
                            // vertex
                            [_, _] => cell[(0..3).find(|k| m[*k] == p).unwrap_or(0)],
                            // interior of the local edge opposite to vertex k
                            [k] => {
                                let [a, b] = TRIANGLE_LOCAL_EDGE[*k];
                                let edge_id = topo.cell_to_edge(cell_id)[*k];
                                let steps = if topo.local_edge_agrees(cell_id, *k) {
                                    m[b]
                                } else {
                                    m[a]
                                };
                                nn + edge_id * (p - 1) + steps - 1
                            }
                            _ => {
                                next_interior += 1;
                                next_interior - 1
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }

    fn edge_bc_to_cell_bc(&self, cell_id: usize, local_edge: usize, edge_bc: &[f64; 2]) -> [f64; 3] {
        let [a, b] = TRIANGLE_LOCAL_EDGE[local_edge];
        let [wa, wb] = if self.topology.local_edge_agrees(cell_id, local_edge) {
            *edge_bc
        } else {
            [edge_bc[1], edge_bc[0]]
        };

        let mut bc = [0.0; 3];
        bc[a] = wa;
        bc[b] = wb;
        bc
    }

    fn cell_area(&self) -> Vec<f64> {
        (0..self.number_of_cells())
            .map(|cell_id| self.signed_area(cell_id).abs())
            .collect()
    }
}
