use super::space::{Point, M2D, V2D};
use super::tensor::{self, QUADRANGLE_TENSOR_ORDER};
use super::topology::{MeshTopology, QUADRANGLE_LOCAL_EDGE};
use super::triangle::TriangleMesh;
use super::{Mesh2d, MeshError};
use crate::quadrature::{Quadrature, TensorBc};
use crate::shape_fns::{tensor_reference_grads, tensor_shape_function};

/// Reference shapes for [QuadrangleMesh::from_one_quadrangle]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuadrangleShape {
    /// The unit square
    Square,
    /// `[0, 2] x [0, 1]`
    Rectangle,
    /// A rhombus with unit sides and a 60 degree corner at the origin
    Rhombus,
}

/// Mesh of counter-clockwise, bilinear quadrangles
///
/// ```text
///     3 --------- 2
///     |     2     |
///     |3         1|
///     |     0     |
///     0 --------- 1
/// ```
#[derive(Debug, Clone)]
pub struct QuadrangleMesh {
    nodes: Vec<Point>,
    topology: MeshTopology,
}

impl QuadrangleMesh {
    pub fn new(nodes: Vec<Point>, cells: Vec<[usize; 4]>) -> Result<Self, MeshError> {
        let topology = MeshTopology::new(
            nodes.len(),
            cells.into_iter().flatten().collect(),
            4,
            &QUADRANGLE_LOCAL_EDGE,
        )?;

        let mesh = Self { nodes, topology };
        let inverted = (0..mesh.number_of_cells())
            .filter(|cell_id| mesh.signed_area(*cell_id) <= 0.0)
            .count();
        if inverted > 0 {
            log::warn!("Quadrangle mesh has {} cells that are not counter-clockwise", inverted);
        }

        Ok(mesh)
    }

    /// A single-cell mesh
    pub fn from_one_quadrangle(shape: QuadrangleShape) -> Self {
        let nodes = match shape {
            QuadrangleShape::Square => [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            QuadrangleShape::Rectangle => [[0.0, 0.0], [2.0, 0.0], [2.0, 1.0], [0.0, 1.0]],
            QuadrangleShape::Rhombus => {
                let h = 3.0_f64.sqrt() / 2.0;
                [[0.0, 0.0], [1.0, 0.0], [1.5, h], [0.5, h]]
            }
        };

        Self {
            nodes: nodes.into_iter().map(Point::from).collect(),
            topology: MeshTopology::new(4, vec![0, 1, 2, 3], 4, &QUADRANGLE_LOCAL_EDGE)
                .expect("a single quadrangle is a valid mesh"),
        }
    }

    /// Structured `nx` by `ny` mesh of the box `[x0, x1, y0, y1]`
    ///
    /// Node `i * (ny + 1) + j` sits at `(x_i, y_j)`. Cells whose barycenter satisfies the `threshold` are removed,
    /// along with any nodes that are no longer used.
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

        let mut cells: Vec<[usize; 4]> = (0..nx)
            .flat_map(|i| {
                (0..ny).map(move |j| [idx(i, j), idx(i + 1, j), idx(i + 1, j + 1), idx(i, j + 1)])
            })
            .collect();

        if let Some(threshold) = threshold {
            let num_cells = cells.len();
            cells.retain(|cell| !threshold(&Point::centroid(cell.iter().map(|v| &nodes[*v]))));
            log::debug!("Box threshold removed {} of {} cells", num_cells - cells.len(), num_cells);

            let (kept_nodes, renumbered) = remove_unused_nodes(&nodes, &cells);
            nodes = kept_nodes;
            cells = renumbered;
        }

        Self::new(nodes, cells)
    }

    /// Split each triangle into three quadrangles through its edge midpoints and barycenter
    ///
    /// New nodes are numbered `[triangle nodes, edge midpoints, barycenters]`. The quadrangles at each triangle's
    /// vertex `k` are grouped together: cell `k * NC + c` is the child of triangle `c` at its local vertex `k`.
    pub fn from_triangle_mesh(tri_mesh: &TriangleMesh) -> Result<Self, MeshError> {
        let topo = tri_mesh.topology();
        let (nn, ne, nc) = (
            topo.number_of_nodes(),
            topo.number_of_edges(),
            topo.number_of_cells(),
        );

        let nodes: Vec<Point> = tri_mesh.nodes()[..nn]
            .iter()
            .cloned()
            .chain(tri_mesh.entity_barycenter(super::EntityKind::Edge))
            .chain(tri_mesh.entity_barycenter(super::EntityKind::Cell))
            .collect();

        let mut cells = vec![[0; 4]; 3 * nc];
        for cell_id in 0..nc {
            let v = topo.cell(cell_id);
            let e = topo.cell_to_edge(cell_id);
            let ctr = nn + ne + cell_id;

            cells[cell_id] = [v[0], nn + e[2], ctr, nn + e[1]];
            cells[nc + cell_id] = [v[1], nn + e[0], ctr, nn + e[2]];
            cells[2 * nc + cell_id] = [v[2], nn + e[1], ctr, nn + e[0]];
        }

        Self::new(nodes, cells)
    }

    /// Refine every cell into four children `n` times
    ///
    /// Old nodes keep their numbers; edge midpoints and then cell centers are appended.
    /// The children of cell `c` are cells `4c..4c + 4`.
    pub fn uniform_refine(&mut self, n: usize) -> Result<(), MeshError> {
        for _ in 0..n {
            let (nn, ne, nc) = (
                self.topology.number_of_nodes(),
                self.topology.number_of_edges(),
                self.topology.number_of_cells(),
            );

            let mut nodes = self.nodes.clone();
            nodes.extend(self.entity_barycenter(super::EntityKind::Edge));
            nodes.extend(self.entity_barycenter(super::EntityKind::Cell));

            let mut cells = Vec::with_capacity(4 * nc);
            for cell_id in 0..nc {
                let v = self.topology.cell(cell_id);
                let e: Vec<usize> = self
                    .topology
                    .cell_to_edge(cell_id)
                    .iter()
                    .map(|e| nn + e)
                    .collect();
                let c = nn + ne + cell_id;

                cells.push([v[0], e[0], c, e[3]]);
                cells.push([e[0], v[1], e[1], c]);
                cells.push([c, e[1], v[2], e[2]]);
                cells.push([e[3], c, e[2], v[3]]);
            }

            *self = Self::new(nodes, cells)?;
        }

        log::debug!(
            "Uniformly refined quadrangle mesh {} times: {} nodes, {} cells",
            n,
            self.number_of_nodes(),
            self.number_of_cells()
        );
        Ok(())
    }

    /// The cell's vertices in tensor order
    pub fn tensor_nodes(&self, cell_id: usize) -> [&Point; 4] {
        let cell = self.topology.cell(cell_id);
        QUADRANGLE_TENSOR_ORDER.map(|v| &self.nodes[cell[v]])
    }

    pub fn cell_points(&self, cell_id: usize) -> [&Point; 4] {
        let cell = self.topology.cell(cell_id);
        [
            &self.nodes[cell[0]],
            &self.nodes[cell[1]],
            &self.nodes[cell[2]],
            &self.nodes[cell[3]],
        ]
    }

    fn signed_area(&self, cell_id: usize) -> f64 {
        let pts = self.cell_points(cell_id);
        (0..4)
            .map(|i| {
                let (a, b) = (pts[i], pts[(i + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            / 2.0
    }

    // the two edges leaving each corner: towards the next and the previous vertex
    fn corner_edges(&self, cell_id: usize) -> [(V2D, V2D); 4] {
        let pts = self.cell_points(cell_id);
        [0, 1, 2, 3].map(|i| {
            (
                pts[i].vector_to(pts[(i + 1) % 4]),
                pts[i].vector_to(pts[(i + 3) % 4]),
            )
        })
    }

    /// Jacobian determinant of the bilinear map at each corner: the cross product of the two edges leaving the corner
    pub fn jacobi_at_corner(&self) -> Vec<[f64; 4]> {
        (0..self.number_of_cells())
            .map(|cell_id| {
                self.corner_edges(cell_id)
                    .map(|(next, prev)| next.cross(&prev))
            })
            .collect()
    }

    /// Interior angle at each corner
    pub fn angle(&self) -> Vec<[f64; 4]> {
        (0..self.number_of_cells())
            .map(|cell_id| {
                self.corner_edges(cell_id).map(|(next, prev)| {
                    (next.dot_with(&prev) / (next.norm() * prev.norm()))
                        .clamp(-1.0, 1.0)
                        .acos()
                })
            })
            .collect()
    }

    /// Ratio of the largest to the smallest corner Jacobian of each cell (1 for parallelograms)
    ///
    /// Cells with a non-positive corner Jacobian have infinite quality ratio.
    pub fn cell_quality(&self) -> Vec<f64> {
        self.jacobi_at_corner()
            .iter()
            .map(|jacs| {
                let min = jacs.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = jacs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                if min > 0.0 {
                    max / min
                } else {
                    f64::INFINITY
                }
            })
            .collect()
    }
}

impl Mesh2d for QuadrangleMesh {
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

    fn jacobi_matrix(&self, cell_id: usize, bc: &TensorBc) -> M2D {
        tensor::geometry_jacobian(&self.tensor_nodes(cell_id), bc, 1)
    }

    fn shape_function(&self, bc: &TensorBc, p: usize) -> Vec<f64> {
        tensor_shape_function(bc, p)
    }

    fn grad_shape_function_ref(&self, bc: &TensorBc, p: usize) -> Vec<V2D> {
        tensor_reference_grads(bc, p)
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
        tensor::cell_to_ipoint(&self.topology, &QUADRANGLE_TENSOR_ORDER, p)
    }

    fn edge_bc_to_cell_bc(&self, cell_id: usize, local_edge: usize, edge_bc: &[f64; 2]) -> TensorBc {
        tensor::edge_bc_to_cell_bc(
            &self.topology,
            &QUADRANGLE_TENSOR_ORDER,
            cell_id,
            local_edge,
            edge_bc,
        )
    }

    fn cell_area(&self) -> Vec<f64> {
        (0..self.number_of_cells())
            .map(|cell_id| self.signed_area(cell_id).abs())
            .collect()
    }
}

/// Drop the nodes that no cell references, renumbering the remaining nodes in their original order
pub(crate) fn remove_unused_nodes<const N: usize>(
    nodes: &[Point],
    cells: &[[usize; N]],
) -> (Vec<Point>, Vec<[usize; N]>) {
    let mut used = vec![false; nodes.len()];
    cells.iter().flatten().for_each(|v| used[*v] = true);

    let mut new_ids = vec![usize::MAX; nodes.len()];
    let mut kept = Vec::new();
    for (node_id, node) in nodes.iter().enumerate() {
        if used[node_id] {
            new_ids[node_id] = kept.len();
            kept.push(*node);
        }
    }

    if kept.len() < nodes.len() {
        log::warn!("Removed {} unused nodes", nodes.len() - kept.len());
    }

    (
        kept,
        cells.iter().map(|cell| cell.map(|v| new_ids[v])).collect(),
    )
}
