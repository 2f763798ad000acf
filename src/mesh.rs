/// JSON Mesh import and export
pub mod io;
/// Isoparametric (curved) quadrangle meshes of arbitrary order
pub mod lagrange_quadrangle;
/// Bilinear quadrangle meshes
pub mod quadrangle;
/// Structures to describe the 2D real and parametric spaces defining a Mesh
pub mod space;
/// Entity numbering and adjacency shared by all mesh types
pub mod topology;
/// Linear triangle meshes
pub mod triangle;
/// Structured meshes over a rectangular grid
pub mod uniform;

mod tensor;

use crate::linalg::SparseMatrix;
use crate::quadrature::Quadrature;
use space::{Point, M2D, V2D};
use topology::{flag_to_index, MeshTopology};

use std::fmt;
use thiserror::Error;

/// Mesh entities of a 2D mesh. Faces coincide with edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
    Face,
    Cell,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
            Self::Face => write!(f, "face"),
            Self::Cell => write!(f, "cell"),
        }
    }
}

/// Variables of a shape function gradient: reference coordinates `(ξ, η)` or physical coordinates `(x, y)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variables {
    U,
    X,
}

/// Failures while building, loading or querying a Mesh
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("cell connectivity of length {len} is not a multiple of {nvc} vertices per cell")]
    CellArity { len: usize, nvc: usize },
    #[error("cell {cell} references node {node}, but the mesh only has {num_nodes} nodes")]
    NodeOutOfRange {
        cell: usize,
        node: usize,
        num_nodes: usize,
    },
    #[error("local edge {local_edge} of cell {cell} starts and ends on the same node")]
    DegenerateEdge { cell: usize, local_edge: usize },
    #[error("edge [{0}, {1}] is shared by more than two cells")]
    NonManifoldEdge(usize, usize),
    #[error("edge {nodes:?} of cell {cell} is missing from the supplied edges")]
    MissingEdge { nodes: [usize; 2], cell: usize },
    #[error("edge {0} is not part of any cell")]
    UnusedEdge(usize),
    #[error("cell {0} doesn't exist")]
    CellDoesntExist(usize),
    #[error("mesh contains duplicate nodes")]
    DuplicateNodes,
    #[error("invalid mesh parameter: {0}")]
    InvalidParameter(String),
    #[error("unable to read mesh file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to parse mesh file as JSON: {0}")]
    Json(#[from] json::Error),
    #[error("malformed mesh file: {0}")]
    Format(String),
}

/// Functionality shared by all 2D meshes: geometry, reference mappings, Lagrange interpolation points and adjacency.
///
/// Each mesh type has its own reference cell (the unit square for quadrangles, the unit triangle for triangles) and barycentric
/// representation `Bc` of points on that cell.
pub trait Mesh2d: Sync {
    /// Barycentric representation of a point on the reference cell
    type Bc: Copy + Send + Sync + fmt::Debug;

    /// Geometry nodes; the first `topology().number_of_nodes()` entries are the cell vertices
    fn nodes(&self) -> &[Point];

    fn topology(&self) -> &MeshTopology;

    /// Measure of the reference cell in `(ξ, η)` coordinates
    fn reference_cell_measure(&self) -> f64;

    /// Quadrature rule of order `q` on the reference cell
    fn cell_quadrature(&self, q: usize) -> Quadrature<Self::Bc>;

    /// Map a point on the reference cell into real space
    fn bc_to_point(&self, cell_id: usize, bc: &Self::Bc) -> Point;

    /// Jacobian of the reference map with rows `(∂x/∂ξ, ∂x/∂η)` and `(∂y/∂ξ, ∂y/∂η)`
    fn jacobi_matrix(&self, cell_id: usize, bc: &Self::Bc) -> M2D;

    /// Values of the degree `p` Lagrange shape functions in local interpolation point order
    fn shape_function(&self, bc: &Self::Bc, p: usize) -> Vec<f64>;

    /// Gradients of the degree `p` Lagrange shape functions with respect to `(ξ, η)`
    fn grad_shape_function_ref(&self, bc: &Self::Bc, p: usize) -> Vec<V2D>;

    /// Reference positions of the degree `p` local interpolation points
    fn local_ipoint_bcs(&self, p: usize) -> Vec<Self::Bc>;

    fn number_of_local_ipoints(&self, p: usize) -> usize;

    fn number_of_global_ipoints(&self, p: usize) -> usize;

    /// Global interpolation point numbers of each cell's local interpolation points
    fn cell_to_ipoint(&self, p: usize) -> Vec<Vec<usize>>;

    /// Map a point of an edge quadrature rule onto the reference cell of one of the edge's cells.
    ///
    /// `edge_bc` is relative to the global orientation of the edge.
    fn edge_bc_to_cell_bc(&self, cell_id: usize, local_edge: usize, edge_bc: &[f64; 2]) -> Self::Bc;

    fn cell_area(&self) -> Vec<f64>;

    // ----------------------------------------------------------------------------------------------------
    // Counts
    // ----------------------------------------------------------------------------------------------------

    fn number_of_nodes(&self) -> usize {
        self.nodes().len()
    }

    /// Number of cell vertices (differs from [Mesh2d::number_of_nodes] for high order meshes)
    fn number_of_corner_nodes(&self) -> usize {
        self.topology().number_of_nodes()
    }

    fn number_of_edges(&self) -> usize {
        self.topology().number_of_edges()
    }

    fn number_of_faces(&self) -> usize {
        self.topology().number_of_faces()
    }

    fn number_of_cells(&self) -> usize {
        self.topology().number_of_cells()
    }

    fn number_of_entities(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => self.number_of_nodes(),
            EntityKind::Edge => self.number_of_edges(),
            EntityKind::Face => self.number_of_faces(),
            EntityKind::Cell => self.number_of_cells(),
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Geometry
    // ----------------------------------------------------------------------------------------------------

    fn edge_points(&self, edge_id: usize) -> [&Point; 2] {
        let [a, b] = self.topology().edge(edge_id);
        [&self.nodes()[a], &self.nodes()[b]]
    }

    fn edge_length(&self) -> Vec<f64> {
        self.edge_tangent().iter().map(|t| t.norm()).collect()
    }

    /// Node measures are zero, edge measures are lengths and cell measures are areas
    fn entity_measure(&self, kind: EntityKind) -> Vec<f64> {
        match kind {
            EntityKind::Node => vec![0.0; self.number_of_nodes()],
            EntityKind::Edge | EntityKind::Face => self.edge_length(),
            EntityKind::Cell => self.cell_area(),
        }
    }

    fn entity_barycenter(&self, kind: EntityKind) -> Vec<Point> {
        let nodes = self.nodes();
        match kind {
            EntityKind::Node => nodes.to_vec(),
            EntityKind::Edge | EntityKind::Face => self
                .topology()
                .edges()
                .iter()
                .map(|[a, b]| Point::between(&nodes[*a], &nodes[*b]))
                .collect(),
            EntityKind::Cell => self
                .topology()
                .cells()
                .map(|cell| Point::centroid(cell.iter().map(|v| &nodes[*v])))
                .collect(),
        }
    }

    /// Quadrature rule of order `q` over edges
    fn edge_quadrature(&self, q: usize) -> Quadrature<[f64; 2]> {
        Quadrature::gauss_legendre(q)
    }

    /// `x1 - x0` for each edge
    fn edge_tangent(&self) -> Vec<V2D> {
        (0..self.number_of_edges())
            .map(|edge_id| {
                let [p0, p1] = self.edge_points(edge_id);
                p0.vector_to(p1)
            })
            .collect()
    }

    /// Tangent `dx/dt` of an edge at a point of an edge rule
    ///
    /// Its length is the line element of the rule's weights. Straight edges have the constant tangent `x1 - x0`.
    fn edge_tangent_at(&self, edge_id: usize, _edge_bc: &[f64; 2]) -> V2D {
        let [p0, p1] = self.edge_points(edge_id);
        p0.vector_to(p1)
    }

    /// Unit normal `(t_y, -t_x) / |t|` of an edge at a point of an edge rule
    fn edge_unit_normal_at(&self, edge_id: usize, edge_bc: &[f64; 2]) -> V2D {
        self.edge_tangent_at(edge_id, edge_bc).rotated_cw().normalized()
    }

    fn edge_unit_tangent(&self) -> Vec<V2D> {
        self.edge_tangent().iter().map(|t| t.normalized()).collect()
    }

    /// The tangent rotated clockwise: `(t_y, -t_x)`. Points out of the edge's first cell.
    fn edge_normal(&self) -> Vec<V2D> {
        self.edge_tangent().iter().map(|t| t.rotated_cw()).collect()
    }

    fn edge_unit_normal(&self) -> Vec<V2D> {
        self.edge_tangent()
            .iter()
            .map(|t| t.rotated_cw().normalized())
            .collect()
    }

    /// Unit normals and unit tangents of all edges
    fn edge_frame(&self) -> (Vec<V2D>, Vec<V2D>) {
        let tangents = self.edge_unit_tangent();
        (tangents.iter().map(|t| t.rotated_cw()).collect(), tangents)
    }

    /// `|det J|` scaled by the measure of the reference cell: the local area element of the quadrature weights
    fn cell_measure_at(&self, cell_id: usize, bc: &Self::Bc) -> f64 {
        self.reference_cell_measure() * self.jacobi_matrix(cell_id, bc).det().abs()
    }

    /// Gradients of the degree `p` shape functions with respect to `(x, y)`: `J^{-T} ∇_ξ φ`
    fn grad_shape_function_x(&self, cell_id: usize, bc: &Self::Bc, p: usize) -> Vec<V2D> {
        let jinv_t = self.jacobi_matrix(cell_id, bc).inverse().transpose();
        self.grad_shape_function_ref(bc, p)
            .into_iter()
            .map(|g| jinv_t * g)
            .collect()
    }

    fn grad_shape_function(
        &self,
        cell_id: usize,
        bc: &Self::Bc,
        p: usize,
        variables: Variables,
    ) -> Vec<V2D> {
        match variables {
            Variables::U => self.grad_shape_function_ref(bc, p),
            Variables::X => self.grad_shape_function_x(cell_id, bc, p),
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Interpolation points
    // ----------------------------------------------------------------------------------------------------

    /// Global numbers of the degree `p` interpolation points on each edge, ordered from `edge[0]` to `edge[1]`
    fn edge_to_ipoint(&self, p: usize) -> Vec<Vec<usize>> {
        assert!(p > 0, "Interpolation points are only defined for p >= 1!");
        let ncn = self.number_of_corner_nodes();

        self.topology()
            .edges()
            .iter()
            .enumerate()
            .map(|(edge_id, [a, b])| {
                std::iter::once(*a)
                    .chain((0..p - 1).map(|k| ncn + edge_id * (p - 1) + k))
                    .chain(std::iter::once(*b))
                    .collect()
            })
            .collect()
    }

    /// Coordinates of the degree `p` interpolation points: nodes, edge interiors, then cell interiors
    fn interpolation_points(&self, p: usize) -> Vec<Point> {
        let mut ipoints = vec![Point::default(); self.number_of_global_ipoints(p)];
        let ncn = self.number_of_corner_nodes();
        ipoints[..ncn].clone_from_slice(&self.nodes()[..ncn]);

        let bcs = self.local_ipoint_bcs(p);
        for (cell_id, cell_ipoints) in self.cell_to_ipoint(p).iter().enumerate() {
            for (ip, bc) in cell_ipoints.iter().zip(bcs.iter()) {
                if *ip >= ncn {
                    ipoints[*ip] = self.bc_to_point(cell_id, bc);
                }
            }
        }

        ipoints
    }

    /// Interpolation matrix from the degree `p0` interpolation points to the degree `p1` interpolation points
    ///
    /// Row `i` holds the values of the degree `p0` basis functions at interpolation point `i` of degree `p1`.
    fn prolongation_matrix(&self, p0: usize, p1: usize) -> SparseMatrix {
        assert!(p1 > p0, "Prolongation must increase the polynomial degree!");

        let c2p0 = self.cell_to_ipoint(p0);
        let c2p1 = self.cell_to_ipoint(p1);
        let bcs = self.local_ipoint_bcs(p1);

        let mut prolongation = SparseMatrix::new(
            self.number_of_global_ipoints(p1),
            self.number_of_global_ipoints(p0),
        );
        for (fine, coarse) in c2p1.iter().zip(c2p0.iter()) {
            for (row, bc) in fine.iter().zip(bcs.iter()) {
                for (col, value) in coarse.iter().zip(self.shape_function(bc, p0)) {
                    if value.abs() > PROLONGATION_TOLERANCE {
                        prolongation.set([*row, *col], value);
                    }
                }
            }
        }

        prolongation
    }

    // ----------------------------------------------------------------------------------------------------
    // Boundary
    // ----------------------------------------------------------------------------------------------------

    fn boundary_node_flag(&self) -> Vec<bool> {
        let mut flags = self.topology().boundary_node_flag();
        flags.resize(self.number_of_nodes(), false);
        flags
    }

    fn boundary_node_index(&self) -> Vec<usize> {
        flag_to_index(&self.boundary_node_flag())
    }

    fn boundary_edge_flag(&self) -> Vec<bool> {
        self.topology().boundary_edge_flag()
    }

    fn boundary_edge_index(&self) -> Vec<usize> {
        self.topology().boundary_edge_index()
    }

    fn boundary_face_index(&self) -> Vec<usize> {
        self.topology().boundary_face_index()
    }

    fn boundary_cell_flag(&self) -> Vec<bool> {
        self.topology().boundary_cell_flag()
    }

    fn boundary_cell_index(&self) -> Vec<usize> {
        self.topology().boundary_cell_index()
    }
}

/// Basis function values smaller than this are left out of prolongation matrices
pub const PROLONGATION_TOLERANCE: f64 = 1e-14;

/// The first fundamental form `JᵀJ` of a reference map
///
/// ```
/// use fem_mesh_2d::mesh::first_fundamental_form;
/// use fem_mesh_2d::mesh::space::M2D;
///
/// let jac = M2D::from([2.0, 0.0], [1.0, 1.0]);
/// let g = first_fundamental_form(&jac);
///
/// assert_eq!(g, M2D::from([5.0, 1.0], [1.0, 1.0]));
/// ```
pub fn first_fundamental_form(jacobian: &M2D) -> M2D {
    jacobian.transpose() * *jacobian
}
