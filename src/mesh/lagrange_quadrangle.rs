use super::quadrangle::QuadrangleMesh;
use super::space::{Point, M2D, V2D};
use super::tensor::{self, QUADRANGLE_TENSOR_ORDER};
use super::topology::MeshTopology;
use super::{first_fundamental_form, EntityKind, Mesh2d, MeshError};
use crate::quadrature::{Quadrature, TensorBc};
use crate::shape_fns::{
    lagrange_grad_shape_function_1d, tensor_reference_grads, tensor_shape_function,
};

/// Quadrangle mesh whose cells are the images of the unit square under a degree `p` Lagrange map
///
/// The geometry nodes are the degree `p` interpolation points of a linear mesh: the cell vertices,
/// then `p - 1` nodes per edge, then `(p - 1)^2` nodes per cell. Moving nodes with [LagrangeQuadrangleMesh::map_nodes]
/// bends the cells (e.g. to fit a curved boundary) without changing the numbering.
#[derive(Debug, Clone)]
pub struct LagrangeQuadrangleMesh {
    p: usize,
    nodes: Vec<Point>,
    topology: MeshTopology,
    cell_nodes: Vec<Vec<usize>>,
}

impl LagrangeQuadrangleMesh {
    pub fn from_quadrangle_mesh(mesh: &QuadrangleMesh, p: usize) -> Result<Self, MeshError> {
        if p == 0 {
            return Err(MeshError::InvalidParameter(
                "Lagrange meshes need a geometry degree of at least 1".to_string(),
            ));
        }

        let lagrange_mesh = Self {
            p,
            nodes: mesh.interpolation_points(p),
            topology: mesh.topology().clone(),
            cell_nodes: mesh.cell_to_ipoint(p),
        };
        log::debug!(
            "Built degree {} Lagrange quadrangle mesh with {} geometry nodes",
            p,
            lagrange_mesh.nodes.len()
        );

        Ok(lagrange_mesh)
    }

    /// Degree of the geometry map
    pub fn geometry_degree(&self) -> usize {
        self.p
    }

    /// Move every geometry node
    pub fn map_nodes<F>(&mut self, f: F)
    where
        F: Fn(&Point) -> Point,
    {
        self.nodes.iter_mut().for_each(|node| *node = f(node));
    }

    /// Geometry nodes of each cell: `(p + 1)^2` nodes in tensor order
    pub fn cell_nodes(&self) -> &[Vec<usize>] {
        &self.cell_nodes
    }

    /// Geometry nodes of each edge: `p + 1` nodes from `edge[0]` to `edge[1]`
    pub fn edge_nodes(&self) -> Vec<Vec<usize>> {
        self.edge_to_ipoint(self.p)
    }

    fn geometry_nodes(&self, cell_id: usize) -> Vec<&Point> {
        self.cell_nodes[cell_id]
            .iter()
            .map(|n| &self.nodes[*n])
            .collect()
    }

    /// Cell areas computed with a `q` point tensor product rule
    pub fn integrate_cell_area(&self, q: usize) -> Vec<f64> {
        let quad = self.cell_quadrature(q);
        (0..self.number_of_cells())
            .map(|cell_id| quad.integrate(|bc| self.cell_measure_at(cell_id, bc)))
            .collect()
    }

    /// Edge lengths computed with a `q` point Gauss-Legendre rule
    pub fn integrate_edge_length(&self, q: usize) -> Vec<f64> {
        let quad = self.edge_quadrature(q);
        (0..self.number_of_edges())
            .map(|edge_id| quad.integrate(|bc| self.edge_tangent_at(edge_id, bc).norm()))
            .collect()
    }

    /// `JᵀJ` of the geometry map at a point of a cell
    pub fn first_fundamental_form(&self, cell_id: usize, bc: &TensorBc) -> M2D {
        first_fundamental_form(&self.jacobi_matrix(cell_id, bc))
    }

    /// Degree `p` Lagrange DOF layout on this mesh
    pub fn dof(&self, p: usize) -> LagrangeQuadrangleDof2d<'_> {
        LagrangeQuadrangleDof2d::new(self, p)
    }
}

impl Mesh2d for LagrangeQuadrangleMesh {
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
        tensor::geometry_point(&self.geometry_nodes(cell_id), bc, self.p)
    }

    fn jacobi_matrix(&self, cell_id: usize, bc: &TensorBc) -> M2D {
        tensor::geometry_jacobian(&self.geometry_nodes(cell_id), bc, self.p)
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
        if p == self.p {
            self.cell_nodes.clone()
        } else {
            tensor::cell_to_ipoint(&self.topology, &QUADRANGLE_TENSOR_ORDER, p)
        }
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

    fn edge_tangent_at(&self, edge_id: usize, edge_bc: &[f64; 2]) -> V2D {
        let [a, b] = self.topology.edge(edge_id);
        let ncn = self.topology.number_of_nodes();
        let edge_nodes = std::iter::once(a)
            .chain((0..self.p - 1).map(|k| ncn + edge_id * (self.p - 1) + k))
            .chain(std::iter::once(b));

        lagrange_grad_shape_function_1d(edge_bc, self.p)
            .iter()
            .zip(edge_nodes)
            .fold(V2D::zero(), |tangent, (g, n)| {
                let node = &self.nodes[n];
                tangent + V2D::from([node.x, node.y]) * (g[1] - g[0])
            })
    }

    fn cell_area(&self) -> Vec<f64> {
        self.integrate_cell_area(self.p + 1)
    }

    fn edge_length(&self) -> Vec<f64> {
        self.integrate_edge_length(self.p + 1)
    }
}

/// Numbering of the degree `p` Lagrange DOFs of a [LagrangeQuadrangleMesh]
///
/// When `p` matches the geometry degree the DOFs coincide with the mesh's geometry nodes.
#[derive(Debug, Clone, Copy)]
pub struct LagrangeQuadrangleDof2d<'m> {
    mesh: &'m LagrangeQuadrangleMesh,
    p: usize,
}

impl<'m> LagrangeQuadrangleDof2d<'m> {
    pub fn new(mesh: &'m LagrangeQuadrangleMesh, p: usize) -> Self {
        assert!(p > 0, "Lagrange DOFs are only defined for p >= 1!");
        Self { mesh, p }
    }

    pub fn degree(&self) -> usize {
        self.p
    }

    pub fn number_of_global_dofs(&self) -> usize {
        self.mesh.number_of_global_ipoints(self.p)
    }

    pub fn number_of_local_dofs(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Node => 1,
            EntityKind::Edge | EntityKind::Face => self.p + 1,
            EntityKind::Cell => (self.p + 1) * (self.p + 1),
        }
    }

    pub fn edge_to_dof(&self) -> Vec<Vec<usize>> {
        self.mesh.edge_to_ipoint(self.p)
    }

    pub fn face_to_dof(&self) -> Vec<Vec<usize>> {
        self.edge_to_dof()
    }

    pub fn cell_to_dof(&self) -> Vec<Vec<usize>> {
        self.mesh.cell_to_ipoint(self.p)
    }

    pub fn interpolation_points(&self) -> Vec<Point> {
        self.mesh.interpolation_points(self.p)
    }

    /// Flag the DOFs on boundary edges; with a `threshold`, only edges whose midpoint satisfies it
    pub fn is_boundary_dof(&self, threshold: Option<&dyn Fn(&Point) -> bool>) -> Vec<bool> {
        crate::dof::boundary_dof_flags(self.mesh, self.p, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::quadrangle::QuadrangleShape;

    fn disk_map(point: &Point) -> Point {
        // maps the square [-1, 1]^2 smoothly onto the unit disk
        Point::new(
            point.x * (1.0 - point.y * point.y / 2.0).sqrt(),
            point.y * (1.0 - point.x * point.x / 2.0).sqrt(),
        )
    }

    #[test]
    fn geometry_nodes_match_linear_mesh() {
        let quad_mesh = QuadrangleMesh::from_one_quadrangle(QuadrangleShape::Square);
        let mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 2).unwrap();

        assert_eq!(mesh.number_of_nodes(), 9);
        assert_eq!(mesh.number_of_corner_nodes(), 4);
        assert_eq!(mesh.cell_nodes(), &[vec![0, 5, 3, 4, 8, 7, 1, 6, 2]]);
        assert_eq!(mesh.edge_nodes()[0], vec![0, 4, 1]);
        assert_eq!(mesh.nodes()[8], Point::new(0.5, 0.5));

        let area = mesh.cell_area();
        assert!((area[0] - 1.0).abs() < 1e-14);
        for length in mesh.edge_length() {
            assert!((length - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn affine_maps_are_exact() {
        let quad_mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 2, None).unwrap();
        let mut mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 3).unwrap();
        mesh.map_nodes(|p| Point::new(2.0 * p.x + p.y, 3.0 * p.y));

        let total: f64 = mesh.cell_area().iter().sum();
        assert!((total - 6.0).abs() < 1e-12);

        let bc = TensorBc::from_reference([0.3, 0.6]);
        let jac = mesh.jacobi_matrix(0, &bc);
        assert!((jac.det() - 1.5).abs() < 1e-12);

        let g = mesh.first_fundamental_form(0, &bc);
        assert!(g.is_symmetric(1e-14));
    }

    #[test]
    fn curved_disk() {
        let quad_mesh = QuadrangleMesh::from_box([-1.0, 1.0, -1.0, 1.0], 8, 8, None).unwrap();
        let mut mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 4).unwrap();
        mesh.map_nodes(disk_map);

        let area: f64 = mesh.integrate_cell_area(6).iter().sum();
        assert!((area - std::f64::consts::PI).abs() < 1e-2);

        let lengths = mesh.integrate_edge_length(6);
        let perimeter: f64 = mesh
            .boundary_edge_index()
            .iter()
            .map(|e| lengths[*e])
            .sum();
        assert!((perimeter - 2.0 * std::f64::consts::PI).abs() < 1e-2);

        // curved boundary points stay on the circle
        let ipoints = mesh.interpolation_points(4);
        for dof in flag_indices(&mesh.dof(4).is_boundary_dof(None)) {
            let p = &ipoints[dof];
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 1.0).abs() < 1e-12);
        }
    }

    // two stacked unit squares whose shared edge bulges up into `y = 1 + 4 δ x (1 - x)`
    fn bent_interface(delta: f64) -> LagrangeQuadrangleMesh {
        let quad_mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 2.0], 1, 2, None).unwrap();
        let mut mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 2).unwrap();
        mesh.map_nodes(|p| {
            if (p.x - 0.5).abs() < 1e-12 && (p.y - 1.0).abs() < 1e-12 {
                Point::new(0.5, 1.0 + delta)
            } else {
                *p
            }
        });
        mesh
    }

    #[test]
    fn curved_edge_tangents() {
        let delta = 0.1;
        let mesh = bent_interface(delta);
        let boundary = mesh.boundary_edge_index();
        let inner = (0..mesh.number_of_edges())
            .find(|e| !boundary.contains(e))
            .unwrap();

        // horizontal at the crest, slope ±4δ at the ends
        let mid = mesh.edge_tangent_at(inner, &[0.5, 0.5]);
        assert!(mid[1].abs() < 1e-12);
        assert!((mid[0].abs() - 1.0).abs() < 1e-12);
        for bc in [[1.0, 0.0], [0.0, 1.0]] {
            let t = mesh.edge_tangent_at(inner, &bc);
            assert!((t[0].abs() - 1.0).abs() < 1e-12);
            assert!((t[1].abs() - 4.0 * delta).abs() < 1e-12);

            let n = mesh.edge_unit_normal_at(inner, &bc);
            assert!((n.norm() - 1.0).abs() < 1e-12);
            assert!(n.dot_with(&t).abs() < 1e-12);
        }

        let arc_length = Quadrature::gauss_legendre(20)
            .integrate(|bc| (1.0 + (4.0 * delta * (1.0 - 2.0 * bc[1])).powi(2)).sqrt());
        let lengths = mesh.integrate_edge_length(10);
        assert!((lengths[inner] - arc_length).abs() < 1e-8);
        assert!(lengths[inner] > 1.0 + 1e-3);

        // straight edges keep their chord length
        for e in boundary {
            assert!((lengths[e] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn dof_layout() {
        let quad_mesh = QuadrangleMesh::from_box([0.0, 1.0, 0.0, 1.0], 2, 1, None).unwrap();
        let mesh = LagrangeQuadrangleMesh::from_quadrangle_mesh(&quad_mesh, 2).unwrap();
        let dof = mesh.dof(2);

        assert_eq!(dof.number_of_global_dofs(), mesh.number_of_nodes());
        assert_eq!(dof.cell_to_dof(), mesh.cell_nodes().to_vec());
        assert_eq!(dof.number_of_local_dofs(EntityKind::Edge), 3);
        assert_eq!(dof.number_of_local_dofs(EntityKind::Cell), 9);
        assert_eq!(dof.face_to_dof(), dof.edge_to_dof());

        let ipoints = dof.interpolation_points();
        for (a, b) in ipoints.iter().zip(mesh.nodes()) {
            assert_eq!(a, b);
        }

        // everything except the cell centers and the middle of the shared edge lies on the boundary
        let flags = dof.is_boundary_dof(None);
        assert_eq!(flags.iter().filter(|f| **f).count(), dof.number_of_global_dofs() - 3);

        let left = dof.is_boundary_dof(Some(&|p: &Point| p.x < 1e-12));
        assert_eq!(flags.len(), left.len());
        assert_eq!(left.iter().filter(|f| **f).count(), 3);

        let cubic = mesh.dof(3);
        assert_eq!(cubic.number_of_global_dofs(), 6 + 2 * 7 + 4 * 2);
    }

    fn flag_indices(flags: &[bool]) -> Vec<usize> {
        flags
            .iter()
            .enumerate()
            .filter_map(|(i, f)| if *f { Some(i) } else { None })
            .collect()
    }
}
