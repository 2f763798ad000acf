/// Diffusion, mass, source and interior penalty integrators; global assembly and Dirichlet conditions
pub mod assembly;
/// Continuous Lagrange finite element spaces
pub mod dof;
/// Sparse matrices, linear systems and a dense solver for small problems
pub mod linalg;
/// Triangle, quadrangle, curved quadrangle and structured meshes
pub mod mesh;
/// Gauss-Legendre, tensor product and triangle quadrature rules
pub mod quadrature;
/// Lagrange shape functions on simplices and tensor product cells
pub mod shape_fns;

pub use dof::LagrangeFESpace;
pub use linalg::sparse_matrix::SparseMatrix;
pub use mesh::space::{Point, M2D, V2D};
pub use mesh::{EntityKind, Mesh2d, MeshError, Variables};
