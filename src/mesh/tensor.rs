//! Reference mappings and interpolation point numbering of tensor-product (quadrangle) cells.
//!
//! A "tensor order" lists a cell's vertices by tensor index `m * 2 + n`, where vertex `(m, n)` sits at `(ξ, η) = (m, n)`
//! of the unit square. Interpolation points of degree `p` are stored per cell with the index `i * (p + 1) + j`.

use super::space::{Point, M2D};
use super::topology::MeshTopology;
use crate::quadrature::TensorBc;
use crate::shape_fns::{tensor_reference_grads, tensor_shape_function};

/// Tensor order of a counter-clockwise quadrangle: `[v0, v3, v1, v2]`
pub(crate) const QUADRANGLE_TENSOR_ORDER: [usize; 4] = [0, 3, 1, 2];

/// Tensor order of cells which are already stored in tensor order
pub(crate) const IDENTITY_TENSOR_ORDER: [usize; 4] = [0, 1, 2, 3];

/// `(m, n)` position of a local cell vertex on the unit square
pub(crate) fn vertex_position(tensor_order: &[usize; 4], vertex: usize) -> [usize; 2] {
    tensor_order
        .iter()
        .position(|v| *v == vertex)
        .map(|t| [t / 2, t % 2])
        .unwrap_or_else(|| panic!("Vertex {} is missing from the tensor order!", vertex))
}

pub(crate) fn local_ipoint_bcs(p: usize) -> Vec<TensorBc> {
    assert!(p > 0, "Interpolation points are only defined for p >= 1!");
    let pf = p as f64;
    (0..=p)
        .flat_map(|i| (0..=p).map(move |j| TensorBc::from_reference([i as f64 / pf, j as f64 / pf])))
        .collect()
}

pub(crate) fn number_of_global_ipoints(topo: &MeshTopology, p: usize) -> usize {
    assert!(p > 0, "Interpolation points are only defined for p >= 1!");
    topo.number_of_nodes()
        + (p - 1) * topo.number_of_edges()
        + (p - 1) * (p - 1) * topo.number_of_cells()
}

/// Global interpolation point numbers of each cell, in tensor order
pub(crate) fn cell_to_ipoint(
    topo: &MeshTopology,
    tensor_order: &[usize; 4],
    p: usize,
) -> Vec<Vec<usize>> {
    assert!(p > 0, "Interpolation points are only defined for p >= 1!");
    let nn = topo.number_of_nodes();
    let ne = topo.number_of_edges();
    let row = p + 1;

    // k'th point (0..=p) along global edge e
    let edge_ipoint = |edge_id: usize, k: usize| -> usize {
        match k {
            0 => topo.edge(edge_id)[0],
            k if k == p => topo.edge(edge_id)[1],
            k => nn + edge_id * (p - 1) + k - 1,
        }
    };

    (0..topo.number_of_cells())
        .map(|cell_id| {
            let cell = topo.cell(cell_id);
            let mut c2p = vec![0; row * row];

            for (t, v) in tensor_order.iter().enumerate() {
                c2p[(t / 2) * p * row + (t % 2) * p] = cell[*v];
            }

            for (local_idx, [a, b]) in topo.local_edge().iter().enumerate() {
                let edge_id = topo.cell_to_edge(cell_id)[local_idx];
                let forward = topo.local_edge_agrees(cell_id, local_idx);
                let [ma, na] = vertex_position(tensor_order, *a);
                let [mb, nb] = vertex_position(tensor_order, *b);

                for k in 1..p {
                    // walk from vertex a to vertex b in grid units
                    let i = ma * p + k * mb - k * ma;
                    let j = na * p + k * nb - k * na;
                    c2p[i * row + j] = edge_ipoint(edge_id, if forward { k } else { p - k });
                }
            }

            let interior_offset = nn + ne * (p - 1) + cell_id * (p - 1) * (p - 1);
            for i in 1..p {
                for j in 1..p {
                    c2p[i * row + j] = interior_offset + (i - 1) * (p - 1) + (j - 1);
                }
            }

            c2p
        })
        .collect()
}

/// Map a point of an edge rule onto the unit square of one of the edge's cells
pub(crate) fn edge_bc_to_cell_bc(
    topo: &MeshTopology,
    tensor_order: &[usize; 4],
    cell_id: usize,
    local_edge: usize,
    edge_bc: &[f64; 2],
) -> TensorBc {
    let [a, b] = topo.local_edge()[local_edge];
    let [wa, wb] = if topo.local_edge_agrees(cell_id, local_edge) {
        *edge_bc
    } else {
        [edge_bc[1], edge_bc[0]]
    };
    let [ma, na] = vertex_position(tensor_order, a);
    let [mb, nb] = vertex_position(tensor_order, b);

    TensorBc::from_reference([
        wa * ma as f64 + wb * mb as f64,
        wa * na as f64 + wb * nb as f64,
    ])
}

/// Image of a reference point under the degree `p` map defined by the cell's geometry nodes (in tensor order)
pub(crate) fn geometry_point(geometry_nodes: &[&Point], bc: &TensorBc, p: usize) -> Point {
    Point::weighted_sum(geometry_nodes.iter().copied(), &tensor_shape_function(bc, p))
}

/// Jacobian of the degree `p` map defined by the cell's geometry nodes (in tensor order)
pub(crate) fn geometry_jacobian(geometry_nodes: &[&Point], bc: &TensorBc, p: usize) -> M2D {
    let grads = tensor_reference_grads(bc, p);
    let (dx, dy) = geometry_nodes
        .iter()
        .zip(grads.iter())
        .fold(([0.0; 2], [0.0; 2]), |(dx, dy), (node, g)| {
            (
                [dx[0] + node.x * g[0], dx[1] + node.x * g[1]],
                [dy[0] + node.y * g[0], dy[1] + node.y * g[1]],
            )
        });

    M2D::from(dx, dy)
}
