use super::MeshError;

use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// Local edge table of a triangle: edge `i` is opposite to vertex `i`
pub const TRIANGLE_LOCAL_EDGE: [[usize; 2]; 3] = [[1, 2], [2, 0], [0, 1]];

/// Local edge table of a counter-clockwise quadrangle
pub const QUADRANGLE_LOCAL_EDGE: [[usize; 2]; 4] = [[0, 1], [1, 2], [2, 3], [3, 0]];

/// Local edge table of a quadrangle whose vertices are stored in tensor order
///
/// ```text
///     1 --------- 3
///     |     1     |
///     |2         1|
///     |     0     |
///     0 --------- 2
/// ```
pub const TENSOR_QUADRANGLE_LOCAL_EDGE: [[usize; 2]; 4] = [[0, 2], [2, 3], [3, 1], [1, 0]];

/// Expected number of cells sharing one node. Determines the stack allocation of node-to-cell lists.
pub const EXPECTED_NODE_VALENCE: usize = 8;

/// Entity numbering and adjacency of a 2D mesh.
///
/// Cells are stored row-wise in a flat array with `nvc` vertices per cell. Edges are generated from the cells
/// and a local edge table; their orientation is inherited from the first cell in which they appear.
///
/// `edge2cell[e] = [c0, c1, i0, i1]`: the first and last cell containing edge `e` together with the edge's local index
/// in each of them. Boundary edges have `c0 == c1`. In two dimensions faces and edges coincide.
#[derive(Debug, Clone)]
pub struct MeshTopology {
    number_of_nodes: usize,
    nvc: usize,
    cell: Vec<usize>,
    local_edge: Vec<[usize; 2]>,
    edge: Vec<[usize; 2]>,
    edge2cell: Vec<[usize; 4]>,
    cell2edge: Vec<usize>,
}

impl MeshTopology {
    /// Build the edges of a mesh from its cells.
    ///
    /// Edges are numbered lexicographically by their sorted pair of vertices
    ///
    /// ```
    /// use fem_mesh_2d::mesh::topology::{MeshTopology, QUADRANGLE_LOCAL_EDGE};
    ///
    /// let topo = MeshTopology::new(4, vec![0, 1, 2, 3], 4, &QUADRANGLE_LOCAL_EDGE).unwrap();
    ///
    /// assert_eq!(topo.number_of_edges(), 4);
    /// assert_eq!(topo.edges(), &[[0, 1], [3, 0], [1, 2], [2, 3]]);
    /// assert_eq!(topo.edge_to_cell()[1], [0, 0, 3, 3]);
    /// ```
    pub fn new(
        number_of_nodes: usize,
        cell: Vec<usize>,
        nvc: usize,
        local_edge: &[[usize; 2]],
    ) -> Result<Self, MeshError> {
        validate_cells(number_of_nodes, &cell, nvc, local_edge)?;
        let nec = local_edge.len();

        // {sorted node pair => (first occurrence, last occurrence, count)}
        let mut edge_occurrences: BTreeMap<[usize; 2], (usize, usize, u8)> = BTreeMap::new();
        for (cell_id, cell_nodes) in cell.chunks(nvc).enumerate() {
            for (local_idx, [a, b]) in local_edge.iter().enumerate() {
                let key = sorted_pair(cell_nodes[*a], cell_nodes[*b]);
                let occurrence = cell_id * nec + local_idx;

                let entry = edge_occurrences
                    .entry(key)
                    .or_insert((occurrence, occurrence, 0));
                entry.1 = occurrence;
                entry.2 += 1;

                if entry.2 > 2 {
                    return Err(MeshError::NonManifoldEdge(key[0], key[1]));
                }
            }
        }

        let (edge, edge2cell): (Vec<[usize; 2]>, Vec<[usize; 4]>) = edge_occurrences
            .values()
            .map(|&(first, last, _)| {
                let [a, b] = local_edge[first % nec];
                let first_cell = &cell[(first / nec) * nvc..(first / nec + 1) * nvc];
                (
                    [first_cell[a], first_cell[b]],
                    [first / nec, last / nec, first % nec, last % nec],
                )
            })
            .unzip();

        let topo = Self::assemble(number_of_nodes, nvc, cell, local_edge, edge, edge2cell);
        log::debug!(
            "Built mesh topology: {} nodes, {} edges, {} cells",
            topo.number_of_nodes,
            topo.number_of_edges(),
            topo.number_of_cells()
        );
        Ok(topo)
    }

    /// Build the adjacency of a mesh whose edge numbering is already known (structured meshes).
    ///
    /// The supplied edges keep their order and orientation. The first cell of each edge is the cell whose local edge
    /// runs in the same direction as the edge, so that the edge normal points out of it.
    pub fn from_parts(
        number_of_nodes: usize,
        cell: Vec<usize>,
        nvc: usize,
        local_edge: &[[usize; 2]],
        edge: Vec<[usize; 2]>,
    ) -> Result<Self, MeshError> {
        validate_cells(number_of_nodes, &cell, nvc, local_edge)?;
        let nec = local_edge.len();

        let edge_ids: HashMap<[usize; 2], usize> = edge
            .iter()
            .enumerate()
            .map(|(edge_id, [a, b])| (sorted_pair(*a, *b), edge_id))
            .collect();

        let mut occurrences: Vec<Option<[usize; 2]>> = vec![None; edge.len()];
        for (cell_id, cell_nodes) in cell.chunks(nvc).enumerate() {
            for (local_idx, [a, b]) in local_edge.iter().enumerate() {
                let edge_id = *edge_ids
                    .get(&sorted_pair(cell_nodes[*a], cell_nodes[*b]))
                    .ok_or(MeshError::MissingEdge {
                        nodes: [cell_nodes[*a], cell_nodes[*b]],
                        cell: cell_id,
                    })?;
                let occurrence = cell_id * nec + local_idx;

                occurrences[edge_id] = match occurrences[edge_id] {
                    None => Some([occurrence, occurrence]),
                    Some([first, last]) if first == last => Some([first, occurrence]),
                    Some(_) => {
                        let [a, b] = edge[edge_id];
                        return Err(MeshError::NonManifoldEdge(a, b));
                    }
                };
            }
        }

        // the first cell of an edge is the one whose local edge agrees with the edge's orientation (when there is one)
        let agrees = |edge_id: usize, occurrence: usize| {
            let [a, _] = local_edge[occurrence % nec];
            cell[(occurrence / nec) * nvc + a] == edge[edge_id][0]
        };

        let edge2cell = occurrences
            .iter()
            .enumerate()
            .map(|(edge_id, occ)| match occ {
                Some([first, last]) => {
                    let [first, last] = if !agrees(edge_id, *first) && agrees(edge_id, *last) {
                        [*last, *first]
                    } else {
                        [*first, *last]
                    };
                    Ok([first / nec, last / nec, first % nec, last % nec])
                }
                None => Err(MeshError::UnusedEdge(edge_id)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::assemble(
            number_of_nodes,
            nvc,
            cell,
            local_edge,
            edge,
            edge2cell,
        ))
    }

    fn assemble(
        number_of_nodes: usize,
        nvc: usize,
        cell: Vec<usize>,
        local_edge: &[[usize; 2]],
        edge: Vec<[usize; 2]>,
        edge2cell: Vec<[usize; 4]>,
    ) -> Self {
        let nec = local_edge.len();
        let num_cells = cell.len() / nvc;

        let mut cell2edge = vec![0; num_cells * nec];
        for (edge_id, [c0, c1, i0, i1]) in edge2cell.iter().enumerate() {
            cell2edge[c0 * nec + i0] = edge_id;
            cell2edge[c1 * nec + i1] = edge_id;
        }

        Self {
            number_of_nodes,
            nvc,
            cell,
            local_edge: local_edge.to_vec(),
            edge,
            edge2cell,
            cell2edge,
        }
    }

    // ----------------------------------------------------------------------------------------------------
    // Counts and raw entities
    // ----------------------------------------------------------------------------------------------------

    pub fn number_of_nodes(&self) -> usize {
        self.number_of_nodes
    }

    pub fn number_of_edges(&self) -> usize {
        self.edge.len()
    }

    pub fn number_of_faces(&self) -> usize {
        self.edge.len()
    }

    pub fn number_of_cells(&self) -> usize {
        self.cell.len() / self.nvc
    }

    /// Number of vertices per cell
    pub fn number_of_vertices_of_cells(&self) -> usize {
        self.nvc
    }

    /// Number of edges per cell
    pub fn number_of_edges_of_cells(&self) -> usize {
        self.local_edge.len()
    }

    pub fn local_edge(&self) -> &[[usize; 2]] {
        &self.local_edge
    }

    /// The vertices of one cell
    pub fn cell(&self, cell_id: usize) -> &[usize] {
        assert!(
            cell_id < self.number_of_cells(),
            "Cell {} doesn't exist; cannot retrieve its vertices!",
            cell_id
        );
        &self.cell[cell_id * self.nvc..(cell_id + 1) * self.nvc]
    }

    /// Iterate over the vertex lists of all cells
    pub fn cells(&self) -> impl ExactSizeIterator<Item = &[usize]> + '_ {
        self.cell.chunks(self.nvc)
    }

    /// Flat, row-wise cell connectivity
    pub fn cell_connectivity(&self) -> &[usize] {
        &self.cell
    }

    pub fn edge(&self, edge_id: usize) -> [usize; 2] {
        self.edge[edge_id]
    }

    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edge
    }

    pub fn faces(&self) -> &[[usize; 2]] {
        &self.edge
    }

    /// The two global nodes of a cell's local edge, in the cell's local orientation
    pub fn local_edge_nodes(&self, cell_id: usize, local_idx: usize) -> [usize; 2] {
        let [a, b] = self.local_edge[local_idx];
        let cell = self.cell(cell_id);
        [cell[a], cell[b]]
    }

    // ----------------------------------------------------------------------------------------------------
    // Adjacency
    // ----------------------------------------------------------------------------------------------------

    pub fn edge_to_cell(&self) -> &[[usize; 4]] {
        &self.edge2cell
    }

    pub fn face_to_cell(&self) -> &[[usize; 4]] {
        &self.edge2cell
    }

    /// Global edge ids of a cell's local edges
    pub fn cell_to_edge(&self, cell_id: usize) -> &[usize] {
        let nec = self.local_edge.len();
        &self.cell2edge[cell_id * nec..(cell_id + 1) * nec]
    }

    pub fn cell_to_face(&self, cell_id: usize) -> &[usize] {
        self.cell_to_edge(cell_id)
    }

    /// For each cell and local edge: whether the global edge has the same orientation as the local edge
    pub fn cell_to_edge_sign(&self) -> Vec<Vec<bool>> {
        (0..self.number_of_cells())
            .map(|cell_id| {
                self.cell_to_edge(cell_id)
                    .iter()
                    .enumerate()
                    .map(|(local_idx, edge_id)| {
                        self.edge[*edge_id][0] == self.local_edge_nodes(cell_id, local_idx)[0]
                    })
                    .collect()
            })
            .collect()
    }

    /// Whether a cell's local edge has the same orientation as the associated global edge
    pub fn local_edge_agrees(&self, cell_id: usize, local_idx: usize) -> bool {
        let edge_id = self.cell_to_edge(cell_id)[local_idx];
        self.edge[edge_id][0] == self.local_edge_nodes(cell_id, local_idx)[0]
    }

    /// For each cell: the neighbouring cell across each local edge (the cell itself on the boundary)
    pub fn cell_to_cell(&self) -> Vec<Vec<usize>> {
        let nec = self.local_edge.len();
        let mut cell2cell = vec![vec![0; nec]; self.number_of_cells()];
        for [c0, c1, i0, i1] in self.edge2cell.iter() {
            cell2cell[*c0][*i0] = *c1;
            cell2cell[*c1][*i1] = *c0;
        }
        cell2cell
    }

    /// For each node: the cells which contain it, in ascending order
    pub fn node_to_cell(&self) -> Vec<SmallVec<[usize; EXPECTED_NODE_VALENCE]>> {
        let mut node2cell = vec![SmallVec::new(); self.number_of_nodes];
        for (cell_id, cell_nodes) in self.cells().enumerate() {
            for node_id in cell_nodes {
                node2cell[*node_id].push(cell_id);
            }
        }
        node2cell
    }

    // ----------------------------------------------------------------------------------------------------
    // Boundary
    // ----------------------------------------------------------------------------------------------------

    pub fn boundary_edge_flag(&self) -> Vec<bool> {
        self.edge2cell.iter().map(|[c0, c1, _, _]| c0 == c1).collect()
    }

    pub fn boundary_edge_index(&self) -> Vec<usize> {
        flag_to_index(&self.boundary_edge_flag())
    }

    pub fn boundary_face_flag(&self) -> Vec<bool> {
        self.boundary_edge_flag()
    }

    pub fn boundary_face_index(&self) -> Vec<usize> {
        self.boundary_edge_index()
    }

    pub fn boundary_node_flag(&self) -> Vec<bool> {
        let mut flags = vec![false; self.number_of_nodes];
        for (edge, is_bd) in self.edge.iter().zip(self.boundary_edge_flag()) {
            if is_bd {
                flags[edge[0]] = true;
                flags[edge[1]] = true;
            }
        }
        flags
    }

    pub fn boundary_node_index(&self) -> Vec<usize> {
        flag_to_index(&self.boundary_node_flag())
    }

    pub fn boundary_cell_flag(&self) -> Vec<bool> {
        let mut flags = vec![false; self.number_of_cells()];
        for [c0, c1, _, _] in self.edge2cell.iter() {
            if c0 == c1 {
                flags[*c0] = true;
            }
        }
        flags
    }

    pub fn boundary_cell_index(&self) -> Vec<usize> {
        flag_to_index(&self.boundary_cell_flag())
    }
}

fn validate_cells(
    number_of_nodes: usize,
    cell: &[usize],
    nvc: usize,
    local_edge: &[[usize; 2]],
) -> Result<(), MeshError> {
    if nvc == 0 || cell.len() % nvc != 0 {
        return Err(MeshError::CellArity {
            len: cell.len(),
            nvc,
        });
    }
    assert!(
        local_edge.iter().flatten().all(|v| *v < nvc),
        "Local edge table references a vertex outside of the cell; cannot build topology!"
    );

    for (cell_id, cell_nodes) in cell.chunks(nvc).enumerate() {
        if let Some(node) = cell_nodes.iter().find(|n| **n >= number_of_nodes) {
            return Err(MeshError::NodeOutOfRange {
                cell: cell_id,
                node: *node,
                num_nodes: number_of_nodes,
            });
        }
        for (local_idx, [a, b]) in local_edge.iter().enumerate() {
            if cell_nodes[*a] == cell_nodes[*b] {
                return Err(MeshError::DegenerateEdge {
                    cell: cell_id,
                    local_edge: local_idx,
                });
            }
        }
    }
    Ok(())
}

fn sorted_pair(a: usize, b: usize) -> [usize; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

pub(crate) fn flag_to_index(flags: &[bool]) -> Vec<usize> {
    flags
        .iter()
        .enumerate()
        .filter(|(_, f)| **f)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // two triangles sharing the edge [1, 2]
    //   2 ------ 3
    //   | \      |
    //   |   \    |
    //   |     \  |
    //   0 ------ 1
    fn two_triangles() -> MeshTopology {
        MeshTopology::new(4, vec![1, 2, 0, 2, 1, 3], 3, &TRIANGLE_LOCAL_EDGE).unwrap()
    }

    #[test]
    fn edges_and_adjacency() {
        let topo = two_triangles();

        assert_eq!(topo.number_of_edges(), 5);
        assert_eq!(topo.edges(), &[[0, 1], [2, 0], [1, 2], [1, 3], [3, 2]]);
        assert_eq!(
            topo.edge_to_cell(),
            &[[0, 0, 1, 1], [0, 0, 0, 0], [0, 1, 2, 2], [1, 1, 0, 0], [1, 1, 1, 1]]
        );

        assert_eq!(topo.cell_to_edge(0), &[1, 0, 2]);
        assert_eq!(topo.cell_to_edge(1), &[3, 4, 2]);
        assert_eq!(topo.cell_to_cell(), vec![vec![0, 0, 1], vec![1, 1, 0]]);
        assert_eq!(
            topo.cell_to_edge_sign(),
            vec![vec![true, true, true], vec![true, true, false]]
        );
    }

    #[test]
    fn adjacency_is_consistent() {
        let topo = two_triangles();
        for (edge_id, [c0, c1, i0, i1]) in topo.edge_to_cell().iter().enumerate() {
            assert_eq!(topo.cell_to_edge(*c0)[*i0], edge_id);
            assert_eq!(topo.cell_to_edge(*c1)[*i1], edge_id);
        }
    }

    #[test]
    fn boundary_entities() {
        let topo = two_triangles();

        assert_eq!(topo.boundary_edge_index(), vec![0, 1, 3, 4]);
        assert_eq!(topo.boundary_node_index(), vec![0, 1, 2, 3]);
        assert_eq!(topo.boundary_cell_index(), vec![0, 1]);

        let node2cell = topo.node_to_cell();
        assert_eq!(node2cell[1].as_slice(), &[0, 1]);
        assert_eq!(node2cell[3].as_slice(), &[1]);
    }

    #[test]
    fn from_parts_keeps_edge_numbering() {
        let topo = MeshTopology::from_parts(
            4,
            vec![0, 1, 2, 3],
            4,
            &QUADRANGLE_LOCAL_EDGE,
            vec![[3, 0], [2, 3], [1, 2], [0, 1]],
        )
        .unwrap();

        assert_eq!(topo.cell_to_edge(0), &[3, 2, 1, 0]);
        assert_eq!(topo.edge_to_cell()[0], [0, 0, 3, 3]);
    }

    #[test]
    fn from_parts_missing_edge() {
        let res = MeshTopology::from_parts(
            4,
            vec![0, 1, 2, 3],
            4,
            &QUADRANGLE_LOCAL_EDGE,
            vec![[3, 0], [2, 3], [1, 2]],
        );
        assert!(matches!(res, Err(MeshError::MissingEdge { .. })));
    }

    #[test]
    fn non_manifold_edge() {
        let res = MeshTopology::new(5, vec![0, 1, 2, 1, 0, 3, 0, 1, 4], 3, &TRIANGLE_LOCAL_EDGE);
        assert!(matches!(res, Err(MeshError::NonManifoldEdge(0, 1))));
    }

    #[test]
    fn bad_cells() {
        assert!(matches!(
            MeshTopology::new(3, vec![0, 1, 5], 3, &TRIANGLE_LOCAL_EDGE),
            Err(MeshError::NodeOutOfRange { node: 5, .. })
        ));
        assert!(matches!(
            MeshTopology::new(3, vec![0, 1, 2, 0], 3, &TRIANGLE_LOCAL_EDGE),
            Err(MeshError::CellArity { len: 4, nvc: 3 })
        ));
        assert!(matches!(
            MeshTopology::new(3, vec![0, 1, 1], 3, &TRIANGLE_LOCAL_EDGE),
            Err(MeshError::DegenerateEdge { cell: 0, .. })
        ));
    }
}
