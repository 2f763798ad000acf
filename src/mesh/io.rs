use super::quadrangle::QuadrangleMesh;
use super::space::Point;
use super::triangle::TriangleMesh;
use super::MeshError;

use json::JsonValue;
use std::collections::HashSet;
use std::fs::read_to_string;

#[cfg(feature = "json_export")]
use super::Mesh2d;
#[cfg(feature = "json_export")]
use json::object;
#[cfg(feature = "json_export")]
use std::fs::File;
#[cfg(feature = "json_export")]
use std::io::BufWriter;

/// Node locations and cell connectivity as stored in a mesh file
///
/// mesh.json
/// ```JSON
/// {
///     "Nodes": [
///         [x_coordinate, y_coordinate],
///         [0.0, 0.0],
///         [1.0, 0.0],
///         [1.0, 1.0],
///         [0.0, 1.0]
///     ],
///     "Cells": [
///         [node_0_id, node_1_id, node_2_id, ...],
///         [0, 1, 2, 3]
///     ]
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MeshFile {
    pub nodes: Vec<Point>,
    pub cells: Vec<Vec<usize>>,
}

impl MeshFile {
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, MeshError> {
        let mesh_file_contents = read_to_string(path.as_ref())?;
        Self::parse(&mesh_file_contents)
    }

    pub fn parse(contents: &str) -> Result<Self, MeshError> {
        let mesh_file_json = json::parse(contents)?;

        let nodes = parse_node_information(&mesh_file_json)?;
        let cells = parse_cell_information(&mesh_file_json)?;

        if let Some((cell_id, node)) = cells
            .iter()
            .enumerate()
            .flat_map(|(cell_id, cell)| cell.iter().map(move |node| (cell_id, *node)))
            .find(|(_, node)| *node >= nodes.len())
        {
            return Err(MeshError::NodeOutOfRange {
                cell: cell_id,
                node,
                num_nodes: nodes.len(),
            });
        }

        Ok(Self { nodes, cells })
    }

    fn fixed_size_cells<const N: usize>(&self) -> Result<Vec<[usize; N]>, MeshError> {
        self.cells
            .iter()
            .map(|cell| {
                <[usize; N]>::try_from(cell.as_slice()).map_err(|_| MeshError::CellArity {
                    len: cell.len(),
                    nvc: N,
                })
            })
            .collect()
    }
}

impl TriangleMesh {
    /// Load a triangle mesh from a JSON file with three node ids per cell (see [MeshFile])
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, MeshError> {
        let mesh_file = MeshFile::from_file(path)?;
        let cells = mesh_file.fixed_size_cells::<3>()?;
        Self::new(mesh_file.nodes, cells)
    }
}

impl QuadrangleMesh {
    /// Load a quadrangle mesh from a JSON file with four counter-clockwise node ids per cell (see [MeshFile])
    pub fn from_file(path: impl AsRef<str>) -> Result<Self, MeshError> {
        let mesh_file = MeshFile::from_file(path)?;
        let cells = mesh_file.fixed_size_cells::<4>()?;
        Self::new(mesh_file.nodes, cells)
    }
}

/// Print a mesh to a JSON file: nodes and cells in the [MeshFile] layout, plus edges and edge-to-cell adjacency
#[cfg(feature = "json_export")]
pub fn export_to_json<M: Mesh2d>(mesh: &M, path: impl AsRef<str>) -> std::io::Result<()> {
    let f = File::create(path.as_ref())?;
    let mut w = BufWriter::new(&f);

    mesh_to_json(mesh).write_pretty(&mut w, 4)?;

    Ok(())
}

#[cfg(feature = "json_export")]
pub fn mesh_to_json<M: Mesh2d>(mesh: &M) -> JsonValue {
    let topo = mesh.topology();

    object! {
        "Nodes": JsonValue::from(mesh.nodes().iter().map(|node| JsonValue::from(*node)).collect::<Vec<_>>()),
        "Cells": JsonValue::from(topo.cells().map(|cell| cell.to_vec()).collect::<Vec<_>>()),
        "Edges": JsonValue::from(topo.edges().iter().map(|edge| edge.to_vec()).collect::<Vec<_>>()),
        "EdgeToCell": JsonValue::from(topo.edge_to_cell().iter().map(|e2c| e2c.to_vec()).collect::<Vec<_>>()),
    }
}

fn parse_node_information(mesh_file_json: &JsonValue) -> Result<Vec<Point>, MeshError> {
    if !mesh_file_json["Nodes"].is_array() {
        return Err(MeshError::Format("Nodes must be an Array!".to_string()));
    }

    let node_points = mesh_file_json["Nodes"]
        .members()
        .map(|json_node_point| {
            if !json_node_point.is_array() || json_node_point.members().count() != 2 {
                return Err(MeshError::Format(
                    "Nodes must be arrays of length 2!".to_string(),
                ));
            }

            match (json_node_point[0].as_f64(), json_node_point[1].as_f64()) {
                (Some(x), Some(y)) => Ok(Point::new(x, y)),
                _ => Err(MeshError::Format(
                    "Nodes must be composed of numerical values!".to_string(),
                )),
            }
        })
        .collect::<Result<Vec<Point>, MeshError>>()?;

    if has_duplicates(&node_points) {
        return Err(MeshError::DuplicateNodes);
    }

    Ok(node_points)
}

fn parse_cell_information(mesh_file_json: &JsonValue) -> Result<Vec<Vec<usize>>, MeshError> {
    if !mesh_file_json["Cells"].is_array() {
        return Err(MeshError::Format("Cells must be an Array!".to_string()));
    }

    mesh_file_json["Cells"]
        .members()
        .map(|json_cell| {
            if !json_cell.is_array() {
                return Err(MeshError::Format(
                    "Cells must be arrays of node ids!".to_string(),
                ));
            }

            json_cell
                .members()
                .map(|id| {
                    id.as_usize().ok_or_else(|| {
                        MeshError::Format("Cell node ids must be non-negative integers!".to_string())
                    })
                })
                .collect::<Result<Vec<usize>, MeshError>>()
        })
        .collect()
}

fn has_duplicates(points: &[Point]) -> bool {
    let mut uniq = HashSet::new();
    !points.iter().all(move |p| uniq.insert(*p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_SQUARE: &str = r#"{
        "Nodes": [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        "Cells": [[0, 1, 2, 3]]
    }"#;

    #[test]
    fn parse_mesh_file() {
        let mesh_file = MeshFile::parse(UNIT_SQUARE).unwrap();

        assert_eq!(mesh_file.nodes.len(), 4);
        assert_eq!(mesh_file.nodes[2], Point::new(1.0, 1.0));
        assert_eq!(mesh_file.cells, vec![vec![0, 1, 2, 3]]);
        assert_eq!(mesh_file.fixed_size_cells::<4>().unwrap(), vec![[0, 1, 2, 3]]);
        assert!(matches!(
            mesh_file.fixed_size_cells::<3>(),
            Err(MeshError::CellArity { len: 4, nvc: 3 })
        ));
    }

    #[test]
    fn malformed_mesh_files() {
        assert!(matches!(
            MeshFile::parse("{ \"Nodes\": [[0.0, 0.0]], "),
            Err(MeshError::Json(_))
        ));
        assert!(matches!(
            MeshFile::parse(r#"{ "Nodes": [[0.0, 0.0, 1.0]], "Cells": [] }"#),
            Err(MeshError::Format(_))
        ));
        assert!(matches!(
            MeshFile::parse(r#"{ "Nodes": [[0.0, 0.0], [0.0, 0.0]], "Cells": [] }"#),
            Err(MeshError::DuplicateNodes)
        ));
        assert!(matches!(
            MeshFile::parse(r#"{ "Nodes": [[0.0, 0.0], [1.0, 0.0]], "Cells": [[0, 1, 2]] }"#),
            Err(MeshError::NodeOutOfRange { cell: 0, node: 2, num_nodes: 2 })
        ));
        assert!(matches!(
            MeshFile::parse(r#"{ "Nodes": [[0.0, 0.0]], "Cells": [[-1]] }"#),
            Err(MeshError::Format(_))
        ));
        assert!(matches!(
            MeshFile::parse(r#"{ "Nodes": [[0.0, 0.0]] }"#),
            Err(MeshError::Format(_))
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            QuadrangleMesh::from_file("./this_mesh_does_not_exist.json"),
            Err(MeshError::Io(_))
        ));
    }

    #[cfg(feature = "json_export")]
    #[test]
    fn export_and_reload() {
        let mesh = QuadrangleMesh::from_box([0.0, 2.0, 0.0, 1.0], 2, 1, None).unwrap();
        let path = std::env::temp_dir().join("fem_mesh_2d_export_and_reload.json");
        let path = path.to_string_lossy();

        export_to_json(&mesh, &*path).unwrap();
        let reloaded = QuadrangleMesh::from_file(&*path).unwrap();

        assert_eq!(reloaded.number_of_nodes(), mesh.number_of_nodes());
        assert_eq!(
            reloaded.topology().cell_connectivity(),
            mesh.topology().cell_connectivity()
        );
        assert_eq!(reloaded.topology().edges(), mesh.topology().edges());

        let json = mesh_to_json(&mesh);
        assert_eq!(json["Edges"].members().count(), 7);
        assert_eq!(json["EdgeToCell"][0].members().count(), 4);
    }
}
