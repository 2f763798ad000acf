use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use bytes::{BufMut, BytesMut};
use nalgebra::DMatrix;

/// PETSc's class id for binary matrix files
const PETSC_MAT_FILE_CLASSID: i32 = 1211216;

/// Wrapper around a BTreeMap to store general (rectangular, non-symmetric) matrices in a sparse data structure
///
/// Entries are ordered by row, then column.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    /// Matrix Entries
    entries: BTreeMap<[u32; 2], f64>,
}

impl SparseMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        assert!(
            rows <= (u32::MAX as usize) && cols <= (u32::MAX as usize),
            "Matrix Dimensions cannot exceed the size of a u32!"
        );

        Self {
            rows,
            cols,
            entries: BTreeMap::new(),
        }
    }

    pub fn square(dimension: usize) -> Self {
        Self::new(dimension, dimension)
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    fn coordinates(&self, [row_idx, col_idx]: [usize; 2]) -> [u32; 2] {
        assert!(
            row_idx < self.rows,
            "row_idx exceeded matrix dimension; cannot access value!"
        );
        assert!(
            col_idx < self.cols,
            "col_idx exceeded matrix dimension; cannot access value!"
        );

        // both indices fit in a u32 since the dimensions do
        [row_idx as u32, col_idx as u32]
    }

    /// Add a value to the matrix entry
    pub fn insert(&mut self, rc: [usize; 2], value: f64) {
        let coordinates = self.coordinates(rc);
        self.entries
            .entry(coordinates)
            .and_modify(|curr_val| *curr_val += value)
            .or_insert(value);
    }

    /// Overwrite the matrix entry
    pub fn set(&mut self, rc: [usize; 2], value: f64) {
        let coordinates = self.coordinates(rc);
        self.entries.insert(coordinates, value);
    }

    /// Value of an entry (zero if it is not stored)
    pub fn get(&self, rc: [usize; 2]) -> f64 {
        self.entries
            .get(&self.coordinates(rc))
            .copied()
            .unwrap_or(0.0)
    }

    /// Insert a group of entries
    pub fn insert_group(&mut self, entry_group: Vec<([usize; 2], f64)>) {
        for (rc, value) in entry_group {
            self.insert(rc, value);
        }
    }

    // Remove the entries from the matrix, replacing them with an empty BTreeMap.
    fn take_entries(&mut self) -> BTreeMap<[u32; 2], f64> {
        std::mem::take(&mut self.entries)
    }

    /// Consume the entries from another sparse matrix leaving it empty.
    pub fn consume_matrix(&mut self, other: &mut Self) {
        assert!(
            self.shape() == other.shape(),
            "Sparse Matrices have different dimensions; cannot consume matrix!"
        );

        for (coordinates, value) in other.take_entries() {
            self.entries
                .entry(coordinates)
                .and_modify(|curr_val| *curr_val += value)
                .or_insert(value);
        }
    }

    /// Iterate over the stored entries, ordered by row then column
    pub fn iter(&self) -> impl Iterator<Item = ([usize; 2], f64)> + '_ {
        self.entries
            .iter()
            .map(|(coords, value)| ([coords[0] as usize, coords[1] as usize], *value))
    }

    /// Iterate over the stored entries of one row
    pub fn row(&self, row_idx: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let r = row_idx as u32;
        self.entries
            .range([r, 0]..=[r, u32::MAX])
            .map(|([_, c], v)| (*c as usize, *v))
    }

    /// Matrix vector product
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        assert_eq!(
            x.len(),
            self.cols,
            "Vector length does not match the number of columns; cannot multiply!"
        );

        let mut y = vec![0.0; self.rows];
        for ([r, c], value) in self.iter() {
            y[r] += value * x[c];
        }
        y
    }

    pub fn transpose(&self) -> Self {
        Self {
            rows: self.cols,
            cols: self.rows,
            entries: self
                .entries
                .iter()
                .map(|([r, c], v)| ([*c, *r], *v))
                .collect(),
        }
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        self.rows == self.cols
            && self
                .iter()
                .all(|([r, c], v)| (self.get([c, r]) - v).abs() <= tol)
    }

    /// Remove every entry on the flagged rows and columns
    pub fn zero_rows_and_cols(&mut self, flags: &[bool]) {
        assert!(
            flags.len() >= self.rows.max(self.cols),
            "Row/Column flags do not cover the matrix!"
        );
        self.entries
            .retain(|[r, c], _| !flags[*r as usize] && !flags[*c as usize]);
    }

    pub fn write_to_petsc_binary_format(self, path: impl AsRef<str>) -> std::io::Result<()> {
        AIJMatrixBinary::from(self).print_to_petsc_binary_file(path)
    }
}

impl From<SparseMatrix> for DMatrix<f64> {
    fn from(sm: SparseMatrix) -> Self {
        let mut dense = DMatrix::zeros(sm.rows, sm.cols);
        for ([r, c], v) in sm.iter() {
            dense[(r, c)] = v;
        }
        dense
    }
}

impl From<SparseMatrix> for AIJMatrixBinary {
    fn from(sm: SparseMatrix) -> Self {
        // number of entries in each row
        let mut row_counts = vec![0; sm.rows];
        for [r, _] in sm.entries.keys() {
            row_counts[*r as usize] += 1;
        }

        // matrix entries and their associated columns; sorted by row then column
        let (j, a) = sm
            .entries
            .iter()
            .map(|([_, c], v)| (*c as i32, *v))
            .unzip();

        AIJMatrixBinary {
            a,
            i: row_counts,
            j,
            shape: [sm.rows, sm.cols],
        }
    }
}

/// Petsc/Slepc Sparse Matrix Format
pub struct AIJMatrixBinary {
    pub a: Vec<f64>,
    pub i: Vec<i32>, // Number of entries on each row (compute a prefix sum to get canonical form)
    pub j: Vec<i32>,
    pub shape: [usize; 2],
}

impl AIJMatrixBinary {
    pub fn print_to_petsc_binary_file(&self, path: impl AsRef<str>) -> std::io::Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        writer.write_all(self.to_bytes().as_ref())?;
        writer.flush()
    }

    /// Big-endian PETSc binary representation: header, row counts, column indices, values
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(16 + 4 * (self.i.len() + self.j.len()) + 8 * self.a.len());

        // header
        buf.put_i32(PETSC_MAT_FILE_CLASSID);
        buf.put_i32(self.shape[0] as i32);
        buf.put_i32(self.shape[1] as i32);
        buf.put_i32(self.a.len() as i32);

        // num-non-zero entries on each row
        for &rnz in self.i.iter() {
            buf.put_i32(rnz);
        }

        // column indices of non-zero entries
        for &j in self.j.iter() {
            buf.put_i32(j);
        }

        // non-zero entries
        for &a in self.a.iter() {
            buf.put_f64(a);
        }

        buf
    }
}
