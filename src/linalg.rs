/// Use Nalgebra's LU decomposition to solve small linear systems
pub mod dense_solve;
/// Sparsely Packed Matrix
pub mod sparse_matrix;

use rayon::prelude::*;
pub use sparse_matrix::{AIJMatrixBinary, SparseMatrix};
use std::sync::mpsc::channel;

pub use dense_solve::{solve_dense, SolveError};

/// Group of matrix entries produced by a single element
pub type EntryGroup = Vec<([usize; 2], f64)>;

/// Group of vector entries produced by a single element
pub type VectorGroup = Vec<(usize, f64)>;

/// Linear System
///
/// Au = b
#[derive(Clone, Debug)]
pub struct LinearSystem {
    /// A Matrix
    pub a: SparseMatrix,
    /// Right hand side
    pub b: Vec<f64>,
}

impl LinearSystem {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            a: SparseMatrix::square(num_dofs),
            b: vec![0.0; num_dofs],
        }
    }

    pub fn from_parts(a: SparseMatrix, b: Vec<f64>) -> Self {
        assert_eq!(
            a.shape(),
            [b.len(), b.len()],
            "Matrix and right hand side have incompatible dimensions!"
        );
        Self { a, b }
    }

    pub fn num_dofs(&self) -> usize {
        self.b.len()
    }

    pub fn print_to_petsc_binary_files(
        self,
        dir: impl AsRef<str>,
        prefix: impl AsRef<str>,
    ) -> std::io::Result<()> {
        let a: AIJMatrixBinary = self.a.into();
        a.print_to_petsc_binary_file(format!("{}/{}_a.dat", dir.as_ref(), prefix.as_ref()))?;
        AIJMatrixBinary {
            a: self.b.clone(),
            i: vec![1; self.b.len()],
            j: vec![0; self.b.len()],
            shape: [self.b.len(), 1],
        }
        .print_to_petsc_binary_file(format!("{}/{}_b.dat", dir.as_ref(), prefix.as_ref()))
    }

    /// Solve the system with a dense LU decomposition
    pub fn solve_dense(&self) -> Result<Vec<f64>, SolveError> {
        solve_dense(&self.a, &self.b)
    }
}

/// Dense vector summed from per-element groups
#[derive(Clone, Debug, PartialEq)]
pub struct DenseVector {
    pub values: Vec<f64>,
}

impl DenseVector {
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.values
    }
}

impl ParallelExtend<VectorGroup> for DenseVector {
    fn par_extend<I>(&mut self, elem_groups_iter: I)
    where
        I: IntoParallelIterator<Item = VectorGroup>,
    {
        let (sender, receiver) = channel();

        elem_groups_iter
            .into_par_iter()
            .for_each_with(sender, |s, elem_group| {
                s.send(elem_group).expect(
                    "Failed to send element groups over MPSC channel; cannot construct Vector!",
                );
            });

        receiver.iter().for_each(|elem_group| {
            for (r, v) in elem_group {
                self.values[r] += v;
            }
        });
    }
}

impl ParallelExtend<(EntryGroup, VectorGroup)> for LinearSystem {
    fn par_extend<I>(&mut self, elem_groups_iter: I)
    where
        I: IntoParallelIterator<Item = (EntryGroup, VectorGroup)>,
    {
        let (sender, receiver) = channel();

        elem_groups_iter
            .into_par_iter()
            .for_each_with(sender, |s, elem_groups| {
                s.send(elem_groups).expect(
                    "Failed to send element groups over MPSC channel; cannot construct Linear System!",
                );
            });

        receiver.iter().for_each(|(elem_a, elem_b)| {
            self.a.insert_group(elem_a);
            for (r, v) in elem_b {
                self.b[r] += v;
            }
        });
    }
}

impl ParallelExtend<EntryGroup> for SparseMatrix {
    fn par_extend<I>(&mut self, elem_groups_iter: I)
    where
        I: IntoParallelIterator<Item = EntryGroup>,
    {
        let (sender, receiver) = channel();

        elem_groups_iter
            .into_par_iter()
            .for_each_with(sender, |s, elem_group| {
                s.send(elem_group).expect(
                    "Failed to send element groups over MPSC channel; cannot construct Matrix!",
                );
            });

        receiver
            .iter()
            .for_each(|elem_group| self.insert_group(elem_group));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_assembly() {
        let mut system = LinearSystem::new(4);
        system.par_extend((0..4_usize).into_par_iter().map(|i| {
            let j = (i + 1) % 4;
            (
                vec![([i, i], 1.0), ([j, j], 1.0), ([i, j], -1.0), ([j, i], -1.0)],
                vec![(i, 0.5), (j, 0.5)],
            )
        }));

        for i in 0..4 {
            assert!((system.a.get([i, i]) - 2.0).abs() < 1e-15);
            assert!((system.b[i] - 1.0).abs() < 1e-15);
        }
        assert!((system.a.get([0, 3]) + 1.0).abs() < 1e-15);
        assert!(system.a.get([0, 2]).abs() < 1e-15);
        assert!(system.a.is_symmetric(1e-15));
    }

    #[test]
    fn parallel_vector_extension() {
        let mut v = DenseVector::zeros(3);
        v.par_extend((0..6_usize).into_par_iter().map(|i| vec![(i % 3, 1.0), (0, 0.5)]));

        assert_eq!(v.into_inner(), vec![5.0, 2.0, 2.0]);
    }

    #[test]
    fn parallel_matrix_extension() {
        let mut sm = SparseMatrix::new(2, 3);
        sm.par_extend(vec![vec![([0, 0], 1.0)], vec![([0, 0], 2.0), ([1, 2], 1.0)]]);

        assert!((sm.get([0, 0]) - 3.0).abs() < 1e-15);
        assert_eq!(sm.num_entries(), 2);
    }
}
