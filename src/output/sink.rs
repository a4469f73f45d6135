//! Accumulation of potential samples
//!
//! [`AccumulationSink`] turns one Current Sample into one potential column per
//! coefficient matrix (`phi = M * I`) and deposits it at the current step
//! index, in memory ([`MemorySink`]) and/or in a [`SeriesStore`]. The column
//! is computed once and shared by both paths.

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView1;
use std::path::PathBuf;

use super::store::SeriesStore;
use crate::electrode::CoefficientMatrix;
use crate::error::{AlignmentError, Result};

// =================================================================================================
// Memory Sink
// =================================================================================================

/// Preallocated `rows x capacity` series written one column at a time
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySink {
    series: DMatrix<f64>,
    growable: bool,
}

impl MemorySink {
    pub fn new(rows: usize, capacity: usize, growable: bool) -> Self {
        Self {
            series: DMatrix::zeros(rows, capacity),
            growable,
        }
    }

    pub fn rows(&self) -> usize {
        self.series.nrows()
    }

    pub fn capacity(&self) -> usize {
        self.series.ncols()
    }

    /// Write `values` into column `tstep`
    ///
    /// Past the capacity a growable sink doubles its columns; a fixed sink
    /// returns [`AlignmentError::SampleOverflow`].
    pub fn write(&mut self, tstep: usize, values: &[f64]) -> Result<()> {
        if values.len() != self.rows() {
            return Err(AlignmentError::CurrentLength {
                expected: self.rows(),
                actual: values.len(),
            }
            .into());
        }

        if tstep >= self.capacity() {
            if !self.growable {
                return Err(AlignmentError::SampleOverflow {
                    index: tstep,
                    capacity: self.capacity(),
                }
                .into());
            }
            let columns = (self.capacity() * 2).max(tstep + 1);
            let series = std::mem::replace(&mut self.series, DMatrix::zeros(0, 0));
            self.series = series.resize_horizontally(columns, 0.0);
        }

        self.series.column_mut(tstep).copy_from_slice(values);
        Ok(())
    }

    /// Series trimmed to the first `samples` columns
    pub fn finish(self, samples: usize) -> DMatrix<f64> {
        let samples = samples.min(self.capacity());
        self.series.resize_horizontally(samples, 0.0)
    }
}

// =================================================================================================
// Accumulation Sink
// =================================================================================================

/// Everything a finished sink hands back
#[derive(Debug, Clone, PartialEq)]
pub struct SinkOutput {
    /// One `contacts x samples` series per matrix; `None` when memory output is off
    pub series: Option<Vec<DMatrix<f64>>>,

    /// Path of the closed store, when file output was active
    pub file: Option<PathBuf>,

    pub samples: usize,
}

/// Per-step deposit of potential columns for a set of coefficient matrices
pub struct AccumulationSink<'m> {
    matrices: &'m [CoefficientMatrix],
    memory: Option<Vec<MemorySink>>,
    store: Option<Box<dyn SeriesStore>>,
    columns: Vec<DVector<f64>>,
    capacity: usize,
    growable: bool,
    tstep: usize,
}

impl<'m> AccumulationSink<'m> {
    /// Allocate one series per matrix
    ///
    /// `store`, when given, must already hold one dataset per matrix.
    pub fn new(
        matrices: &'m [CoefficientMatrix],
        capacity: usize,
        growable: bool,
        to_memory: bool,
        store: Option<Box<dyn SeriesStore>>,
    ) -> Self {
        let memory = to_memory.then(|| {
            matrices
                .iter()
                .map(|m| MemorySink::new(m.contacts(), capacity, growable))
                .collect()
        });
        let columns = matrices.iter().map(|m| DVector::zeros(m.contacts())).collect();

        Self {
            matrices,
            memory,
            store,
            columns,
            capacity,
            growable,
            tstep: 0,
        }
    }

    /// Index of the next column to be written
    pub fn tstep(&self) -> usize {
        self.tstep
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Whether a fixed-capacity sink has no column left
    pub fn is_full(&self) -> bool {
        !self.growable && self.tstep >= self.capacity
    }

    /// Deposit the potential of `current` (nA per segment) at the current step
    pub fn deposit(&mut self, current: &DVector<f64>) -> Result<()> {
        if self.is_full() {
            return Err(AlignmentError::SampleOverflow {
                index: self.tstep,
                capacity: self.capacity,
            }
            .into());
        }

        for (index, matrix) in self.matrices.iter().enumerate() {
            let column = &mut self.columns[index];
            matrix.apply_into(current, column);

            if let Some(memory) = self.memory.as_mut() {
                memory[index].write(self.tstep, column.as_slice())?;
            }
            if let Some(store) = self.store.as_mut() {
                store.write_column(index, self.tstep, ArrayView1::from(column.as_slice()))?;
            }
        }

        self.tstep += 1;
        Ok(())
    }

    /// Trim the series to the written samples and close the store
    pub fn finish(self) -> Result<SinkOutput> {
        let samples = self.tstep;
        let file = match self.store {
            Some(store) => Some(store.finish(samples)?),
            None => None,
        };
        let series = self
            .memory
            .map(|sinks| sinks.into_iter().map(|sink| sink.finish(samples)).collect());

        Ok(SinkOutput { series, file, samples })
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LfpError;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Records every column it receives
    struct RecordingStore {
        columns: Arc<Mutex<Vec<(usize, usize, Vec<f64>)>>>,
    }

    impl SeriesStore for RecordingStore {
        fn path(&self) -> &Path {
            Path::new("recording.h5")
        }

        fn write_column(&mut self, dataset: usize, tstep: usize, column: ArrayView1<'_, f64>) -> Result<()> {
            self.columns.lock().unwrap().push((dataset, tstep, column.to_vec()));
            Ok(())
        }

        fn finish(self: Box<Self>, _samples: usize) -> Result<PathBuf> {
            Ok(PathBuf::from("recording.h5"))
        }
    }

    fn matrices() -> Vec<CoefficientMatrix> {
        vec![
            CoefficientMatrix::from_matrix(DMatrix::from_row_slice(1, 2, &[1.0, 2.0])),
            CoefficientMatrix::from_matrix(DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0])),
        ]
    }

    // ====== Memory sink ======

    #[test]
    fn test_memory_sink_fixed_overflow() {
        let mut sink = MemorySink::new(1, 2, false);
        sink.write(0, &[1.0]).unwrap();
        sink.write(1, &[2.0]).unwrap();

        let err = sink.write(2, &[3.0]).unwrap_err();
        assert!(matches!(
            err,
            LfpError::Alignment(AlignmentError::SampleOverflow { index: 2, capacity: 2 })
        ));
    }

    #[test]
    fn test_memory_sink_grows_and_trims() {
        let mut sink = MemorySink::new(2, 1, true);
        for tstep in 0..5 {
            sink.write(tstep, &[tstep as f64, 1.0]).unwrap();
        }
        assert!(sink.capacity() >= 5);

        let series = sink.finish(5);
        assert_eq!(series.shape(), (2, 5));
        assert_eq!(series[(0, 4)], 4.0);
        assert_eq!(series[(1, 0)], 1.0);
    }

    #[test]
    fn test_memory_sink_rejects_wrong_length() {
        let mut sink = MemorySink::new(3, 2, false);
        assert!(sink.write(0, &[1.0, 2.0]).is_err());
    }

    // ====== Accumulation sink ======

    #[test]
    fn test_deposit_writes_one_column_per_matrix() {
        let matrices = matrices();
        let mut sink = AccumulationSink::new(&matrices, 3, false, true, None);

        sink.deposit(&DVector::from_vec(vec![1.0, 1.0])).unwrap();
        sink.deposit(&DVector::from_vec(vec![0.5, -1.0])).unwrap();
        assert_eq!(sink.tstep(), 2);

        let output = sink.finish().unwrap();
        assert_eq!(output.samples, 2);
        assert!(output.file.is_none());

        let series = output.series.unwrap();
        assert_eq!(series[0], DMatrix::from_row_slice(1, 2, &[3.0, -1.5]));
        assert_eq!(series[1], DMatrix::from_row_slice(2, 2, &[1.0, 0.5, -1.0, 1.0]));
    }

    #[test]
    fn test_memory_and_store_receive_identical_columns() {
        let matrices = matrices();
        let written = Arc::new(Mutex::new(Vec::new()));
        let store = RecordingStore { columns: Arc::clone(&written) };
        let mut sink = AccumulationSink::new(&matrices, 2, false, true, Some(Box::new(store)));
        assert!(sink.has_store());

        sink.deposit(&DVector::from_vec(vec![2.0, 3.0])).unwrap();
        let output = sink.finish().unwrap();
        assert_eq!(output.file, Some(PathBuf::from("recording.h5")));

        let series = output.series.unwrap();
        let written = written.lock().unwrap();
        assert_eq!(written.len(), 2);
        for (dataset, tstep, column) in written.iter() {
            assert_eq!(*tstep, 0);
            assert_eq!(column.as_slice(), series[*dataset].column(0).as_slice());
        }
    }

    #[test]
    fn test_file_only_sink_keeps_no_series() {
        let matrices = matrices();
        let store = RecordingStore { columns: Arc::new(Mutex::new(Vec::new())) };
        let mut sink = AccumulationSink::new(&matrices, 2, false, false, Some(Box::new(store)));
        sink.deposit(&DVector::from_vec(vec![1.0, 0.0])).unwrap();

        let output = sink.finish().unwrap();
        assert!(output.series.is_none());
        assert!(output.file.is_some());
    }

    #[test]
    fn test_full_sink_refuses_deposit() {
        let matrices = matrices();
        let mut sink = AccumulationSink::new(&matrices, 1, false, true, None);
        sink.deposit(&DVector::from_vec(vec![1.0, 0.0])).unwrap();
        assert!(sink.is_full());
        assert!(sink.deposit(&DVector::from_vec(vec![1.0, 0.0])).is_err());
        assert_eq!(sink.tstep(), 1);
    }
}
