//! HDF5 backend for [`SeriesStore`]
//!
//! One `f64` dataset per coefficient source at the file root. Datasets are
//! chunked with an unlimited column extent: growable stores resize on demand
//! and every store is trimmed to the written sample count when it finishes.

use hdf5::{Dataset, File};
use nalgebra::DMatrix;
use ndarray::{s, ArrayView1};
use std::path::{Path, PathBuf};

use super::store::{check_dataset, dataset_name, SeriesStore, StoreLayout};
use crate::error::{LfpError, Result};

const CHUNK_COLUMNS: usize = 256;

/// Container file with one dataset per coefficient source
pub struct Hdf5Store {
    path: PathBuf,
    file: File,
    datasets: Vec<Dataset>,
    rows: Vec<usize>,
    columns: usize,
    growable: bool,
}

impl Hdf5Store {
    /// Create (truncate) `path` and allocate every dataset of `layout`
    pub fn create(path: &Path, layout: &StoreLayout) -> Result<Self> {
        let file = File::create(path)?;
        let columns = layout.capacity.max(1);

        let mut datasets = Vec::with_capacity(layout.rows.len());
        for (index, &rows) in layout.rows.iter().enumerate() {
            let dataset = file
                .new_dataset::<f64>()
                .chunk((rows.max(1), CHUNK_COLUMNS.min(columns)))
                .shape((rows, columns..))
                .create(dataset_name(index).as_str())?;
            datasets.push(dataset);
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            datasets,
            rows: layout.rows.clone(),
            columns,
            growable: layout.growable,
        })
    }

    /// Read dataset `index` of the file at `path` back into memory
    pub fn read_series(path: &Path, index: usize) -> Result<DMatrix<f64>> {
        let file = File::open(path)?;
        let array = file.dataset(&dataset_name(index))?.read_2d::<f64>()?;
        let (rows, cols) = array.dim();
        Ok(DMatrix::from_fn(rows, cols, |r, c| array[[r, c]]))
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        let columns = (self.columns * 2).max(needed);
        for (dataset, &rows) in self.datasets.iter().zip(&self.rows) {
            dataset.resize((rows, columns))?;
        }
        self.columns = columns;
        Ok(())
    }
}

impl SeriesStore for Hdf5Store {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write_column(&mut self, dataset: usize, tstep: usize, column: ArrayView1<'_, f64>) -> Result<()> {
        check_dataset(&self.rows, dataset, column.len())?;

        if tstep >= self.columns {
            if !self.growable {
                return Err(LfpError::Storage(format!(
                    "{} holds {} columns, cannot write column {}",
                    dataset_name(dataset),
                    self.columns,
                    tstep
                )));
            }
            self.grow(tstep + 1)?;
        }

        self.datasets[dataset].write_slice(column, s![.., tstep])?;
        Ok(())
    }

    fn finish(self: Box<Self>, samples: usize) -> Result<PathBuf> {
        if samples != self.columns {
            for (dataset, &rows) in self.datasets.iter().zip(&self.rows) {
                dataset.resize((rows, samples))?;
            }
        }
        self.file.flush()?;

        let Hdf5Store { path, file, datasets, .. } = *self;
        drop(datasets);
        drop(file);
        Ok(path)
    }
}
