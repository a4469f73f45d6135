//! Persistent series storage
//!
//! A [`SeriesStore`] holds one dataset per coefficient source, named
//! `electrode000`, `electrode001`, ... in submission order. Each dataset is
//! shaped `contacts x capacity` and written one column per retained step.
//! The store is opened in write-truncate mode before the loop and closed
//! exactly once by [`SeriesStore::finish`].

use ndarray::ArrayView1;
use std::path::{Path, PathBuf};

use crate::error::{LfpError, Result};

/// Suffix every output container file name carries
pub const FILE_SUFFIX: &str = ".h5";

/// Append [`FILE_SUFFIX`] unless the name already ends with it
///
/// ```rust
/// use lfp_rs::output::normalize_file_name;
///
/// assert_eq!(normalize_file_name("lfp"), "lfp.h5");
/// assert_eq!(normalize_file_name("lfp.h5"), "lfp.h5");
/// ```
pub fn normalize_file_name(name: &str) -> String {
    if name.ends_with(FILE_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, FILE_SUFFIX)
    }
}

/// Dataset name of the `index`-th coefficient source
pub fn dataset_name(index: usize) -> String {
    format!("electrode{:03}", index)
}

/// Shape of every dataset in a store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreLayout {
    /// Contact count of each dataset, in submission order
    pub rows: Vec<usize>,

    /// Initial column count
    pub capacity: usize,

    /// Columns may grow past `capacity` (adaptive stepping)
    pub growable: bool,
}

/// Single-writer column store
pub trait SeriesStore {
    fn path(&self) -> &Path;

    /// Write `column` into column `tstep` of dataset `dataset`
    fn write_column(&mut self, dataset: usize, tstep: usize, column: ArrayView1<'_, f64>) -> Result<()>;

    /// Trim every dataset to `samples` columns and close the container
    fn finish(self: Box<Self>, samples: usize) -> Result<PathBuf>;
}

/// Open a store at `path`, destroying any prior contents
///
/// Returns [`LfpError::PersistenceUnavailable`] when the crate was built
/// without a storage backend.
pub fn open_store(path: &Path, layout: &StoreLayout) -> Result<Box<dyn SeriesStore>> {
    #[cfg(feature = "hdf5")]
    {
        let store = super::hdf5::Hdf5Store::create(path, layout)?;
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "hdf5"))]
    {
        let _ = layout;
        Err(LfpError::PersistenceUnavailable(format!(
            "cannot write {}: built without the `hdf5` feature",
            path.display()
        )))
    }
}

pub(crate) fn check_dataset(layout_rows: &[usize], dataset: usize, column_len: usize) -> Result<()> {
    match layout_rows.get(dataset) {
        None => Err(LfpError::Storage(format!(
            "no dataset {} (store holds {})",
            dataset_name(dataset),
            layout_rows.len()
        ))),
        Some(&rows) if rows != column_len => Err(LfpError::Storage(format!(
            "{} expects columns of {} values, got {}",
            dataset_name(dataset),
            rows,
            column_len
        ))),
        Some(_) => Ok(()),
    }
}
