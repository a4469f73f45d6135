//! Output paths for potential samples
//!
//! Two independent paths receive the same per-step potential columns:
//!
//! - **Memory**: one growable or preallocated series per coefficient source
//!   ([`MemorySink`])
//! - **File**: one dataset per coefficient source in a single container
//!   ([`SeriesStore`], HDF5 backend behind the `hdf5` feature)
//!
//! # Architecture
//!
//! ```text
//! output/
//! ├── mod.rs     ← This file
//! ├── sink.rs    ← AccumulationSink, MemorySink
//! ├── store.rs   ← SeriesStore trait, open_store, naming
//! └── hdf5.rs    ← Hdf5Store (feature = "hdf5")
//! ```
//!
//! Without the `hdf5` feature, [`open_store`] reports
//! [`LfpError::PersistenceUnavailable`](crate::error::LfpError::PersistenceUnavailable)
//! and the driver falls back to memory output.

pub mod sink;
pub mod store;

#[cfg(feature = "hdf5")]
pub mod hdf5;

pub use sink::{AccumulationSink, MemorySink, SinkOutput};
pub use store::{dataset_name, normalize_file_name, open_store, SeriesStore, StoreLayout, FILE_SUFFIX};

#[cfg(feature = "hdf5")]
pub use self::hdf5::Hdf5Store;
