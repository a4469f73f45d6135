//! Electrodes and the geometry-to-potential forward model
//!
//! An electrode is a set of observation contacts where the extracellular
//! potential is evaluated. This module defines:
//!
//! - **[`Electrode`]**: the collaborator contract (`calc_lfp` on a batch of
//!   per-segment currents, plus the result fields the driver writes back)
//! - **[`ElectrodeState`]**: the caller-owned result fields (`lfp`,
//!   `cell_lfp`, `coefficients`)
//! - **[`CoefficientMatrix`]**: the linear operator `potential = M * current`
//!   built once per (electrode, geometry) pair by impulse response
//! - **[`ExtracellularElectrode`]**: a reference electrode for a homogeneous
//!   medium (point-source and line-source approximations)
//!
//! # Units
//!
//! Currents in nA, conductivity in S/m, distances in um, potentials in mV.
//!
//! # Example
//!
//! ```rust,ignore
//! use lfp_rs::electrode::{CoefficientMatrix, ElectrodeConfig, ExtracellularElectrode};
//!
//! let config = ElectrodeConfig::new(0.3, vec![Point3::new(50.0, 0.0, 0.0)]);
//! let mut electrode = ExtracellularElectrode::new("shank", config)?;
//! let coefficients = CoefficientMatrix::build(&mut electrode, &geometry)?;
//! assert_eq!(coefficients.segments(), geometry.totnsegs());
//! ```

pub mod coefficients;
pub mod extracellular;

pub use coefficients::CoefficientMatrix;
pub use extracellular::{ElectrodeConfig, ExtracellularElectrode, SourceMethod};

use nalgebra::DMatrix;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;
use crate::morphology::GeometryTable;

// =================================================================================================
// Electrode Result State
// =================================================================================================

/// Result fields owned by an electrode
///
/// The simulation driver never writes these directly; the caller merges an
/// [`ElectrodeOutput`](crate::simulation::ElectrodeOutput) into them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElectrodeState {
    /// Accumulated potential, contacts x samples (mV)
    pub lfp: Option<DMatrix<f64>>,

    /// Per-source-cell contributions, kept when the electrode asks for them
    pub cell_lfp: Option<Vec<DMatrix<f64>>>,

    /// Coefficient matrix the last merged result was computed with
    pub coefficients: Option<CoefficientMatrix>,
}

// =================================================================================================
// Electrode Trait
// =================================================================================================

/// Electrode collaborator
///
/// # Batched currents
///
/// `calc_lfp` receives a `totnsegs x k` matrix: each column is one
/// per-segment current vector (nA). It must compute the `contacts x k`
/// potential and store it in `state_mut().lfp`. Electrodes that can only
/// handle one column at a time return `false` from
/// [`supports_batched_currents`](Electrode::supports_batched_currents); the
/// coefficient builder then probes one unit current at a time.
pub trait Electrode {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Number of observation contacts
    fn contacts(&self) -> usize;

    /// Keep each source cell's contribution separately in `cell_lfp`
    fn per_cell_lfp(&self) -> bool {
        false
    }

    /// Whether `calc_lfp` accepts more than one current column per call
    fn supports_batched_currents(&self) -> bool {
        true
    }

    fn state(&self) -> &ElectrodeState;

    fn state_mut(&mut self) -> &mut ElectrodeState;

    /// Compute the potential of `currents` and store it in the electrode state
    fn calc_lfp(&mut self, geometry: &GeometryTable, currents: &DMatrix<f64>) -> Result<()>;
}

// =================================================================================================
// Parallel Execution Threshold
// =================================================================================================

/// Default number of coefficient entries (contacts x segments) above which
/// rows are computed in parallel when the `parallel` feature is enabled.
const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

static PARALLEL_THRESHOLD: AtomicUsize = AtomicUsize::new(DEFAULT_PARALLEL_THRESHOLD);

/// Return the current parallel-execution threshold.
///
/// # Example
///
/// ```rust
/// use lfp_rs::electrode::parallel_threshold;
///
/// assert!(parallel_threshold() > 0);
/// ```
pub fn parallel_threshold() -> usize {
    PARALLEL_THRESHOLD.load(Ordering::Relaxed)
}

/// Set the parallel-execution threshold to a new value.
///
/// # Panics
///
/// Panics when `threshold == 0`.
pub fn set_parallel_threshold(threshold: usize) {
    assert!(threshold > 0, "parallel threshold must be at least 1");
    PARALLEL_THRESHOLD.store(threshold, Ordering::Relaxed);
}

/// Saves the threshold on construction and restores it on drop.
#[cfg(test)]
pub(crate) struct ThresholdGuard {
    previous: usize,
}

#[cfg(test)]
impl ThresholdGuard {
    pub(crate) fn save(new_value: usize) -> Self {
        let previous = parallel_threshold();
        set_parallel_threshold(new_value);
        Self { previous }
    }
}

#[cfg(test)]
impl Drop for ThresholdGuard {
    fn drop(&mut self) {
        PARALLEL_THRESHOLD.store(self.previous, Ordering::Relaxed);
    }
}

// =================================================================================================
// Tests
// =================================================================================================
