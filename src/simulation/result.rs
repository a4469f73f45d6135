//! Immutable results of one LFP run
//!
//! The driver never writes into electrode objects. It returns an
//! [`LfpResult`]; the caller decides whether to attach the per-electrode
//! outputs with [`LfpResult::attach`] or [`ElectrodeOutput::merge_into`].
//!
//! # Merge policy
//!
//! - no prior `lfp` on the electrode: the new series is assigned
//! - prior `lfp` present: the new series is added to it (multi-cell superposition)
//! - per-cell electrodes additionally append the new series to `cell_lfp`
//! - `coefficients` is always replaced by the matrix the series was computed with

use nalgebra::DMatrix;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::electrode::{CoefficientMatrix, Electrode};
use crate::error::{AlignmentError, LfpError, Result};

/// Step count and end time of a finished run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Number of `advance` calls
    pub steps: usize,

    /// Engine time when the loop stopped (ms)
    pub final_time: f64,
}

// =================================================================================================
// Electrode Output
// =================================================================================================

/// Series computed for one electrode, not yet merged into it
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeOutput {
    /// Name of the electrode the series belongs to
    pub name: String,

    /// `contacts x samples` potential (mV); `None` when memory output was off
    pub lfp: Option<DMatrix<f64>>,

    pub coefficients: CoefficientMatrix,
}

impl ElectrodeOutput {
    /// Merge this output into `electrode`'s result fields
    ///
    /// # Errors
    ///
    /// [`AlignmentError::SeriesShape`] when a prior `lfp` has a different
    /// shape; the electrode is left untouched in that case.
    pub fn merge_into<E: Electrode + ?Sized>(&self, electrode: &mut E) -> Result<()> {
        self.check_merge(&*electrode)?;

        let per_cell = electrode.per_cell_lfp();
        let state = electrode.state_mut();

        if let Some(lfp) = &self.lfp {
            match state.lfp.as_mut() {
                Some(existing) => *existing += lfp,
                None => state.lfp = Some(lfp.clone()),
            }

            if per_cell {
                state.cell_lfp.get_or_insert_with(Vec::new).push(lfp.clone());
            }
        }

        state.coefficients = Some(self.coefficients.clone());
        Ok(())
    }

    /// Whether [`merge_into`](Self::merge_into) would succeed, without touching `electrode`
    pub fn check_merge<E: Electrode + ?Sized>(&self, electrode: &E) -> Result<()> {
        if let (Some(lfp), Some(existing)) = (&self.lfp, electrode.state().lfp.as_ref()) {
            if existing.shape() != lfp.shape() {
                return Err(AlignmentError::SeriesShape {
                    rows: lfp.nrows(),
                    cols: lfp.ncols(),
                    existing_rows: existing.nrows(),
                    existing_cols: existing.ncols(),
                }
                .into());
            }
        }
        Ok(())
    }
}

// =================================================================================================
// LFP Result
// =================================================================================================

/// Everything one LFP run produced
#[derive(Debug, Clone, PartialEq)]
pub struct LfpResult {
    /// Engine time of every retained sample (ms)
    pub time: Vec<f64>,

    /// Series of the caller-supplied matrices, in submission order
    pub coefficient_series: Vec<DMatrix<f64>>,

    /// Outputs of the electrode sources, in submission order
    pub electrode_outputs: Vec<ElectrodeOutput>,

    /// Output container, when file output ran
    pub file: Option<PathBuf>,

    /// Absolute membrane current per segment (nA), `totnsegs x samples`
    pub imem: Option<DMatrix<f64>>,

    /// Membrane voltage per segment (mV), `totnsegs x samples`
    pub vmem: Option<DMatrix<f64>>,

    pub summary: RunSummary,

    /// Free-form run description (driver, dt, start timestamp, ...)
    pub metadata: HashMap<String, String>,
}

impl LfpResult {
    /// Number of retained samples
    pub fn samples(&self) -> usize {
        self.time.len()
    }

    pub fn add_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Merge every electrode output into its electrode
    ///
    /// `electrodes` must be the electrode sources of the run, in the same
    /// order. Names and series shapes are checked for all electrodes before
    /// the first one is modified.
    pub fn attach(&self, electrodes: &mut [&mut dyn Electrode]) -> Result<()> {
        if electrodes.len() != self.electrode_outputs.len() {
            return Err(LfpError::Electrode(format!(
                "result holds {} electrode outputs, {} electrodes given",
                self.electrode_outputs.len(),
                electrodes.len()
            )));
        }

        for (output, electrode) in self.electrode_outputs.iter().zip(electrodes.iter()) {
            if output.name != electrode.name() {
                return Err(LfpError::Electrode(format!(
                    "output of '{}' cannot be attached to '{}'",
                    output.name,
                    electrode.name()
                )));
            }
            output.check_merge(&**electrode)?;
        }

        for (output, electrode) in self.electrode_outputs.iter().zip(electrodes.iter_mut()) {
            output.merge_into(&mut **electrode)?;
        }
        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================
