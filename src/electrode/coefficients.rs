//! Coefficient matrices by impulse response
//!
//! A coefficient matrix `M` (contacts x totnsegs) maps one per-segment current
//! vector to one potential per contact: `phi = M * i`. Column `j` is the
//! potential produced by a unit current in segment `j` alone, so `M` is
//! obtained by feeding the electrode the identity matrix as currents.
//!
//! # Probing
//!
//! - Batched electrodes receive the full `totnsegs x totnsegs` identity in a
//!   single `calc_lfp` call and return all columns at once.
//! - Other electrodes are probed once per unit basis vector.
//!
//! Either way the electrode's result fields are saved before the probe and
//! restored after it, whether the probe succeeded or not.

use nalgebra::{DMatrix, DVector};

use crate::electrode::Electrode;
use crate::error::{AlignmentError, LfpError, Result};
use crate::morphology::GeometryTable;

/// Linear operator from per-segment current (nA) to contact potential (mV)
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientMatrix {
    matrix: DMatrix<f64>,
}

impl CoefficientMatrix {
    /// Wrap a caller-supplied ("ad-hoc") coefficient matrix
    pub fn from_matrix(matrix: DMatrix<f64>) -> Self {
        Self { matrix }
    }

    /// Build the coefficient matrix of `electrode` for `geometry`
    ///
    /// # Errors
    ///
    /// - any error raised by the electrode's `calc_lfp`
    /// - [`AlignmentError::ElectrodeShape`] when the probe output is not
    ///   contacts x totnsegs
    pub fn build<E: Electrode + ?Sized>(electrode: &mut E, geometry: &GeometryTable) -> Result<Self> {
        let saved = electrode.state().clone();
        let probed = probe(electrode, geometry);
        *electrode.state_mut() = saved;

        let matrix = probed?;
        Self::check_shape(&matrix, electrode.name(), electrode.contacts(), geometry.totnsegs())?;

        Ok(Self { matrix })
    }

    pub(crate) fn check_shape(
        matrix: &DMatrix<f64>,
        electrode: &str,
        contacts: usize,
        totnsegs: usize,
    ) -> Result<()> {
        if matrix.shape() != (contacts, totnsegs) {
            return Err(AlignmentError::ElectrodeShape {
                electrode: electrode.to_string(),
                rows: matrix.nrows(),
                cols: matrix.ncols(),
                expected_rows: contacts,
                expected_cols: totnsegs,
            }
            .into());
        }
        Ok(())
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn into_matrix(self) -> DMatrix<f64> {
        self.matrix
    }

    /// Number of contacts (rows)
    pub fn contacts(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of segments (columns)
    pub fn segments(&self) -> usize {
        self.matrix.ncols()
    }

    /// Potential at every contact for one current sample
    pub fn apply(&self, current: &DVector<f64>) -> DVector<f64> {
        &self.matrix * current
    }

    /// Like [`apply`](Self::apply), writing into an existing buffer
    pub fn apply_into(&self, current: &DVector<f64>, out: &mut DVector<f64>) {
        out.gemv(1.0, &self.matrix, current, 0.0);
    }

    /// Check that this matrix spans a Geometry Table of `totnsegs` segments
    pub fn check_columns(&self, totnsegs: usize, source_index: usize) -> Result<()> {
        if self.segments() != totnsegs {
            return Err(AlignmentError::CoefficientColumns {
                source_index,
                expected: totnsegs,
                actual: self.segments(),
            }
            .into());
        }
        Ok(())
    }
}

fn probe<E: Electrode + ?Sized>(electrode: &mut E, geometry: &GeometryTable) -> Result<DMatrix<f64>> {
    let n = geometry.totnsegs();

    if electrode.supports_batched_currents() {
        electrode.calc_lfp(geometry, &DMatrix::identity(n, n))?;
        return stored_potential(electrode);
    }

    let mut matrix = DMatrix::zeros(electrode.contacts(), n);
    let mut unit = DMatrix::zeros(n, 1);
    for j in 0..n {
        unit[(j, 0)] = 1.0;
        electrode.calc_lfp(geometry, &unit)?;
        unit[(j, 0)] = 0.0;

        let column = stored_potential(electrode)?;
        if column.shape() != (matrix.nrows(), 1) {
            return Err(AlignmentError::ElectrodeShape {
                electrode: electrode.name().to_string(),
                rows: column.nrows(),
                cols: column.ncols(),
                expected_rows: matrix.nrows(),
                expected_cols: 1,
            }
            .into());
        }
        matrix.set_column(j, &column.column(0));
    }

    Ok(matrix)
}

fn stored_potential<E: Electrode + ?Sized>(electrode: &E) -> Result<DMatrix<f64>> {
    electrode.state().lfp.clone().ok_or_else(|| {
        LfpError::Electrode(format!(
            "electrode '{}' stored no potential after calc_lfp",
            electrode.name()
        ))
    })
}

// =================================================================================================
// Tests
// =================================================================================================
