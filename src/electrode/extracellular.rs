//! Extracellular electrode in a homogeneous, isotropic medium
//!
//! # Forward models
//!
//! For a segment carrying current `I` (nA) in a medium of conductivity
//! `sigma` (S/m), the potential at a contact `p` (mV, distances in um) is
//!
//! **Point source** (current concentrated at the segment midpoint):
//!
//! ```text
//! phi = I / (4 pi sigma r)
//! ```
//!
//! **Line source** (current spread uniformly along the segment, length `ds`):
//!
//! ```text
//! phi = I / (4 pi sigma ds) * ln((sqrt(l^2 + r^2) + l) / (sqrt(h^2 + r^2) + h))
//! ```
//!
//! where `h` is the signed distance of `p` beyond the segment end along the
//! segment axis, `l = h + ds`, and `r` the distance from the axis. The log
//! argument is evaluated in one of three algebraically equal forms depending
//! on the signs of `h` and `l`, so that no form subtracts nearly equal numbers.
//!
//! Distances are never allowed below half the segment diameter.

use nalgebra::{DMatrix, Point3};
use std::f64::consts::PI;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::electrode::{CoefficientMatrix, Electrode, ElectrodeState};
use crate::error::{AlignmentError, LfpError, Result};
use crate::morphology::{GeometryTable, Segment};

// =================================================================================================
// Configuration
// =================================================================================================

/// Approximation used for each segment's current distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMethod {
    /// All current at the segment midpoint
    PointSource,

    /// Current spread uniformly along the segment
    #[default]
    LineSource,

    /// Point source for soma segments, line source elsewhere
    SomaAsPoint,
}

/// Configuration for [`ExtracellularElectrode`]
///
/// # Example
///
/// ```rust
/// use lfp_rs::electrode::{ElectrodeConfig, SourceMethod};
/// use nalgebra::Point3;
///
/// let config = ElectrodeConfig::new(0.3, vec![Point3::new(100.0, 0.0, 0.0)])
///     .method(SourceMethod::PointSource)
///     .per_cell_lfp(true);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeConfig {
    /// Extracellular conductivity (S/m)
    pub sigma: f64,

    /// Contact positions (um)
    pub contacts: Vec<Point3<f64>>,

    /// Source approximation
    pub method: SourceMethod,

    /// Keep each cell's contribution in `cell_lfp`
    pub per_cell_lfp: bool,
}

impl ElectrodeConfig {
    pub fn new(sigma: f64, contacts: Vec<Point3<f64>>) -> Self {
        Self {
            sigma,
            contacts,
            method: SourceMethod::default(),
            per_cell_lfp: false,
        }
    }

    /// Builder pattern: set source approximation
    pub fn method(mut self, method: SourceMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder pattern: keep per-cell contributions
    pub fn per_cell_lfp(mut self, enabled: bool) -> Self {
        self.per_cell_lfp = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(LfpError::InvalidConfiguration(format!(
                "conductivity must be positive and finite, got {}",
                self.sigma
            )));
        }
        if self.contacts.is_empty() {
            return Err(LfpError::InvalidConfiguration(
                "electrode needs at least one contact".to_string(),
            ));
        }
        if let Some(i) = self
            .contacts
            .iter()
            .position(|p| p.iter().any(|c| !c.is_finite()))
        {
            return Err(LfpError::InvalidConfiguration(format!(
                "contact {} has a non-finite coordinate",
                i
            )));
        }
        Ok(())
    }
}

// =================================================================================================
// Electrode
// =================================================================================================

/// Multi-contact electrode in a homogeneous medium
#[derive(Debug, Clone)]
pub struct ExtracellularElectrode {
    name: String,
    config: ElectrodeConfig,
    preset: Option<DMatrix<f64>>,
    state: ElectrodeState,
}

impl ExtracellularElectrode {
    /// Create an electrode; the configuration is validated here
    pub fn new(name: impl Into<String>, config: ElectrodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
            preset: None,
            state: ElectrodeState::default(),
        })
    }

    /// Use a pre-computed coefficient matrix instead of the forward model
    pub fn with_coefficients(mut self, coefficients: DMatrix<f64>) -> Result<Self> {
        if coefficients.nrows() != self.config.contacts.len() {
            return Err(AlignmentError::ElectrodeShape {
                electrode: self.name.clone(),
                rows: coefficients.nrows(),
                cols: coefficients.ncols(),
                expected_rows: self.config.contacts.len(),
                expected_cols: coefficients.ncols(),
            }
            .into());
        }
        self.preset = Some(coefficients);
        Ok(self)
    }

    pub fn config(&self) -> &ElectrodeConfig {
        &self.config
    }

    /// Coefficient matrix of the forward model for `geometry`,
    /// contacts x totnsegs.
    pub fn forward_model(&self, geometry: &GeometryTable) -> DMatrix<f64> {
        let n = geometry.totnsegs();
        let rows = self.config.contacts.len();
        let sources: Vec<(Source, &Segment)> = geometry
            .iter()
            .map(|seg| (self.source_kind(geometry, seg), seg))
            .collect();

        let row = |contact: &Point3<f64>| -> Vec<f64> {
            sources
                .iter()
                .map(|(kind, seg)| match kind {
                    Source::Point => point_source(contact, seg, self.config.sigma),
                    Source::Line => line_source(contact, seg, self.config.sigma),
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let values: Vec<Vec<f64>> = if rows * n > super::parallel_threshold() {
            self.config.contacts.par_iter().map(&row).collect()
        } else {
            self.config.contacts.iter().map(&row).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let values: Vec<Vec<f64>> = self.config.contacts.iter().map(&row).collect();

        DMatrix::from_fn(rows, n, |i, j| values[i][j])
    }

    fn source_kind(&self, geometry: &GeometryTable, segment: &Segment) -> Source {
        match self.config.method {
            SourceMethod::PointSource => Source::Point,
            SourceMethod::LineSource => Source::Line,
            SourceMethod::SomaAsPoint => {
                let is_soma = geometry
                    .section_name(segment.id)
                    .map(|name| name.starts_with("soma"))
                    .unwrap_or(false);
                if is_soma {
                    Source::Point
                } else {
                    Source::Line
                }
            }
        }
    }
}

impl Electrode for ExtracellularElectrode {
    fn name(&self) -> &str {
        &self.name
    }

    fn contacts(&self) -> usize {
        self.config.contacts.len()
    }

    fn per_cell_lfp(&self) -> bool {
        self.config.per_cell_lfp
    }

    fn state(&self) -> &ElectrodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ElectrodeState {
        &mut self.state
    }

    fn calc_lfp(&mut self, geometry: &GeometryTable, currents: &DMatrix<f64>) -> Result<()> {
        let n = geometry.totnsegs();
        if currents.nrows() != n {
            return Err(AlignmentError::CurrentLength {
                expected: n,
                actual: currents.nrows(),
            }
            .into());
        }

        let lfp = match &self.preset {
            Some(matrix) => {
                CoefficientMatrix::check_shape(matrix, &self.name, self.contacts(), n)?;
                matrix * currents
            }
            None => self.forward_model(geometry) * currents,
        };

        if self.config.per_cell_lfp {
            self.state
                .cell_lfp
                .get_or_insert_with(Vec::new)
                .push(lfp.clone());
        }
        self.state.lfp = Some(lfp);

        Ok(())
    }
}

// =================================================================================================
// Forward Models
// =================================================================================================

#[derive(Debug, Clone, Copy)]
enum Source {
    Point,
    Line,
}

/// Potential (mV) at `contact` per nA at the segment midpoint
fn point_source(contact: &Point3<f64>, segment: &Segment, sigma: f64) -> f64 {
    let r = nalgebra::distance(contact, &segment.midpoint()).max(segment.diam / 2.0);
    1.0 / (4.0 * PI * sigma * r)
}

/// Potential (mV) at `contact` per nA spread along the segment
fn line_source(contact: &Point3<f64>, segment: &Segment, sigma: f64) -> f64 {
    let axis = segment.end.coords - segment.start.coords;
    let ds = axis.norm();
    if ds <= f64::EPSILON {
        return point_source(contact, segment, sigma);
    }

    let to_contact = contact.coords - segment.end.coords;
    let h = to_contact.dot(&axis) / ds;
    let l = h + ds;

    let r_limit = segment.diam / 2.0;
    let r2 = (to_contact.norm_squared() - h * h).max(r_limit * r_limit);

    let root_h = (h * h + r2).sqrt();
    let root_l = (l * l + r2).sqrt();

    let log_argument = if h < 0.0 && l > 0.0 {
        // contact projects onto the segment
        (root_h - h) * (root_l + l) / r2
    } else if l <= 0.0 {
        // contact lies before the segment start
        (root_h - h) / (root_l - l)
    } else {
        // contact lies beyond the segment end
        (root_l + l) / (root_h + h)
    };

    log_argument.ln() / (4.0 * PI * sigma * ds)
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{SectionSpan, SegmentId};
    use approx::assert_relative_eq;

    fn segment(start: [f64; 3], end: [f64; 3], diam: f64) -> Segment {
        let start = Point3::from(start);
        let end = Point3::from(end);
        Segment {
            id: SegmentId(0),
            section: 0,
            start,
            end,
            area: PI * diam * nalgebra::distance(&start, &end),
            diam,
            length: nalgebra::distance(&start, &end),
        }
    }

    fn table(segments: Vec<Segment>, names: &[&str]) -> GeometryTable {
        let spans = names
            .iter()
            .enumerate()
            .map(|(i, name)| SectionSpan {
                name: name.to_string(),
                first: SegmentId(i),
                nseg: 1,
            })
            .collect();
        let segments = segments
            .into_iter()
            .enumerate()
            .map(|(i, mut s)| {
                s.section = i;
                s
            })
            .collect();
        GeometryTable::from_parts(segments, spans).unwrap()
    }

    // ====== Configuration ======

    #[test]
    fn test_config_validation() {
        let good = ElectrodeConfig::new(0.3, vec![Point3::origin()]);
        assert!(good.validate().is_ok());

        assert!(ElectrodeConfig::new(0.0, vec![Point3::origin()]).validate().is_err());
        assert!(ElectrodeConfig::new(f64::NAN, vec![Point3::origin()]).validate().is_err());
        assert!(ElectrodeConfig::new(0.3, vec![]).validate().is_err());
        assert!(ElectrodeConfig::new(0.3, vec![Point3::new(0.0, f64::INFINITY, 0.0)])
            .validate()
            .is_err());
        assert!(ExtracellularElectrode::new("bad", ElectrodeConfig::new(-1.0, vec![])).is_err());
    }

    // ====== Forward models ======

    #[test]
    fn test_point_source_closed_form() {
        let seg = segment([-0.5, 0.0, 0.0], [0.5, 0.0, 0.0], 1.0);
        let value = point_source(&Point3::new(0.0, 50.0, 0.0), &seg, 0.3);
        assert_relative_eq!(value, 1.0 / (4.0 * PI * 0.3 * 50.0), max_relative = 1e-12);
    }

    #[test]
    fn test_point_source_distance_is_clamped() {
        let seg = segment([-0.5, 0.0, 0.0], [0.5, 0.0, 0.0], 2.0);
        let at_center = point_source(&Point3::origin(), &seg, 0.3);
        assert_relative_eq!(at_center, 1.0 / (4.0 * PI * 0.3 * 1.0), max_relative = 1e-12);
    }

    #[test]
    fn test_line_source_far_field_matches_point_source() {
        let seg = segment([0.0, -1.0, 0.0], [0.0, 1.0, 0.0], 1.0);
        for contact in [
            Point3::new(200.0, 0.0, 0.0),
            Point3::new(0.0, 200.0, 0.0),
            Point3::new(0.0, -200.0, 0.0),
        ] {
            let line = line_source(&contact, &seg, 0.3);
            let point = point_source(&contact, &seg, 0.3);
            assert_relative_eq!(line, point, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_line_source_is_symmetric_about_segment() {
        let seg = segment([0.0, -10.0, 0.0], [0.0, 10.0, 0.0], 1.0);
        let before = line_source(&Point3::new(5.0, -30.0, 0.0), &seg, 0.3);
        let after = line_source(&Point3::new(5.0, 30.0, 0.0), &seg, 0.3);
        assert_relative_eq!(before, after, max_relative = 1e-10);
    }

    #[test]
    fn test_line_source_perpendicular_closed_form() {
        // contact at distance r from the segment center on the bisector
        let half = 10.0;
        let r = 20.0_f64;
        let seg = segment([0.0, -half, 0.0], [0.0, half, 0.0], 1.0);
        let expected = ((half.hypot(r) + half) / (half.hypot(r) - half)).ln()
            / (4.0 * PI * 0.3 * 2.0 * half);
        let value = line_source(&Point3::new(r, 0.0, 0.0), &seg, 0.3);
        assert_relative_eq!(value, expected, max_relative = 1e-10);
    }

    // ====== Electrode behavior ======

    #[test]
    fn test_soma_as_point_uses_point_source_for_soma_only() {
        let geometry = table(
            vec![
                segment([0.0, -10.0, 0.0], [0.0, 10.0, 0.0], 10.0),
                segment([0.0, 10.0, 0.0], [0.0, 60.0, 0.0], 1.0),
            ],
            &["soma[0]", "dend[0]"],
        );
        let contact = Point3::new(30.0, 0.0, 0.0);

        let config = ElectrodeConfig::new(0.3, vec![contact]).method(SourceMethod::SomaAsPoint);
        let electrode = ExtracellularElectrode::new("mixed", config).unwrap();
        let m = electrode.forward_model(&geometry);

        assert_relative_eq!(m[(0, 0)], point_source(&contact, &geometry.segments()[0], 0.3));
        assert_relative_eq!(m[(0, 1)], line_source(&contact, &geometry.segments()[1], 0.3));
    }

    #[test]
    fn test_calc_lfp_stores_potential_and_cell_contributions() {
        let geometry = table(vec![segment([0.0, 0.0, 0.0], [0.0, 10.0, 0.0], 1.0)], &["soma"]);
        let config = ElectrodeConfig::new(0.3, vec![Point3::new(0.0, 0.0, 100.0)])
            .per_cell_lfp(true);
        let mut electrode = ExtracellularElectrode::new("e", config).unwrap();

        let currents = DMatrix::from_row_slice(1, 3, &[1.0, 0.0, -1.0]);
        electrode.calc_lfp(&geometry, &currents).unwrap();
        electrode.calc_lfp(&geometry, &currents).unwrap();

        let lfp = electrode.state().lfp.as_ref().unwrap();
        assert_eq!(lfp.shape(), (1, 3));
        assert!(lfp[(0, 0)] > 0.0);
        assert_relative_eq!(lfp[(0, 2)], -lfp[(0, 0)]);
        assert_eq!(electrode.state().cell_lfp.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_calc_lfp_rejects_misaligned_currents() {
        let geometry = table(vec![segment([0.0, 0.0, 0.0], [0.0, 10.0, 0.0], 1.0)], &["soma"]);
        let mut electrode =
            ExtracellularElectrode::new("e", ElectrodeConfig::new(0.3, vec![Point3::origin()]))
                .unwrap();

        let currents = DMatrix::zeros(2, 1);
        assert!(matches!(
            electrode.calc_lfp(&geometry, &currents),
            Err(LfpError::Alignment(AlignmentError::CurrentLength { expected: 1, actual: 2 }))
        ));
    }

    #[test]
    fn test_preset_coefficients_are_used_verbatim() {
        let geometry = table(
            vec![
                segment([0.0, 0.0, 0.0], [0.0, 10.0, 0.0], 1.0),
                segment([0.0, 10.0, 0.0], [0.0, 20.0, 0.0], 1.0),
            ],
            &["soma", "dend"],
        );
        let preset = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let config = ElectrodeConfig::new(0.3, vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let mut electrode = ExtracellularElectrode::new("preset", config)
            .unwrap()
            .with_coefficients(preset)
            .unwrap();

        let currents = DMatrix::from_column_slice(2, 1, &[1.0, 1.0]);
        electrode.calc_lfp(&geometry, &currents).unwrap();

        let lfp = electrode.state().lfp.as_ref().unwrap();
        assert_relative_eq!(lfp[(0, 0)], 3.0);
        assert_relative_eq!(lfp[(1, 0)], 7.0);
    }

    #[test]
    fn test_preset_with_wrong_rows_is_rejected() {
        let config = ElectrodeConfig::new(0.3, vec![Point3::origin()]);
        let result = ExtracellularElectrode::new("preset", config)
            .unwrap()
            .with_coefficients(DMatrix::zeros(3, 4));
        assert!(result.is_err());
    }

    #[test]
    fn test_forward_model_parallel_rows_match_sequential() {
        let geometry = table(
            vec![
                segment([0.0, 0.0, 0.0], [0.0, 10.0, 0.0], 1.0),
                segment([0.0, 10.0, 0.0], [0.0, 20.0, 0.0], 1.0),
            ],
            &["soma", "dend"],
        );
        let contacts = (0..16).map(|i| Point3::new(10.0 + i as f64, 5.0, 0.0)).collect();
        let electrode =
            ExtracellularElectrode::new("grid", ElectrodeConfig::new(0.3, contacts)).unwrap();

        let sequential = electrode.forward_model(&geometry);
        let parallel = {
            let _guard = crate::electrode::ThresholdGuard::save(1);
            electrode.forward_model(&geometry)
        };
        assert_eq!(sequential, parallel);
    }
}
