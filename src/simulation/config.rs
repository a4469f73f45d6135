//! Run configuration
//!
//! All run-level flags live in [`SimulationConfig`]. Output paths are
//! independent: memory and file output may both be active in the same run.
//!
//! # Example
//!
//! ```rust
//! use lfp_rs::simulation::{OutputConfig, SimulationConfig};
//!
//! let config = SimulationConfig::default()
//!     .tstop(50.0)
//!     .dt(0.025)
//!     .output(OutputConfig::default().to_file("run"));
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.output.file_name.as_deref(), Some("run.h5"));
//! ```

use std::path::PathBuf;

use crate::error::{LfpError, Result};
use crate::morphology::IntegratorMode;
use crate::output::store::{normalize_file_name, FILE_SUFFIX};

// =================================================================================================
// Output Configuration
// =================================================================================================

/// Where potential samples go
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Keep the result series in memory (default: true)
    pub to_memory: bool,

    /// Stream the result series to a container file (default: false)
    pub to_file: bool,

    /// Container file name, suffix normalized to `.h5`
    pub file_name: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            to_memory: true,
            to_file: false,
            file_name: None,
        }
    }
}

impl OutputConfig {
    /// Enable file output to `file_name`
    pub fn to_file(mut self, file_name: impl Into<String>) -> Self {
        self.to_file = true;
        self.file_name = Some(normalize_file_name(&file_name.into()));
        self
    }

    pub fn to_memory(mut self, enabled: bool) -> Self {
        self.to_memory = enabled;
        self
    }

    /// Container path of an enabled file output, always carrying the `.h5` suffix
    ///
    /// The fields are public, so the name stored in `file_name` may not have
    /// gone through [`to_file`](Self::to_file).
    pub fn file_path(&self) -> Option<PathBuf> {
        match (self.to_file, self.file_name.as_deref()) {
            (true, Some(name)) => Some(PathBuf::from(normalize_file_name(name))),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.to_file, &self.file_name) {
            (true, None) => Err(LfpError::InvalidConfiguration(
                "file output requested without a file name".to_string(),
            )),
            (true, Some(name)) if name.trim_end_matches(FILE_SUFFIX).is_empty() => Err(
                LfpError::InvalidConfiguration("file output requested with an empty file name".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

// =================================================================================================
// Recording Configuration
// =================================================================================================

/// Optional per-segment recordings kept alongside the potential
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingConfig {
    /// Absolute membrane current per segment (nA)
    pub imem: bool,

    /// Membrane voltage per segment (mV)
    pub vmem: bool,
}

impl RecordingConfig {
    pub fn any(&self) -> bool {
        self.imem || self.vmem
    }
}

// =================================================================================================
// Simulation Configuration
// =================================================================================================

/// Time-stepping parameters and output flags for one run
///
/// Times are in ms, voltages in mV.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub tstart: f64,
    pub tstop: f64,
    pub dt: f64,
    pub v_init: f64,

    /// Let the engine's adaptive integrator choose micro-steps
    pub variable_dt: bool,

    /// Absolute error bound of the adaptive integrator
    pub atol: f64,

    /// Emit progress lines and build-phase messages at `info` level
    pub verbose: bool,

    /// Steps between progress lines; `None` derives it from `dt` and `tstop`
    pub progress_interval: Option<u64>,

    pub output: OutputConfig,
    pub recording: RecordingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tstart: 0.0,
            tstop: 100.0,
            dt: 2f64.powi(-4),
            v_init: -65.0,
            variable_dt: false,
            atol: 0.001,
            verbose: false,
            progress_interval: None,
            output: OutputConfig::default(),
            recording: RecordingConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn tstart(mut self, tstart: f64) -> Self {
        self.tstart = tstart;
        self
    }

    pub fn tstop(mut self, tstop: f64) -> Self {
        self.tstop = tstop;
        self
    }

    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn v_init(mut self, v_init: f64) -> Self {
        self.v_init = v_init;
        self
    }

    /// Enable adaptive integration with absolute tolerance `atol`
    pub fn variable_dt(mut self, atol: f64) -> Self {
        self.variable_dt = true;
        self.atol = atol;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn progress_interval(mut self, steps: u64) -> Self {
        self.progress_interval = Some(steps);
        self
    }

    pub fn output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    pub fn recording(mut self, recording: RecordingConfig) -> Self {
        self.recording = recording;
        self
    }

    /// Integrator mode handed to the engine
    pub fn integrator_mode(&self) -> IntegratorMode {
        if self.variable_dt {
            IntegratorMode::Adaptive { atol: self.atol }
        } else {
            IntegratorMode::Fixed
        }
    }

    /// Number of retained samples in fixed-step mode: `floor(tstop / dt) + 1`
    ///
    /// The small offset absorbs quotients such as `0.3 / 0.1 = 2.9999999999999996`.
    pub fn capacity(&self) -> usize {
        (self.tstop / self.dt + 1e-9).floor().max(0.0) as usize + 1
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LfpError::InvalidConfiguration(msg));

        if !self.dt.is_finite() || self.dt <= 0.0 {
            return invalid(format!("dt must be positive and finite, got {}", self.dt));
        }
        if !self.tstart.is_finite() || !self.tstop.is_finite() {
            return invalid("tstart and tstop must be finite".to_string());
        }
        if self.tstop <= self.tstart {
            return invalid(format!(
                "tstop ({}) must be greater than tstart ({})",
                self.tstop, self.tstart
            ));
        }
        if self.tstop < 0.0 {
            return invalid(format!("tstop must be non-negative, got {}", self.tstop));
        }
        if !self.v_init.is_finite() {
            return invalid(format!("v_init must be finite, got {}", self.v_init));
        }
        if self.variable_dt && (!self.atol.is_finite() || self.atol <= 0.0) {
            return invalid(format!("atol must be positive, got {}", self.atol));
        }
        if self.progress_interval == Some(0) {
            return invalid("progress interval must be at least one step".to_string());
        }

        self.output.validate()
    }
}

// =================================================================================================
// Tests
// =================================================================================================
