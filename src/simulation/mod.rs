//! Simulation driver and run results
//!
//! # Core Concepts
//!
//! - **Configuration** ([`SimulationConfig`]): time span, step, integrator
//!   mode and output flags of one run
//! - **Driver** ([`SimulationDriver`]): initializes the engine, owns the
//!   time loop and samples membrane currents at every retained step
//! - **Sources** ([`LfpSources`]): ad-hoc coefficient matrices and electrodes
//!   whose potentials are computed during the run
//! - **Result** ([`LfpResult`]): immutable series returned to the caller, who
//!   merges them into electrodes with [`LfpResult::attach`]
//!
//! # Example
//!
//! ```rust,ignore
//! use lfp_rs::simulation::{LfpSources, SimulationConfig, SimulationDriver};
//!
//! let config = SimulationConfig::default().tstop(100.0).dt(0.025).verbose(true);
//! let mut driver = SimulationDriver::new(config)?;
//!
//! let result = driver.run_with_lfp(
//!     &mut engine,
//!     &geometry,
//!     LfpSources::new().coefficients(precomputed).electrode(&mut shank),
//! )?;
//!
//! let precomputed_lfp = &result.coefficient_series[0];
//! result.attach(&mut [&mut shank])?;
//! ```

pub mod config;
pub mod driver;
pub mod progress;
pub mod result;

pub use config::{OutputConfig, RecordingConfig, SimulationConfig};
pub use driver::{DriverPhase, LfpSources, SimulationDriver};
pub use progress::{default_interval, ProgressMonitor};
pub use result::{ElectrodeOutput, LfpResult, RunSummary};
