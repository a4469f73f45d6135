//! lfp-rs: Extracellular Potentials of Multicompartment Neuron Simulations
//!
//! Drives a time-stepped compartmental neuron simulation and streams the
//! transmembrane currents it produces through precomputed linear forward
//! models, yielding the local field potential (LFP) at a set of electrode
//! contacts.
//!
//! # Architecture
//!
//! lfp-rs is built on two core principles:
//!
//! 1. **Separation of Engine and Field**
//!    - The compartmental engine solves the cable equations (external collaborator)
//!    - This crate maps its currents to potentials with a fixed linear operator
//!
//! 2. **Explicit Positional Coupling**
//!    - Segments are indexed by [`SegmentId`](morphology::SegmentId)
//!    - Engine layout, coefficient columns and live current reads are checked
//!      against the Geometry Table instead of trusted
//!
//! ```text
//! collect_geometry ─► CoefficientMatrix::build ─► SimulationDriver ─► AccumulationSink
//!   (morphology)        (electrode)                 (simulation)        (output)
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use lfp_rs::prelude::*;
//! use nalgebra::Point3;
//!
//! # struct Soma { t: f64, dt: f64 }
//! # impl CompartmentEngine for Soma {
//! #     fn sections(&self) -> Vec<SectionDescriptor> {
//! #         let trace = vec![TracePoint::new(0.0, -10.0, 0.0, 0.0), TracePoint::new(20.0, 10.0, 0.0, 0.0)];
//! #         vec![SectionDescriptor::uniform("soma", 20.0, 20.0, 1, trace)]
//! #     }
//! #     fn read_membrane_currents(&self, buffer: &mut Vec<f64>) { buffer.clear(); buffer.push(1e-3); }
//! #     fn read_membrane_voltages(&self, buffer: &mut Vec<f64>) { buffer.clear(); buffer.push(-65.0); }
//! #     fn set_dt(&mut self, dt: f64) { self.dt = dt; }
//! #     fn set_integrator(&mut self, _: IntegratorMode) -> std::result::Result<(), EngineError> { Ok(()) }
//! #     fn initialize(&mut self, _: f64) -> std::result::Result<(), EngineError> { Ok(()) }
//! #     fn reinit_integrator(&mut self) -> std::result::Result<(), EngineError> { Ok(()) }
//! #     fn compute_currents(&mut self) -> std::result::Result<(), EngineError> { Ok(()) }
//! #     fn init_recorders(&mut self) -> std::result::Result<(), EngineError> { Ok(()) }
//! #     fn time(&self) -> f64 { self.t }
//! #     fn set_time(&mut self, t: f64) { self.t = t; }
//! #     fn advance(&mut self) -> std::result::Result<(), EngineError> { self.t += self.dt; Ok(()) }
//! # }
//! # fn main() -> lfp_rs::Result<()> {
//! # let mut engine = Soma { t: 0.0, dt: 0.0 };
//! // 1. Geometry Table of the loaded morphology
//! let geometry = collect_geometry(&engine, &GeometryOptions::default())?;
//!
//! // 2. Electrode with two contacts in a medium of 0.3 S/m
//! let contacts = vec![Point3::new(50.0, 0.0, 0.0), Point3::new(100.0, 0.0, 0.0)];
//! let mut electrode = ExtracellularElectrode::new("shank", ElectrodeConfig::new(0.3, contacts))?;
//!
//! // 3. Run for 10 ms at dt = 0.1 ms
//! let mut driver = SimulationDriver::new(SimulationConfig::default().tstop(10.0).dt(0.1))?;
//! let result = driver.run_with_lfp(&mut engine, &geometry, LfpSources::new().electrode(&mut electrode))?;
//!
//! // 4. Attach the potentials to the electrode
//! result.attach(&mut [&mut electrode])?;
//! let lfp = electrode.state().lfp.as_ref().unwrap();
//! assert_eq!(lfp.shape(), (2, result.samples()));
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`morphology`]: engine contract and Geometry Table
//! - [`electrode`]: electrode contract, forward model, coefficient matrices
//! - [`simulation`]: configuration, driver, results
//! - [`output`]: memory and file sinks
//! - [`stimulus`]: synapses and stimulus electrodes
//! - [`error`]: error taxonomy
//!
//! # Features
//!
//! - `parallel`: compute coefficient rows of large electrodes with rayon
//! - `hdf5`: stream potentials to an HDF5 container

pub mod error;

pub mod electrode;
pub mod morphology;
pub mod output;
pub mod simulation;
pub mod stimulus;

pub use error::{LfpError, Result};

pub mod prelude {
    //! Convenient imports for common usage
    //!
    //! ```rust
    //! use lfp_rs::prelude::*;
    //! ```
    pub use crate::electrode::{CoefficientMatrix,
                               Electrode,
                               ElectrodeConfig,
                               ElectrodeState,
                               ExtracellularElectrode,
                               SourceMethod};
    pub use crate::error::{EngineError, LfpError};
    pub use crate::morphology::{collect_geometry,
                                CompartmentEngine,
                                GeometryOptions,
                                GeometryTable,
                                IntegratorMode,
                                SectionDescriptor,
                                SegmentId,
                                TracePoint};
    pub use crate::simulation::{LfpResult,
                                LfpSources,
                                OutputConfig,
                                RecordingConfig,
                                SimulationConfig,
                                SimulationDriver};
}
