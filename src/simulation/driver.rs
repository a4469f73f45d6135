//! Time-stepping driver
//!
//! [`SimulationDriver`] owns the loop around an external
//! [`CompartmentEngine`]:
//!
//! ```text
//! Uninitialized → Initialized → Running → Finalizing → Done
//! ```
//!
//! - **Initialized**: `dt` and integrator set, state variables at `v_init`,
//!   integrator primed, recorders reset, time at `tstart`, spikes loaded
//! - **Running**: `[if t >= 0: sample] → advance → progress` while `t < tstop`
//! - **Finalizing**: one last sample at the final time, store closed, result built
//!
//! Any error aborts the run. Partial series are dropped with the sink and
//! never returned.
//!
//! # Sampling
//!
//! Each retained step reads one current density per segment in Geometry
//! Table order, converts it to absolute current with `area * 1e-2`
//! (mA/cm^2 x um^2 → nA) and deposits one potential column per coefficient
//! matrix. The current buffers are reused across steps.

use log::{debug, info, warn};
use nalgebra::DVector;
use std::collections::HashMap;

use super::config::SimulationConfig;
use super::progress::{default_interval, ProgressMonitor};
use super::result::{ElectrodeOutput, LfpResult, RunSummary};
use crate::electrode::{CoefficientMatrix, Electrode};
use crate::error::{AlignmentError, LfpError, Result};
use crate::morphology::{CompartmentEngine, GeometryTable};
use crate::output::{open_store, AccumulationSink, MemorySink, SeriesStore, StoreLayout};

/// Factor turning `density (mA/cm^2) * area (um^2)` into nA
const AREA_SCALE: f64 = 1e-2;

// =================================================================================================
// Driver Phase
// =================================================================================================

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    Uninitialized,
    Initialized,
    Running,
    Finalizing,
    Done,
}

// =================================================================================================
// Coefficient Sources
// =================================================================================================

/// Coefficient sources of one LFP run
///
/// Ad-hoc matrices come first in the output, electrode sources after them,
/// each group in submission order.
#[derive(Default)]
pub struct LfpSources<'a> {
    matrices: Vec<CoefficientMatrix>,
    electrodes: Vec<&'a mut dyn Electrode>,
}

impl<'a> LfpSources<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a caller-supplied coefficient matrix
    pub fn coefficients(mut self, matrix: CoefficientMatrix) -> Self {
        self.matrices.push(matrix);
        self
    }

    /// Add an electrode; its matrix is built by impulse response before the run
    pub fn electrode(mut self, electrode: &'a mut dyn Electrode) -> Self {
        self.electrodes.push(electrode);
        self
    }

    pub fn len(&self) -> usize {
        self.matrices.len() + self.electrodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =================================================================================================
// Sampler
// =================================================================================================

/// Per-step sampling state, dropped with its partial series on error
struct Sampler<'m> {
    areas: DVector<f64>,
    density: Vec<f64>,
    current: DVector<f64>,
    voltage: Vec<f64>,
    sink: AccumulationSink<'m>,
    imem: Option<MemorySink>,
    vmem: Option<MemorySink>,
    time: Vec<f64>,
}

impl<'m> Sampler<'m> {
    fn is_full(&self) -> bool {
        self.sink.is_full()
    }

    fn sample<E: CompartmentEngine + ?Sized>(&mut self, engine: &E) -> Result<()> {
        let t = engine.time();
        let tstep = self.sink.tstep();

        engine.read_membrane_currents(&mut self.density);
        if self.density.len() != self.areas.len() {
            return Err(AlignmentError::CurrentLength {
                expected: self.areas.len(),
                actual: self.density.len(),
            }
            .into());
        }

        for ((current, density), area) in self.current.iter_mut().zip(&self.density).zip(self.areas.iter()) {
            *current = density * area;
        }

        if let Some(segment) = self.current.iter().position(|i| !i.is_finite()) {
            return Err(LfpError::Integrator {
                time: t,
                message: format!(
                    "non-finite membrane current in segment {} at sample {}, try a smaller time step",
                    segment, tstep
                ),
            });
        }

        self.sink.deposit(&self.current)?;

        if let Some(imem) = self.imem.as_mut() {
            imem.write(tstep, self.current.as_slice())?;
        }
        if let Some(vmem) = self.vmem.as_mut() {
            engine.read_membrane_voltages(&mut self.voltage);
            vmem.write(tstep, &self.voltage)?;
        }

        self.time.push(t);
        Ok(())
    }
}

// =================================================================================================
// Simulation Driver
// =================================================================================================

/// Drives a compartmental engine from `tstart` to `tstop`
///
/// # Example
///
/// ```rust,ignore
/// use lfp_rs::prelude::*;
///
/// let geometry = collect_geometry(&engine, &GeometryOptions::default())?;
/// let mut driver = SimulationDriver::new(SimulationConfig::default().tstop(50.0))?;
///
/// let result = driver.run_with_lfp(
///     &mut engine,
///     &geometry,
///     LfpSources::new().electrode(&mut electrode),
/// )?;
/// result.attach(&mut [&mut electrode])?;
/// ```
#[derive(Debug, Clone)]
pub struct SimulationDriver {
    config: SimulationConfig,
    phase: DriverPhase,
}

impl SimulationDriver {
    /// Validate `config` and create an idle driver
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            phase: DriverPhase::Uninitialized,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Phase reached by the last (or current) run
    pub fn phase(&self) -> DriverPhase {
        self.phase
    }

    /// Advance the engine from `tstart` to `tstop` without sampling
    pub fn run<E: CompartmentEngine + ?Sized>(&mut self, engine: &mut E) -> Result<RunSummary> {
        self.set_phase(DriverPhase::Uninitialized);
        self.initialize(engine)?;

        self.set_phase(DriverPhase::Running);
        let mut progress = self.progress_monitor(engine.time());
        let mut steps = 0;
        while engine.time() < self.config.tstop {
            self.advance(engine)?;
            steps += 1;
            progress.tick(engine.time());
        }

        self.set_phase(DriverPhase::Finalizing);
        let summary = RunSummary {
            steps,
            final_time: engine.time(),
        };
        self.set_phase(DriverPhase::Done);
        Ok(summary)
    }

    /// Advance the engine from `tstart` to `tstop`, sampling the potential
    /// of every coefficient source at each retained step
    ///
    /// # Errors
    ///
    /// - [`AlignmentError`] when the engine layout, a coefficient matrix or a
    ///   live current read disagrees with `geometry`
    /// - [`LfpError::Integrator`] when the engine fails a primitive or
    ///   produces a non-finite current
    /// - [`LfpError::Storage`] when file output fails midway
    ///
    /// A missing storage backend is not an error: file output is disabled
    /// with a warning.
    pub fn run_with_lfp<E: CompartmentEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        geometry: &GeometryTable,
        sources: LfpSources<'_>,
    ) -> Result<LfpResult> {
        self.set_phase(DriverPhase::Uninitialized);
        let started = chrono::Utc::now();

        // ====== Step 1: Alignment ======

        geometry.verify_alignment(&*engine)?;
        let totnsegs = geometry.totnsegs();

        // ====== Step 2: Coefficient matrices ======

        let LfpSources { mut matrices, electrodes } = sources;
        let adhoc = matrices.len();

        if self.config.verbose && !electrodes.is_empty() {
            info!("precalculating geometry - LFP mapping");
        }
        let mut names = Vec::with_capacity(electrodes.len());
        for electrode in electrodes {
            names.push(electrode.name().to_string());
            matrices.push(CoefficientMatrix::build(&mut *electrode, geometry)?);
        }

        for (index, matrix) in matrices.iter().enumerate() {
            matrix.check_columns(totnsegs, index)?;
        }

        // ====== Step 3: Output allocation ======

        let capacity = self.config.capacity();
        let growable = self.config.variable_dt;
        let layout = StoreLayout {
            rows: matrices.iter().map(CoefficientMatrix::contacts).collect(),
            capacity,
            growable,
        };
        let store = self.open_output(&layout)?;
        if !self.config.output.to_memory && store.is_none() {
            warn!("no output path is active, potentials are computed and discarded");
        }

        let recording = self.config.recording;
        let mut sampler = Sampler {
            areas: geometry.areas() * AREA_SCALE,
            density: Vec::with_capacity(totnsegs),
            current: DVector::zeros(totnsegs),
            voltage: Vec::with_capacity(totnsegs),
            sink: AccumulationSink::new(&matrices, capacity, growable, self.config.output.to_memory, store),
            imem: recording.imem.then(|| MemorySink::new(totnsegs, capacity, growable)),
            vmem: recording.vmem.then(|| MemorySink::new(totnsegs, capacity, growable)),
            time: Vec::with_capacity(capacity),
        };

        // ====== Step 4: Initialization ======

        self.initialize(engine)?;

        // ====== Step 5: Time loop ======

        self.set_phase(DriverPhase::Running);
        let mut progress = self.progress_monitor(engine.time());
        let mut steps = 0;
        while engine.time() < self.config.tstop {
            if engine.time() >= 0.0 {
                sampler.sample(&*engine)?;
            }
            self.advance(engine)?;
            steps += 1;
            progress.tick(engine.time());
        }

        // ====== Step 6: Final sample ======

        self.set_phase(DriverPhase::Finalizing);
        if engine.time() >= 0.0 {
            if sampler.is_full() {
                warn!(
                    "final sample at t = {} skipped: all {} columns already written",
                    engine.time(),
                    capacity
                );
            } else {
                sampler.sample(&*engine)?;
            }
        }

        // ====== Step 7: Build result ======

        let Sampler { sink, imem, vmem, time, .. } = sampler;
        let output = sink.finish()?;
        let samples = output.samples;

        let (coefficient_series, electrode_series) = match output.series {
            Some(mut series) => {
                let tail = series.split_off(adhoc);
                (series, tail.into_iter().map(Some).collect())
            }
            None => (Vec::new(), vec![None; names.len()]),
        };

        let electrode_outputs = names
            .into_iter()
            .zip(electrode_series)
            .zip(matrices.split_off(adhoc))
            .map(|((name, lfp), coefficients)| ElectrodeOutput {
                name,
                lfp,
                coefficients,
            })
            .collect();

        let mut result = LfpResult {
            time,
            coefficient_series,
            electrode_outputs,
            file: output.file,
            imem: imem.map(|sink| sink.finish(samples)),
            vmem: vmem.map(|sink| sink.finish(samples)),
            summary: RunSummary {
                steps,
                final_time: engine.time(),
            },
            metadata: HashMap::new(),
        };

        result.add_metadata("started", &started.to_rfc3339());
        result.add_metadata("integrator", if growable { "adaptive" } else { "fixed" });
        result.add_metadata("dt", &self.config.dt.to_string());
        result.add_metadata("tstop", &self.config.tstop.to_string());
        result.add_metadata("segments", &totnsegs.to_string());
        result.add_metadata("samples", &samples.to_string());

        self.set_phase(DriverPhase::Done);
        Ok(result)
    }

    // ====== Helpers ======

    fn set_phase(&mut self, phase: DriverPhase) {
        debug!("driver phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Bring the engine to `tstart` with primed state
    fn initialize<E: CompartmentEngine + ?Sized>(&mut self, engine: &mut E) -> Result<()> {
        let tstart = self.config.tstart;
        let failed = move |e| LfpError::integrator(tstart, e);
        let mode = self.config.integrator_mode();

        engine.set_dt(self.config.dt);
        engine.set_integrator(mode).map_err(failed)?;
        engine.initialize(self.config.v_init).map_err(failed)?;
        if mode.is_adaptive() {
            engine.reinit_integrator().map_err(failed)?;
        } else {
            engine.compute_currents().map_err(failed)?;
        }
        engine.init_recorders().map_err(failed)?;
        engine.set_time(tstart);
        engine.load_spikes().map_err(failed)?;

        self.set_phase(DriverPhase::Initialized);
        Ok(())
    }

    /// One macro-step; time must move forward
    fn advance<E: CompartmentEngine + ?Sized>(&self, engine: &mut E) -> Result<()> {
        let before = engine.time();
        engine.advance().map_err(|e| LfpError::integrator(before, e))?;

        let after = engine.time();
        if !(after > before) {
            return Err(LfpError::Integrator {
                time: before,
                message: format!("engine time did not advance (t = {} after step)", after),
            });
        }
        Ok(())
    }

    fn progress_monitor(&self, t: f64) -> ProgressMonitor {
        let interval = self
            .config
            .progress_interval
            .unwrap_or_else(|| default_interval(self.config.dt, self.config.tstop));
        ProgressMonitor::new(interval, t, self.config.verbose)
    }

    /// Open the file path, or `None` when it is off or unavailable
    fn open_output(&self, layout: &StoreLayout) -> Result<Option<Box<dyn SeriesStore>>> {
        let path = match self.config.output.file_path() {
            Some(path) => path,
            None => return Ok(None),
        };

        match open_store(&path, layout) {
            Ok(store) => Ok(Some(store)),
            Err(err) if err.is_recoverable() => {
                warn!("{}; continuing with memory output only", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

// =================================================================================================
// Tests
// =================================================================================================
