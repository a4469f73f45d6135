//! Compartmental engine collaborator
//!
//! This module defines the contract the external cable-equation engine must
//! satisfy. The engine owns the ODE state; this crate only reads geometry,
//! reads per-segment state after each macro-step and drives the stepping
//! primitives.
//!
//! # Ordering
//!
//! `sections()`, `segment_counts()`, `read_membrane_currents()` and
//! `read_membrane_voltages()` must all iterate section-major, segment-minor,
//! in the same order. The Geometry Table, the coefficient matrix columns and
//! every live current read are positionally coupled through that order.

use crate::error::EngineError;

// =================================================================================================
// Section Descriptors
// =================================================================================================

/// One 3-D trace sample of a section, parameterized by arc length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePoint {
    /// Arc length from the section's 0-end (um)
    pub arc: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TracePoint {
    pub fn new(arc: f64, x: f64, y: f64, z: f64) -> Self {
        Self { arc, x, y, z }
    }
}

/// Per-segment quantities reported by the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentDescriptor {
    /// Fractional midpoint position along the section, in (0, 1)
    pub x: f64,
    /// Membrane surface area (um^2)
    pub area: f64,
    /// Diameter (um)
    pub diam: f64,
}

/// Anatomical section: an unbranched cable split into segments
#[derive(Debug, Clone, PartialEq)]
pub struct SectionDescriptor {
    /// Section name (e.g. `soma[0]`, `dend[3]`)
    pub name: String,
    /// Physical length (um)
    pub length: f64,
    /// 3-D trace, ordered by arc length
    pub points: Vec<TracePoint>,
    /// Segments, ordered from the 0-end
    pub segments: Vec<SegmentDescriptor>,
}

impl SectionDescriptor {
    /// Build a section with `nseg` evenly spaced segments of uniform diameter.
    ///
    /// Segment area is the lateral surface of a cylinder, `pi * diam * L / nseg`.
    pub fn uniform(
        name: impl Into<String>,
        length: f64,
        diam: f64,
        nseg: usize,
        points: Vec<TracePoint>,
    ) -> Self {
        let seg_length = if nseg > 0 { length / nseg as f64 } else { 0.0 };
        let segments = (0..nseg)
            .map(|i| SegmentDescriptor {
                x: (i as f64 + 0.5) / nseg as f64,
                area: std::f64::consts::PI * diam * seg_length,
                diam,
            })
            .collect();

        Self {
            name: name.into(),
            length,
            points,
            segments,
        }
    }

    /// Number of segments
    pub fn nseg(&self) -> usize {
        self.segments.len()
    }
}

// =================================================================================================
// Integrator Mode
// =================================================================================================

/// Time-integration mode requested from the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegratorMode {
    /// Fixed macro-step of `dt`
    Fixed,

    /// Adaptive integration; `atol` bounds the local absolute error only and
    /// never changes the sampling cadence
    Adaptive { atol: f64 },
}

impl IntegratorMode {
    pub fn is_adaptive(&self) -> bool {
        matches!(self, IntegratorMode::Adaptive { .. })
    }
}

// =================================================================================================
// Compartmental Engine Trait
// =================================================================================================

/// External compartmental simulation engine
///
/// # Responsibility
/// Solves the cable equations. The LFP driver never integrates anything
/// itself; it calls [`advance`](CompartmentEngine::advance) and reads state
/// synchronously right after.
///
/// # Units
/// - time: ms
/// - membrane current density: mA/cm^2
/// - membrane voltage: mV
pub trait CompartmentEngine {
    /// Ordered, repeatable iteration over sections and their segments
    fn sections(&self) -> Vec<SectionDescriptor>;

    /// Segment count of every section, in iteration order
    fn segment_counts(&self) -> Vec<usize> {
        self.sections().iter().map(SectionDescriptor::nseg).collect()
    }

    /// Total number of segments (`totnsegs`)
    fn total_segments(&self) -> usize {
        self.segment_counts().iter().sum()
    }

    /// Write the transmembrane current density of every segment into
    /// `buffer`, clearing it first.
    fn read_membrane_currents(&self, buffer: &mut Vec<f64>);

    /// Write the membrane voltage of every segment into `buffer`, clearing it first.
    fn read_membrane_voltages(&self, buffer: &mut Vec<f64>);

    /// Set the macro-step (ms)
    fn set_dt(&mut self, dt: f64);

    /// Select fixed or adaptive integration
    fn set_integrator(&mut self, mode: IntegratorMode) -> Result<(), EngineError>;

    /// Set every state variable to its resting value at `v_init` (mV)
    fn initialize(&mut self, v_init: f64) -> Result<(), EngineError>;

    /// Re-prime the adaptive integrator after initialization
    fn reinit_integrator(&mut self) -> Result<(), EngineError>;

    /// Compute membrane currents for the fixed-step integrator
    fn compute_currents(&mut self) -> Result<(), EngineError>;

    /// Reset every recording vector
    fn init_recorders(&mut self) -> Result<(), EngineError>;

    /// Load pre-synaptic event times into the event queue
    fn load_spikes(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Current simulated time (ms)
    fn time(&self) -> f64;

    /// Overwrite the simulated time (ms)
    fn set_time(&mut self, t: f64);

    /// Advance the simulation by one macro-step
    fn advance(&mut self) -> Result<(), EngineError>;
}

// =================================================================================================
// Tests
// =================================================================================================
