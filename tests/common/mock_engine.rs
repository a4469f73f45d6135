//! Deterministic compartmental engine for integration tests

use lfp_rs::error::EngineError;
use lfp_rs::morphology::{CompartmentEngine, IntegratorMode, SectionDescriptor, TracePoint};

/// Current density (mA/cm^2) of segment `index` at time `t` (ms)
pub type CurrentProfile = Box<dyn Fn(f64, usize) -> f64>;

/// Engine whose membrane currents follow a closed-form profile
///
/// Fixed mode advances by `dt`; adaptive mode alternates `dt` and `dt / 2`
/// to mimic an integrator choosing its own steps.
pub struct MockEngine {
    pub sections: Vec<SectionDescriptor>,
    pub profile: CurrentProfile,
    pub t: f64,
    t0: f64,
    pub dt: f64,
    pub mode: IntegratorMode,
    pub steps: usize,
    pub calls: Vec<&'static str>,
    /// Fail the first advance at or after this time
    pub fail_at: Option<f64>,
    /// Report one current value fewer than there are segments
    pub drop_last_current: bool,
}

impl MockEngine {
    pub fn new(sections: Vec<SectionDescriptor>, profile: CurrentProfile) -> Self {
        Self {
            sections,
            profile,
            t: 0.0,
            t0: 0.0,
            dt: 0.1,
            mode: IntegratorMode::Fixed,
            steps: 0,
            calls: Vec::new(),
            fail_at: None,
            drop_last_current: false,
        }
    }

    pub fn total(&self) -> usize {
        self.sections.iter().map(SectionDescriptor::nseg).sum()
    }
}

impl CompartmentEngine for MockEngine {
    fn sections(&self) -> Vec<SectionDescriptor> {
        self.sections.clone()
    }

    fn read_membrane_currents(&self, buffer: &mut Vec<f64>) {
        buffer.clear();
        let count = if self.drop_last_current {
            self.total().saturating_sub(1)
        } else {
            self.total()
        };
        buffer.extend((0..count).map(|index| (self.profile)(self.t, index)));
    }

    fn read_membrane_voltages(&self, buffer: &mut Vec<f64>) {
        buffer.clear();
        buffer.extend((0..self.total()).map(|index| -65.0 + index as f64));
    }

    fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
        self.calls.push("set_dt");
    }

    fn set_integrator(&mut self, mode: IntegratorMode) -> Result<(), EngineError> {
        self.mode = mode;
        self.calls.push("set_integrator");
        Ok(())
    }

    fn initialize(&mut self, _v_init: f64) -> Result<(), EngineError> {
        self.t = 0.0;
        self.steps = 0;
        self.calls.push("initialize");
        Ok(())
    }

    fn reinit_integrator(&mut self) -> Result<(), EngineError> {
        self.calls.push("reinit_integrator");
        Ok(())
    }

    fn compute_currents(&mut self) -> Result<(), EngineError> {
        self.calls.push("compute_currents");
        Ok(())
    }

    fn init_recorders(&mut self) -> Result<(), EngineError> {
        self.calls.push("init_recorders");
        Ok(())
    }

    fn time(&self) -> f64 {
        self.t
    }

    fn set_time(&mut self, t: f64) {
        self.t = t;
        self.t0 = t;
    }

    fn advance(&mut self) -> Result<(), EngineError> {
        if let Some(fail_at) = self.fail_at {
            if self.t >= fail_at {
                return Err(EngineError::new("CVode step failed: too much accuracy requested"));
            }
        }

        self.steps += 1;
        self.t = match self.mode {
            // From the step index, so that fixed-step times carry no accumulated rounding
            IntegratorMode::Fixed => self.t0 + self.steps as f64 * self.dt,
            IntegratorMode::Adaptive { .. } if self.steps % 2 == 0 => self.t + self.dt * 0.5,
            IntegratorMode::Adaptive { .. } => self.t + self.dt,
        };
        Ok(())
    }
}

// =================================================================================================
// Morphologies
// =================================================================================================

/// Straight section from `start` to `end` (um) with `nseg` segments
pub fn straight_section(name: &str, start: [f64; 3], end: [f64; 3], diam: f64, nseg: usize) -> SectionDescriptor {
    let length = ((end[0] - start[0]).powi(2) + (end[1] - start[1]).powi(2) + (end[2] - start[2]).powi(2)).sqrt();
    let trace = vec![
        TracePoint::new(0.0, start[0], start[1], start[2]),
        TracePoint::new(length, end[0], end[1], end[2]),
    ];
    SectionDescriptor::uniform(name, length, diam, nseg, trace)
}

/// Soma along z plus an apical dendrite and a basal dendrite
pub fn ball_and_sticks() -> Vec<SectionDescriptor> {
    vec![
        straight_section("soma[0]", [0.0, 0.0, -10.0], [0.0, 0.0, 10.0], 20.0, 1),
        straight_section("apic[0]", [0.0, 0.0, 10.0], [0.0, 0.0, 410.0], 2.0, 8),
        straight_section("dend[0]", [0.0, 0.0, -10.0], [0.0, -150.0, -160.0], 1.5, 5),
    ]
}
