//! Point processes: synapses and stimulus electrodes
//!
//! Point processes inject current into a single segment. The engine owns
//! their dynamics; this module only describes them with a validated,
//! per-kind configuration, places them on a segment and reads their recorded
//! series back after a run. Pre-synaptic event times are handed to the host
//! as-is, without scheduling or validation.
//!
//! # Example
//!
//! ```rust,ignore
//! use lfp_rs::stimulus::{PointProcess, PointProcessKind, SynapseConfig, SynapseType};
//!
//! let kind = PointProcessKind::Synapse(SynapseConfig {
//!     syntype: SynapseType::ExpSyn { tau: 2.0 },
//!     e: 0.0,
//!     weight: 0.01,
//! });
//! let mut synapse = PointProcess::insert(&mut engine, &geometry, idx, kind, true)?;
//! synapse.set_spike_times(&mut engine, &[10.0, 15.0, 20.0])?;
//! // ... run the simulation ...
//! synapse.collect_current(&engine)?;
//! ```

use nalgebra::Point3;

use crate::error::{EngineError, LfpError, Result};
use crate::morphology::{GeometryTable, SegmentId};

// =================================================================================================
// Configuration
// =================================================================================================

/// Synaptic conductance kinetics
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynapseType {
    /// Single exponential decay, time constant `tau` (ms)
    ExpSyn { tau: f64 },

    /// Difference of exponentials, rise `tau1` and decay `tau2` (ms)
    Exp2Syn { tau1: f64, tau2: f64 },

    /// Alpha function starting at `onset` (ms), peak conductance `gmax` (uS)
    AlphaSynapse { onset: f64, tau: f64, gmax: f64 },
}

/// Synapse parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynapseConfig {
    pub syntype: SynapseType,
    /// Reversal potential (mV)
    pub e: f64,
    /// Connection weight (uS)
    pub weight: f64,
}

/// Three-level voltage command: `(amplitude mV, duration ms)` per level
pub type VoltageSteps = [(f64, f64); 3];

/// Stimulus electrode parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClampConfig {
    /// Current clamp: `amp` (nA) for `dur` (ms) after `delay` (ms)
    IClamp { amp: f64, dur: f64, delay: f64 },

    /// Two-electrode voltage clamp
    VClamp { steps: VoltageSteps },

    /// Single-electrode voltage clamp with series resistance `rs` (MOhm)
    SEClamp { steps: VoltageSteps, rs: f64 },
}

/// Point-process configuration, one variant per collaborator kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointProcessKind {
    Synapse(SynapseConfig),
    Clamp(ClampConfig),
}

impl PointProcessKind {
    /// Mechanism name as known to the engine
    pub fn mechanism(&self) -> &'static str {
        match self {
            PointProcessKind::Synapse(config) => match config.syntype {
                SynapseType::ExpSyn { .. } => "ExpSyn",
                SynapseType::Exp2Syn { .. } => "Exp2Syn",
                SynapseType::AlphaSynapse { .. } => "AlphaSynapse",
            },
            PointProcessKind::Clamp(config) => match config {
                ClampConfig::IClamp { .. } => "IClamp",
                ClampConfig::VClamp { .. } => "VClamp",
                ClampConfig::SEClamp { .. } => "SEClamp",
            },
        }
    }

    pub fn is_synapse(&self) -> bool {
        matches!(self, PointProcessKind::Synapse(_))
    }

    /// Validate that parameters are physically meaningful
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LfpError::InvalidConfiguration(msg));

        match self {
            PointProcessKind::Synapse(config) => {
                if !config.e.is_finite() || !config.weight.is_finite() {
                    return invalid(format!("{}: reversal potential and weight must be finite", self.mechanism()));
                }
                match config.syntype {
                    SynapseType::ExpSyn { tau } if tau <= 0.0 => {
                        invalid(format!("ExpSyn: tau must be positive, got {}", tau))
                    }
                    SynapseType::Exp2Syn { tau1, tau2 } if tau1 <= 0.0 || tau2 <= 0.0 => {
                        invalid(format!("Exp2Syn: time constants must be positive, got {} and {}", tau1, tau2))
                    }
                    SynapseType::Exp2Syn { tau1, tau2 } if tau1 >= tau2 => {
                        invalid(format!("Exp2Syn: rise time {} must be shorter than decay time {}", tau1, tau2))
                    }
                    SynapseType::AlphaSynapse { tau, gmax, .. } if tau <= 0.0 || gmax < 0.0 => {
                        invalid(format!("AlphaSynapse: tau must be positive and gmax non-negative, got {} and {}", tau, gmax))
                    }
                    _ => Ok(()),
                }
            }
            PointProcessKind::Clamp(config) => match config {
                ClampConfig::IClamp { amp, dur, delay } => {
                    if !amp.is_finite() || *dur < 0.0 || *delay < 0.0 {
                        return invalid(format!(
                            "IClamp: amplitude must be finite, duration and delay non-negative \
                             (amp = {}, dur = {}, delay = {})",
                            amp, dur, delay
                        ));
                    }
                    Ok(())
                }
                ClampConfig::VClamp { steps } => validate_steps("VClamp", steps),
                ClampConfig::SEClamp { steps, rs } => {
                    if *rs <= 0.0 {
                        return invalid(format!("SEClamp: series resistance must be positive, got {}", rs));
                    }
                    validate_steps("SEClamp", steps)
                }
            },
        }
    }
}

fn validate_steps(mechanism: &str, steps: &VoltageSteps) -> Result<()> {
    for (level, (amp, dur)) in steps.iter().enumerate() {
        if !amp.is_finite() || *dur < 0.0 {
            return Err(LfpError::InvalidConfiguration(format!(
                "{}: level {} needs a finite amplitude and non-negative duration",
                mechanism, level
            )));
        }
    }
    Ok(())
}

/// Artificial spike generator driving a synapse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetStimConfig {
    /// Fractional randomness in [0, 1]: 0 is periodic, 1 is Poisson
    pub noise: f64,
    /// Time of the first spike (ms)
    pub start: f64,
    /// (Average) number of spikes
    pub number: f64,
    /// (Mean) interval between spikes (ms)
    pub interval: f64,
    pub seed: u64,
}

impl Default for NetStimConfig {
    fn default() -> Self {
        Self {
            noise: 1.0,
            start: 0.0,
            number: 1e3,
            interval: 10.0,
            seed: 1234,
        }
    }
}

impl NetStimConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.noise) {
            return Err(LfpError::InvalidConfiguration(format!(
                "NetStim noise must lie in [0, 1], got {}",
                self.noise
            )));
        }
        if self.interval <= 0.0 || self.number < 0.0 {
            return Err(LfpError::InvalidConfiguration(
                "NetStim interval must be positive and number non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

// =================================================================================================
// Host Trait
// =================================================================================================

/// Engine-side handle of an inserted point process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle(pub usize);

/// Engine capability to host point processes
///
/// Separate from [`CompartmentEngine`](crate::morphology::CompartmentEngine):
/// LFP computation does not need it.
pub trait PointProcessHost {
    fn insert_point_process(
        &mut self,
        segment: SegmentId,
        kind: &PointProcessKind,
        record_current: bool,
    ) -> std::result::Result<ProcessHandle, EngineError>;

    /// Register pre-synaptic event times (ms)
    fn set_spike_times(&mut self, handle: ProcessHandle, times: &[f64]) -> std::result::Result<(), EngineError>;

    fn configure_netstim(
        &mut self,
        handle: ProcessHandle,
        config: &NetStimConfig,
    ) -> std::result::Result<(), EngineError>;

    /// Current recorded through the process during the last run (nA)
    fn recorded_current(&self, handle: ProcessHandle) -> Option<Vec<f64>>;

    /// Membrane voltage of the host segment during the last run (mV)
    fn recorded_voltage(&self, handle: ProcessHandle) -> Option<Vec<f64>>;
}

// =================================================================================================
// Point Process
// =================================================================================================

/// A point process placed on one segment
#[derive(Debug, Clone, PartialEq)]
pub struct PointProcess {
    pub handle: ProcessHandle,
    pub segment: SegmentId,
    /// Midpoint of the host segment (um)
    pub position: Point3<f64>,
    pub kind: PointProcessKind,
    pub record_current: bool,
    pub spike_times: Vec<f64>,
    /// Recorded current, filled by [`collect_current`](Self::collect_current)
    pub current: Option<Vec<f64>>,
    /// Recorded voltage, filled by [`collect_potential`](Self::collect_potential)
    pub voltage: Option<Vec<f64>>,
}

impl PointProcess {
    /// Validate `kind` and insert the process on `segment`
    pub fn insert<H: PointProcessHost + ?Sized>(
        host: &mut H,
        geometry: &GeometryTable,
        segment: SegmentId,
        kind: PointProcessKind,
        record_current: bool,
    ) -> Result<Self> {
        kind.validate()?;

        let position = geometry.midpoint(segment).ok_or_else(|| {
            LfpError::PointProcess(format!(
                "{} is outside the geometry ({} segments)",
                segment,
                geometry.totnsegs()
            ))
        })?;

        let handle = host
            .insert_point_process(segment, &kind, record_current)
            .map_err(|e| LfpError::PointProcess(format!("inserting {}: {}", kind.mechanism(), e)))?;

        Ok(Self {
            handle,
            segment,
            position,
            kind,
            record_current,
            spike_times: Vec::new(),
            current: None,
            voltage: None,
        })
    }

    /// Refresh `position` after the geometry changed
    pub fn update_position(&mut self, geometry: &GeometryTable) -> Result<()> {
        self.position = geometry
            .midpoint(self.segment)
            .ok_or_else(|| LfpError::PointProcess(format!("{} is outside the geometry", self.segment)))?;
        Ok(())
    }

    /// Set pre-synaptic spike times explicitly
    pub fn set_spike_times<H: PointProcessHost + ?Sized>(&mut self, host: &mut H, times: &[f64]) -> Result<()> {
        self.require_synapse("spike times")?;
        host.set_spike_times(self.handle, times)
            .map_err(|e| LfpError::PointProcess(e.to_string()))?;
        self.spike_times = times.to_vec();
        Ok(())
    }

    /// Drive the synapse with an artificial spike generator
    pub fn set_spike_times_w_netstim<H: PointProcessHost + ?Sized>(
        &mut self,
        host: &mut H,
        config: &NetStimConfig,
    ) -> Result<()> {
        self.require_synapse("a NetStim")?;
        config.validate()?;
        host.configure_netstim(self.handle, config)
            .map_err(|e| LfpError::PointProcess(e.to_string()))
    }

    /// Read the recorded current after a run
    pub fn collect_current<H: PointProcessHost + ?Sized>(&mut self, host: &H) -> Result<&[f64]> {
        if !self.record_current {
            return Err(LfpError::PointProcess(format!(
                "{} on {} was inserted without current recording",
                self.kind.mechanism(),
                self.segment
            )));
        }
        let current = host.recorded_current(self.handle).ok_or_else(|| {
            LfpError::PointProcess("current recording deleted between consecutive runs".to_string())
        })?;
        Ok(self.current.insert(current))
    }

    /// Read the recorded host-segment voltage after a run
    pub fn collect_potential<H: PointProcessHost + ?Sized>(&mut self, host: &H) -> Result<&[f64]> {
        let voltage = host.recorded_voltage(self.handle).ok_or_else(|| {
            LfpError::PointProcess("voltage recording deleted between consecutive runs".to_string())
        })?;
        Ok(self.voltage.insert(voltage))
    }

    fn require_synapse(&self, what: &str) -> Result<()> {
        if !self.kind.is_synapse() {
            return Err(LfpError::PointProcess(format!(
                "{} cannot take {}",
                self.kind.mechanism(),
                what
            )));
        }
        Ok(())
    }
}

// =================================================================================================
// Tests
// =================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{SectionSpan, Segment};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockHost {
        inserted: Vec<(SegmentId, &'static str, bool)>,
        spikes: HashMap<usize, Vec<f64>>,
        netstims: HashMap<usize, NetStimConfig>,
    }

    impl PointProcessHost for MockHost {
        fn insert_point_process(
            &mut self,
            segment: SegmentId,
            kind: &PointProcessKind,
            record_current: bool,
        ) -> std::result::Result<ProcessHandle, EngineError> {
            self.inserted.push((segment, kind.mechanism(), record_current));
            Ok(ProcessHandle(self.inserted.len() - 1))
        }

        fn set_spike_times(&mut self, handle: ProcessHandle, times: &[f64]) -> std::result::Result<(), EngineError> {
            self.spikes.insert(handle.0, times.to_vec());
            Ok(())
        }

        fn configure_netstim(
            &mut self,
            handle: ProcessHandle,
            config: &NetStimConfig,
        ) -> std::result::Result<(), EngineError> {
            self.netstims.insert(handle.0, *config);
            Ok(())
        }

        fn recorded_current(&self, handle: ProcessHandle) -> Option<Vec<f64>> {
            self.inserted
                .get(handle.0)
                .filter(|(_, _, record)| *record)
                .map(|_| vec![0.0, -0.1, -0.05])
        }

        fn recorded_voltage(&self, _handle: ProcessHandle) -> Option<Vec<f64>> {
            Some(vec![-65.0, -64.0, -64.5])
        }
    }

    fn geometry() -> GeometryTable {
        let segments = (0..3)
            .map(|i| Segment {
                id: SegmentId(i),
                section: 0,
                start: Point3::new(0.0, 0.0, 10.0 * i as f64),
                end: Point3::new(0.0, 0.0, 10.0 * (i + 1) as f64),
                area: 31.4,
                diam: 1.0,
                length: 10.0,
            })
            .collect();
        let spans = vec![SectionSpan {
            name: "dend".into(),
            first: SegmentId(0),
            nseg: 3,
        }];
        GeometryTable::from_parts(segments, spans).unwrap()
    }

    fn exp_syn() -> PointProcessKind {
        PointProcessKind::Synapse(SynapseConfig {
            syntype: SynapseType::ExpSyn { tau: 2.0 },
            e: 0.0,
            weight: 0.01,
        })
    }

    fn iclamp() -> PointProcessKind {
        PointProcessKind::Clamp(ClampConfig::IClamp {
            amp: 1.0,
            dur: 20.0,
            delay: 10.0,
        })
    }

    // ====== Validation ======

    #[test]
    fn test_kind_validation() {
        assert!(exp_syn().validate().is_ok());
        assert!(iclamp().validate().is_ok());

        let bad_tau = PointProcessKind::Synapse(SynapseConfig {
            syntype: SynapseType::ExpSyn { tau: 0.0 },
            e: 0.0,
            weight: 0.01,
        });
        assert!(bad_tau.validate().is_err());

        let inverted = PointProcessKind::Synapse(SynapseConfig {
            syntype: SynapseType::Exp2Syn { tau1: 5.0, tau2: 1.0 },
            e: 0.0,
            weight: 0.01,
        });
        assert!(inverted.validate().is_err());

        let negative_dur = PointProcessKind::Clamp(ClampConfig::VClamp {
            steps: [(-65.0, 10.0), (0.0, -1.0), (-65.0, 10.0)],
        });
        assert!(negative_dur.validate().is_err());

        let no_rs = PointProcessKind::Clamp(ClampConfig::SEClamp {
            steps: [(-65.0, 10.0), (0.0, 20.0), (-65.0, 10.0)],
            rs: 0.0,
        });
        assert!(no_rs.validate().is_err());
    }

    #[test]
    fn test_netstim_validation() {
        assert!(NetStimConfig::default().validate().is_ok());
        assert!(NetStimConfig { noise: 1.5, ..Default::default() }.validate().is_err());
        assert!(NetStimConfig { interval: 0.0, ..Default::default() }.validate().is_err());
    }

    // ====== Placement and recording ======

    #[test]
    fn test_insert_places_process_at_segment_midpoint() {
        let mut host = MockHost::default();
        let process = PointProcess::insert(&mut host, &geometry(), SegmentId(1), exp_syn(), true).unwrap();

        assert_eq!(process.position, Point3::new(0.0, 0.0, 15.0));
        assert_eq!(host.inserted, vec![(SegmentId(1), "ExpSyn", true)]);
    }

    #[test]
    fn test_insert_rejects_unknown_segment() {
        let mut host = MockHost::default();
        let result = PointProcess::insert(&mut host, &geometry(), SegmentId(9), exp_syn(), false);

        assert!(matches!(result, Err(LfpError::PointProcess(_))));
        assert!(host.inserted.is_empty());
    }

    #[test]
    fn test_spike_times_only_for_synapses() {
        let mut host = MockHost::default();
        let geometry = geometry();

        let mut synapse = PointProcess::insert(&mut host, &geometry, SegmentId(0), exp_syn(), false).unwrap();
        synapse.set_spike_times(&mut host, &[10.0, 15.0]).unwrap();
        assert_eq!(synapse.spike_times, vec![10.0, 15.0]);
        assert_eq!(host.spikes[&synapse.handle.0], vec![10.0, 15.0]);

        synapse
            .set_spike_times_w_netstim(&mut host, &NetStimConfig { noise: 0.0, ..Default::default() })
            .unwrap();
        assert_eq!(host.netstims[&synapse.handle.0].noise, 0.0);

        let mut clamp = PointProcess::insert(&mut host, &geometry, SegmentId(0), iclamp(), false).unwrap();
        assert!(clamp.set_spike_times(&mut host, &[1.0]).is_err());
    }

    #[test]
    fn test_collect_current_requires_recording() {
        let mut host = MockHost::default();
        let geometry = geometry();

        let mut recorded = PointProcess::insert(&mut host, &geometry, SegmentId(2), iclamp(), true).unwrap();
        assert_eq!(recorded.collect_current(&host).unwrap().len(), 3);
        assert!(recorded.current.is_some());
        assert_eq!(recorded.collect_potential(&host).unwrap()[0], -65.0);

        let mut silent = PointProcess::insert(&mut host, &geometry, SegmentId(2), iclamp(), false).unwrap();
        assert!(silent.collect_current(&host).is_err());
    }
}
