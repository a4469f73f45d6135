//! Error types for LFP simulation
//!
//! Every fatal error names the invariant that broke, so that a biologically
//! implausible run can be traced back to its cause:
//!
//! - [`GeometryError`]: the morphology cannot be turned into a Geometry Table
//! - [`AlignmentError`]: segment order or sample shapes drifted apart
//! - [`LfpError::Integrator`]: the compartmental engine failed a step
//!
//! [`LfpError::PersistenceUnavailable`] is the single recoverable error: the
//! driver disables file output and keeps recording to memory.

use thiserror::Error;

/// Result type alias for LFP operations
pub type Result<T> = std::result::Result<T, LfpError>;

/// Main error type for LFP simulation
#[derive(Error, Debug)]
pub enum LfpError {
    /// Morphology geometry cannot be extracted
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Positional coupling between segments, coefficients and samples broke
    #[error("alignment error: {0}")]
    Alignment(#[from] AlignmentError),

    /// The compartmental engine reported a failed or unstable step
    #[error("integrator error at t = {time} ms: {message}")]
    Integrator {
        /// Simulated time at which the failure was observed (ms)
        time: f64,
        /// Engine diagnostic
        message: String,
    },

    /// Persistent storage backend is not available in this build
    #[error("persistent storage unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Persistent storage backend failed while writing
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Electrode collaborator failure
    #[error("electrode error: {0}")]
    Electrode(String),

    /// Point-process collaborator failure
    #[error("point process error: {0}")]
    PointProcess(String),
}

impl LfpError {
    /// Whether the run can continue with degraded capability
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LfpError::PersistenceUnavailable(_))
    }

    /// Build an integrator error from an engine failure at time `time`
    pub fn integrator(time: f64, source: EngineError) -> Self {
        LfpError::Integrator {
            time,
            message: source.to_string(),
        }
    }
}

#[cfg(feature = "hdf5")]
impl From<hdf5::Error> for LfpError {
    fn from(err: hdf5::Error) -> Self {
        LfpError::Storage(err.to_string())
    }
}

/// Failures while building the Geometry Table
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Section has segments but no 3-D trace points
    #[error(
        "section '{section}' has {nseg} segment(s) but no 3-D points; \
         morphology must carry explicit 3-D tracing"
    )]
    MissingTrace { section: String, nseg: usize },

    /// Section has a 3-D trace but zero physical length
    #[error("section '{section}' has zero length, arc length cannot be normalized")]
    ZeroLengthSection { section: String },

    /// Model exposes no segments at all
    #[error("morphology contains no segments")]
    EmptyMorphology,

    /// Section spans declare a different number of segments than supplied
    #[error("section spans declare {declared} segment(s), {actual} supplied")]
    SegmentCount { declared: usize, actual: usize },

    /// Section span does not start where the previous one ended
    #[error("section '{section}' starts at segment {first}, expected {expected}")]
    SpanOffset {
        section: String,
        first: usize,
        expected: usize,
    },

    /// Segment names a section other than the span it lies in
    #[error("segment {segment} refers to section {section} but lies in section {expected}")]
    SectionIndex {
        segment: usize,
        section: usize,
        expected: usize,
    },
}

/// Broken positional coupling between Geometry Table, coefficients and samples
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    /// Engine section count changed since the geometry was built
    #[error("section count mismatch: geometry has {expected}, engine has {actual}")]
    SectionCount { expected: usize, actual: usize },

    /// Engine segment count of one section changed since the geometry was built
    #[error(
        "segment layout mismatch in section {section}: geometry has {expected} segment(s), \
         engine has {actual}"
    )]
    SegmentLayout {
        section: usize,
        expected: usize,
        actual: usize,
    },

    /// Live current read returned the wrong number of values
    #[error("membrane current read returned {actual} value(s), expected totnsegs = {expected}")]
    CurrentLength { expected: usize, actual: usize },

    /// Coefficient matrix does not span the Geometry Table
    #[error(
        "coefficient source {source_index} has {actual} column(s), expected totnsegs = {expected}"
    )]
    CoefficientColumns {
        source_index: usize,
        expected: usize,
        actual: usize,
    },

    /// Electrode potential output has an unexpected shape
    #[error("electrode '{electrode}' returned a {rows}x{cols} potential, expected {expected_rows}x{expected_cols}")]
    ElectrodeShape {
        electrode: String,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// Two result series cannot be superposed
    #[error("cannot superpose a {rows}x{cols} series onto an existing {existing_rows}x{existing_cols} series")]
    SeriesShape {
        rows: usize,
        cols: usize,
        existing_rows: usize,
        existing_cols: usize,
    },

    /// Sample index ran past the pre-allocated series
    #[error("sample index {index} exceeds series capacity {capacity}")]
    SampleOverflow { index: usize, capacity: usize },
}

/// Failure reported by the compartmental engine collaborator
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct EngineError {
    /// Engine diagnostic
    pub message: String,
}

impl EngineError {
    /// Create an engine error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =================================================================================================
// Tests
// =================================================================================================
