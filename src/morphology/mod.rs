//! Neuron morphology and the compartmental engine contract
//!
//! # Core Concepts
//!
//! - **Compartmental engine** ([`CompartmentEngine`]): the external collaborator
//!   that solves the cable equations and exposes sections, segments and live
//!   per-segment state
//! - **Geometry Table** ([`GeometryTable`]): one [`Segment`] per compartment
//!   with 3-D start/end points, area, diameter and length
//! - **Segment index** ([`SegmentId`]): the shared index tying geometry,
//!   coefficient columns and live current reads together
//!
//! # Example
//!
//! ```rust,ignore
//! use lfp_rs::morphology::{collect_geometry, GeometryOptions};
//!
//! let geometry = collect_geometry(&engine, &GeometryOptions::default())?;
//! println!("{} segments, {:.1} um^2", geometry.totnsegs(), geometry.total_area());
//! ```

pub mod geometry;
pub mod traits;

pub use geometry::{
    collect_geometry,
    interp,
    GeometryOptions,
    GeometryTable,
    SectionSpan,
    Segment,
    SegmentId,
};
pub use traits::{
    CompartmentEngine,
    IntegratorMode,
    SectionDescriptor,
    SegmentDescriptor,
    TracePoint,
};
