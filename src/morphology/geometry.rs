//! Geometry Table extraction
//!
//! Walks the engine's sections in iteration order and produces one
//! [`Segment`] per compartment with interpolated 3-D start/end points,
//! surface area, diameter and length.
//!
//! # Interpolation
//!
//! Each section's 3-D trace is normalized to arc length in `[0, 1]`. A segment
//! with midpoint `x` in a section of `nseg` segments spans
//! `[x - 1/(2 nseg), x + 1/(2 nseg)]`. Both ends are rounded to
//! `rounding_decimals` and clamped to `[0, 1]`, which absorbs the round-off
//! picked up when midpoints pass through the engine, and then
//! interpolated linearly against the trace.

use nalgebra::{DVector, Point3};

use crate::error::{AlignmentError, GeometryError, Result};
use crate::morphology::traits::{CompartmentEngine, SectionDescriptor, TracePoint};

// =================================================================================================
// Segment Identifier
// =================================================================================================

/// Index of a segment in the Geometry Table
///
/// Coefficient matrix column `i`, live current entry `i` and Geometry Table
/// entry `i` all refer to the same `SegmentId(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub usize);

impl SegmentId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seg#{}", self.0)
    }
}

// =================================================================================================
// Segment
// =================================================================================================

/// One compartment of the neuron model
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    /// Index of the owning section in the Geometry Table layout
    pub section: usize,
    /// 3-D start point (um)
    pub start: Point3<f64>,
    /// 3-D end point (um)
    pub end: Point3<f64>,
    /// Membrane surface area (um^2)
    pub area: f64,
    /// Diameter (um)
    pub diam: f64,
    /// Physical length (um)
    pub length: f64,
}

impl Segment {
    /// Midpoint between start and end
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.end)
    }
}

/// Contiguous run of segments belonging to one section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpan {
    pub name: String,
    pub first: SegmentId,
    pub nseg: usize,
}

impl SectionSpan {
    /// Segment ids covered by this section
    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> {
        let start = self.first.0;
        (start..start + self.nseg).map(SegmentId)
    }
}

// =================================================================================================
// Geometry Options
// =================================================================================================

/// Options for [`collect_geometry`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryOptions {
    /// Decimal places kept on fractional segment ends before interpolation
    pub rounding_decimals: i32,
}

impl Default for GeometryOptions {
    fn default() -> Self {
        Self { rounding_decimals: 6 }
    }
}

impl GeometryOptions {
    /// Builder pattern: set rounding tolerance
    pub fn rounding_decimals(mut self, decimals: i32) -> Self {
        self.rounding_decimals = decimals;
        self
    }

    fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(self.rounding_decimals);
        ((value * scale).round() / scale).clamp(0.0, 1.0)
    }
}

// =================================================================================================
// Geometry Table
// =================================================================================================

/// Ordered sequence of segments, in engine iteration order
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTable {
    segments: Vec<Segment>,
    sections: Vec<SectionSpan>,
}

impl GeometryTable {
    /// Assemble a table from already-computed segments.
    ///
    /// Segment ids are reassigned to their position. Spans must be contiguous
    /// and in order, and every segment's `section` must be the index of the
    /// span it lies in.
    pub fn from_parts(mut segments: Vec<Segment>, sections: Vec<SectionSpan>) -> Result<Self> {
        if segments.is_empty() {
            return Err(GeometryError::EmptyMorphology.into());
        }

        let declared: usize = sections.iter().map(|s| s.nseg).sum();
        if declared != segments.len() {
            return Err(GeometryError::SegmentCount {
                declared,
                actual: segments.len(),
            }
            .into());
        }

        let mut position = 0;
        for (index, span) in sections.iter().enumerate() {
            if span.first.0 != position {
                return Err(GeometryError::SpanOffset {
                    section: span.name.clone(),
                    first: span.first.0,
                    expected: position,
                }
                .into());
            }
            for (offset, segment) in segments[position..position + span.nseg].iter().enumerate() {
                if segment.section != index {
                    return Err(GeometryError::SectionIndex {
                        segment: position + offset,
                        section: segment.section,
                        expected: index,
                    }
                    .into());
                }
            }
            position += span.nseg;
        }

        for (i, segment) in segments.iter_mut().enumerate() {
            segment.id = SegmentId(i);
        }

        Ok(Self { segments, sections })
    }

    /// Total number of segments (`totnsegs`)
    pub fn totnsegs(&self) -> usize {
        self.segments.len()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn sections(&self) -> &[SectionSpan] {
        &self.sections
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(id.0)
    }

    /// Name of the section owning `id`
    pub fn section_name(&self, id: SegmentId) -> Option<&str> {
        self.get(id)
            .and_then(|seg| self.sections.get(seg.section))
            .map(|span| span.name.as_str())
    }

    /// Segment count per section, in iteration order
    pub fn layout(&self) -> Vec<usize> {
        self.sections.iter().map(|s| s.nseg).collect()
    }

    /// Segment areas (um^2) as a vector aligned with coefficient columns
    pub fn areas(&self) -> DVector<f64> {
        DVector::from_iterator(self.segments.len(), self.segments.iter().map(|s| s.area))
    }

    /// Total membrane area (um^2)
    pub fn total_area(&self) -> f64 {
        self.segments.iter().map(|s| s.area).sum()
    }

    /// Midpoint of a segment
    pub fn midpoint(&self, id: SegmentId) -> Option<Point3<f64>> {
        self.get(id).map(Segment::midpoint)
    }

    /// Segment whose midpoint lies closest to `point`
    pub fn closest_segment(&self, point: &Point3<f64>) -> Option<SegmentId> {
        self.segments
            .iter()
            .map(|seg| (seg.id, nalgebra::distance_squared(&seg.midpoint(), point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    /// Check that the engine still iterates the layout this table was built from.
    ///
    /// Runs once at the start of a simulation; live reads rely on it.
    pub fn verify_alignment<E: CompartmentEngine + ?Sized>(&self, engine: &E) -> Result<()> {
        let counts = engine.segment_counts();

        if counts.len() != self.sections.len() {
            return Err(AlignmentError::SectionCount {
                expected: self.sections.len(),
                actual: counts.len(),
            }
            .into());
        }

        for (section, (span, &actual)) in self.sections.iter().zip(counts.iter()).enumerate() {
            if span.nseg != actual {
                return Err(AlignmentError::SegmentLayout {
                    section,
                    expected: span.nseg,
                    actual,
                }
                .into());
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a GeometryTable {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

// =================================================================================================
// Extraction
// =================================================================================================

/// Build the Geometry Table from the engine's sections
///
/// # Errors
///
/// - [`GeometryError::MissingTrace`] when a section with segments has no 3-D points
/// - [`GeometryError::ZeroLengthSection`] when a traced section has zero length
/// - [`GeometryError::EmptyMorphology`] when the model has no segments
pub fn collect_geometry<E: CompartmentEngine + ?Sized>(
    engine: &E,
    options: &GeometryOptions,
) -> Result<GeometryTable> {
    let sections = engine.sections();

    let mut segments = Vec::with_capacity(sections.iter().map(SectionDescriptor::nseg).sum());
    let mut spans = Vec::with_capacity(sections.len());

    for (section_index, section) in sections.iter().enumerate() {
        let nseg = section.nseg();

        spans.push(SectionSpan {
            name: section.name.clone(),
            first: SegmentId(segments.len()),
            nseg,
        });

        if nseg == 0 {
            continue;
        }

        if section.points.is_empty() {
            return Err(GeometryError::MissingTrace {
                section: section.name.clone(),
                nseg,
            }
            .into());
        }

        if section.length <= 0.0 {
            return Err(GeometryError::ZeroLengthSection {
                section: section.name.clone(),
            }
            .into());
        }

        let arc: Vec<f64> = section.points.iter().map(|p| p.arc / section.length).collect();
        let half_width = 0.5 / nseg as f64;
        let length = section.length / nseg as f64;

        for probe in &section.segments {
            let x0 = options.round(probe.x - half_width);
            let x1 = options.round(probe.x + half_width);

            segments.push(Segment {
                id: SegmentId(segments.len()),
                section: section_index,
                start: trace_position(x0, &arc, &section.points),
                end: trace_position(x1, &arc, &section.points),
                area: probe.area,
                diam: probe.diam,
                length,
            });
        }
    }

    GeometryTable::from_parts(segments, spans)
}

fn trace_position(x: f64, arc: &[f64], points: &[TracePoint]) -> Point3<f64> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let zs: Vec<f64> = points.iter().map(|p| p.z).collect();

    Point3::new(interp(x, arc, &xs), interp(x, arc, &ys), interp(x, arc, &zs))
}

/// One-dimensional linear interpolation against increasing sample positions.
///
/// Values outside `[xp[0], xp[last]]` take the nearest endpoint value.
/// Repeated sample positions resolve to the later sample.
///
/// # Panics
///
/// Panics if `xp` is empty or `xp` and `fp` lengths differ.
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    assert!(!xp.is_empty(), "interp needs at least one sample");
    assert_eq!(xp.len(), fp.len(), "interp sample lengths differ");

    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }

    // first index with xp[j] > x; 1 <= j <= last here
    let j = xp.partition_point(|&v| v <= x);
    let (x_lo, x_hi) = (xp[j - 1], xp[j]);
    let (f_lo, f_hi) = (fp[j - 1], fp[j]);

    if x_hi == x_lo {
        return f_lo;
    }

    f_lo + (x - x_lo) * (f_hi - f_lo) / (x_hi - x_lo)
}

// =================================================================================================
// Tests
// =================================================================================================
