//! Conversion between storage space and display space.
//!
//! Storage space is the source JSON frame shifted by a fixed offset. The
//! offset is added once when a document is ingested and removed once when it
//! is persisted. Display space is storage space multiplied by the zoom
//! factor; the zoom never reaches persisted values.

use serde::{Deserialize, Serialize};

/// A 2D point. Which space it lives in is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Box (Chebyshev) proximity check used for corner hit-testing.
    pub fn within_box(&self, other: &Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    offset: f64,
    scale: f64,
}

impl CoordinateTransform {
    pub fn new(offset: f64, scale: f64) -> Self {
        Self {
            offset,
            scale: sanitize_scale(scale),
        }
    }

    /// Same offset, new zoom. Hosts call this with the current zoom control
    /// value before every geometry read or write.
    pub fn with_scale(self, scale: f64) -> Self {
        Self {
            offset: self.offset,
            scale: sanitize_scale(scale),
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn to_display(&self, p: Point) -> Point {
        Point::new(p.x * self.scale, p.y * self.scale)
    }

    pub fn to_storage(&self, p: Point) -> Point {
        Point::new(p.x / self.scale, p.y / self.scale)
    }

    /// Source value -> storage value. Applied exactly once, at load.
    pub fn ingest(&self, raw: f64) -> f64 {
        raw + self.offset
    }

    /// Storage value -> source value. Independent of the zoom.
    pub fn to_persisted(&self, stored: f64) -> f64 {
        stored - self.offset
    }
}

fn sanitize_scale(scale: f64) -> f64 {
    if scale <= 0.0 || !scale.is_finite() {
        tracing::warn!(scale, "Ignoring invalid zoom factor, using 1.0");
        1.0
    } else {
        scale
    }
}
