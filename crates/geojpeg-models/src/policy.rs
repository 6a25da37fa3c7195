//! Bounding-box plausibility policy.
//!
//! Images whose CRS cannot be resolved are only kept when their footprint
//! looks like it belongs to the expected operating region.

use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// Plausibility policy shared read-only by every worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationPolicy {
    /// Whether the check is enforced at all
    pub enforce: bool,
    /// Acceptable geographic range
    pub envelope: Option<BoundingBox>,
    /// Maximum footprint span per axis, in degrees (exclusive)
    pub max_span_degrees: Option<f64>,
}

impl ValidationPolicy {
    /// Policy that keeps every output.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enforced policy over the given envelope.
    pub fn enforced(envelope: BoundingBox) -> Self {
        Self {
            enforce: true,
            envelope: Some(envelope),
            max_span_degrees: None,
        }
    }

    /// Set the maximum footprint span.
    pub fn with_max_span(mut self, degrees: f64) -> Self {
        self.max_span_degrees = Some(degrees);
        self
    }

    /// Decide keep (`true`) or discard (`false`) for a footprint.
    pub fn admits(&self, bbox: &BoundingBox) -> bool {
        if !self.enforce {
            return true;
        }
        if bbox.is_degenerate() {
            return false;
        }
        let Some(envelope) = self.envelope else {
            return false;
        };
        if !envelope.contains(bbox) {
            return false;
        }
        match self.max_span_degrees {
            Some(max) => bbox.width() < max && bbox.height() < max,
            None => true,
        }
    }
}

/// Validate a footprint against the policy.
pub fn validate(bbox: &BoundingBox, policy: &ValidationPolicy) -> bool {
    policy.admits(bbox)
}
