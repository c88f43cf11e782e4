use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference ratio for landscape video (16:9).
pub const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;
/// Reference ratio for portrait video (9:16).
pub const PORTRAIT_RATIO: f64 = 9.0 / 16.0;
/// Default distance from a reference ratio that still counts as a match.
pub const DEFAULT_TOLERANCE: f64 = 0.1;

/// Coarse orientation of a video, used as the storage key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectBucket {
    Landscape,
    Portrait,
    Other,
}

impl AspectBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectBucket::Landscape => "landscape",
            AspectBucket::Portrait => "portrait",
            AspectBucket::Other => "other",
        }
    }
}

impl fmt::Display for AspectBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AspectClassifier {
    tolerance: f64,
}

impl Default for AspectClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl AspectClassifier {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Maps a frame size to a bucket. Bounds are inclusive; when both bands
    /// match, the closer reference ratio wins.
    pub fn classify(&self, width: u32, height: u32) -> AspectBucket {
        if width == 0 || height == 0 {
            return AspectBucket::Other;
        }
        let ratio = f64::from(width) / f64::from(height);

        let landscape = (ratio - LANDSCAPE_RATIO).abs();
        let portrait = (ratio - PORTRAIT_RATIO).abs();

        match (landscape <= self.tolerance, portrait <= self.tolerance) {
            (true, true) if portrait < landscape => AspectBucket::Portrait,
            (true, _) => AspectBucket::Landscape,
            (false, true) => AspectBucket::Portrait,
            (false, false) => AspectBucket::Other,
        }
    }
}
