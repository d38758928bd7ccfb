//! Sheet scale and strictness profiles.
//!
//! All distance thresholds in the engines are expressed as fractions of the
//! staff interline, so one set of constants works across sheet resolutions.

use serde::{Deserialize, Serialize};

/// Sheet scale: the staff interline value in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    interline: f64,
}

impl Scale {
    pub fn new(interline: f64) -> Self {
        Self { interline }
    }

    pub fn interline(&self) -> f64 {
        self.interline
    }

    /// Convert an interline fraction to pixels.
    pub fn to_pixels(&self, fraction: f64) -> f64 {
        fraction * self.interline
    }

    /// Convert a pixel distance to an interline fraction.
    pub fn pixels_to_frac(&self, pixels: f64) -> f64 {
        pixels / self.interline
    }
}

/// Strictness level controlling which gap maxima apply.
///
/// `STRICT` is the default for engine-driven searches; `MANUAL` relaxes the
/// maxima for user-initiated links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile(pub u8);

impl Profile {
    pub const STRICT: Profile = Profile(0);
    pub const MANUAL: Profile = Profile(1);

    /// Index into a per-profile maxima table, clamped to the table length.
    pub fn index(&self, table_len: usize) -> usize {
        (self.0 as usize).min(table_len.saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let scale = Scale::new(20.0);
        assert_eq!(scale.to_pixels(1.5), 30.0);
        assert_eq!(scale.pixels_to_frac(10.0), 0.5);
    }

    #[test]
    fn test_profile_index() {
        assert_eq!(Profile::STRICT.index(2), 0);
        assert_eq!(Profile::MANUAL.index(2), 1);
        assert_eq!(Profile(7).index(2), 1);
    }
}
