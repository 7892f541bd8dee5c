//! Red → yellow → green feedback palette.
//!
//! The 30 entries are shared with existing recorded data and legends and
//! must not change.

use serde::{Deserialize, Serialize};

/// An RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Returns the color as an `[r, g, b]` array.
    pub fn to_array(self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

const PALETTE: [Rgb; 30] = [
    Rgb::new(1.000, 0.000, 0.000),
    Rgb::new(1.000, 0.071, 0.000),
    Rgb::new(1.000, 0.143, 0.000),
    Rgb::new(1.000, 0.214, 0.000),
    Rgb::new(1.000, 0.286, 0.000),
    Rgb::new(1.000, 0.357, 0.000),
    Rgb::new(1.000, 0.429, 0.000),
    Rgb::new(1.000, 0.500, 0.000),
    Rgb::new(1.000, 0.571, 0.000),
    Rgb::new(1.000, 0.643, 0.000),
    Rgb::new(1.000, 0.714, 0.000),
    Rgb::new(1.000, 0.786, 0.000),
    Rgb::new(1.000, 0.857, 0.000),
    Rgb::new(1.000, 0.929, 0.000),
    Rgb::new(1.000, 1.000, 0.000),
    Rgb::new(0.933, 1.000, 0.000),
    Rgb::new(0.867, 1.000, 0.000),
    Rgb::new(0.800, 1.000, 0.000),
    Rgb::new(0.733, 1.000, 0.000),
    Rgb::new(0.667, 1.000, 0.000),
    Rgb::new(0.600, 1.000, 0.000),
    Rgb::new(0.533, 1.000, 0.000),
    Rgb::new(0.467, 1.000, 0.000),
    Rgb::new(0.400, 1.000, 0.000),
    Rgb::new(0.333, 1.000, 0.000),
    Rgb::new(0.267, 1.000, 0.000),
    Rgb::new(0.200, 1.000, 0.000),
    Rgb::new(0.133, 1.000, 0.000),
    Rgb::new(0.067, 1.000, 0.000),
    Rgb::new(0.000, 1.000, 0.000),
];

/// Pure red, the color of an out-of-tolerance channel.
pub const WORST: Rgb = PALETTE[0];

/// Pure green, the color of an exactly on-target channel.
pub const BEST: Rgb = PALETTE[PALETTE.len() - 1];

/// Number of palette entries.
#[inline]
pub const fn palette_size() -> usize {
    PALETTE.len()
}

/// Color at `index`, clamped to the last entry.
pub fn palette(index: usize) -> Rgb {
    PALETTE[index.min(PALETTE.len() - 1)]
}

/// Maps a goodness value in `[0, 1]` to a palette index.
///
/// `floor(goodness * (size - 1))` clamped to `[0, size - 1]`; NaN maps to 0.
pub fn palette_index_for(goodness: f64) -> usize {
    let max = (PALETTE.len() - 1) as f64;
    let scaled = (goodness * max).floor();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else {
        scaled.min(max) as usize
    }
}

/// The full table, red first.
pub fn entries() -> &'static [Rgb] {
    &PALETTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_endpoints() {
        assert_eq!(palette_size(), 30);
        assert_eq!(palette(0), Rgb::new(1.0, 0.0, 0.0));
        assert_eq!(palette(29), Rgb::new(0.0, 1.0, 0.0));
        assert_eq!(palette(14), Rgb::new(1.0, 1.0, 0.0));
        assert_eq!(WORST, palette(0));
        assert_eq!(BEST, palette(29));
        assert_eq!(palette(500), BEST);
    }

    #[test]
    fn test_hue_moves_monotonically() {
        // Green rises to yellow, then red falls to green.
        for pair in entries().windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(b.g >= a.g);
            assert!(b.r <= a.r);
            assert_eq!(a.b, 0.0);
        }
    }

    #[test]
    fn test_index_mapping() {
        assert_eq!(palette_index_for(0.0), 0);
        assert_eq!(palette_index_for(0.5), 14);
        assert_eq!(palette_index_for(1.0), 29);
        assert_eq!(palette_index_for(1.7), 29);
        assert_eq!(palette_index_for(-0.2), 0);
        assert_eq!(palette_index_for(f64::NAN), 0);
    }

    #[test]
    fn test_index_mapping_is_monotone() {
        let mut last = 0;
        for i in 0..=1000 {
            let idx = palette_index_for(i as f64 / 1000.0);
            assert!(idx >= last);
            last = idx;
        }
        assert_eq!(last, 29);
    }
}
