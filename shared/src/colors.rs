use serde::{Deserialize, Serialize};

/// RGBA fill color, serialized as `[r, g, b, a]` for the map layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    pub fn r(self) -> u8 {
        self.0[0]
    }

    pub fn g(self) -> u8 {
        self.0[1]
    }

    pub fn b(self) -> u8 {
        self.0[2]
    }

    pub fn a(self) -> u8 {
        self.0[3]
    }

    /// CSS `rgb(...)` string for legend gradients.
    pub fn css_rgb(self) -> String {
        format!("rgb({},{},{})", self.r(), self.g(), self.b())
    }
}

/// Low end of the ramp: green.
pub const LOW_COLOR: Rgba = Rgba::new(76, 204, 0, FILL_ALPHA);
/// High end of the ramp: red.
pub const HIGH_COLOR: Rgba = Rgba::new(255, 0, 0, FILL_ALPHA);
/// Divisions without a value for the selection.
pub const NO_DATA_COLOR: Rgba = Rgba::new(160, 160, 160, 90);
/// Division outlines.
pub const OUTLINE_COLOR: Rgba = Rgba::new(80, 80, 80, 200);

const FILL_ALPHA: u8 = 180;

/// Scale a `0..=1` fraction to a channel, truncating toward zero.
fn channel(fraction: f64) -> u8 {
    (255.0 * fraction).clamp(0.0, 255.0) as u8
}

/// Position of `value` within `[min, max]`, clamped to `0..=1`.
///
/// A degenerate range (`max <= min`) places every value at the low end.
pub fn normalized_position(value: f64, min: f64, max: f64) -> f64 {
    if !(max > min) {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Map a value onto the green-to-red ramp.
///
/// Red rises and green falls monotonically with the value. Absent or NaN
/// values get [`NO_DATA_COLOR`].
pub fn scale_color(value: Option<f64>, min: f64, max: f64) -> Rgba {
    let Some(value) = value.filter(|v| !v.is_nan()) else {
        return NO_DATA_COLOR;
    };
    let t = normalized_position(value, min, max);
    Rgba::new(
        channel(0.3 + 0.7 * t),
        channel(0.8 - 0.8 * t),
        0,
        FILL_ALPHA,
    )
}

/// CSS `linear-gradient` between two legend colors.
pub fn legend_gradient_css(low: Rgba, high: Rgba) -> String {
    format!(
        "linear-gradient(to right, {}, {})",
        low.css_rgb(),
        high.css_rgb()
    )
}

#[cfg(test)]
mod tests {
    use super::{
        HIGH_COLOR, LOW_COLOR, NO_DATA_COLOR, Rgba, legend_gradient_css, normalized_position,
        scale_color,
    };

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn endpoints_map_to_ramp_ends() {
        assert_eq!(scale_color(Some(50.0), 50.0, 150.0), LOW_COLOR);
        assert_eq!(scale_color(Some(150.0), 50.0, 150.0), HIGH_COLOR);
    }

    #[test]
    fn ramp_is_monotonic_across_range() {
        let (min, max) = (-20.0, 1_000.0);
        let mut previous = scale_color(Some(min), min, max);
        for step in 1..=500 {
            let value = min + (max - min) * step as f64 / 500.0;
            let color = scale_color(Some(value), min, max);
            assert!(color.r() >= previous.r(), "red fell at {value}");
            assert!(color.g() <= previous.g(), "green rose at {value}");
            assert_eq!(color.b(), previous.b());
            previous = color;
        }
    }

    #[test]
    fn degenerate_range_is_constant_low_end() {
        for value in [-5.0, 0.0, 7.0, 1e12] {
            assert_eq!(scale_color(Some(value), 7.0, 7.0), LOW_COLOR);
        }
        assert_close(normalized_position(7.0, 7.0, 7.0), 0.0);
    }

    #[test]
    fn midpoint_truncates_channels() {
        assert_eq!(scale_color(Some(0.5), 0.0, 1.0), Rgba::new(165, 102, 0, 180));
        assert_eq!(scale_color(Some(25.0), 0.0, 100.0), Rgba::new(121, 153, 0, 180));
    }

    #[test]
    fn values_outside_range_clamp() {
        assert_eq!(scale_color(Some(-1.0), 0.0, 10.0), LOW_COLOR);
        assert_eq!(scale_color(Some(11.0), 0.0, 10.0), HIGH_COLOR);
        assert_close(normalized_position(5.0, 0.0, 10.0), 0.5);
    }

    #[test]
    fn absent_or_nan_is_no_data() {
        assert_eq!(scale_color(None, 0.0, 10.0), NO_DATA_COLOR);
        assert_eq!(scale_color(Some(f64::NAN), 0.0, 10.0), NO_DATA_COLOR);
        assert_ne!(NO_DATA_COLOR, LOW_COLOR);
        assert_ne!(NO_DATA_COLOR, HIGH_COLOR);
    }

    #[test]
    fn legend_gradient_runs_low_to_high() {
        assert_eq!(
            legend_gradient_css(LOW_COLOR, HIGH_COLOR),
            "linear-gradient(to right, rgb(76,204,0), rgb(255,0,0))"
        );
    }
}
