// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! Fan curve definition and interpolation.
//!
//! The curve maps a temperature in degrees Celsius to a duty percentage
//! (0-100). Breakpoints are linearly interpolated; slopes between
//! adjacent breakpoints are computed once at startup.

/// A validated piecewise-linear temperature-to-speed curve.
///
/// Immutable after construction. Below the first breakpoint the curve
/// returns the configured idle speed; at or above the last breakpoint it
/// returns the final speed breakpoint. No extrapolation.
#[derive(Debug, Clone)]
pub struct SpeedCurve {
    temps: Vec<f64>,
    speeds: Vec<f64>,
    /// `slopes[i]` covers the segment between breakpoints `i` and `i + 1`.
    slopes: Vec<f64>,
    idle_speed: f64,
}

impl SpeedCurve {
    /// Build a curve from index-aligned breakpoint arrays.
    ///
    /// Fails if the arrays differ in length, have fewer than 2 entries,
    /// temperatures are not strictly increasing, or any speed lies outside
    /// 0-100. Breakpoints are taken as given, never re-sorted.
    pub fn new(temps: &[i64], speeds: &[i64], idle_speed: i64) -> Result<Self, String> {
        if temps.len() != speeds.len() {
            return Err(format!(
                "temp_curve has {} entries but speed_curve has {}",
                temps.len(),
                speeds.len()
            ));
        }
        if temps.len() < 2 {
            return Err("Curve must have at least 2 breakpoints".to_string());
        }
        for (i, w) in temps.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(format!(
                    "temp_curve must be strictly increasing (entry {})",
                    i + 1
                ));
            }
        }
        for (i, &s) in speeds.iter().enumerate() {
            if !(0..=100).contains(&s) {
                return Err(format!("speed_curve entry {i} ({s}) is outside 0-100"));
            }
        }
        if !(0..=100).contains(&idle_speed) {
            return Err(format!("idle_speed ({idle_speed}) is outside 0-100"));
        }

        let temps: Vec<f64> = temps.iter().map(|&t| t as f64).collect();
        let speeds: Vec<f64> = speeds.iter().map(|&s| s as f64).collect();
        let slopes = temps
            .windows(2)
            .zip(speeds.windows(2))
            .map(|(t, s)| (s[1] - s[0]) / (t[1] - t[0]))
            .collect();

        Ok(Self {
            temps,
            speeds,
            slopes,
            idle_speed: idle_speed as f64,
        })
    }

    /// Interpolate the target duty percentage for a temperature.
    ///
    /// The result is an exact, unrounded value; quantization to fan steps
    /// happens later in the pipeline.
    pub fn target_for(&self, temp: f64) -> f64 {
        if temp <= self.temps[0] {
            return self.idle_speed;
        }
        let last = self.temps.len() - 1;
        if temp >= self.temps[last] {
            return self.speeds[last];
        }

        // Smallest i with temps[i] >= temp; 0 < i <= last here.
        let i = self.temps.partition_point(|&t| t < temp);
        self.speeds[i - 1] + self.slopes[i - 1] * (temp - self.temps[i - 1])
    }

    pub fn idle_speed(&self) -> f64 {
        self.idle_speed
    }
}
