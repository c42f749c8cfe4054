// Copyright (c) 2026 Omen Fan Utility Contributors
// Licensed under the MIT License

//! The control pipeline: smoothing, hysteresis and deadband quantization.
//!
//! Each poll turns a raw temperature sample into at most one actuation:
//!
//! ```text
//! temperature -> curve target -> EMA smoothing -> hysteresis governor
//!             -> deadband quantizer -> (maybe) fan register write
//! ```
//!
//! The pipeline is pure given [`LoopState`] and a timestamp; the daemon
//! performs the register writes that [`StepReport`] asks for.

use crate::curve::SpeedCurve;
use std::fmt;
use std::time::{Duration, Instant};

/// Fan speeds snap to multiples of this step.
pub const SPEED_STEP: f64 = 5.0;

// ---------------------------------------------------------------------------
// Tuning parameters
// ---------------------------------------------------------------------------

/// Pipeline tuning, fixed for the process lifetime.
#[derive(Debug, Clone, Copy)]
pub struct ControlSettings {
    /// EMA factor, 0 < alpha <= 1. 1 disables smoothing.
    pub smoothing_factor: f64,
    /// Minimum time between an increase and a later decrease.
    pub cooldown: Duration,
    /// Minimum percentage change that triggers an actuation.
    pub deadband_percent: f64,
}

// ---------------------------------------------------------------------------
// Loop state
// ---------------------------------------------------------------------------

/// Mutable state threaded through the loop, one owner, no sharing.
#[derive(Debug, Clone)]
pub struct LoopState {
    /// Last percentage actually written to hardware. `None` before the
    /// first write, which forces the first sample to actuate.
    pub last_applied: Option<u8>,
    /// Speed the hysteresis governor currently commits to.
    pub current_speed: f64,
    /// EMA-filtered target. `None` before the first sample so the filter
    /// starts at the target instead of ramping up from zero.
    pub smoothed: Option<f64>,
    /// When the governor last adopted an increase.
    pub last_increase: Option<Instant>,
    /// When the periodic status line was last written.
    pub last_log: Option<Instant>,
}

impl LoopState {
    pub fn new() -> Self {
        Self {
            last_applied: None,
            current_speed: 0.0,
            smoothed: None,
            last_increase: None,
            last_log: None,
        }
    }
}

impl Default for LoopState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Step outcome
// ---------------------------------------------------------------------------

/// Which hysteresis transition fired this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Smoothed target rose above the committed speed; adopted immediately.
    Increase,
    /// Smoothed target fell and the cooldown had elapsed; adopted.
    Decrease,
    /// Smoothed target fell but the cooldown is still running; held.
    Cooldown { remaining_secs: u64 },
    /// Smoothed target equals the committed speed.
    Maintain,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Increase => write!(f, "INCREASE"),
            Transition::Decrease => write!(f, "DECREASE"),
            Transition::Cooldown { remaining_secs } => {
                write!(f, "COOLDOWN({remaining_secs}s)")
            }
            Transition::Maintain => write!(f, "MAINTAIN"),
        }
    }
}

/// What the quantizer decided to do with the governor's proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write this quantized percentage to both fan registers.
    Apply(u8),
    /// Change was below the deadband; no write.
    Suppressed,
    /// Quantized value equals the last applied one; no write.
    Unchanged,
}

/// Full account of one pipeline step, consumed by the daemon for
/// actuation and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct StepReport {
    pub target: f64,
    pub smoothed: f64,
    pub transition: Transition,
    pub action: Action,
}

impl StepReport {
    /// Label for the periodic status line: the transition that fired, or
    /// `DEADBAND` when the quantizer suppressed the change.
    pub fn status_label(&self) -> String {
        match self.action {
            Action::Suppressed => "DEADBAND".to_string(),
            _ => self.transition.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the curve, the tuning parameters and the loop state.
pub struct Controller {
    curve: SpeedCurve,
    settings: ControlSettings,
    state: LoopState,
}

impl Controller {
    pub fn new(curve: SpeedCurve, settings: ControlSettings) -> Self {
        Self {
            curve,
            settings,
            state: LoopState::new(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    /// Run one pipeline step for a temperature sample taken at `now`.
    ///
    /// Updates the loop state, including `last_applied` when the report
    /// carries an [`Action::Apply`]; the caller only has to perform the
    /// register writes.
    pub fn step(&mut self, temp: f64, now: Instant) -> StepReport {
        let target = self.curve.target_for(temp);
        let smoothed = self.smooth(target);
        let transition = self.govern(smoothed, now);
        let action = self.quantize();

        StepReport {
            target,
            smoothed,
            transition,
            action,
        }
    }

    /// True when the periodic status line is due; records `now` if so.
    pub fn heartbeat_due(&mut self, now: Instant, interval: Duration) -> bool {
        let due = match self.state.last_log {
            None => true,
            Some(last) => now.duration_since(last) >= interval,
        };
        if due {
            self.state.last_log = Some(now);
        }
        due
    }

    /// Exponential moving average. The first sample seeds the filter so
    /// the fans do not ramp up from an artificial zero.
    fn smooth(&mut self, target: f64) -> f64 {
        let alpha = self.settings.smoothing_factor;
        let smoothed = match self.state.smoothed {
            None => target,
            Some(prev) => alpha * target + (1.0 - alpha) * prev,
        };
        self.state.smoothed = Some(smoothed);
        smoothed
    }

    /// Asymmetric hysteresis: increases are adopted immediately, decreases
    /// only after the cooldown since the last increase has elapsed.
    fn govern(&mut self, smoothed: f64, now: Instant) -> Transition {
        if smoothed > self.state.current_speed {
            self.state.current_speed = smoothed;
            self.state.last_increase = Some(now);
            Transition::Increase
        } else if smoothed < self.state.current_speed {
            let since_increase = self
                .state
                .last_increase
                .map(|t| now.duration_since(t))
                .unwrap_or(self.settings.cooldown);
            if since_increase >= self.settings.cooldown {
                self.state.current_speed = smoothed;
                Transition::Decrease
            } else {
                let remaining = self.settings.cooldown - since_increase;
                Transition::Cooldown {
                    remaining_secs: remaining.as_secs(),
                }
            }
        } else {
            Transition::Maintain
        }
    }

    /// Deadband filter and step quantization.
    fn quantize(&mut self) -> Action {
        let proposed = self.state.current_speed;
        match self.state.last_applied {
            Some(prev) if (proposed - f64::from(prev)).abs() < self.settings.deadband_percent => {
                Action::Suppressed
            }
            prev => {
                let quantized = quantize_speed(proposed);
                if prev == Some(quantized) {
                    Action::Unchanged
                } else {
                    self.state.last_applied = Some(quantized);
                    Action::Apply(quantized)
                }
            }
        }
    }
}

/// Snap a percentage to the nearest multiple of [`SPEED_STEP`], clamped
/// to 0-100. Ties round away from zero.
pub fn quantize_speed(percent: f64) -> u8 {
    let stepped = (percent / SPEED_STEP).round() * SPEED_STEP;
    stepped.clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(alpha: f64, cooldown_secs: u64, deadband: f64) -> ControlSettings {
        ControlSettings {
            smoothing_factor: alpha,
            cooldown: Duration::from_secs(cooldown_secs),
            deadband_percent: deadband,
        }
    }

    fn test_curve() -> SpeedCurve {
        SpeedCurve::new(&[40, 60, 80], &[20, 50, 100], 20).unwrap()
    }

    #[test]
    fn test_quantize_snaps_and_clamps() {
        assert_eq!(quantize_speed(0.0), 0);
        assert_eq!(quantize_speed(27.5), 30);
        assert_eq!(quantize_speed(62.4), 60);
        assert_eq!(quantize_speed(62.5), 65);
        assert_eq!(quantize_speed(98.0), 100);
        assert_eq!(quantize_speed(120.0), 100);
        assert_eq!(quantize_speed(-3.0), 0);
    }

    #[test]
    fn test_smoothing_converges_without_overshoot() {
        let mut ctl = Controller::new(test_curve(), settings(0.3, 0, 100.0));
        let now = Instant::now();

        // Constant 70C -> target 75.0; seed with a cold sample first.
        let first = ctl.step(30.0, now);
        assert_eq!(first.smoothed, 20.0);

        let mut prev = first.smoothed;
        for i in 1..50 {
            let r = ctl.step(70.0, now + Duration::from_secs(i));
            assert!(r.smoothed > prev, "EMA must rise monotonically");
            assert!(r.smoothed <= 75.0, "EMA must never overshoot the target");
            prev = r.smoothed;
        }
        assert!((prev - 75.0).abs() < 0.1);
    }

    #[test]
    fn test_first_sample_seeds_filter_at_target() {
        let mut ctl = Controller::new(test_curve(), settings(0.3, 15, 3.0));
        let r = ctl.step(70.0, Instant::now());
        // No ramp from zero: smoothed equals the interpolated target.
        assert_eq!(r.smoothed, 75.0);
        assert_eq!(r.transition, Transition::Increase);
    }

    #[test]
    fn test_hysteresis_holds_during_cooldown_then_releases() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 0.0));
        let t0 = Instant::now();

        let up = ctl.step(80.0, t0);
        assert_eq!(up.transition, Transition::Increase);
        assert_eq!(ctl.state().current_speed, 100.0);

        // Lower sample 5s later: still cooling down, committed speed held.
        let held = ctl.step(50.0, t0 + Duration::from_secs(5));
        assert!(matches!(held.transition, Transition::Cooldown { .. }));
        assert_eq!(ctl.state().current_speed, 100.0);

        // Same sample after the cooldown: decrease adopted.
        let down = ctl.step(50.0, t0 + Duration::from_secs(16));
        assert_eq!(down.transition, Transition::Decrease);
        assert_eq!(ctl.state().current_speed, 35.0);
    }

    #[test]
    fn test_cooldown_reports_remaining_time() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 0.0));
        let t0 = Instant::now();
        ctl.step(80.0, t0);
        let held = ctl.step(50.0, t0 + Duration::from_secs(5));
        assert_eq!(
            held.transition,
            Transition::Cooldown { remaining_secs: 10 }
        );
    }

    #[test]
    fn test_maintain_when_speed_unchanged() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 3.0));
        let t0 = Instant::now();
        ctl.step(70.0, t0);
        let r = ctl.step(70.0, t0 + Duration::from_secs(1));
        assert_eq!(r.transition, Transition::Maintain);
    }

    #[test]
    fn test_deadband_suppresses_small_changes() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 0, 3.0));
        let t0 = Instant::now();

        let first = ctl.step(70.0, t0);
        assert_eq!(first.action, Action::Apply(75));

        // 71C -> target 77.5, |77.5 - 75| = 2.5 < deadband 3: suppressed.
        let small = ctl.step(71.0, t0 + Duration::from_secs(1));
        assert_eq!(small.action, Action::Suppressed);
        assert_eq!(ctl.state().last_applied, Some(75));

        // 74C -> target 85.0, change of 10 >= deadband: applied.
        let big = ctl.step(74.0, t0 + Duration::from_secs(2));
        assert_eq!(big.action, Action::Apply(85));
    }

    #[test]
    fn test_first_iteration_actuates_despite_deadband() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 50.0));
        let r = ctl.step(35.0, Instant::now());
        // last_applied is unset, so even a huge deadband cannot suppress.
        assert_eq!(r.action, Action::Apply(20));
    }

    #[test]
    fn test_no_write_when_quantized_value_unchanged() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 0, 1.0));
        let t0 = Instant::now();
        let first = ctl.step(70.0, t0);
        assert_eq!(first.action, Action::Apply(75));

        // 69.4C -> target 73.5: above the deadband but quantizes back to 75.
        let r = ctl.step(69.4, t0 + Duration::from_secs(1));
        assert_eq!(r.action, Action::Unchanged);
        assert_eq!(ctl.state().last_applied, Some(75));
    }

    #[test]
    fn test_heartbeat_interval() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 3.0));
        let t0 = Instant::now();
        let every = Duration::from_secs(5);

        assert!(ctl.heartbeat_due(t0, every));
        assert!(!ctl.heartbeat_due(t0 + Duration::from_secs(2), every));
        assert!(ctl.heartbeat_due(t0 + Duration::from_secs(5), every));
    }

    /// End-to-end trace with smoothing disabled: curve [40,60,80] ->
    /// [20,50,100], idle 20, deadband 3, cooldown 15s, temperatures
    /// 35, 65, 65, 45 one second apart, then 45 again after the cooldown.
    #[test]
    fn test_end_to_end_trace() {
        let mut ctl = Controller::new(test_curve(), settings(1.0, 15, 3.0));
        let t0 = Instant::now();

        // 35C: at idle, first write.
        let r1 = ctl.step(35.0, t0);
        assert_eq!(r1.target, 20.0);
        assert_eq!(r1.transition, Transition::Increase);
        assert_eq!(r1.action, Action::Apply(20));

        // 65C: target 50 + 2.5 * 5 = 62.5; immediate increase, 62.5
        // quantizes to 65 (ties away from zero).
        let r2 = ctl.step(65.0, t0 + Duration::from_secs(1));
        assert_eq!(r2.target, 62.5);
        assert_eq!(r2.transition, Transition::Increase);
        assert_eq!(r2.action, Action::Apply(65));

        // 65C again: committed speed already 62.5, |62.5 - 65| = 2.5 < 3.
        let r3 = ctl.step(65.0, t0 + Duration::from_secs(2));
        assert_eq!(r3.transition, Transition::Maintain);
        assert_eq!(r3.action, Action::Suppressed);

        // 45C: target 20 + 1.5 * 5 = 27.5, but the increase at t0+1s is
        // only 2s old, so the governor holds 62.5 and the deadband
        // suppresses again.
        let r4 = ctl.step(45.0, t0 + Duration::from_secs(3));
        assert_eq!(r4.target, 27.5);
        assert!(matches!(r4.transition, Transition::Cooldown { .. }));
        assert_eq!(r4.action, Action::Suppressed);
        assert_eq!(ctl.state().last_applied, Some(65));

        // 45C after the cooldown: decrease adopted, 27.5 quantizes to 30.
        let r5 = ctl.step(45.0, t0 + Duration::from_secs(17));
        assert_eq!(r5.transition, Transition::Decrease);
        assert_eq!(r5.action, Action::Apply(30));
        assert_eq!(ctl.state().last_applied, Some(30));
    }
}
