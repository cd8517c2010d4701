//! AUTO / FAST / CYCLE decision rules.
//!
//! Every rule is a pure function of the slot's stored quality, its output
//! count and the ticks elapsed since its decision window opened.

use crate::config::{CaptureConfig, CaptureMode};

/// Baseline that lets any observation above `thr_quality` qualify.
pub const ANY_QUALIFYING: f32 = -1.0;

/// What to do with a matched slot's stored record this tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateDecision {
    /// Overwrite the stored record and write new pixels.
    pub capture: bool,
    /// Restart the decision window at the current tick.
    pub reset_window: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ModePolicy<'a> {
    mode: CaptureMode,
    cfg: &'a CaptureConfig,
}

impl<'a> ModePolicy<'a> {
    pub fn new(mode: CaptureMode, cfg: &'a CaptureConfig) -> Self {
        Self { mode, cfg }
    }

    pub fn is_qualified(&self, candidate: f32, baseline: f32) -> bool {
        candidate >= self.cfg.thr_quality && candidate > baseline
    }

    /// Update rule for a slot matched this tick.
    pub fn update(
        &self,
        stored_quality: f32,
        output_count: u32,
        elapsed: u64,
        candidate: f32,
    ) -> UpdateDecision {
        let cfg = self.cfg;
        match self.mode {
            CaptureMode::Auto => {
                let timed_out = cfg.auto_time_limit != 0 && elapsed > cfg.auto_time_limit;
                if timed_out || stored_quality >= cfg.thr_quality_high {
                    return UpdateDecision::default();
                }
                let baseline = if stored_quality < cfg.thr_quality {
                    0.0
                } else {
                    (stored_quality + cfg.update_step).min(cfg.thr_quality_high)
                };
                UpdateDecision {
                    capture: self.is_qualified(candidate, baseline),
                    reset_window: false,
                }
            }
            CaptureMode::Fast => {
                if output_count >= cfg.fast_capture_cap {
                    return UpdateDecision::default();
                }
                self.interval_update(stored_quality, elapsed, candidate, cfg.fast_interval)
            }
            CaptureMode::Cycle => {
                self.interval_update(stored_quality, elapsed, candidate, cfg.cycle_interval)
            }
        }
    }

    // Inside the window only improvements are taken; once the window has
    // elapsed the current observation is forced in and the window restarts,
    // whether or not it qualifies.
    fn interval_update(
        &self,
        stored_quality: f32,
        elapsed: u64,
        candidate: f32,
        interval: u64,
    ) -> UpdateDecision {
        if elapsed >= interval {
            return UpdateDecision {
                capture: true,
                reset_window: true,
            };
        }
        let baseline = if stored_quality < self.cfg.thr_quality {
            ANY_QUALIFYING
        } else {
            (stored_quality + self.cfg.update_step).min(1.0)
        };
        UpdateDecision {
            capture: self.is_qualified(candidate, baseline),
            reset_window: false,
        }
    }

    /// Finalize rule for a matched slot, evaluated after `update` was applied.
    ///
    /// `elapsed` is measured against the window as it was before any reset
    /// this tick.
    pub fn should_emit(&self, stored_quality: f32, output_count: u32, elapsed: u64) -> bool {
        let cfg = self.cfg;
        let qualified = self.is_qualified(stored_quality, ANY_QUALIFYING);
        match self.mode {
            CaptureMode::Auto => {
                let first = cfg.auto_fast_capture && output_count < 1 && elapsed >= cfg.fast_interval;
                let time_up = cfg.auto_time_limit != 0 && elapsed == cfg.auto_time_limit;
                qualified && (first || time_up)
            }
            CaptureMode::Fast => {
                qualified
                    && output_count < cfg.fast_capture_cap
                    && elapsed.wrapping_add(1) == cfg.fast_interval
            }
            CaptureMode::Cycle => qualified && elapsed.wrapping_add(1) == cfg.cycle_interval,
        }
    }

    /// Last finalize attempt for a slot being evicted.
    ///
    /// FAST and CYCLE only emit here if the target never produced output, so
    /// every qualified target is reported at least once.
    pub fn should_emit_on_evict(&self, stored_quality: f32, output_count: u32) -> bool {
        let qualified = self.is_qualified(stored_quality, ANY_QUALIFYING);
        match self.mode {
            CaptureMode::Auto => qualified,
            CaptureMode::Fast | CaptureMode::Cycle => qualified && output_count == 0,
        }
    }
}
