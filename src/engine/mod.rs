//! Per-tick capture orchestration.
//!
//! One `run_tick` call processes one frame:
//!
//! 1. cleanup: slots evicted last tick return to `Idle`, ready flags clear;
//! 2. match: observations bind to alive slots or claim idle ones;
//! 3. eviction: alive slots left unmatched age, and expire past the miss limit;
//! 4. decide: matched slots run the mode's update and finalize rules;
//! 5. write: pending captures are admitted against the budget and cropped;
//! 6. the tick clock advances.
//!
//! Eviction only ever looks at slots the current tick did not bind, so a
//! target observed this tick is never expired by it.

pub mod budget;
pub mod matcher;
pub mod policy;
pub mod slot;

use anyhow::Result;

use crate::config::{CaptureConfig, CaptureMode, EngineSettings};
use crate::crop::{Cropper, PixelCropper};
use crate::error::CaptureError;
use crate::frame::{BBox, CropBuffer};
use crate::target::{Observation, TargetKind};

use matcher::MatchResolver;
use policy::ModePolicy;
use slot::{CaptureSlot, SlotPool, SlotState};

/// Outcome of one `run_tick`.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Clock value the tick ran at.
    pub tick: u64,
    /// Slots whose snapshot is ready for hand-off, in slot order.
    pub ready: Vec<usize>,
    /// New tracks turned away because the pool was full, one
    /// `PoolExhausted` each.
    pub dropped: Vec<CaptureError>,
    /// Crop writes refused by the budget or the cropper.
    pub rejected: Vec<CaptureError>,
}

/// Borrowed view of a ready snapshot.
#[derive(Debug)]
pub struct CapturedTarget<'a, M> {
    pub slot: usize,
    pub track_id: u64,
    pub quality: f32,
    pub bbox: BBox,
    pub metadata: &'a M,
    pub crop: &'a CropBuffer,
    /// Emissions so far, this one included.
    pub output_count: u32,
}

impl<'a, M> CapturedTarget<'a, M> {
    fn from_slot(index: usize, slot: &'a CaptureSlot<M>) -> Option<Self> {
        Some(Self {
            slot: index,
            track_id: slot.track_id,
            quality: slot.quality,
            bbox: slot.bbox,
            metadata: slot.metadata.as_ref()?,
            crop: slot.crop.as_ref()?,
            output_count: slot.output_count,
        })
    }
}

/// Snapshot handed out by `reset`, owning its pixels.
#[derive(Debug)]
pub struct ExportedTarget<M> {
    pub slot: usize,
    pub track_id: u64,
    pub quality: f32,
    pub bbox: BBox,
    pub metadata: M,
    pub crop: CropBuffer,
    pub output_count: u32,
}

pub struct CaptureEngine<K: TargetKind, C: Cropper> {
    kind: K,
    cropper: C,
    pool: SlotPool<K::Metadata>,
    mode: CaptureMode,
    config: CaptureConfig,
    resolver: MatchResolver,
    clock: u64,
}

impl<K: TargetKind> CaptureEngine<K, PixelCropper> {
    /// Engine with the software cropper configured from `settings`.
    pub fn with_pixel_cropper(kind: K, settings: &EngineSettings) -> Result<Self> {
        Self::new(kind, PixelCropper::new(settings.store_rgb), settings)
    }
}

impl<K: TargetKind, C: Cropper> CaptureEngine<K, C> {
    pub fn new(kind: K, cropper: C, settings: &EngineSettings) -> Result<Self> {
        settings.validate()?;
        log::info!("{} capture engine: {}", kind.name(), settings.summary());
        Ok(Self {
            pool: SlotPool::new(settings.pool_size, settings.memory_limit),
            mode: settings.mode,
            config: settings.capture.clone(),
            resolver: MatchResolver,
            clock: 0,
            kind,
            cropper,
        })
    }

    // ---- Tick ----

    /// Process one frame's observations.
    ///
    /// Fails only with `InvalidArgument` when the active config does not
    /// validate; in that case no slot is touched and the clock holds.
    pub fn run_tick(
        &mut self,
        observations: &[Observation<K::Metadata>],
        frame: &C::Frame,
    ) -> Result<TickResult> {
        self.config.validate()?;
        let now = self.clock;
        let config = self.config.clone();
        let policy = ModePolicy::new(self.mode, &config);

        self.clean_up()?;

        let resolution = self.resolver.resolve(&mut self.pool, observations, now);
        let matched = resolution.matched(self.pool.len());

        self.evict_unmatched(&matched, &policy);

        for binding in &resolution.bindings {
            let obs = &observations[binding.observation];
            let Some(quality) = obs.quality else {
                continue;
            };
            let Some(slot) = self.pool.get_mut(binding.slot) else {
                continue;
            };
            if binding.allocated {
                slot.store(quality, obs.bbox, obs.metadata.clone());
                log::debug!(
                    "tick {}: track {} -> slot {} (quality {:.3})",
                    now,
                    obs.track_id,
                    binding.slot,
                    quality
                );
                continue;
            }

            slot.miss_counter = 0;
            let elapsed = now.wrapping_sub(slot.window_start);
            let decision = policy.update(slot.quality, slot.output_count, elapsed, quality);
            if decision.capture {
                slot.store(quality, obs.bbox, obs.metadata.clone());
            }
            if decision.reset_window {
                slot.window_start = now;
            }
            if policy.should_emit(slot.quality, slot.output_count, elapsed) {
                slot.ready = true;
                slot.output_count = slot.output_count.saturating_add(1);
                log::debug!(
                    "tick {}: slot {} ready (track {}, quality {:.3}, output #{})",
                    now,
                    binding.slot,
                    slot.track_id,
                    slot.quality,
                    slot.output_count
                );
            }
        }

        let rejected = self.write_pending(frame);

        let ready = self
            .pool
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.ready)
            .map(|(index, _)| index)
            .collect();
        self.clock = self.clock.wrapping_add(1);

        Ok(TickResult {
            tick: now,
            ready,
            dropped: resolution.dropped,
            rejected,
        })
    }

    fn clean_up(&mut self) -> Result<()> {
        for index in 0..self.pool.len() {
            let state = match self.pool.get_mut(index) {
                Some(slot) => {
                    slot.ready = false;
                    slot.state
                }
                None => continue,
            };
            if state == SlotState::Miss {
                self.pool.free(index)?;
            }
        }
        Ok(())
    }

    fn evict_unmatched(&mut self, matched: &[bool], policy: &ModePolicy<'_>) {
        let threshold = self.config.eviction_threshold();
        for (index, slot) in self.pool.iter_mut().enumerate() {
            if slot.state != SlotState::Alive || matched.get(index).copied().unwrap_or(false) {
                continue;
            }
            slot.miss_counter = slot.miss_counter.saturating_add(1);
            if slot.miss_counter <= threshold {
                continue;
            }
            slot.state = SlotState::Miss;
            if policy.should_emit_on_evict(slot.quality, slot.output_count) {
                slot.ready = true;
                slot.output_count = slot.output_count.saturating_add(1);
            }
            log::debug!(
                "tick {}: track {} lost, slot {} evicted (ready={})",
                self.clock,
                slot.track_id,
                index,
                slot.ready
            );
        }
    }

    fn write_pending(&mut self, frame: &C::Frame) -> Vec<CaptureError> {
        let mut rejected = Vec::new();
        for index in 0..self.pool.len() {
            let (first_write, bbox) = match self.pool.get(index) {
                Some(slot) if slot.pending_capture => (slot.crop.is_none(), slot.bbox),
                _ => continue,
            };
            if let Err(err) = self.write_crop(index, frame, &bbox) {
                log::warn!("{}", err);
                if first_write {
                    // A slot that never held pixels goes back to the pool.
                    self.pool.roll_back(index);
                }
                rejected.push(err);
            }
            if let Some(slot) = self.pool.get_mut(index) {
                slot.pending_capture = false;
            }
        }
        rejected
    }

    fn write_crop(
        &mut self,
        index: usize,
        frame: &C::Frame,
        bbox: &BBox,
    ) -> Result<(), CaptureError> {
        let crop_failed = |err: anyhow::Error| CaptureError::CropFailed {
            slot: index,
            reason: err.to_string(),
        };

        let estimate = self.cropper.estimate_len(frame, bbox).map_err(crop_failed)?;
        self.check_budget(index, estimate)?;
        let crop = self.cropper.crop(frame, bbox).map_err(crop_failed)?;
        // The cropper may produce more than it estimated.
        self.check_budget(index, crop.byte_len())?;
        self.pool.install_crop(index, crop);
        Ok(())
    }

    fn check_budget(&self, index: usize, requested: usize) -> Result<(), CaptureError> {
        if self.pool.admit(index, requested) {
            return Ok(());
        }
        Err(CaptureError::InsufficientMemory {
            slot: index,
            requested,
            available: self.pool.available_for(index),
        })
    }

    // ---- Control ----

    /// Takes effect on the next tick. Slot windows are not restarted.
    pub fn set_mode(&mut self, mode: CaptureMode) {
        if mode != self.mode {
            log::info!("capture mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }

    /// Replace the thresholds. An invalid config is accepted here and
    /// reported by the next `run_tick`.
    pub fn set_config(&mut self, config: CaptureConfig) {
        self.config = config;
    }

    /// Release every slot. Alive slots get a last finalize attempt; those
    /// that qualify are returned with ownership of their crop.
    pub fn reset(&mut self) -> Vec<ExportedTarget<K::Metadata>> {
        let config = self.config.clone();
        let policy = ModePolicy::new(self.mode, &config);
        let mut exported = Vec::new();
        let mut released = 0usize;

        for index in 0..self.pool.len() {
            let Some(state) = self.pool.get(index).map(CaptureSlot::state) else {
                continue;
            };
            let Some(old) = self.pool.release(index) else {
                continue;
            };
            if state == SlotState::Idle {
                continue;
            }
            released += 1;
            if state != SlotState::Alive
                || !policy.should_emit_on_evict(old.quality, old.output_count)
            {
                continue;
            }
            if let (Some(metadata), Some(crop)) = (old.metadata, old.crop) {
                exported.push(ExportedTarget {
                    slot: index,
                    track_id: old.track_id,
                    quality: old.quality,
                    bbox: old.bbox,
                    metadata,
                    crop,
                    output_count: old.output_count.saturating_add(1),
                });
            }
        }

        log::info!(
            "capture engine reset: {} slots released, {} targets exported",
            released,
            exported.len()
        );
        exported
    }

    /// Hand off a ready snapshot, clearing its ready flag.
    pub fn consume(&mut self, index: usize) -> Option<CapturedTarget<'_, K::Metadata>> {
        let slot = self.pool.get_mut(index)?;
        if !slot.ready {
            return None;
        }
        slot.ready = false;
        let slot: &CaptureSlot<K::Metadata> = slot;
        CapturedTarget::from_slot(index, slot)
    }

    /// Ready snapshots, without clearing their flags.
    pub fn ready_targets(&self) -> impl Iterator<Item = CapturedTarget<'_, K::Metadata>> {
        self.pool
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.ready)
            .filter_map(|(index, slot)| CapturedTarget::from_slot(index, slot))
    }

    // ---- Inspection ----

    pub fn slots(&self) -> impl Iterator<Item = &CaptureSlot<K::Metadata>> {
        self.pool.iter()
    }

    pub fn slot(&self, index: usize) -> Option<&CaptureSlot<K::Metadata>> {
        self.pool.get(index)
    }

    pub fn pool(&self) -> &SlotPool<K::Metadata> {
        &self.pool
    }

    pub fn alive_count(&self) -> usize {
        self.pool
            .iter()
            .filter(|slot| slot.state == SlotState::Alive)
            .count()
    }

    pub fn mem_used(&self) -> usize {
        self.pool.mem_used()
    }

    pub fn memory_limit(&self) -> usize {
        self.pool.budget().limit()
    }

    /// Clock value the next tick will run at.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, PixelFormat};

    struct Plain;

    impl TargetKind for Plain {
        type Metadata = u32;

        fn name(&self) -> &'static str {
            "plain"
        }

        fn update_step(&self) -> f32 {
            0.1
        }

        fn assess(&self, _bbox: &BBox, _metadata: &u32) -> Option<f32> {
            Some(1.0)
        }
    }

    fn settings(mode: CaptureMode) -> EngineSettings {
        EngineSettings {
            pool_size: 2,
            memory_limit: 4096,
            mode,
            store_rgb: false,
            capture: CaptureConfig {
                thr_quality: 0.5,
                thr_quality_high: 0.95,
                miss_time_limit: 2,
                fast_interval: 3,
                fast_capture_cap: 5,
                cycle_interval: 3,
                ..CaptureConfig::default()
            },
        }
    }

    fn frame() -> Frame {
        Frame::filled(32, 32, PixelFormat::Rgb24, 9).unwrap()
    }

    fn seen(track_id: u64, quality: f32) -> Observation<u32> {
        Observation::new(track_id, BBox::new(0.0, 0.0, 3.0, 3.0), Some(quality), 1)
    }

    #[test]
    fn invalid_config_fails_without_touching_state() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Auto)).unwrap();
        engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        engine.set_config(CaptureConfig {
            fast_interval: 0,
            ..CaptureConfig::default()
        });

        let err = engine.run_tick(&[], &frame()).unwrap_err();
        let typed = err.downcast_ref::<CaptureError>().unwrap();
        assert_eq!(typed.code(), "CAPTURE_INVALID_ARGUMENT");
        assert_eq!(engine.clock(), 1);
        assert_eq!(engine.alive_count(), 1);
        assert_eq!(engine.slot(0).unwrap().miss_counter(), 0);
    }

    #[test]
    fn new_rejects_empty_pool() {
        let bad = EngineSettings {
            pool_size: 0,
            ..settings(CaptureMode::Auto)
        };
        assert!(CaptureEngine::with_pixel_cropper(Plain, &bad).is_err());
    }

    #[test]
    fn first_sighting_writes_crop() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Auto)).unwrap();
        let result = engine.run_tick(&[seen(4, 0.7)], &frame()).unwrap();
        assert_eq!(result.tick, 0);
        assert!(result.ready.is_empty());
        let slot = engine.slot(0).unwrap();
        assert_eq!(slot.state(), SlotState::Alive);
        assert_eq!(slot.track_id(), 4);
        assert!(!slot.is_pending_capture());
        assert_eq!(slot.crop_len(), 4 * 4 * 3);
        assert_eq!(engine.mem_used(), 48);
    }

    #[test]
    fn consume_clears_ready_flag() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Cycle)).unwrap();
        for _ in 0..2 {
            engine.run_tick(&[seen(4, 0.7)], &frame()).unwrap();
        }
        let ready = engine.run_tick(&[seen(4, 0.7)], &frame()).unwrap().ready;
        assert_eq!(ready, vec![0]);
        assert_eq!(engine.ready_targets().count(), 1);

        let target = engine.consume(0).unwrap();
        assert_eq!(target.track_id, 4);
        assert_eq!(*target.metadata, 1);
        assert_eq!(target.crop.byte_len(), 48);
        assert!(engine.consume(0).is_none());
        assert_eq!(engine.ready_targets().count(), 0);
    }

    #[test]
    fn mode_switch_applies_next_tick() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Auto)).unwrap();
        engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        engine.set_mode(CaptureMode::Cycle);
        // Window opened at tick 0; CYCLE emits at elapsed == cycle_interval - 1.
        let result = engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        assert_eq!(result.ready, vec![0]);
    }

    #[test]
    fn clock_wraps_without_breaking_windows() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Fast)).unwrap();
        engine.clock = u64::MAX - 2;

        let start = engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        assert_eq!(start.tick, u64::MAX - 2);
        assert!(engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap().ready.is_empty());
        let emit = engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        assert_eq!(emit.tick, u64::MAX);
        assert_eq!(emit.ready, vec![0]);

        // Three ticks after the window opened, the capture is forced and the
        // window restarts at the wrapped clock.
        let wrapped = engine.run_tick(&[seen(1, 0.8)], &frame()).unwrap();
        assert_eq!(wrapped.tick, 0);
        assert_eq!(engine.slot(0).unwrap().window_start(), 0);
        assert_eq!(engine.clock(), 1);
    }

    #[test]
    fn reset_exports_qualified_alive_targets() {
        let mut engine =
            CaptureEngine::with_pixel_cropper(Plain, &settings(CaptureMode::Auto)).unwrap();
        engine
            .run_tick(&[seen(1, 0.8), seen(2, 0.3)], &frame())
            .unwrap();
        assert_eq!(engine.mem_used(), 96);

        let exported = engine.reset();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].track_id, 1);
        assert_eq!(exported[0].crop.byte_len(), 48);
        assert_eq!(engine.mem_used(), 0);
        assert!(engine.slots().all(|slot| slot.state() == SlotState::Idle));
    }
}
