//! Fixed-size slot storage.
//!
//! Slot lifecycle: `Idle -> Alive` on allocation, `Alive -> Miss` on eviction,
//! `Miss -> Idle` on cleanup. A slot exclusively owns its crop, and every
//! path that drops or hands out a crop goes through `SlotPool::release` so
//! the budget stays in step.

use anyhow::Result;

use super::budget::MemoryBudget;
use crate::error::CaptureError;
use crate::frame::{BBox, CropBuffer};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    #[default]
    Idle,
    Alive,
    Miss,
}

/// Storage for one tracked target's best snapshot.
#[derive(Debug)]
pub struct CaptureSlot<M> {
    pub(crate) state: SlotState,
    pub(crate) track_id: u64,
    pub(crate) quality: f32,
    pub(crate) metadata: Option<M>,
    pub(crate) bbox: BBox,
    pub(crate) crop: Option<CropBuffer>,
    pub(crate) pending_capture: bool,
    pub(crate) miss_counter: u32,
    pub(crate) window_start: u64,
    pub(crate) output_count: u32,
    pub(crate) ready: bool,
}

impl<M> Default for CaptureSlot<M> {
    fn default() -> Self {
        Self {
            state: SlotState::Idle,
            track_id: 0,
            quality: 0.0,
            metadata: None,
            bbox: BBox::default(),
            crop: None,
            pending_capture: false,
            miss_counter: 0,
            window_start: 0,
            output_count: 0,
            ready: false,
        }
    }
}

impl<M> CaptureSlot<M> {
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Meaningful only while the slot is not `Idle`.
    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    /// Quality of the last accepted capture.
    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn metadata(&self) -> Option<&M> {
        self.metadata.as_ref()
    }

    /// Box the stored crop was (or will be) cut from.
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn crop(&self) -> Option<&CropBuffer> {
        self.crop.as_ref()
    }

    pub fn crop_len(&self) -> usize {
        self.crop.as_ref().map_or(0, CropBuffer::byte_len)
    }

    pub fn is_pending_capture(&self) -> bool {
        self.pending_capture
    }

    pub fn miss_counter(&self) -> u32 {
        self.miss_counter
    }

    pub fn window_start(&self) -> u64 {
        self.window_start
    }

    pub fn output_count(&self) -> u32 {
        self.output_count
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Record an accepted capture. Pixels are written later in the tick.
    pub(crate) fn store(&mut self, quality: f32, bbox: BBox, metadata: M) {
        self.quality = quality;
        self.bbox = bbox;
        self.metadata = Some(metadata);
        self.pending_capture = true;
    }
}

/// Fixed array of slots plus the memory they hold.
#[derive(Debug)]
pub struct SlotPool<M> {
    slots: Vec<CaptureSlot<M>>,
    budget: MemoryBudget,
}

impl<M> SlotPool<M> {
    pub fn new(size: usize, memory_limit: usize) -> Self {
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, CaptureSlot::default);
        Self {
            slots,
            budget: MemoryBudget::new(memory_limit),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CaptureSlot<M>> {
        self.slots.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut CaptureSlot<M>> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureSlot<M>> {
        self.slots.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CaptureSlot<M>> {
        self.slots.iter_mut()
    }

    pub fn budget(&self) -> &MemoryBudget {
        &self.budget
    }

    pub fn mem_used(&self) -> usize {
        self.budget.used()
    }

    /// Index of the alive slot bound to `track_id`.
    pub fn find(&self, track_id: u64) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.state == SlotState::Alive && slot.track_id == track_id)
    }

    /// Claim an idle slot for `track_id`, starting its decision window at `now`.
    ///
    /// Returns `None` when the pool is exhausted; the pool never grows.
    pub fn allocate(&mut self, track_id: u64, now: u64) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Idle && !slot.pending_capture)?;
        let slot = &mut self.slots[index];
        slot.state = SlotState::Alive;
        slot.track_id = track_id;
        slot.miss_counter = 0;
        slot.window_start = now;
        slot.output_count = 0;
        slot.ready = false;
        Some(index)
    }

    /// Return a `Miss` slot to `Idle`, releasing its crop.
    pub fn free(&mut self, index: usize) -> Result<()> {
        let state = self
            .slots
            .get(index)
            .map(CaptureSlot::state)
            .ok_or_else(|| CaptureError::invalid(format!("slot {} out of range", index)))?;
        if state != SlotState::Miss {
            return Err(CaptureError::invalid(format!(
                "slot {} must be in Miss state to be freed, found {:?}",
                index, state
            ))
            .into());
        }
        self.release(index);
        Ok(())
    }

    /// Reset a slot to `Idle` and hand back what it held. The crop's bytes
    /// are returned to the budget here, whoever ends up owning the buffer.
    pub(crate) fn release(&mut self, index: usize) -> Option<CaptureSlot<M>> {
        let slot = self.slots.get_mut(index)?;
        let old = std::mem::take(slot);
        self.budget.release(old.crop_len());
        Some(old)
    }

    /// Undo an allocation whose first write never happened.
    pub(crate) fn roll_back(&mut self, index: usize) {
        if let Some(old) = self.release(index) {
            debug_assert!(old.crop.is_none());
        }
    }

    /// Replace a slot's crop, keeping the memory counter in step.
    pub(crate) fn install_crop(&mut self, index: usize, crop: CropBuffer) {
        if let Some(slot) = self.slots.get_mut(index) {
            let old_len = slot.crop_len();
            self.budget.replace(old_len, crop.byte_len());
            slot.crop = Some(crop);
        }
    }

    /// Would a `new_len` crop fit in slot `index`?
    pub fn admit(&self, index: usize, new_len: usize) -> bool {
        let current = self.slots.get(index).map_or(0, CaptureSlot::crop_len);
        self.budget.admit(current, new_len)
    }

    pub fn available_for(&self, index: usize) -> usize {
        let current = self.slots.get(index).map_or(0, CaptureSlot::crop_len);
        self.budget.available_for(current)
    }
}
