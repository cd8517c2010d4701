//! Target Capture Engine
//!
//! Keeps the best-quality snapshot of every stable tracked target (face,
//! person, vehicle) in a fixed pool of slots, and decides per frame when a
//! snapshot is ready to be handed downstream.
//!
//! # Architecture
//!
//! Each processed frame is one *tick*. The engine:
//!
//! 1. **Binds** the tick's observations to slots by track id, claiming idle
//!    slots for new tracks; the pool never grows.
//! 2. **Evicts** targets unseen for longer than the miss limit.
//! 3. **Decides** per target, under the AUTO / FAST / CYCLE mode policy,
//!    whether to refresh the stored crop and whether it is ready to emit.
//! 4. **Writes** accepted crops, admitting each one against a global byte
//!    budget. A rejected write never breaks the tick.
//!
//! # Module Structure
//!
//! - `engine`: `CaptureEngine` plus slot pool, memory budget, matcher and policy
//! - `target`: target kinds and their quality functions
//! - `frame` / `crop`: pixel buffers and the cropping seam
//! - `config`: modes, thresholds and settings loading
//! - `error`: `CaptureError`

pub mod config;
pub mod crop;
pub mod engine;
pub mod error;
pub mod frame;
pub mod target;

pub use config::{CaptureConfig, CaptureMode, EngineSettings};
pub use crop::{Cropper, PixelCropper};
pub use engine::budget::MemoryBudget;
pub use engine::matcher::MatchResolver;
pub use engine::policy::ModePolicy;
pub use engine::slot::{CaptureSlot, SlotPool, SlotState};
pub use engine::{CaptureEngine, CapturedTarget, ExportedTarget, TickResult};
pub use error::CaptureError;
pub use frame::{BBox, CropBuffer, Frame, PixelFormat};
pub use target::{
    FaceMetadata, FaceTarget, HeadPose, ObjectClass, ObjectMetadata, Observation, PersonTarget,
    TargetKind, VehicleTarget,
};
