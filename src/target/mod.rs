//! Target kinds and per-tick observations.
//!
//! A `TargetKind` supplies the two things that differ between face, person
//! and vehicle capture: the metadata carried with each snapshot and the
//! quality function that scores an observation.

mod face;
mod object;

pub use face::{FaceMetadata, FaceTarget, HeadPose};
pub use object::{AreaQuality, ObjectClass, ObjectMetadata, PersonTarget, VehicleTarget};

use crate::frame::BBox;

/// Per-kind quality policy and metadata shape.
pub trait TargetKind {
    /// Payload copied verbatim into a slot on every accepted capture.
    type Metadata: Clone + std::fmt::Debug;

    fn name(&self) -> &'static str;

    /// Minimum quality gain that justifies overwriting a stored crop.
    fn update_step(&self) -> f32;

    /// Score one observation in `[0, 1]`, or `None` to skip it this tick
    /// (too small, extreme pose, wrong class).
    fn assess(&self, bbox: &BBox, metadata: &Self::Metadata) -> Option<f32>;
}

/// One frame's tracker output for a single stable track.
///
/// Callers pass only observations whose tracker state is stable.
#[derive(Clone, Debug)]
pub struct Observation<M> {
    pub track_id: u64,
    pub bbox: BBox,
    /// `None` makes the engine treat the track as absent this tick.
    pub quality: Option<f32>,
    pub metadata: M,
}

impl<M> Observation<M> {
    pub fn new(track_id: u64, bbox: BBox, quality: Option<f32>, metadata: M) -> Self {
        Self {
            track_id,
            bbox,
            quality,
            metadata,
        }
    }

    /// Build an observation scored by `kind`.
    pub fn assess<K>(kind: &K, track_id: u64, bbox: BBox, metadata: M) -> Self
    where
        K: TargetKind<Metadata = M>,
    {
        let quality = kind.assess(&bbox, &metadata);
        Self::new(track_id, bbox, quality, metadata)
    }
}
