use serde::{Deserialize, Serialize};

use super::TargetKind;
use crate::frame::BBox;

const DEFAULT_POSE_LIMIT: f32 = 0.5;
const DEFAULT_MIN_FACE_AREA: f32 = 25.0 * 25.0;
const FACE_UPDATE_STEP: f32 = 0.1;

/// Head pose, normalized so that 1.0 is a full profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceMetadata {
    /// Output of the face-quality model.
    pub face_quality: f32,
    pub pose: HeadPose,
    /// Detector confidence.
    pub confidence: f32,
}

/// Face capture: quality is the face-quality score, gated on pose and size.
#[derive(Clone, Debug)]
pub struct FaceTarget {
    pub max_yaw: f32,
    pub max_pitch: f32,
    pub max_roll: f32,
    pub min_area: f32,
}

impl Default for FaceTarget {
    fn default() -> Self {
        Self {
            max_yaw: DEFAULT_POSE_LIMIT,
            max_pitch: DEFAULT_POSE_LIMIT,
            max_roll: DEFAULT_POSE_LIMIT,
            min_area: DEFAULT_MIN_FACE_AREA,
        }
    }
}

impl TargetKind for FaceTarget {
    type Metadata = FaceMetadata;

    fn name(&self) -> &'static str {
        "face"
    }

    fn update_step(&self) -> f32 {
        FACE_UPDATE_STEP
    }

    fn assess(&self, bbox: &BBox, metadata: &FaceMetadata) -> Option<f32> {
        if !bbox.is_finite() || !metadata.face_quality.is_finite() {
            return None;
        }
        if bbox.area() < self.min_area {
            return None;
        }
        let pose = metadata.pose;
        if pose.yaw.abs() >= self.max_yaw
            || pose.pitch.abs() >= self.max_pitch
            || pose.roll.abs() >= self.max_roll
        {
            return None;
        }
        Some(metadata.face_quality.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(quality: f32, yaw: f32) -> FaceMetadata {
        FaceMetadata {
            face_quality: quality,
            pose: HeadPose {
                yaw,
                pitch: 0.1,
                roll: 0.0,
            },
            confidence: 0.9,
        }
    }

    #[test]
    fn frontal_face_keeps_model_quality() {
        let kind = FaceTarget::default();
        let bbox = BBox::new(0.0, 0.0, 60.0, 60.0);
        assert_eq!(kind.assess(&bbox, &face(0.8, 0.1)), Some(0.8));
        assert_eq!(kind.assess(&bbox, &face(1.4, -0.2)), Some(1.0));
    }

    #[test]
    fn extreme_pose_or_tiny_face_is_skipped() {
        let kind = FaceTarget::default();
        let bbox = BBox::new(0.0, 0.0, 60.0, 60.0);
        assert_eq!(kind.assess(&bbox, &face(0.9, -0.7)), None);
        let tiny = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(kind.assess(&tiny, &face(0.9, 0.0)), None);
    }
}
