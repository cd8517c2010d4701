use serde::{Deserialize, Serialize};

use super::TargetKind;
use crate::frame::BBox;

const OBJECT_UPDATE_STEP: f32 = 0.05;
const FULL_HD_AREA: f32 = 1920.0 * 1080.0;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub class: ObjectClass,
    /// Detector confidence.
    pub confidence: f32,
}

/// Size-and-shape quality shared by person and vehicle capture.
///
/// Score is `min(1, area / area_base)`; boxes outside the area or aspect
/// ratio (height / width) ranges are skipped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AreaQuality {
    pub area_base: f32,
    pub area_min: f32,
    pub area_max: f32,
    pub aspect_ratio_min: f32,
    pub aspect_ratio_max: f32,
}

impl AreaQuality {
    pub fn score(&self, bbox: &BBox) -> Option<f32> {
        if !bbox.is_finite() || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return None;
        }
        let aspect_ratio = bbox.aspect_ratio();
        if aspect_ratio < self.aspect_ratio_min || aspect_ratio > self.aspect_ratio_max {
            return None;
        }
        let area = bbox.area();
        if area < self.area_min || area > self.area_max {
            return None;
        }
        Some((area / self.area_base).min(1.0))
    }
}

/// Person capture: upright boxes only.
#[derive(Clone, Debug)]
pub struct PersonTarget {
    pub quality: AreaQuality,
}

impl Default for PersonTarget {
    fn default() -> Self {
        Self {
            quality: AreaQuality {
                area_base: 128.0 * 128.0,
                area_min: 32.0 * 64.0,
                area_max: FULL_HD_AREA,
                aspect_ratio_min: 1.0,
                aspect_ratio_max: 4.0,
            },
        }
    }
}

impl TargetKind for PersonTarget {
    type Metadata = ObjectMetadata;

    fn name(&self) -> &'static str {
        "person"
    }

    fn update_step(&self) -> f32 {
        OBJECT_UPDATE_STEP
    }

    fn assess(&self, bbox: &BBox, metadata: &ObjectMetadata) -> Option<f32> {
        if metadata.class != ObjectClass::Person {
            return None;
        }
        self.quality.score(bbox)
    }
}

/// Vehicle capture: wide or square boxes.
#[derive(Clone, Debug)]
pub struct VehicleTarget {
    pub quality: AreaQuality,
}

impl Default for VehicleTarget {
    fn default() -> Self {
        Self {
            quality: AreaQuality {
                area_base: 128.0 * 128.0,
                area_min: 32.0 * 32.0,
                area_max: FULL_HD_AREA,
                aspect_ratio_min: 0.25,
                aspect_ratio_max: 2.0,
            },
        }
    }
}

impl TargetKind for VehicleTarget {
    type Metadata = ObjectMetadata;

    fn name(&self) -> &'static str {
        "vehicle"
    }

    fn update_step(&self) -> f32 {
        OBJECT_UPDATE_STEP
    }

    fn assess(&self, bbox: &BBox, metadata: &ObjectMetadata) -> Option<f32> {
        if metadata.class != ObjectClass::Vehicle {
            return None;
        }
        self.quality.score(bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(class: ObjectClass) -> ObjectMetadata {
        ObjectMetadata {
            class,
            confidence: 0.8,
        }
    }

    #[test]
    fn person_quality_grows_with_area_and_saturates() {
        let kind = PersonTarget::default();
        let small = BBox::new(0.0, 0.0, 40.0, 100.0);
        let large = BBox::new(0.0, 0.0, 200.0, 500.0);
        let q_small = kind.assess(&small, &meta(ObjectClass::Person)).unwrap();
        assert!((q_small - 4000.0 / 16384.0).abs() < 1e-6);
        assert_eq!(kind.assess(&large, &meta(ObjectClass::Person)), Some(1.0));
    }

    #[test]
    fn person_rejects_wrong_shape_or_class() {
        let kind = PersonTarget::default();
        let wide = BBox::new(0.0, 0.0, 200.0, 100.0);
        assert_eq!(kind.assess(&wide, &meta(ObjectClass::Person)), None);
        let upright = BBox::new(0.0, 0.0, 60.0, 150.0);
        assert_eq!(kind.assess(&upright, &meta(ObjectClass::Vehicle)), None);
    }

    #[test]
    fn vehicle_accepts_wide_boxes() {
        let kind = VehicleTarget::default();
        let wide = BBox::new(0.0, 0.0, 200.0, 100.0);
        assert_eq!(kind.assess(&wide, &meta(ObjectClass::Vehicle)), Some(1.0));
        let tall = BBox::new(0.0, 0.0, 40.0, 200.0);
        assert_eq!(kind.assess(&tall, &meta(ObjectClass::Vehicle)), None);
    }

    #[test]
    fn degenerate_box_is_skipped() {
        let quality = PersonTarget::default().quality;
        assert_eq!(quality.score(&BBox::new(5.0, 5.0, 5.0, 50.0)), None);
    }
}
