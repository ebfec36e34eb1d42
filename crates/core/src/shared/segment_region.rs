use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::error::ValidationError;
use crate::shared::math::polygon_area;

/// Canonical container a plant region sits in.
///
/// Raw model labels are mapped through [`LABEL_TABLE`]; anything not listed
/// is carried as `Unrecognized` so it can still be counted and reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Plug,
    Box,
    Segment,
    Unrecognized(String),
}

/// Raw segmentation labels (lowercase) and the container each maps to.
static LABEL_TABLE: &[(&str, ContainerType)] = &[
    ("plug", ContainerType::Plug),
    ("plugs", ContainerType::Plug),
    ("plug_tray", ContainerType::Plug),
    ("plug tray", ContainerType::Plug),
    ("box", ContainerType::Box),
    ("boxes", ContainerType::Box),
    ("crate", ContainerType::Box),
    ("segment", ContainerType::Segment),
    ("segments", ContainerType::Segment),
    ("bed", ContainerType::Segment),
    ("bed_segment", ContainerType::Segment),
];

impl ContainerType {
    /// Map a raw model label to its canonical container.
    pub fn from_label(label: &str) -> ContainerType {
        let key = label.trim().to_lowercase();
        match LABEL_TABLE.iter().find(|(raw, _)| *raw == key) {
            Some((_, container)) => container.clone(),
            None => {
                log::warn!("Unrecognized container label '{label}', passing through");
                ContainerType::Unrecognized(label.to_string())
            }
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ContainerType::Unrecognized(_))
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::Plug => write!(f, "plug"),
            ContainerType::Box => write!(f, "box"),
            ContainerType::Segment => write!(f, "segment"),
            ContainerType::Unrecognized(label) => write!(f, "unrecognized({label})"),
        }
    }
}

/// A container found by segmentation. Geometry is normalized to `[0, 1]`
/// relative to the full photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRegion {
    pub container_type: ContainerType,
    pub confidence: f64,
    pub bbox: [f64; 4],
    pub polygon: Vec<(f64, f64)>,
    pub area_px: f64,
}

impl SegmentRegion {
    pub fn new(
        container_type: ContainerType,
        confidence: f64,
        bbox: [f64; 4],
        polygon: Vec<(f64, f64)>,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, ValidationError> {
        if polygon.len() < 3 {
            return Err(ValidationError(format!(
                "segment polygon needs at least 3 points, got {}",
                polygon.len()
            )));
        }
        let bbox = bbox.map(|v| v.clamp(0.0, 1.0));
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            return Err(ValidationError(format!("degenerate segment bbox {bbox:?}")));
        }
        let polygon: Vec<(f64, f64)> = polygon
            .into_iter()
            .map(|(x, y)| (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
            .collect();
        let area_px = polygon_area(&polygon) * image_width as f64 * image_height as f64;
        Ok(Self {
            container_type,
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            polygon,
            area_px,
        })
    }

    /// Pixel rectangle `(x, y, w, h)` enclosing the bbox in a photo of the
    /// given size. Always at least one pixel.
    pub fn pixel_bounds(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let w = image_width as f64;
        let h = image_height as f64;
        let x1 = (self.bbox[0] * w).floor() as u32;
        let y1 = (self.bbox[1] * h).floor() as u32;
        let x2 = ((self.bbox[2] * w).ceil() as u32).min(image_width).max(x1 + 1);
        let y2 = ((self.bbox[3] * h).ceil() as u32).min(image_height).max(y1 + 1);
        (x1, y1, x2 - x1, y2 - y1)
    }

    /// Polygon in pixel coordinates relative to `(origin_x, origin_y)`.
    pub fn polygon_in_pixels(
        &self,
        image_width: u32,
        image_height: u32,
        origin_x: u32,
        origin_y: u32,
    ) -> Vec<(f64, f64)> {
        self.polygon
            .iter()
            .map(|&(x, y)| {
                (
                    x * image_width as f64 - origin_x as f64,
                    y * image_height as f64 - origin_y as f64,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn square() -> Vec<(f64, f64)> {
        vec![(0.25, 0.25), (0.75, 0.25), (0.75, 0.75), (0.25, 0.75)]
    }

    #[rstest]
    #[case("plug", ContainerType::Plug)]
    #[case("Plug_Tray", ContainerType::Plug)]
    #[case("crate", ContainerType::Box)]
    #[case(" BOX ", ContainerType::Box)]
    #[case("bed_segment", ContainerType::Segment)]
    fn test_known_labels_map_to_canonical(#[case] label: &str, #[case] expected: ContainerType) {
        assert_eq!(ContainerType::from_label(label), expected);
    }

    #[test]
    fn test_unknown_label_passes_through() {
        let t = ContainerType::from_label("pallet");
        assert_eq!(t, ContainerType::Unrecognized("pallet".into()));
        assert!(!t.is_recognized());
    }

    #[test]
    fn test_area_px_from_polygon() {
        let r = SegmentRegion::new(
            ContainerType::Box,
            0.9,
            [0.25, 0.25, 0.75, 0.75],
            square(),
            200,
            100,
        )
        .unwrap();
        assert_relative_eq!(r.area_px, 0.25 * 200.0 * 100.0);
    }

    #[test]
    fn test_polygon_with_two_points_is_rejected() {
        let err = SegmentRegion::new(
            ContainerType::Box,
            0.9,
            [0.0, 0.0, 1.0, 1.0],
            vec![(0.0, 0.0), (1.0, 1.0)],
            10,
            10,
        )
        .unwrap_err();
        assert!(err.0.contains("at least 3 points"));
    }

    #[test]
    fn test_degenerate_bbox_is_rejected() {
        assert!(SegmentRegion::new(
            ContainerType::Box,
            0.9,
            [0.5, 0.1, 0.5, 0.9],
            square(),
            10,
            10
        )
        .is_err());
    }

    #[test]
    fn test_pixel_bounds_and_relative_polygon() {
        let r = SegmentRegion::new(
            ContainerType::Plug,
            0.5,
            [0.25, 0.25, 0.75, 0.75],
            square(),
            200,
            100,
        )
        .unwrap();
        assert_eq!(r.pixel_bounds(200, 100), (50, 25, 100, 50));
        let poly = r.polygon_in_pixels(200, 100, 50, 25);
        assert_eq!(poly[0], (0.0, 0.0));
        assert_eq!(poly[2], (100.0, 50.0));
    }

    #[test]
    fn test_container_type_serializes_snake_case() {
        let json = serde_json::to_string(&ContainerType::Plug).unwrap();
        assert_eq!(json, "\"plug\"");
    }
}
