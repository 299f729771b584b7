//! Area-ratio filtering and schema normalization of raw boxes.

use vdet_models::{BoundingBox, Detection, RawBox};

use super::class_names::ClassNames;

/// Convert raw boxes into output detections.
///
/// A box is rejected when `area / frame_area > max_area_ratio`; a ratio
/// exactly equal to the limit is kept. Area uses the real-valued box size,
/// while the emitted coordinates are truncated toward zero. Survivors keep
/// the engine's order.
pub fn filter_detections(
    raw: &[RawBox],
    frame_width: u32,
    frame_height: u32,
    max_area_ratio: f64,
    names: &ClassNames,
) -> Vec<Detection> {
    let frame_area = f64::from(frame_width) * f64::from(frame_height);
    if frame_area <= 0.0 {
        return Vec::new();
    }

    raw.iter()
        .filter(|b| b.area() / frame_area <= max_area_ratio)
        .map(|b| Detection {
            bbox: BoundingBox {
                x: b.x1 as i32,
                y: b.y1 as i32,
                width: b.width() as i32,
                height: b.height() as i32,
            },
            confidence: b.confidence,
            class_name: names.resolve(b.class_id),
            class_id: b.class_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize) -> RawBox {
        RawBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id,
        }
    }

    #[test]
    fn test_boundary_ratio_is_kept() {
        let names = ClassNames::coco();
        // 60x100 in a 100x100 frame: ratio exactly 0.6
        let at_limit = raw(0.0, 0.0, 60.0, 100.0, 0);
        let out = filter_detections(&[at_limit], 100, 100, 0.6, &names);
        assert_eq!(out.len(), 1);

        // 61x100: ratio 0.61
        let over = raw(0.0, 0.0, 61.0, 100.0, 0);
        assert!(filter_detections(&[over], 100, 100, 0.6, &names).is_empty());
    }

    #[test]
    fn test_large_boxes_never_survive() {
        let names = ClassNames::coco();
        let boxes: Vec<RawBox> = (0..=100)
            .map(|w| raw(0.0, 0.0, w as f32, 100.0, 1))
            .collect();
        let out = filter_detections(&boxes, 100, 100, 0.6, &names);

        assert_eq!(out.len(), 61);
        assert!(out
            .iter()
            .all(|d| f64::from(d.bbox.width * d.bbox.height) / 10_000.0 <= 0.6));
    }

    #[test]
    fn test_truncation_and_real_area() {
        let names = ClassNames::coco();
        let b = raw(10.9, 20.2, 40.7, 60.9, 2);
        let out = filter_detections(&[b], 640, 480, 0.6, &names);
        let d = &out[0];

        assert_eq!(d.bbox, BoundingBox::new(10, 20, 29, 40));
        assert_eq!(d.class_name, "car");
        assert_eq!(d.class_id, 2);
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_area_uses_untruncated_size() {
        let names = ClassNames::coco();
        // 60.5 x 100 = 6050 > 6000 although the truncated width is 60
        let b = raw(0.0, 0.0, 60.5, 100.0, 0);
        assert!(filter_detections(&[b], 100, 100, 0.6, &names).is_empty());
    }

    #[test]
    fn test_order_is_preserved() {
        let names = ClassNames::from_list(["a", "b", "c"]);
        let boxes = vec![
            raw(5.0, 5.0, 10.0, 10.0, 2),
            raw(0.0, 0.0, 100.0, 100.0, 0),
            raw(1.0, 1.0, 3.0, 3.0, 1),
        ];
        let out = filter_detections(&boxes, 100, 100, 0.6, &names);
        let classes: Vec<&str> = out.iter().map(|d| d.class_name.as_str()).collect();
        assert_eq!(classes, vec!["c", "b"]);
    }

    #[test]
    fn test_empty_frame_rejects_everything() {
        let names = ClassNames::coco();
        assert!(filter_detections(&[raw(0.0, 0.0, 1.0, 1.0, 0)], 0, 10, 0.6, &names).is_empty());
    }
}
