//! Property-based tests for the geometric heuristics.

use pcbtrace::config::SlicingConfig;
use pcbtrace::detection::reproject;
use pcbtrace::prelude::*;
use pcbtrace::{BinaryTrackMask, ConnectivityAnalyzer, NmsReducer, TileSlicer};
use proptest::prelude::*;

fn bbox_strategy() -> impl Strategy<Value = BoundingBox> {
    (0.0f64..500.0, 0.0f64..500.0, 1.0f64..120.0, 1.0f64..120.0)
        .prop_map(|(x, y, w, h)| BoundingBox::new(x, y, w, h))
}

fn detections_strategy() -> impl Strategy<Value = Vec<Detection>> {
    prop::collection::vec((bbox_strategy(), 0.0f64..1.0), 0..40).prop_map(|items| {
        items
            .into_iter()
            .map(|(bbox, confidence)| Detection::new("Part", confidence, bbox))
            .collect()
    })
}

/// Every tile lies inside the image, and tiles are full size along any
/// axis longer than the tile size. Shorter axes get strips of at most the
/// image extent. Corners and the centre are covered.
fn check_tile_plan(width: u32, height: u32) -> Result<(), TestCaseError> {
    let config = SlicingConfig::default();
    let tiles = TileSlicer::plan(width, height, &config);
    prop_assert!(!tiles.is_empty());
    for t in &tiles {
        prop_assert!(t.right <= width && t.bottom <= height);
        prop_assert!(t.left < t.right && t.top < t.bottom);
        if tiles.len() > 1 {
            if width > config.tile_size {
                prop_assert_eq!(t.width(), config.tile_size);
            }
            if height > config.tile_size {
                prop_assert_eq!(t.height(), config.tile_size);
            }
        }
    }
    for (px, py) in [(0, 0), (width - 1, 0), (0, height - 1), (width - 1, height - 1), (width / 2, height / 2)] {
        prop_assert!(tiles.iter().any(|t| px >= t.left && px < t.right && py >= t.top && py < t.bottom));
    }
    Ok(())
}

#[test]
fn test_tile_plan_with_short_last_row() {
    check_tile_plan(801, 513).unwrap();
    let tiles = TileSlicer::plan(801, 513, &SlicingConfig::default());
    assert!(tiles.len() > 1);
    assert!(tiles.iter().any(|t| t.height() < 640));
}

proptest! {
    #[test]
    fn proptest_iou_symmetric_and_bounded(a in bbox_strategy(), b in bbox_strategy()) {
        let ab = a.iou(&b);
        prop_assert_eq!(ab, b.iou(&a));
        prop_assert!((0.0..=1.0).contains(&ab));
        prop_assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn proptest_nms_idempotent(detections in detections_strategy()) {
        let reducer = NmsReducer::default();
        let once = reducer.reduce(detections);
        let twice = reducer.reduce(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn proptest_nms_survivors_do_not_overlap(detections in detections_strategy()) {
        let reducer = NmsReducer::default();
        let kept = reducer.reduce(detections);
        for (i, a) in kept.iter().enumerate() {
            prop_assert!(a.confidence >= reducer.confidence_threshold);
            for b in &kept[i + 1..] {
                prop_assert!(a.confidence >= b.confidence);
                prop_assert!(a.iou(b) < reducer.iou_threshold);
            }
        }
    }

    #[test]
    fn proptest_nms_confidence_monotonic(
        detections in detections_strategy(),
        low in 0.0f64..1.0,
        delta in 0.0f64..0.5,
    ) {
        let loose = NmsReducer::new(low, 0.4).reduce(detections.clone());
        let strict = NmsReducer::new(low + delta, 0.4).reduce(detections);
        prop_assert!(strict.len() <= loose.len());
    }

    #[test]
    fn proptest_reprojection_shifts_centre(
        x in 0.0f64..640.0,
        y in 0.0f64..640.0,
        left in 0u32..4000,
        top in 0u32..4000,
    ) {
        let raw = RawDetection::new("Diode", 0.5, x, y, 10.0, 6.0);
        let det = reproject(&raw, left, top);
        prop_assert_eq!(det.bbox.x, x + left as f64);
        prop_assert_eq!(det.bbox.y, y + top as f64);
        prop_assert_eq!((det.bbox.width, det.bbox.height), (10.0, 6.0));
    }

    #[test]
    fn proptest_tile_plan_covers_image(width in 1u32..3000, height in 1u32..3000) {
        check_tile_plan(width, height)?;
    }

    #[test]
    fn proptest_connectivity_symmetric(
        a in bbox_strategy(),
        b in bbox_strategy(),
        stripe in 1u32..40,
    ) {
        let mask = BinaryTrackMask::from_fn(500, 500, |x, y| (x / stripe + y / stripe) % 2 == 0);
        let analyzer = ConnectivityAnalyzer::default();
        let ca = Component::new("A", "Resistor", a);
        let cb = Component::new("B", "Resistor", b);
        prop_assert_eq!(analyzer.connected(&ca, &cb, &mask), analyzer.connected(&cb, &ca, &mask));
    }
}
