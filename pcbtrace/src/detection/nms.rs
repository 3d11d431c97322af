//! Class-agnostic non-maximum suppression.

use std::cmp::Ordering;

use crate::config::NmsConfig;

use super::Detection;

/// Greedy NMS over full-image detections.
#[derive(Debug, Clone, Copy)]
pub struct NmsReducer {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
}

impl Default for NmsReducer {
    fn default() -> Self {
        Self::from_config(&NmsConfig::default())
    }
}

impl NmsReducer {
    pub fn new(confidence_threshold: f64, iou_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
        }
    }

    pub fn from_config(config: &NmsConfig) -> Self {
        Self::new(config.confidence_threshold, config.iou_threshold)
    }

    /// Keep the highest-confidence detection of every overlapping cluster.
    ///
    /// Detections below the confidence threshold are dropped first; the rest
    /// are visited by descending confidence (ties keep input order) and a
    /// candidate survives only if its IoU with every survivor is strictly
    /// below the IoU threshold.
    pub fn reduce(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let input_len = detections.len();

        let mut candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if kept
                .iter()
                .all(|k| k.iou(&candidate) < self.iou_threshold)
            {
                kept.push(candidate);
            }
        }

        tracing::debug!(
            "NMS reduced {} detections to {} (confidence>={}, IoU<{})",
            input_len,
            kept.len(),
            self.confidence_threshold,
            self.iou_threshold
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn det(confidence: f64, x: f64, y: f64, size: f64) -> Detection {
        Detection::new("Resistor", confidence, BoundingBox::new(x, y, size, size))
    }

    #[test]
    fn test_keeps_best_of_overlapping_cluster() {
        let input = vec![
            det(0.6, 102.0, 101.0, 50.0),
            det(0.9, 100.0, 100.0, 50.0),
            det(0.4, 98.0, 99.0, 50.0),
        ];
        let kept = NmsReducer::default().reduce(input);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_confidence_threshold_is_inclusive() {
        let input = vec![det(0.25, 0.0, 0.0, 10.0), det(0.2499, 100.0, 0.0, 10.0)];
        let kept = NmsReducer::new(0.25, 0.4).reduce(input);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.25);
    }

    #[test]
    fn test_iou_at_threshold_is_suppressed() {
        // Same size boxes shifted so that IoU is exactly 1/3.
        let a = det(0.9, 0.0, 0.0, 10.0);
        let b = det(0.8, 5.0, 0.0, 10.0);
        let iou = a.iou(&b);
        let kept = NmsReducer::new(0.0, iou).reduce(vec![a.clone(), b.clone()]);
        assert_eq!(kept.len(), 1);
        let kept = NmsReducer::new(0.0, iou + 1e-9).reduce(vec![a, b]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let first = Detection::new("IC", 0.8, BoundingBox::new(10.0, 10.0, 20.0, 20.0));
        let second = Detection::new("Diode", 0.8, BoundingBox::new(11.0, 10.0, 20.0, 20.0));
        let kept = NmsReducer::default().reduce(vec![first, second]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_name, "IC");
    }

    #[test]
    fn test_output_sorted_by_confidence() {
        let input = vec![
            det(0.3, 0.0, 0.0, 10.0),
            det(0.9, 100.0, 0.0, 10.0),
            det(0.5, 200.0, 0.0, 10.0),
        ];
        let kept = NmsReducer::default().reduce(input);
        let confs: Vec<_> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confs, vec![0.9, 0.5, 0.3]);
    }

    #[test]
    fn test_nan_confidence_dropped() {
        let kept = NmsReducer::new(0.0, 0.4).reduce(vec![det(f64::NAN, 0.0, 0.0, 10.0)]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_degenerate_boxes_never_suppress() {
        let input = vec![det(0.9, 0.0, 0.0, 0.0), det(0.8, 0.0, 0.0, 0.0)];
        let kept = NmsReducer::default().reduce(input);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(NmsReducer::default().reduce(Vec::new()).is_empty());
    }
}
