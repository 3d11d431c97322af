//! Pairwise connectivity heuristic and graph construction.
//!
//! Two components are connected when both touch copper, their centres are
//! closer than `max_distance`, and the rectangle spanning the two centres
//! (grown by `continuity_margin`) is mostly track.

use rayon::prelude::*;

use crate::config::ConnectivityConfig;
use crate::detection::BoundingBox;
use crate::tracks::{BinaryTrackMask, OverlapSampler, PixelRect};

use super::graph::{CircuitGraph, GraphError};
use super::Component;

#[derive(Debug, Clone)]
pub struct ConnectivityAnalyzer {
    pub sampler: OverlapSampler,
    pub config: ConnectivityConfig,
}

impl Default for ConnectivityAnalyzer {
    fn default() -> Self {
        Self::new(OverlapSampler::default(), ConnectivityConfig::default())
    }
}

impl ConnectivityAnalyzer {
    pub fn new(sampler: OverlapSampler, config: ConnectivityConfig) -> Self {
        Self { sampler, config }
    }

    /// Region between two centres, truncated to whole pixels and grown by
    /// the continuity margin.
    pub fn continuity_region(&self, a: &BoundingBox, b: &BoundingBox) -> PixelRect {
        let m = self.config.continuity_margin as i64;
        let (x1, y1) = (a.x as i64, a.y as i64);
        let (x2, y2) = (b.x as i64, b.y as i64);
        PixelRect::new(
            x1.min(x2).saturating_sub(m),
            y1.min(y2).saturating_sub(m),
            x1.max(x2).saturating_add(m),
            y1.max(y2).saturating_add(m),
        )
    }

    /// Track fraction of the continuity region; 0.0 when it lies off the mask.
    pub fn continuity_density(&self, a: &BoundingBox, b: &BoundingBox, mask: &BinaryTrackMask) -> f64 {
        if a.is_degenerate() || b.is_degenerate() {
            return 0.0;
        }
        mask.density_in(self.continuity_region(a, b)).unwrap_or(0.0)
    }

    /// Distance and continuity checks, for pairs already known to touch copper.
    fn linked(&self, a: &BoundingBox, b: &BoundingBox, mask: &BinaryTrackMask) -> bool {
        let distance = a.center_distance(b);
        if !(distance < self.config.max_distance) {
            return false;
        }
        self.continuity_density(a, b, mask) > self.config.density_threshold
    }

    /// Full three-part test for one pair.
    pub fn connected(&self, a: &Component, b: &Component, mask: &BinaryTrackMask) -> bool {
        self.sampler.touches_track(mask, &a.bbox)
            && self.sampler.touches_track(mask, &b.bbox)
            && self.linked(&a.bbox, &b.bbox, mask)
    }

    /// Index pairs `(i, j)`, `i < j`, that pass the connectivity test, in
    /// lexicographic order.
    pub fn connected_pairs(&self, components: &[Component], mask: &BinaryTrackMask) -> Vec<(usize, usize)> {
        let n = components.len();
        let touches: Vec<bool> = components
            .iter()
            .map(|c| self.sampler.touches_track(mask, &c.bbox))
            .collect();
        tracing::debug!(
            "{}/{} components touch a track",
            touches.iter().filter(|&&t| t).count(),
            n
        );

        let row = |i: usize| {
            let touches = &touches;
            (i + 1..n).filter_map(move |j| {
                let hit = touches[i]
                    && touches[j]
                    && self.linked(&components[i].bbox, &components[j].bbox, mask);
                hit.then_some((i, j))
            })
        };

        if n >= self.config.parallel_min_components {
            (0..n).into_par_iter().flat_map_iter(row).collect()
        } else {
            (0..n).flat_map(row).collect()
        }
    }
}

/// Add every component as a node, then connect each qualifying pair.
pub fn build_circuit_graph(
    components: Vec<Component>,
    mask: &BinaryTrackMask,
    analyzer: &ConnectivityAnalyzer,
) -> Result<CircuitGraph, GraphError> {
    let pairs = analyzer.connected_pairs(&components, mask);
    let ids: Vec<String> = components.iter().map(|c| c.id.clone()).collect();

    let mut graph = CircuitGraph::new();
    for component in components {
        graph.add_component(component)?;
    }
    for (i, j) in pairs {
        graph.add_connection(&ids[i], &ids[j])?;
    }

    tracing::info!(
        "Circuit graph built: {} components, {} connections",
        graph.component_count(),
        graph.connection_count()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(id: &str, x: f64, y: f64) -> Component {
        Component::new(id, "Resistor", BoundingBox::new(x, y, 20.0, 20.0))
    }

    /// Horizontal copper band `y in [75, 105)` across the whole width.
    fn band_mask(width: u32) -> BinaryTrackMask {
        BinaryTrackMask::from_fn(width, 200, |_, y| (75..105).contains(&y))
    }

    #[test]
    fn test_neighbours_on_shared_track_connect() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = band_mask(200);
        let (a, b) = (part("R1", 75.0, 100.0), part("R2", 125.0, 100.0));
        // Region x 50..150, y 75..125: rows 75..105 are band, 30 of 50.
        let density = analyzer.continuity_density(&a.bbox, &b.bbox, &mask);
        assert!((density - 0.6).abs() < 1e-9);
        assert!(analyzer.connected(&a, &b, &mask));
        assert!(analyzer.connected(&b, &a, &mask));
    }

    #[test]
    fn test_distance_limit() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = band_mask(700);
        let a = part("R1", 75.0, 100.0);
        let b = part("R2", 575.0, 100.0);
        assert!(!analyzer.connected(&a, &b, &mask));
    }

    #[test]
    fn test_distance_is_strict() {
        let mut config = ConnectivityConfig::default();
        config.max_distance = 50.0;
        let analyzer = ConnectivityAnalyzer::new(OverlapSampler::default(), config);
        let mask = band_mask(200);
        assert!(!analyzer.connected(&part("A", 75.0, 100.0), &part("B", 125.0, 100.0), &mask));
    }

    #[test]
    fn test_no_track_no_connection() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = BinaryTrackMask::empty(200, 200);
        assert!(!analyzer.connected(&part("A", 75.0, 100.0), &part("B", 125.0, 100.0), &mask));
    }

    #[test]
    fn test_region_off_mask_has_zero_density() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = BinaryTrackMask::from_fn(50, 50, |_, _| true);
        let a = BoundingBox::new(500.0, 500.0, 10.0, 10.0);
        let b = BoundingBox::new(520.0, 500.0, 10.0, 10.0);
        assert_eq!(analyzer.continuity_density(&a, &b, &mask), 0.0);
    }

    #[test]
    fn test_far_away_coordinates_do_not_connect() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = BinaryTrackMask::from_fn(100, 100, |_, _| true);
        let far = BoundingBox::new(1e19, 50.0, 10.0, 10.0);
        let near = BoundingBox::new(50.0, 50.0, 10.0, 10.0);
        let region = analyzer.continuity_region(&far, &near);
        assert_eq!(region.x1, i64::MAX);
        assert_eq!(analyzer.continuity_density(&far, &near, &mask), 0.0);
        let a = Component::new("R1", "Resistor", far);
        let b = Component::new("R2", "Resistor", near);
        assert!(!analyzer.connected(&a, &b, &mask));
        let graph = build_circuit_graph(vec![a, b], &mask, &analyzer).unwrap();
        assert!(graph.get_netlist().is_empty());
    }

    #[test]
    fn test_build_graph_skips_self_and_orders_pairs() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = band_mask(400);
        let components = vec![
            part("R1", 75.0, 100.0),
            part("R2", 125.0, 100.0),
            part("R3", 175.0, 100.0),
            part("C1", 380.0, 20.0),
        ];
        let graph = build_circuit_graph(components, &mask, &analyzer).unwrap();
        assert_eq!(graph.component_count(), 4);
        assert_eq!(
            graph.get_netlist(),
            vec!["R1 -- R2", "R1 -- R3", "R2 -- R3"]
        );
        assert!(graph.neighbors("C1").is_empty());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let mask = BinaryTrackMask::from_fn(600, 600, |x, y| (x / 40 + y / 40) % 3 != 0);
        let components: Vec<Component> = (0..80)
            .map(|i| part(&format!("X{}", i + 1), 30.0 + (i % 10) as f64 * 55.0, 30.0 + (i / 10) as f64 * 70.0))
            .collect();

        let mut sequential = ConnectivityConfig::default();
        sequential.parallel_min_components = usize::MAX;
        let mut parallel = ConnectivityConfig::default();
        parallel.parallel_min_components = 1;

        let seq = ConnectivityAnalyzer::new(OverlapSampler::default(), sequential)
            .connected_pairs(&components, &mask);
        let par = ConnectivityAnalyzer::new(OverlapSampler::default(), parallel)
            .connected_pairs(&components, &mask);
        assert_eq!(seq, par);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let analyzer = ConnectivityAnalyzer::default();
        let mask = band_mask(200);
        let err = build_circuit_graph(vec![part("R1", 75.0, 100.0), part("R1", 125.0, 100.0)], &mask, &analyzer)
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateComponent("R1".to_string()));
    }
}
