use std::collections::HashMap;

use tracing::debug;

use crate::pmi::confidence_adjusted;

/// Size-class cutoffs. Small articles keep a permissive floor so sparse
/// graphs survive; large articles are filtered hard to keep degree sane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeClassConfig {
    pub min_score: f64,
    pub percentile_cutoff: f64,
    pub max_edges_per_entity: usize,
}

const SMALL: SizeClassConfig = SizeClassConfig {
    min_score: 0.3,
    percentile_cutoff: 70.0,
    max_edges_per_entity: 5,
};

const MEDIUM: SizeClassConfig = SizeClassConfig {
    min_score: 0.5,
    percentile_cutoff: 60.0,
    max_edges_per_entity: 8,
};

const LARGE: SizeClassConfig = SizeClassConfig {
    min_score: 0.6,
    percentile_cutoff: 50.0,
    max_edges_per_entity: 10,
};

/// Edges surviving a stage-1 wipeout, so sparse articles keep a skeleton.
const FALLBACK_EDGE_COUNT: usize = 3;

pub fn class_for(entity_count: usize) -> SizeClassConfig {
    if entity_count <= 10 {
        SMALL
    } else if entity_count <= 25 {
        MEDIUM
    } else {
        LARGE
    }
}

/// A candidate relationship edge as the thresholder sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEdge {
    pub entity_a: String,
    pub entity_b: String,
    pub score: f64,
    pub confidence: f64,
}

impl ScoredEdge {
    fn ranking_key(&self) -> f64 {
        confidence_adjusted(self.score, self.confidence)
    }
}

/// Article-size-adaptive three-stage filter: absolute floor, percentile over
/// the floor's survivors, then greedy admission under a per-entity degree
/// cap ranked by confidence-weighted score.
pub fn filter_edges(edges: Vec<ScoredEdge>, entity_count: usize) -> Vec<ScoredEdge> {
    if edges.is_empty() {
        return edges;
    }

    let class = class_for(entity_count);
    let total = edges.len();

    // Stage 1: absolute score floor.
    let survivors: Vec<ScoredEdge> = edges
        .iter()
        .filter(|e| e.score >= class.min_score)
        .cloned()
        .collect();

    if survivors.is_empty() {
        // Sparse article: keep the strongest few edges rather than nothing.
        let mut fallback = edges;
        fallback.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fallback.truncate(FALLBACK_EDGE_COUNT);
        debug!(
            kept = fallback.len(),
            "score floor emptied the edge list; keeping top raw edges"
        );
        return fallback;
    }

    // Stage 2: percentile cutoff computed over stage-1 survivors.
    let cutoff = percentile(
        survivors.iter().map(|e| e.score),
        class.percentile_cutoff,
    );
    let survivors: Vec<ScoredEdge> = survivors
        .into_iter()
        .filter(|e| e.score >= cutoff)
        .collect();

    // Stage 3: greedy degree-capped admission, strongest edges first.
    let mut ranked = survivors;
    ranked.sort_by(|a, b| {
        b.ranking_key()
            .partial_cmp(&a.ranking_key())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.entity_a.as_str(), a.entity_b.as_str()).cmp(&(b.entity_a.as_str(), b.entity_b.as_str())))
    });

    let mut degrees: HashMap<&str, usize> = HashMap::new();
    let mut admitted = Vec::new();

    for edge in &ranked {
        let degree_a = degrees.get(edge.entity_a.as_str()).copied().unwrap_or(0);
        let degree_b = degrees.get(edge.entity_b.as_str()).copied().unwrap_or(0);

        if degree_a >= class.max_edges_per_entity || degree_b >= class.max_edges_per_entity {
            continue;
        }

        *degrees.entry(edge.entity_a.as_str()).or_insert(0) += 1;
        *degrees.entry(edge.entity_b.as_str()).or_insert(0) += 1;
        admitted.push(edge.clone());
    }

    debug!(
        total,
        admitted = admitted.len(),
        entity_count,
        min_score = class.min_score,
        percentile = class.percentile_cutoff,
        "edge filtering complete"
    );

    admitted
}

/// Nearest-rank percentile of the given scores.
fn percentile(scores: impl Iterator<Item = f64>, percentile: f64) -> f64 {
    let mut sorted: Vec<f64> = scores.collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(a: &str, b: &str, score: f64) -> ScoredEdge {
        ScoredEdge {
            entity_a: a.to_string(),
            entity_b: b.to_string(),
            score,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_size_classes() {
        assert_eq!(class_for(5), SMALL);
        assert_eq!(class_for(10), SMALL);
        assert_eq!(class_for(11), MEDIUM);
        assert_eq!(class_for(25), MEDIUM);
        assert_eq!(class_for(26), LARGE);
    }

    #[test]
    fn test_floor_drops_weak_edges() {
        let edges = vec![
            edge("A", "B", 0.8),
            edge("A", "C", 0.6),
            edge("B", "C", 0.1),
        ];

        let kept = filter_edges(edges, 5);
        assert!(kept.iter().all(|e| e.score >= 0.3));
        assert!(!kept.iter().any(|e| e.entity_a == "B" && e.entity_b == "C"));
    }

    #[test]
    fn test_fallback_keeps_top_three_raw_edges() {
        // Small article where everything is under the 0.3 floor.
        let edges = vec![
            edge("A", "B", 0.25),
            edge("A", "C", 0.20),
            edge("A", "D", 0.15),
            edge("B", "C", 0.10),
            edge("B", "D", 0.05),
            edge("C", "D", 0.02),
        ];

        let kept = filter_edges(edges, 4);

        assert_eq!(kept.len(), 3);
        assert!((kept[0].score - 0.25).abs() < 1e-9);
        assert!((kept[2].score - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_cutoff_tightens_the_set() {
        // Ten survivors; the SMALL 70th percentile keeps only the top scores.
        let edges: Vec<ScoredEdge> = (0..10)
            .map(|i| edge(&format!("A{i}"), &format!("B{i}"), 0.3 + 0.05 * i as f64))
            .collect();

        let kept = filter_edges(edges, 5);

        assert!(kept.len() <= 4, "70th percentile keeps roughly the top 30%: {kept:?}");
        assert!(kept.iter().all(|e| e.score >= 0.6));
    }

    #[test]
    fn test_degree_cap_limits_hub_entities() {
        // One hub with eight strong edges; SMALL caps degree at five.
        let edges: Vec<ScoredEdge> = (0..8)
            .map(|i| edge("Hub", &format!("Spoke{i}"), 0.9))
            .collect();

        let kept = filter_edges(edges, 9);

        assert_eq!(kept.len(), 5);
        assert!(kept.iter().all(|e| e.entity_a == "Hub"));
    }

    #[test]
    fn test_degree_cap_prefers_confidence_weighted_score() {
        let mut strong = edge("Hub", "Strong", 0.9);
        strong.confidence = 1.0;
        let mut weak = edge("Hub", "Weak", 0.9);
        weak.confidence = 0.5;

        let mut edges = vec![weak.clone(), strong.clone()];
        // Fill the hub's degree budget with middling edges.
        for i in 0..4 {
            let mut mid = edge("Hub", &format!("Mid{i}"), 0.9);
            mid.confidence = 0.8;
            edges.push(mid);
        }

        let kept = filter_edges(edges, 7);

        assert!(kept.iter().any(|e| e.entity_b == "Strong"));
        assert!(
            !kept.iter().any(|e| e.entity_b == "Weak"),
            "the weakest confidence-weighted edge should lose the degree race: {kept:?}"
        );
    }

    #[test]
    fn test_empty_input_stays_empty() {
        assert!(filter_edges(Vec::new(), 5).is_empty());
    }

    #[test]
    fn test_nearest_rank_percentile() {
        let scores = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert!((percentile(scores.iter().copied(), 50.0) - 0.3).abs() < 1e-9);
        assert!((percentile(scores.iter().copied(), 100.0) - 0.5).abs() < 1e-9);
        assert!((percentile(scores.iter().copied(), 1.0) - 0.1).abs() < 1e-9);
    }
}
