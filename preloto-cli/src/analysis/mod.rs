use std::collections::BTreeMap;

use serde::Serialize;

use preloto_db::models::{Draw, GameRules, NumberStats};

/// Fréquence et retard de chaque numéro sur `draws`, ordonnés du plus récent au plus ancien.
/// Un numéro jamais sorti a un retard égal à la taille de la fenêtre.
pub fn compute_stats(draws: &[Draw], rules: &GameRules) -> Vec<NumberStats> {
    let mut stats: Vec<NumberStats> = rules
        .numbers()
        .map(|n| NumberStats {
            number: n,
            frequency: 0,
            gap: draws.len() as u32,
        })
        .collect();

    for (i, draw) in draws.iter().enumerate() {
        for &n in &draw.numbers {
            if let Some(idx) = rules.index_of(n) {
                if stats[idx].frequency == 0 {
                    stats[idx].gap = i as u32;
                }
                stats[idx].frequency += 1;
            }
        }
    }

    stats
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SumStats {
    pub mean: f64,
    pub stdev: f64,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OddStats {
    pub mean: f64,
    pub distribution: BTreeMap<usize, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpreadStats {
    pub mean: f64,
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub total_draws: usize,
    /// (numéro, fréquence), fréquence décroissante puis numéro croissant.
    pub frequencies: Vec<(u8, u32)>,
    pub sum: SumStats,
    pub odd: OddStats,
    pub spread: SpreadStats,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Écart-type d'échantillon, 0 en dessous de deux valeurs.
fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub fn analyze(draws: &[Draw], rules: &GameRules) -> AnalysisReport {
    let mut frequencies: Vec<(u8, u32)> = compute_stats(draws, rules)
        .into_iter()
        .map(|s| (s.number, s.frequency))
        .collect();
    frequencies.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let played: Vec<&Draw> = draws.iter().filter(|d| !d.numbers.is_empty()).collect();

    let sums: Vec<f64> = played.iter().map(|d| d.sum() as f64).collect();
    let sum = SumStats {
        mean: mean(&sums),
        stdev: stdev(&sums),
        min: played.iter().map(|d| d.sum()).min().unwrap_or(0),
        max: played.iter().map(|d| d.sum()).max().unwrap_or(0),
    };

    let mut distribution = BTreeMap::new();
    for d in &played {
        *distribution.entry(d.odd_count()).or_insert(0) += 1;
    }
    let odds: Vec<f64> = played.iter().map(|d| d.odd_count() as f64).collect();
    let odd = OddStats {
        mean: mean(&odds),
        distribution,
    };

    let spreads: Vec<f64> = played.iter().map(|d| d.spread() as f64).collect();
    let spread = SpreadStats {
        mean: mean(&spreads),
        min: played.iter().map(|d| d.spread()).min().unwrap_or(0),
        max: played.iter().map(|d| d.spread()).max().unwrap_or(0),
    };

    AnalysisReport {
        total_draws: draws.len(),
        frequencies,
        sum,
        odd,
        spread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<Draw>, GameRules) {
        let rules = GameRules::custom(1, 10, 3);
        let draws = vec![
            Draw::new(3, "2024-01-05", &[1, 2, 3]),
            Draw::new(2, "2024-01-03", &[1, 5, 9]),
            Draw::new(1, "2024-01-01", &[2, 4, 10]),
        ];
        (draws, rules)
    }

    #[test]
    fn test_compute_stats() {
        let (draws, rules) = sample();
        let stats = compute_stats(&draws, &rules);
        assert_eq!(stats.len(), 10);
        assert_eq!(stats[0].frequency, 2);
        assert_eq!(stats[0].gap, 0);
        assert_eq!(stats[4].frequency, 1);
        assert_eq!(stats[4].gap, 1);
        assert_eq!(stats[9].gap, 2);
        assert_eq!(stats[5].frequency, 0);
        assert_eq!(stats[5].gap, 3);
    }

    #[test]
    fn test_analyze() {
        let (draws, rules) = sample();
        let report = analyze(&draws, &rules);
        assert_eq!(report.total_draws, 3);
        assert_eq!(report.frequencies[0], (1, 2));
        assert_eq!(report.frequencies[1], (2, 2));
        assert_eq!(report.frequencies.last(), Some(&(8, 0)));

        // sommes 6, 15, 16
        assert!((report.sum.mean - 37.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.sum.min, 6);
        assert_eq!(report.sum.max, 16);
        assert!(report.sum.stdev > 0.0);

        // impairs 2, 3, 0
        assert!((report.odd.mean - 5.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.odd.distribution.get(&3), Some(&1));
        assert_eq!(report.odd.distribution.get(&0), Some(&1));

        // écarts 2, 8, 8
        assert_eq!(report.spread.min, 2);
        assert_eq!(report.spread.max, 8);
        assert!((report.spread.mean - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_history() {
        let rules = GameRules::custom(1, 10, 3);
        let report = analyze(&[], &rules);
        assert_eq!(report.total_draws, 0);
        assert_eq!(report.sum, SumStats::default());
        assert!(report.odd.distribution.is_empty());
    }

    #[test]
    fn test_stdev() {
        assert_eq!(stdev(&[4.0]), 0.0);
        assert!((stdev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }
}
