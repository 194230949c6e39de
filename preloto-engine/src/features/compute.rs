use preloto_db::models::{Draw, GameRules};

use super::DrawSummary;

pub fn summarize(draw: &Draw) -> DrawSummary {
    DrawSummary {
        sum: draw.sum(),
        odd: draw.odd_count(),
        even: draw.even_count(),
        spread: draw.spread(),
    }
}

/// Occurrences de chaque numéro dans les `window` derniers tirages.
pub fn window_counts(history: &[Draw], rules: &GameRules, window: usize) -> Vec<u32> {
    let mut counts = vec![0u32; rules.size()];
    let start = history.len().saturating_sub(window);
    for draw in &history[start..] {
        for &n in &draw.numbers {
            if let Some(idx) = rules.index_of(n) {
                counts[idx] += 1;
            }
        }
    }
    counts
}

/// value / max(values), tout à 0 si le max est nul.
pub fn normalize_by_max(values: &[f64]) -> Vec<f64> {
    let max = values.iter().cloned().fold(0.0f64, f64::max);
    if max > 0.0 {
        values.iter().map(|v| v / max).collect()
    } else {
        vec![0.0; values.len()]
    }
}

/// Moyenne et écart-type d'échantillon (0 avec moins de deux valeurs).
pub fn mean_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}
