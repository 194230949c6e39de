use preloto_db::models::{Draw, GameRules};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{check_count, check_history, check_state_len, decode_state, encode_state, parse_value, rank_top, unknown_key, Predictor};
use crate::error::{PredictError, Result};
use crate::features::FeatureTracker;

pub const FEATURE_NAMES: [&str; 3] = ["gap", "frequency", "recent_frequency"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Tirages ignorés avant de produire des lignes d'entraînement.
    pub warmup: usize,
    pub recent_window: usize,
    /// Nombre maximal de tirages cibles (les plus récents) utilisés pour l'entraînement.
    pub window: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 5,
            warmup: 50,
            recent_window: 10,
            window: 200,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "n_trees" => self.n_trees = parse_value(key, value)?,
            "max_depth" => self.max_depth = parse_value(key, value)?,
            "warmup" => self.warmup = parse_value(key, value)?,
            "recent_window" => self.recent_window = parse_value(key, value)?,
            "window" => self.window = parse_value(key, value)?,
            "seed" => self.seed = parse_value(key, value)?,
            _ => return Err(unknown_key("random_forest", key)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("n_trees", self.n_trees),
            ("max_depth", self.max_depth),
            ("recent_window", self.recent_window),
            ("window", self.window),
        ] {
            if v == 0 {
                return Err(PredictError::invalid(format!("random_forest : {name} doit être > 0")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf { value: f64 },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestState {
    trees: Vec<TreeNode>,
    /// Probabilité moyenne de sortie au prochain tirage, par numéro.
    scores: Vec<f64>,
}

/// Forêt d'arbres de Gini sur (retard, fréquence, fréquence récente).
pub struct RandomForestModel {
    rules: GameRules,
    params: ForestParams,
    state: Option<ForestState>,
}

impl RandomForestModel {
    pub fn new(rules: &GameRules, params: ForestParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            state: None,
        }
    }

    pub fn scores(&self) -> Option<&[f64]> {
        self.state.as_ref().map(|s| s.scores.as_slice())
    }

    fn feature_rows(tracker: &FeatureTracker) -> Vec<Vec<f64>> {
        tracker
            .snapshot()
            .iter()
            .map(|f| vec![f.gap as f64, f.frequency as f64, f.window_frequency as f64])
            .collect()
    }

    /// Lignes supervisées : caractéristiques avant le tirage t, étiquette = sorti en t.
    fn training_rows(&self, history: &[Draw]) -> (Vec<Vec<f64>>, Vec<f64>, FeatureTracker) {
        let start = self.params.warmup.max(history.len().saturating_sub(self.params.window));
        let mut tracker = FeatureTracker::new(&self.rules, self.params.recent_window);
        let mut features = Vec::new();
        let mut labels = Vec::new();

        for (t, draw) in history.iter().enumerate() {
            if t >= start {
                for (idx, row) in Self::feature_rows(&tracker).into_iter().enumerate() {
                    let number = self.rules.number_at(idx);
                    features.push(row);
                    labels.push(if draw.contains(number) { 1.0 } else { 0.0 });
                }
            }
            tracker.update(draw);
        }
        (features, labels, tracker)
    }
}

impl Predictor for RandomForestModel {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        self.params.validate()?;
        check_history(history, self.params.warmup + 1)?;

        let (all_features, all_labels, tracker) = self.training_rows(history);
        if all_features.is_empty() {
            return Err(PredictError::ModelFailure("random_forest : aucune ligne d'entraînement".into()));
        }

        let features_per_split = (FEATURE_NAMES.len() as f64).sqrt().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut trees = Vec::with_capacity(self.params.n_trees);

        for _ in 0..self.params.n_trees {
            // Bootstrap
            let n_samples = all_features.len();
            let indices: Vec<usize> = (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();
            let boot_features: Vec<&Vec<f64>> = indices.iter().map(|&i| &all_features[i]).collect();
            let boot_labels: Vec<f64> = indices.iter().map(|&i| all_labels[i]).collect();
            trees.push(build_tree(&boot_features, &boot_labels, self.params.max_depth, features_per_split, &mut rng));
        }

        let scores = Self::feature_rows(&tracker)
            .iter()
            .map(|row| trees.iter().map(|tree| predict_tree(tree, row)).sum::<f64>() / trees.len() as f64)
            .collect();

        self.state = Some(ForestState { trees, scores });
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| PredictError::NotTrained(self.name().to_string()))?;
        check_count(&self.rules, count)?;
        Ok(rank_top(&self.rules, &state.scores, count))
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        encode_state(self.state.as_ref(), self.name())
    }

    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()> {
        let state: ForestState = decode_state(state)?;
        check_state_len(state.scores.len(), &self.rules)?;
        self.state = Some(state);
        Ok(())
    }
}

fn mean(labels: &[f64]) -> f64 {
    labels.iter().sum::<f64>() / labels.len().max(1) as f64
}

fn build_tree(
    features: &[&Vec<f64>],
    labels: &[f64],
    max_depth: usize,
    features_per_split: usize,
    rng: &mut StdRng,
) -> TreeNode {
    if max_depth == 0 || labels.len() < 4 {
        return TreeNode::Leaf { value: mean(labels) };
    }

    let first = labels[0];
    if labels.iter().all(|&l| (l - first).abs() < 1e-10) {
        return TreeNode::Leaf { value: first };
    }

    let n_features = features[0].len();
    let mut feature_indices: Vec<usize> = (0..n_features).collect();
    feature_indices.shuffle(rng);
    feature_indices.truncate(features_per_split);

    let mut best_gini = f64::MAX;
    let mut best_feature = 0;
    let mut best_threshold = 0.0;

    for &feat_idx in &feature_indices {
        let mut values: Vec<f64> = features.iter().map(|f| f[feat_idx]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup();

        if values.len() < 2 {
            continue;
        }

        // au plus une dizaine de seuils par caractéristique
        let step = (values.len() / 10).max(1);
        for i in (0..values.len() - 1).step_by(step) {
            let threshold = (values[i] + values[i + 1]) / 2.0;
            let gini = split_gini(features, labels, feat_idx, threshold);
            if gini < best_gini {
                best_gini = gini;
                best_feature = feat_idx;
                best_threshold = threshold;
            }
        }
    }

    if best_gini >= gini_impurity(labels) {
        return TreeNode::Leaf { value: mean(labels) };
    }

    let (left, right): (Vec<usize>, Vec<usize>) =
        (0..labels.len()).partition(|&i| features[i][best_feature] <= best_threshold);
    if left.is_empty() || right.is_empty() {
        return TreeNode::Leaf { value: mean(labels) };
    }

    let (left_features, left_labels) = subset(features, labels, &left);
    let (right_features, right_labels) = subset(features, labels, &right);

    TreeNode::Split {
        feature_idx: best_feature,
        threshold: best_threshold,
        left: Box::new(build_tree(&left_features, &left_labels, max_depth - 1, features_per_split, rng)),
        right: Box::new(build_tree(&right_features, &right_labels, max_depth - 1, features_per_split, rng)),
    }
}

fn subset<'a>(features: &[&'a Vec<f64>], labels: &[f64], idx: &[usize]) -> (Vec<&'a Vec<f64>>, Vec<f64>) {
    (idx.iter().map(|&i| features[i]).collect(), idx.iter().map(|&i| labels[i]).collect())
}

fn gini_impurity(labels: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let p = mean(labels);
    2.0 * p * (1.0 - p)
}

fn split_gini(features: &[&Vec<f64>], labels: &[f64], feature_idx: usize, threshold: f64) -> f64 {
    let mut left_sum = 0.0;
    let mut left_n = 0usize;
    let mut right_sum = 0.0;
    let mut right_n = 0usize;

    for (feat, &label) in features.iter().zip(labels) {
        if feat[feature_idx] <= threshold {
            left_sum += label;
            left_n += 1;
        } else {
            right_sum += label;
            right_n += 1;
        }
    }

    if left_n == 0 || right_n == 0 {
        return f64::MAX;
    }

    let n = labels.len() as f64;
    let gini = |sum: f64, count: usize| {
        let p = sum / count as f64;
        2.0 * p * (1.0 - p)
    };
    (left_n as f64 / n) * gini(left_sum, left_n) + (right_n as f64 / n) * gini(right_sum, right_n)
}

fn predict_tree(node: &TreeNode, features: &[f64]) -> f64 {
    match node {
        TreeNode::Leaf { value } => *value,
        TreeNode::Split { feature_idx, threshold, left, right } => {
            if features[*feature_idx] <= *threshold {
                predict_tree(left, features)
            } else {
                predict_tree(right, features)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_draws;
    use preloto_db::models::Game;

    fn small() -> ForestParams {
        ForestParams {
            n_trees: 10,
            max_depth: 3,
            warmup: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_requires_warmup_plus_one() {
        let rules = Game::Quina.rules();
        let mut model = RandomForestModel::new(&rules, small());
        let err = model.train(&make_test_draws(20, &rules)).unwrap_err();
        assert_eq!(err, PredictError::InsufficientData { needed: 21, available: 20 });
        assert!(model.train(&make_test_draws(21, &rules)).is_ok());
    }

    #[test]
    fn test_scores_are_probabilities() {
        let rules = Game::Megasena.rules();
        let mut model = RandomForestModel::new(&rules, small());
        model.train(&make_test_draws(60, &rules)).unwrap();
        let scores = model.scores().unwrap();
        assert_eq!(scores.len(), 60);
        assert!(scores.iter().all(|&s| (0.0..=1.0).contains(&s)));
        assert_eq!(model.predict(6).unwrap().len(), 6);
    }

    #[test]
    fn test_seeded_forest_is_deterministic() {
        let rules = Game::Lotofacil.rules();
        let history = make_test_draws(60, &rules);
        let mut a = RandomForestModel::new(&rules, small());
        let mut b = RandomForestModel::new(&rules, small());
        a.train(&history).unwrap();
        b.train(&history).unwrap();
        assert_eq!(a.predict(15).unwrap(), b.predict(15).unwrap());
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini_impurity(&[1.0, 1.0]), 0.0);
        assert!((gini_impurity(&[1.0, 0.0]) - 0.5).abs() < 1e-12);
        let a = vec![0.0];
        let b = vec![1.0];
        let features: Vec<&Vec<f64>> = vec![&a, &b];
        assert_eq!(split_gini(&features, &[0.0, 1.0], 0, 0.5), 0.0);
        assert_eq!(split_gini(&features, &[0.0, 1.0], 0, 5.0), f64::MAX);
    }

    #[test]
    fn test_tree_learns_separable_labels() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let labels: Vec<f64> = (0..20).map(|i| if i >= 10 { 1.0 } else { 0.0 }).collect();
        let refs: Vec<&Vec<f64>> = rows.iter().collect();
        let mut rng = StdRng::seed_from_u64(0);
        let tree = build_tree(&refs, &labels, 3, 1, &mut rng);
        assert_eq!(predict_tree(&tree, &[2.0]), 0.0);
        assert_eq!(predict_tree(&tree, &[17.0]), 1.0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let rules = Game::Quina.rules();
        let mut model = RandomForestModel::new(&rules, small());
        model.train(&make_test_draws(40, &rules)).unwrap();
        let state = model.save_snapshot().unwrap();
        let mut restored = RandomForestModel::new(&rules, small());
        restored.load_snapshot(state).unwrap();
        assert_eq!(restored.predict(10).unwrap(), model.predict(10).unwrap());
    }
}
