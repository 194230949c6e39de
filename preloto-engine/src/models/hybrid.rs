use preloto_db::models::{Draw, GameRules};
use serde::{Deserialize, Serialize};

use super::frequency::{FrequencyModel, FrequencyParams};
use super::gap::GapModel;
use super::surfing::{SurfingModel, SurfingParams, DEFAULT_WINDOW};
use super::{check_count, parse_value, rank_top, unknown_key, Predictor};
use crate::error::{PredictError, Result};
use crate::features::normalize_by_max;

/// Poids du mélange hybride (un individu de l'optimiseur).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub gap: f64,
    pub freq: f64,
    pub surf: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            gap: 1.0,
            freq: 1.0,
            surf: 1.0,
        }
    }
}

impl Weights {
    pub fn new(gap: f64, freq: f64, surf: f64) -> Self {
        Self { gap, freq, surf }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.gap, self.freq, self.surf]
    }

    pub fn from_array(genes: [f64; 3]) -> Self {
        Self::new(genes[0], genes[1], genes[2])
    }
}

impl std::fmt::Display for Weights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gap={:.3} freq={:.3} surf={:.3}", self.gap, self.freq, self.surf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridParams {
    pub w_gap: f64,
    pub w_freq: f64,
    pub w_surf: f64,
    pub window: usize,
}

impl Default for HybridParams {
    fn default() -> Self {
        Self::from_weights(Weights::default(), DEFAULT_WINDOW)
    }
}

impl HybridParams {
    pub fn from_weights(weights: Weights, window: usize) -> Self {
        Self {
            w_gap: weights.gap,
            w_freq: weights.freq,
            w_surf: weights.surf,
            window,
        }
    }

    pub fn weights(&self) -> Weights {
        Weights::new(self.w_gap, self.w_freq, self.w_surf)
    }

    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "w_gap" => self.w_gap = parse_value(key, value)?,
            "w_freq" => self.w_freq = parse_value(key, value)?,
            "w_surf" => self.w_surf = parse_value(key, value)?,
            "window" => self.window = parse_value(key, value)?,
            _ => return Err(unknown_key("hybrid", key)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("w_gap", self.w_gap), ("w_freq", self.w_freq), ("w_surf", self.w_surf)] {
            if !w.is_finite() || w < 0.0 {
                return Err(PredictError::invalid(format!(
                    "hybrid : {name} doit être fini et >= 0 (reçu {w})"
                )));
            }
        }
        if self.window == 0 {
            return Err(PredictError::invalid("hybrid : window doit être > 0"));
        }
        Ok(())
    }
}

/// Scores normalisés [0, 1] de chaque composante, par numéro.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentScores {
    pub gap: Vec<f64>,
    pub freq: Vec<f64>,
    pub surf: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct HybridState {
    gap: serde_json::Value,
    freq: serde_json::Value,
    surf: serde_json::Value,
}

/// Mélange pondéré retard / fréquence / surf.
pub struct HybridModel {
    rules: GameRules,
    params: HybridParams,
    gap: GapModel,
    freq: FrequencyModel,
    surf: SurfingModel,
    trained: bool,
}

impl HybridModel {
    pub fn new(rules: &GameRules, params: HybridParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            gap: GapModel::new(rules),
            freq: FrequencyModel::new(rules, FrequencyParams::default()),
            surf: SurfingModel::new(rules, SurfingParams { window: params.window }),
            trained: false,
        }
    }

    pub fn normalized_scores(&self) -> Result<ComponentScores> {
        let not_trained = || PredictError::NotTrained(self.name().to_string());
        if !self.trained {
            return Err(not_trained());
        }
        let gaps = self.gap.gaps().ok_or_else(not_trained)?;
        let freqs = self.freq.counts().ok_or_else(not_trained)?;
        let surfs = self.surf.counts().ok_or_else(not_trained)?;

        let as_f64 = |v: &[u32]| v.iter().map(|&x| x as f64).collect::<Vec<_>>();
        Ok(ComponentScores {
            gap: normalize_by_max(&gaps.iter().map(|&g| g as f64).collect::<Vec<_>>()),
            freq: normalize_by_max(&as_f64(freqs)),
            surf: normalize_by_max(&as_f64(surfs)),
        })
    }

    pub fn total_scores(&self) -> Result<Vec<f64>> {
        let c = self.normalized_scores()?;
        let w = self.params.weights();
        Ok((0..self.rules.size())
            .map(|i| w.gap * c.gap[i] + w.freq * c.freq[i] + w.surf * c.surf[i])
            .collect())
    }
}

impl Predictor for HybridModel {
    fn name(&self) -> &str {
        "hybrid"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        self.params.validate()?;
        self.trained = false;
        self.gap.train(history)?;
        self.freq.train(history)?;
        self.surf.train(history)?;
        self.trained = true;
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let scores = self.total_scores()?;
        check_count(&self.rules, count)?;
        Ok(rank_top(&self.rules, &scores, count))
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        if !self.trained {
            return Err(PredictError::NotTrained(self.name().to_string()));
        }
        let state = HybridState {
            gap: self.gap.save_snapshot()?,
            freq: self.freq.save_snapshot()?,
            surf: self.surf.save_snapshot()?,
        };
        Ok(serde_json::to_value(state)?)
    }

    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()> {
        let state: HybridState = serde_json::from_value(state)?;
        self.trained = false;
        self.gap.load_snapshot(state.gap)?;
        self.freq.load_snapshot(state.freq)?;
        self.surf.load_snapshot(state.surf)?;
        self.trained = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_draws;

    fn tie_history() -> Vec<Draw> {
        vec![
            Draw::new(1, "2024-01-01", &[1, 2, 3]),
            Draw::new(2, "2024-01-02", &[1, 2, 5]),
            Draw::new(3, "2024-01-03", &[1, 6, 7]),
        ]
    }

    fn model(w_gap: f64, w_freq: f64, w_surf: f64) -> HybridModel {
        let params = HybridParams::from_weights(Weights::new(w_gap, w_freq, w_surf), 30);
        HybridModel::new(&GameRules::custom(1, 10, 3), params)
    }

    #[test]
    fn test_tie_resolves_to_smaller_value() {
        // 1 : freq 1.0, retard 0 ; 4 : freq 0, retard 1.0
        let mut m = model(1.0, 1.0, 0.0);
        m.train(&tie_history()).unwrap();
        let totals = m.total_scores().unwrap();
        assert!((totals[0] - 1.0).abs() < 1e-12);
        assert!((totals[3] - 1.0).abs() < 1e-12);
        assert_eq!(m.predict(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_gap_weight_breaks_tie() {
        let mut m = model(2.0, 1.0, 0.0);
        m.train(&tie_history()).unwrap();
        assert_eq!(m.predict(1).unwrap(), vec![4]);
    }

    #[test]
    fn test_zero_maxima_give_zero_scores() {
        // tous les numéros sortis au dernier tirage : aucun retard
        let mut m = HybridModel::new(&GameRules::custom(1, 3, 3), HybridParams::default());
        m.train(&[Draw::new(1, "2024-01-01", &[1, 2, 3])]).unwrap();
        let scores = m.normalized_scores().unwrap();
        assert_eq!(scores.gap, vec![0.0, 0.0, 0.0]);
        assert_eq!(scores.freq, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_deterministic() {
        let rules = preloto_db::models::Game::Megasena.rules();
        let history = make_test_draws(120, &rules);
        let params = HybridParams::from_weights(Weights::new(3.2, 0.7, 5.1), 30);
        let mut a = HybridModel::new(&rules, params);
        let mut b = HybridModel::new(&rules, params);
        a.train(&history).unwrap();
        b.train(&history).unwrap();
        assert_eq!(a.predict(20).unwrap(), b.predict(20).unwrap());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut m = model(-1.0, 1.0, 1.0);
        assert!(matches!(m.train(&tie_history()), Err(PredictError::InvalidParameter(_))));
        let nan = HybridParams::from_weights(Weights::new(f64::NAN, 1.0, 1.0), 30);
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut m = model(1.0, 2.0, 0.5);
        m.train(&tie_history()).unwrap();
        let state = m.save_snapshot().unwrap();
        let mut restored = model(1.0, 2.0, 0.5);
        restored.load_snapshot(state).unwrap();
        assert_eq!(restored.predict(3).unwrap(), m.predict(3).unwrap());
    }

    #[test]
    fn test_empty_history() {
        let mut m = model(1.0, 1.0, 1.0);
        assert!(matches!(m.train(&[]), Err(PredictError::InsufficientData { .. })));
        assert!(matches!(m.predict(1), Err(PredictError::NotTrained(_))));
    }
}
