use preloto_db::models::{Draw, GameRules};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{check_count, check_history, check_state_len, decode_state, encode_state, parse_value, rank_top, unknown_key, Predictor};
use crate::error::{PredictError, Result};
use crate::features::mean_stdev;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloParams {
    pub simulations: usize,
    pub seed: u64,
    pub sigma: f64,
    pub min_odd_prob: f64,
}

impl Default for MonteCarloParams {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            seed: 42,
            sigma: 1.5,
            min_odd_prob: 0.05,
        }
    }
}

impl MonteCarloParams {
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "simulations" => self.simulations = parse_value(key, value)?,
            "seed" => self.seed = parse_value(key, value)?,
            "sigma" => self.sigma = parse_value(key, value)?,
            "min_odd_prob" => self.min_odd_prob = parse_value(key, value)?,
            _ => return Err(unknown_key("monte_carlo", key)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.simulations == 0 {
            return Err(PredictError::invalid("monte_carlo : simulations doit être > 0"));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(PredictError::invalid(format!(
                "monte_carlo : sigma invalide ({})",
                self.sigma
            )));
        }
        if !(0.0..=1.0).contains(&self.min_odd_prob) {
            return Err(PredictError::invalid(format!(
                "monte_carlo : min_odd_prob hors de [0, 1] ({})",
                self.min_odd_prob
            )));
        }
        Ok(())
    }
}

/// Profil statistique appris sur l'historique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawProfile {
    pub sum_mean: f64,
    pub sum_stdev: f64,
    pub spread_mean: f64,
    pub spread_stdev: f64,
    /// P(nombre d'impairs = k), k = 0..=K.
    pub odd_probs: Vec<f64>,
}

impl DrawProfile {
    pub fn learn(history: &[Draw], draw_count: usize) -> Self {
        let sums: Vec<f64> = history.iter().map(|d| d.sum() as f64).collect();
        let spreads: Vec<f64> = history.iter().map(|d| d.spread() as f64).collect();
        let (sum_mean, sum_stdev) = mean_stdev(&sums);
        let (spread_mean, spread_stdev) = mean_stdev(&spreads);

        let mut odd_probs = vec![0.0; draw_count + 1];
        for draw in history {
            let odd = draw.odd_count().min(draw_count);
            odd_probs[odd] += 1.0;
        }
        let n = history.len().max(1) as f64;
        for p in &mut odd_probs {
            *p /= n;
        }

        Self {
            sum_mean,
            sum_stdev,
            spread_mean,
            spread_stdev,
            odd_probs,
        }
    }

    fn accepts(&self, numbers: &[u8], sigma: f64, min_odd_prob: f64) -> bool {
        let sum: f64 = numbers.iter().map(|&n| n as f64).sum();
        let (lo, hi) = match (numbers.iter().min(), numbers.iter().max()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => return false,
        };
        let spread = (hi - lo) as f64;
        let odd = numbers.iter().filter(|&&n| n % 2 == 1).count();

        let sum_ok = (sum - self.sum_mean).abs() <= sigma * self.sum_stdev;
        let spread_ok = (spread - self.spread_mean).abs() <= sigma * self.spread_stdev;
        let odd_ok = self.odd_probs.get(odd).copied().unwrap_or(0.0) >= min_odd_prob;
        sum_ok && spread_ok && odd_ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MonteCarloState {
    profile: DrawProfile,
    accepted: usize,
    counts: Vec<u32>,
}

/// Simulation de tirages aléatoires filtrés par le profil historique.
pub struct MonteCarloModel {
    rules: GameRules,
    params: MonteCarloParams,
    state: Option<MonteCarloState>,
}

impl MonteCarloModel {
    pub fn new(rules: &GameRules, params: MonteCarloParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            state: None,
        }
    }

    /// Nombre de simulations retenues lors du dernier entraînement.
    pub fn accepted(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.accepted)
    }

    fn simulate(&self, profile: &DrawProfile) -> (usize, Vec<u32>) {
        let size = self.rules.size();
        let k = self.rules.draw_count.min(size);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut pool = vec![0u32; size];
        let mut all = vec![0u32; size];
        let mut accepted = 0usize;

        for _ in 0..self.params.simulations {
            let picks: Vec<usize> = rand::seq::index::sample(&mut rng, size, k).into_vec();
            let numbers: Vec<u8> = picks.iter().map(|&i| self.rules.number_at(i)).collect();
            for &i in &picks {
                all[i] += 1;
            }
            if profile.accepts(&numbers, self.params.sigma, self.params.min_odd_prob) {
                accepted += 1;
                for &i in &picks {
                    pool[i] += 1;
                }
            }
        }

        if accepted == 0 {
            log::debug!("monte_carlo : aucune simulation retenue, repli sur l'ensemble des tirages simulés");
            (0, all)
        } else {
            (accepted, pool)
        }
    }
}

impl Predictor for MonteCarloModel {
    fn name(&self) -> &str {
        "monte_carlo"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        self.params.validate()?;
        check_history(history, 2)?;
        let profile = DrawProfile::learn(history, self.rules.draw_count);
        let (accepted, counts) = self.simulate(&profile);
        self.state = Some(MonteCarloState {
            profile,
            accepted,
            counts,
        });
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| PredictError::NotTrained(self.name().to_string()))?;
        check_count(&self.rules, count)?;
        let scores: Vec<f64> = state.counts.iter().map(|&c| c as f64).collect();
        Ok(rank_top(&self.rules, &scores, count))
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        encode_state(self.state.as_ref(), self.name())
    }

    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()> {
        let state: MonteCarloState = decode_state(state)?;
        check_state_len(state.counts.len(), &self.rules)?;
        self.state = Some(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_draws;
    use preloto_db::models::Game;

    fn small_params(seed: u64) -> MonteCarloParams {
        MonteCarloParams {
            simulations: 2_000,
            seed,
            ..MonteCarloParams::default()
        }
    }

    #[test]
    fn test_profile_learning() {
        let history = vec![
            Draw::new(1, "2024-01-01", &[1, 2, 3]),
            Draw::new(2, "2024-01-02", &[3, 5, 7]),
        ];
        let profile = DrawProfile::learn(&history, 3);
        assert!((profile.sum_mean - 10.5).abs() < 1e-12);
        assert!((profile.spread_mean - 3.0).abs() < 1e-12);
        // impairs : 2 puis 3
        assert_eq!(profile.odd_probs, vec![0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_needs_two_draws() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = MonteCarloModel::new(&rules, small_params(1));
        let err = model.train(&[Draw::new(1, "2024-01-01", &[1, 2, 3])]).unwrap_err();
        assert_eq!(err, PredictError::InsufficientData { needed: 2, available: 1 });
    }

    #[test]
    fn test_same_seed_same_prediction() {
        let rules = Game::Megasena.rules();
        let history = make_test_draws(100, &rules);
        let mut a = MonteCarloModel::new(&rules, small_params(7));
        let mut b = MonteCarloModel::new(&rules, small_params(7));
        a.train(&history).unwrap();
        b.train(&history).unwrap();
        assert_eq!(a.predict(6).unwrap(), b.predict(6).unwrap());
        assert!(a.accepted().unwrap() > 0);
    }

    #[test]
    fn test_fallback_when_nothing_accepted() {
        let rules = GameRules::custom(1, 10, 3);
        // écart-type nul et somme 6 : presque aucune simulation ne tombe juste
        let history = vec![
            Draw::new(1, "2024-01-01", &[1, 2, 3]),
            Draw::new(2, "2024-01-02", &[1, 2, 3]),
        ];
        let params = MonteCarloParams {
            simulations: 50,
            min_odd_prob: 1.0,
            ..MonteCarloParams::default()
        };
        let mut model = MonteCarloModel::new(&rules, params);
        model.train(&history).unwrap();
        let pred = model.predict(3).unwrap();
        assert_eq!(pred.len(), 3);
    }

    #[test]
    fn test_invalid_params() {
        let params = MonteCarloParams {
            simulations: 0,
            ..MonteCarloParams::default()
        };
        assert!(params.validate().is_err());
        let params = MonteCarloParams {
            min_odd_prob: 1.5,
            ..MonteCarloParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(50, &rules);
        let mut model = MonteCarloModel::new(&rules, small_params(3));
        model.train(&history).unwrap();
        let state = model.save_snapshot().unwrap();
        let mut restored = MonteCarloModel::new(&rules, small_params(99));
        restored.load_snapshot(state).unwrap();
        assert_eq!(restored.predict(15).unwrap(), model.predict(15).unwrap());
    }
}
