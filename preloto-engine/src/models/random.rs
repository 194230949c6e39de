use preloto_db::models::{Draw, GameRules};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{check_count, check_history, parse_value, unknown_key, Predictor};
use crate::error::{PredictError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomParams {
    pub seed: u64,
}

impl Default for RandomParams {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl RandomParams {
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "seed" => self.seed = parse_value(key, value)?,
            _ => return Err(unknown_key("random", key)),
        }
        Ok(())
    }
}

/// Référence : tirage uniforme sans remise.
pub struct RandomModel {
    rules: GameRules,
    params: RandomParams,
    trained: bool,
}

impl RandomModel {
    pub fn new(rules: &GameRules, params: RandomParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            trained: false,
        }
    }
}

impl Predictor for RandomModel {
    fn name(&self) -> &str {
        "random"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        check_history(history, 1)?;
        self.trained = true;
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        if !self.trained {
            return Err(PredictError::NotTrained(self.name().to_string()));
        }
        check_count(&self.rules, count)?;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut picked: Vec<u8> = rand::seq::index::sample(&mut rng, self.rules.size(), count)
            .into_iter()
            .map(|i| self.rules.number_at(i))
            .collect();
        picked.sort_unstable();
        Ok(picked)
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        if !self.trained {
            return Err(PredictError::NotTrained(self.name().to_string()));
        }
        Ok(serde_json::json!({ "seed": self.params.seed }))
    }

    fn load_snapshot(&mut self, _state: serde_json::Value) -> Result<()> {
        self.trained = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::make_test_draws;
    use preloto_db::models::Game;

    #[test]
    fn test_seeded_sample() {
        let rules = Game::Lotofacil.rules();
        let history = make_test_draws(5, &rules);
        let mut a = RandomModel::new(&rules, RandomParams { seed: 11 });
        a.train(&history).unwrap();
        let first = a.predict(15).unwrap();
        assert_eq!(first, a.predict(15).unwrap());
        assert_eq!(first.len(), 15);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_full_range() {
        let rules = GameRules::custom(1, 5, 2);
        let mut model = RandomModel::new(&rules, RandomParams::default());
        model.train(&[Draw::new(1, "2024-01-01", &[1, 2])]).unwrap();
        assert_eq!(model.predict(5).unwrap(), vec![1, 2, 3, 4, 5]);
    }
}
