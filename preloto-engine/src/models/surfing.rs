use preloto_db::models::{Draw, GameRules};
use serde::{Deserialize, Serialize};

use super::{check_count, check_history, check_state_len, decode_state, encode_state, parse_value, rank_top, unknown_key, Predictor};
use crate::error::{PredictError, Result};
use crate::features::window_counts;

pub const DEFAULT_WINDOW: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfingParams {
    pub window: usize,
}

impl Default for SurfingParams {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

impl SurfingParams {
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "window" => self.window = parse_value(key, value)?,
            _ => return Err(unknown_key("surfing", key)),
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(PredictError::invalid("surfing : window doit être > 0"));
        }
        Ok(())
    }
}

/// Numéros chauds sur la fenêtre glissante.
pub struct SurfingModel {
    rules: GameRules,
    params: SurfingParams,
    counts: Option<Vec<u32>>,
}

impl SurfingModel {
    pub fn new(rules: &GameRules, params: SurfingParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            counts: None,
        }
    }

    pub fn counts(&self) -> Option<&[u32]> {
        self.counts.as_deref()
    }
}

impl Predictor for SurfingModel {
    fn name(&self) -> &str {
        "surfing"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        self.params.validate()?;
        check_history(history, 1)?;
        self.counts = Some(window_counts(history, &self.rules, self.params.window));
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let counts = self
            .counts
            .as_ref()
            .ok_or_else(|| PredictError::NotTrained(self.name().to_string()))?;
        check_count(&self.rules, count)?;
        let scores: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
        Ok(rank_top(&self.rules, &scores, count))
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        encode_state(self.counts.as_ref(), self.name())
    }

    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()> {
        let counts: Vec<u32> = decode_state(state)?;
        check_state_len(counts.len(), &self.rules)?;
        self.counts = Some(counts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scenario_history;

    #[test]
    fn test_window_restricts_to_recent_draws() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = SurfingModel::new(&rules, SurfingParams { window: 2 });
        model.train(&scenario_history()).unwrap();
        // deux derniers tirages : [10, 5, 6] et [1, 2, 3]
        assert_eq!(model.predict(6).unwrap(), vec![1, 2, 3, 5, 6, 10]);
        assert_eq!(model.counts().unwrap()[6], 0);
    }

    #[test]
    fn test_window_larger_than_history() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = SurfingModel::new(&rules, SurfingParams::default());
        model.train(&scenario_history()).unwrap();
        assert_eq!(model.predict(1).unwrap(), vec![1]);
    }

    #[test]
    fn test_zero_window_rejected() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = SurfingModel::new(&rules, SurfingParams { window: 0 });
        assert!(matches!(
            model.train(&scenario_history()),
            Err(PredictError::InvalidParameter(_))
        ));
    }
}
