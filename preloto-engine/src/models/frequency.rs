use preloto_db::models::{Draw, GameRules};
use serde::{Deserialize, Serialize};

use super::{check_count, check_history, check_state_len, decode_state, encode_state, rank_top, unknown_key, Predictor};
use crate::error::{PredictError, Result};
use crate::features::FeatureTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyOrder {
    /// Les plus sortis d'abord.
    #[default]
    Desc,
    /// Les moins sortis d'abord.
    Asc,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyParams {
    pub order: FrequencyOrder,
}

impl FrequencyParams {
    pub(crate) fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "order" => {
                self.order = match value.trim().to_lowercase().as_str() {
                    "desc" => FrequencyOrder::Desc,
                    "asc" => FrequencyOrder::Asc,
                    other => {
                        return Err(PredictError::invalid(format!(
                            "ordre inconnu '{other}' (asc ou desc)"
                        )))
                    }
                };
                Ok(())
            }
            _ => Err(unknown_key("frequency", key)),
        }
    }
}

pub struct FrequencyModel {
    rules: GameRules,
    params: FrequencyParams,
    counts: Option<Vec<u32>>,
}

impl FrequencyModel {
    pub fn new(rules: &GameRules, params: FrequencyParams) -> Self {
        Self {
            rules: rules.clone(),
            params,
            counts: None,
        }
    }

    /// Fréquences cumulées, None avant entraînement.
    pub fn counts(&self) -> Option<&[u32]> {
        self.counts.as_deref()
    }
}

impl Predictor for FrequencyModel {
    fn name(&self) -> &str {
        "frequency"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        check_history(history, 1)?;
        let tracker = FeatureTracker::from_history(&self.rules, history, 1);
        self.counts = Some(tracker.frequencies().to_vec());
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let counts = self
            .counts
            .as_ref()
            .ok_or_else(|| PredictError::NotTrained(self.name().to_string()))?;
        check_count(&self.rules, count)?;
        let scores: Vec<f64> = match self.params.order {
            FrequencyOrder::Desc => counts.iter().map(|&c| c as f64).collect(),
            FrequencyOrder::Asc => counts.iter().map(|&c| -(c as f64)).collect(),
        };
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
    fn test_most_frequent_with_tie_break() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = FrequencyModel::new(&rules, FrequencyParams::default());
        model.train(&scenario_history()).unwrap();
        assert_eq!(model.predict(1).unwrap(), vec![1]);
        assert_eq!(model.predict(3).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ascending_order() {
        let rules = GameRules::custom(1, 10, 3);
        let params = FrequencyParams { order: FrequencyOrder::Asc };
        let mut model = FrequencyModel::new(&rules, params);
        model.train(&scenario_history()).unwrap();
        // 10 n'est sorti qu'une fois
        assert_eq!(model.predict(1).unwrap(), vec![10]);
    }

    #[test]
    fn test_count_out_of_range() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = FrequencyModel::new(&rules, FrequencyParams::default());
        model.train(&scenario_history()).unwrap();
        assert!(matches!(model.predict(0), Err(PredictError::InvalidParameter(_))));
        assert!(matches!(model.predict(11), Err(PredictError::InvalidParameter(_))));
        assert_eq!(model.predict(10).unwrap().len(), 10);
    }

    #[test]
    fn test_snapshot_restores_predictions() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = FrequencyModel::new(&rules, FrequencyParams::default());
        model.train(&scenario_history()).unwrap();
        let state = model.save_snapshot().unwrap();

        let mut restored = FrequencyModel::new(&rules, FrequencyParams::default());
        restored.load_snapshot(state).unwrap();
        assert_eq!(restored.predict(4).unwrap(), model.predict(4).unwrap());
    }

    #[test]
    fn test_snapshot_wrong_size_rejected() {
        let rules = GameRules::custom(1, 10, 3);
        let mut model = FrequencyModel::new(&rules, FrequencyParams::default());
        let err = model.load_snapshot(serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, PredictError::Snapshot(_)));
    }

    #[test]
    fn test_set_order_param() {
        let mut params = FrequencyParams::default();
        params.set("order", "ASC").unwrap();
        assert_eq!(params.order, FrequencyOrder::Asc);
        assert!(params.set("order", "sideways").is_err());
        assert!(params.set("window", "3").is_err());
    }
}
