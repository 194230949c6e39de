use preloto_db::models::{Draw, GameRules};

use super::{check_count, check_history, check_state_len, decode_state, encode_state, rank_top, Predictor};
use crate::error::{PredictError, Result};
use crate::features::FeatureTracker;

/// Numéros en retard : le plus grand écart depuis la dernière sortie.
pub struct GapModel {
    rules: GameRules,
    gaps: Option<Vec<usize>>,
}

impl GapModel {
    pub fn new(rules: &GameRules) -> Self {
        Self {
            rules: rules.clone(),
            gaps: None,
        }
    }

    pub fn gaps(&self) -> Option<&[usize]> {
        self.gaps.as_deref()
    }
}

impl Predictor for GapModel {
    fn name(&self) -> &str {
        "gap"
    }

    fn train(&mut self, history: &[Draw]) -> Result<()> {
        check_history(history, 1)?;
        let tracker = FeatureTracker::from_history(&self.rules, history, 1);
        self.gaps = Some(tracker.gaps().to_vec());
        Ok(())
    }

    fn predict(&self, count: usize) -> Result<Vec<u8>> {
        let gaps = self
            .gaps
            .as_ref()
            .ok_or_else(|| PredictError::NotTrained(self.name().to_string()))?;
        check_count(&self.rules, count)?;
        let scores: Vec<f64> = gaps.iter().map(|&g| g as f64).collect();
        Ok(rank_top(&self.rules, &scores, count))
    }

    fn save_snapshot(&self) -> Result<serde_json::Value> {
        encode_state(self.gaps.as_ref(), self.name())
    }

    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()> {
        let gaps: Vec<usize> = decode_state(state)?;
        check_state_len(gaps.len(), &self.rules)?;
        self.gaps = Some(gaps);
        Ok(())
    }
}
