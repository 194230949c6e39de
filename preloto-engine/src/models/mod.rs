pub mod frequency;
pub mod gap;
pub mod surfing;
pub mod hybrid;
pub mod monte_carlo;
pub mod random_forest;
pub mod random;

use preloto_db::models::{Draw, GameRules};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};

pub use frequency::{FrequencyOrder, FrequencyParams};
pub use hybrid::{HybridParams, Weights};
pub use monte_carlo::MonteCarloParams;
pub use random_forest::ForestParams;
pub use random::RandomParams;
pub use surfing::SurfingParams;

/// Contrat commun à tous les prédicteurs.
/// `history` est chronologique : history[0] = le plus ancien tirage.
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;
    fn train(&mut self, history: &[Draw]) -> Result<()>;
    /// Retourne exactement `count` numéros distincts, triés par ordre croissant.
    fn predict(&self, count: usize) -> Result<Vec<u8>>;
    fn save_snapshot(&self) -> Result<serde_json::Value>;
    fn load_snapshot(&mut self, state: serde_json::Value) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    Frequency,
    Gap,
    Surfing,
    Hybrid,
    MonteCarlo,
    RandomForest,
    Random,
}

impl PredictorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorKind::Frequency => "frequency",
            PredictorKind::Gap => "gap",
            PredictorKind::Surfing => "surfing",
            PredictorKind::Hybrid => "hybrid",
            PredictorKind::MonteCarlo => "monte_carlo",
            PredictorKind::RandomForest => "random_forest",
            PredictorKind::Random => "random",
        }
    }
}

impl std::fmt::Display for PredictorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration explicite d'un prédicteur : chaque variante ne porte que les
/// paramètres qu'elle reconnaît.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictorConfig {
    Frequency(FrequencyParams),
    Gap,
    Surfing(SurfingParams),
    Hybrid(HybridParams),
    MonteCarlo(MonteCarloParams),
    RandomForest(ForestParams),
    Random(RandomParams),
}

impl PredictorConfig {
    pub fn default_for(kind: PredictorKind) -> Self {
        match kind {
            PredictorKind::Frequency => PredictorConfig::Frequency(FrequencyParams::default()),
            PredictorKind::Gap => PredictorConfig::Gap,
            PredictorKind::Surfing => PredictorConfig::Surfing(SurfingParams::default()),
            PredictorKind::Hybrid => PredictorConfig::Hybrid(HybridParams::default()),
            PredictorKind::MonteCarlo => PredictorConfig::MonteCarlo(MonteCarloParams::default()),
            PredictorKind::RandomForest => PredictorConfig::RandomForest(ForestParams::default()),
            PredictorKind::Random => PredictorConfig::Random(RandomParams::default()),
        }
    }

    /// Construit une configuration à partir de paires `clé=valeur`.
    /// Une clé inconnue pour ce type de prédicteur est une erreur.
    pub fn from_params(kind: PredictorKind, params: &[(String, String)]) -> Result<Self> {
        let mut config = Self::default_for(kind);
        for (key, value) in params {
            config.set(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match self {
            PredictorConfig::Frequency(p) => p.set(key, value),
            PredictorConfig::Gap => Err(PredictError::invalid(format!(
                "le prédicteur gap n'accepte aucun paramètre (reçu '{key}')"
            ))),
            PredictorConfig::Surfing(p) => p.set(key, value),
            PredictorConfig::Hybrid(p) => p.set(key, value),
            PredictorConfig::MonteCarlo(p) => p.set(key, value),
            PredictorConfig::RandomForest(p) => p.set(key, value),
            PredictorConfig::Random(p) => p.set(key, value),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PredictorConfig::Frequency(_) | PredictorConfig::Gap | PredictorConfig::Random(_) => Ok(()),
            PredictorConfig::Surfing(p) => p.validate(),
            PredictorConfig::Hybrid(p) => p.validate(),
            PredictorConfig::MonteCarlo(p) => p.validate(),
            PredictorConfig::RandomForest(p) => p.validate(),
        }
    }

    pub fn kind(&self) -> PredictorKind {
        match self {
            PredictorConfig::Frequency(_) => PredictorKind::Frequency,
            PredictorConfig::Gap => PredictorKind::Gap,
            PredictorConfig::Surfing(_) => PredictorKind::Surfing,
            PredictorConfig::Hybrid(_) => PredictorKind::Hybrid,
            PredictorConfig::MonteCarlo(_) => PredictorKind::MonteCarlo,
            PredictorConfig::RandomForest(_) => PredictorKind::RandomForest,
            PredictorConfig::Random(_) => PredictorKind::Random,
        }
    }

    /// Fabrique : un prédicteur neuf, non entraîné.
    pub fn build(&self, rules: &GameRules) -> Box<dyn Predictor> {
        match self {
            PredictorConfig::Frequency(p) => Box::new(frequency::FrequencyModel::new(rules, *p)),
            PredictorConfig::Gap => Box::new(gap::GapModel::new(rules)),
            PredictorConfig::Surfing(p) => Box::new(surfing::SurfingModel::new(rules, *p)),
            PredictorConfig::Hybrid(p) => Box::new(hybrid::HybridModel::new(rules, *p)),
            PredictorConfig::MonteCarlo(p) => Box::new(monte_carlo::MonteCarloModel::new(rules, *p)),
            PredictorConfig::RandomForest(p) => Box::new(random_forest::RandomForestModel::new(rules, *p)),
            PredictorConfig::Random(p) => Box::new(random::RandomModel::new(rules, *p)),
        }
    }

    pub fn is_stochastic(&self) -> bool {
        self.seed().is_some()
    }

    pub fn seed(&self) -> Option<u64> {
        match self {
            PredictorConfig::MonteCarlo(p) => Some(p.seed),
            PredictorConfig::RandomForest(p) => Some(p.seed),
            PredictorConfig::Random(p) => Some(p.seed),
            _ => None,
        }
    }

    /// Même configuration avec une autre graine (sans effet sur les modèles déterministes).
    pub fn with_seed(&self, seed: u64) -> Self {
        let mut config = self.clone();
        match &mut config {
            PredictorConfig::MonteCarlo(p) => p.seed = seed,
            PredictorConfig::RandomForest(p) => p.seed = seed,
            PredictorConfig::Random(p) => p.seed = seed,
            _ => {}
        }
        config
    }
}

pub fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| PredictError::invalid(format!("valeur invalide pour {key} : '{value}'")))
}

pub fn unknown_key(model: &str, key: &str) -> PredictError {
    PredictError::invalid(format!("paramètre inconnu pour {model} : '{key}'"))
}

/// Parse `clé=valeur` (ou `clé:valeur`).
pub fn parse_param(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .or_else(|| raw.split_once(':'))
        .ok_or_else(|| PredictError::invalid(format!("format attendu clé=valeur : '{raw}'")))?;
    Ok((key.trim().to_lowercase(), value.trim().to_string()))
}

pub fn check_count(rules: &GameRules, count: usize) -> Result<()> {
    if count == 0 || count > rules.size() {
        return Err(PredictError::invalid(format!(
            "nombre de numéros demandé {count} hors de 1..={}",
            rules.size()
        )));
    }
    Ok(())
}

pub fn check_history(history: &[Draw], needed: usize) -> Result<()> {
    if history.len() < needed {
        return Err(PredictError::InsufficientData {
            needed,
            available: history.len(),
        });
    }
    Ok(())
}

/// Top `count` par score décroissant ; à score égal, le plus petit numéro d'abord.
/// Résultat trié par ordre croissant.
pub fn rank_top(rules: &GameRules, scores: &[f64], count: usize) -> Vec<u8> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let mut picked: Vec<u8> = indices
        .into_iter()
        .take(count)
        .map(|idx| rules.number_at(idx))
        .collect();
    picked.sort_unstable();
    picked
}

pub(crate) fn encode_state<T: Serialize>(state: Option<&T>, name: &str) -> Result<serde_json::Value> {
    let state = state.ok_or_else(|| PredictError::NotTrained(name.to_string()))?;
    Ok(serde_json::to_value(state)?)
}

pub(crate) fn decode_state<T: DeserializeOwned>(state: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(state)?)
}

pub(crate) fn check_state_len(len: usize, rules: &GameRules) -> Result<()> {
    if len != rules.size() {
        return Err(PredictError::Snapshot(format!(
            "{} valeurs dans le snapshot, {} attendues pour {}",
            len,
            rules.size(),
            rules.slug
        )));
    }
    Ok(())
}

/// Historique synthétique déterministe, `n` tirages valides pour `rules`.
pub fn make_test_draws(n: usize, rules: &GameRules) -> Vec<Draw> {
    let size = rules.size();
    (0..n)
        .map(|i| {
            let mut numbers: Vec<u8> = Vec::with_capacity(rules.draw_count);
            let mut cursor = (i * 7) % size;
            while numbers.len() < rules.draw_count {
                let n = rules.number_at(cursor % size);
                if numbers.contains(&n) {
                    cursor += 1;
                } else {
                    numbers.push(n);
                    cursor += 3;
                }
            }
            Draw::new(
                i as u32 + 1,
                format!("2024-{:02}-{:02}", (i / 28) % 12 + 1, (i % 28) + 1),
                &numbers,
            )
        })
        .collect()
}

/// Dix tirages sur 1..=10 : [1, 2, 3] sort cinq fois, dont au dernier tirage.
#[cfg(test)]
pub(crate) fn scenario_history() -> Vec<Draw> {
    [
        [1, 2, 3],
        [1, 4, 5],
        [2, 3, 6],
        [7, 8, 9],
        [1, 2, 3],
        [4, 5, 6],
        [7, 8, 9],
        [1, 2, 3],
        [10, 5, 6],
        [1, 2, 3],
    ]
    .iter()
    .enumerate()
    .map(|(i, nums)| Draw::new(i as u32 + 1, format!("2024-01-{:02}", i + 1), nums))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use preloto_db::models::{validate_draw, Game};

    #[test]
    fn test_make_test_draws_valid() {
        for game in [Game::Megasena, Game::Lotofacil, Game::Quina] {
            let rules = game.rules();
            for draw in make_test_draws(40, &rules) {
                assert!(validate_draw(&draw.numbers, &rules).is_ok(), "{:?}", draw);
            }
        }
    }

    #[test]
    fn test_rank_top_tie_break_ascending() {
        let rules = GameRules::custom(1, 5, 2);
        let scores = vec![1.0, 3.0, 3.0, 0.0, 3.0];
        assert_eq!(rank_top(&rules, &scores, 2), vec![2, 3]);
    }

    #[test]
    fn test_from_params_hybrid() {
        let params = vec![
            ("w_gap".to_string(), "2.5".to_string()),
            ("window".to_string(), "10".to_string()),
        ];
        let config = PredictorConfig::from_params(PredictorKind::Hybrid, &params).unwrap();
        match config {
            PredictorConfig::Hybrid(p) => {
                assert_eq!(p.w_gap, 2.5);
                assert_eq!(p.w_freq, 1.0);
                assert_eq!(p.window, 10);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_from_params_unknown_key() {
        let params = vec![("epochs".to_string(), "10".to_string())];
        let err = PredictorConfig::from_params(PredictorKind::Surfing, &params).unwrap_err();
        assert!(matches!(err, PredictError::InvalidParameter(_)));
    }

    #[test]
    fn test_from_params_gap_rejects_any_key() {
        let params = vec![("window".to_string(), "10".to_string())];
        assert!(PredictorConfig::from_params(PredictorKind::Gap, &params).is_err());
    }

    #[test]
    fn test_from_params_bad_value() {
        let params = vec![("w_gap".to_string(), "abc".to_string())];
        assert!(PredictorConfig::from_params(PredictorKind::Hybrid, &params).is_err());
    }

    #[test]
    fn test_parse_param_formats() {
        assert_eq!(parse_param("w_gap=1.5").unwrap(), ("w_gap".to_string(), "1.5".to_string()));
        assert_eq!(parse_param("order:asc").unwrap(), ("order".to_string(), "asc".to_string()));
        assert!(parse_param("garbage").is_err());
    }

    #[test]
    fn test_config_json_roundtrip_tagged() {
        let config = PredictorConfig::default_for(PredictorKind::MonteCarlo);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"kind\":\"monte_carlo\""));
        let back: PredictorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        let gap: PredictorConfig = serde_json::from_str("{\"kind\":\"gap\"}").unwrap();
        assert_eq!(gap, PredictorConfig::Gap);
    }

    #[test]
    fn test_with_seed() {
        let config = PredictorConfig::default_for(PredictorKind::Random).with_seed(7);
        assert_eq!(config.seed(), Some(7));
        assert!(!PredictorConfig::Gap.is_stochastic());
    }

    #[test]
    fn test_every_kind_predicts_valid_sets() {
        let rules = Game::Megasena.rules();
        let history = make_test_draws(80, &rules);
        let kinds = [
            PredictorKind::Frequency,
            PredictorKind::Gap,
            PredictorKind::Surfing,
            PredictorKind::Hybrid,
            PredictorKind::MonteCarlo,
            PredictorKind::Random,
        ];
        for kind in kinds {
            let mut model = PredictorConfig::default_for(kind).build(&rules);
            model.train(&history).unwrap();
            let pred = model.predict(10).unwrap();
            assert_eq!(pred.len(), 10, "{kind}");
            assert!(pred.windows(2).all(|w| w[0] < w[1]), "{kind}: {:?}", pred);
            assert!(pred.iter().all(|&n| (1..=60).contains(&n)), "{kind}");
        }
    }

    #[test]
    fn test_every_kind_rejects_empty_history() {
        let rules = Game::Quina.rules();
        for kind in [
            PredictorKind::Frequency,
            PredictorKind::Gap,
            PredictorKind::Surfing,
            PredictorKind::Hybrid,
            PredictorKind::MonteCarlo,
            PredictorKind::RandomForest,
            PredictorKind::Random,
        ] {
            let mut model = PredictorConfig::default_for(kind).build(&rules);
            let err = model.train(&[]).unwrap_err();
            assert!(matches!(err, PredictError::InsufficientData { .. }), "{kind}: {err}");
        }
    }

    #[test]
    fn test_predict_before_train_fails() {
        let rules = Game::Quina.rules();
        let model = PredictorConfig::Gap.build(&rules);
        assert!(matches!(model.predict(5), Err(PredictError::NotTrained(_))));
    }
}
