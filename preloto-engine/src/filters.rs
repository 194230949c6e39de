use preloto_db::models::{Draw, GameRules};
use serde::Serialize;

use crate::error::{PredictError, Result};
use crate::models::PredictorConfig;

pub const MAX_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    fn parse(key: &str, raw: &str) -> Result<Self> {
        let bad = || PredictError::invalid(format!("intervalle invalide pour {key} : '{raw}'"));
        let (min, max) = match raw.split_once('-') {
            Some((lo, hi)) => (
                lo.trim().parse::<u32>().map_err(|_| bad())?,
                hi.trim().parse::<u32>().map_err(|_| bad())?,
            ),
            None => {
                let v = raw.trim().parse::<u32>().map_err(|_| bad())?;
                (v, v)
            }
        };
        if min > max {
            return Err(bad());
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Filtres statistiques sur une grille : `sum:100-200,odd:3,even:2-4,spread:30-55`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionFilter {
    pub sum: Option<Bounds>,
    pub odd: Option<Bounds>,
    pub even: Option<Bounds>,
    pub spread: Option<Bounds>,
}

impl PredictionFilter {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut filter = Self::default();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| PredictError::invalid(format!("filtre sans ':' : '{part}'")))?;
            let key = key.trim().to_lowercase();
            let bounds = Bounds::parse(&key, value)?;
            match key.as_str() {
                "sum" => filter.sum = Some(bounds),
                "odd" => filter.odd = Some(bounds),
                "even" => filter.even = Some(bounds),
                "spread" => filter.spread = Some(bounds),
                other => return Err(PredictError::invalid(format!("filtre inconnu : '{other}'"))),
            }
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_none() && self.odd.is_none() && self.even.is_none() && self.spread.is_none()
    }

    /// Une grille vide n'est jamais valide.
    pub fn validate(&self, numbers: &[u8]) -> bool {
        if numbers.is_empty() {
            return false;
        }
        let draw = Draw::new(0, "", numbers);
        let checks = [
            (self.sum, draw.sum()),
            (self.odd, draw.odd_count() as u32),
            (self.even, draw.even_count() as u32),
            (self.spread, draw.spread() as u32),
        ];
        checks
            .iter()
            .all(|(bounds, value)| bounds.map_or(true, |b| b.contains(*value)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredPrediction {
    pub numbers: Vec<u8>,
    pub attempts: usize,
    pub seed: Option<u64>,
}

/// Entraîne et prédit jusqu'à satisfaire le filtre. Les prédicteurs aléatoires sont
/// relancés avec des graines dérivées, les déterministes n'ont qu'un essai.
pub fn predict_filtered(
    config: &PredictorConfig,
    rules: &GameRules,
    history: &[Draw],
    count: usize,
    filter: &PredictionFilter,
) -> Result<FilteredPrediction> {
    let max_attempts = if config.is_stochastic() { MAX_ATTEMPTS } else { 1 };
    let base_seed = config.seed();

    for attempt in 0..max_attempts {
        let seed = base_seed.map(|s| s.wrapping_add(attempt as u64));
        let attempt_config = match seed {
            Some(s) => config.with_seed(s),
            None => config.clone(),
        };
        let mut predictor = attempt_config.build(rules);
        predictor.train(history)?;
        let numbers = predictor.predict(count)?;
        if filter.validate(&numbers) {
            return Ok(FilteredPrediction {
                numbers,
                attempts: attempt + 1,
                seed,
            });
        }
        log::debug!("Essai {} rejeté par les filtres : {:?}", attempt + 1, numbers);
    }

    Err(PredictError::ModelFailure(format!(
        "aucune prédiction ne satisfait les filtres après {max_attempts} essai(s)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{make_test_draws, PredictorKind, RandomParams};
    use preloto_db::models::Game;

    #[test]
    fn test_parse() {
        let f = PredictionFilter::parse("sum:100-200, odd:3,even:2-4").unwrap();
        assert_eq!(f.sum, Some(Bounds { min: 100, max: 200 }));
        assert_eq!(f.odd, Some(Bounds { min: 3, max: 3 }));
        assert_eq!(f.even, Some(Bounds { min: 2, max: 4 }));
        assert!(f.spread.is_none());
        assert!(PredictionFilter::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(PredictionFilter::parse("sum:200-100").is_err());
        assert!(PredictionFilter::parse("sum:abc").is_err());
        assert!(PredictionFilter::parse("sum").is_err());
        assert!(PredictionFilter::parse("median:3").is_err());
    }

    #[test]
    fn test_validate() {
        let f = PredictionFilter::parse("sum:10-20,odd:2").unwrap();
        assert!(f.validate(&[1, 3, 6, 8]));
        assert!(!f.validate(&[1, 3, 5, 8]));
        assert!(!f.validate(&[10, 11, 12, 13]));
        assert!(!f.validate(&[]));
        assert!(PredictionFilter::default().validate(&[4]));
        assert!(!PredictionFilter::default().validate(&[]));
    }

    #[test]
    fn test_deterministic_single_attempt() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(30, &rules);
        let impossible = PredictionFilter::parse("sum:0-1").unwrap();
        let err = predict_filtered(&PredictorConfig::Gap, &rules, &history, 5, &impossible).unwrap_err();
        assert!(err.to_string().contains("1 essai"));
    }

    #[test]
    fn test_stochastic_retries_until_valid() {
        let rules = GameRules::custom(1, 10, 3);
        let history = vec![Draw::new(1, "2024-01-01", &[1, 2, 3])];
        let filter = PredictionFilter::parse("odd:3").unwrap();
        let config = PredictorConfig::Random(RandomParams { seed: 5 });
        let found = predict_filtered(&config, &rules, &history, 3, &filter).unwrap();
        assert!(filter.validate(&found.numbers));
        assert!(found.attempts >= 1);
        assert_eq!(found.seed, Some(5 + found.attempts as u64 - 1));
        assert_eq!(PredictorConfig::default_for(PredictorKind::Random).seed(), Some(42));
    }
}
