use std::collections::BTreeMap;
use std::sync::Arc;

use preloto_db::models::{Draw, GameRules};
use serde::{Deserialize, Serialize};

use crate::error::{PredictError, Result};
use crate::models::{check_count, Predictor, PredictorConfig};
use crate::pricing::PriceTable;

pub const DEFAULT_WARMUP_MARGIN: usize = 100;

/// Un tour simulé du rejeu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestDetail {
    pub draw_index: usize,
    pub contest: u32,
    pub date: String,
    pub prediction: Vec<u8>,
    pub actual: Vec<u8>,
    pub hits: usize,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub predictor: String,
    pub prediction_size: usize,
    pub total_bets: usize,
    pub total_cost: f64,
    /// nombre de bons numéros -> occurrences
    pub hits_distribution: BTreeMap<usize, usize>,
    pub skipped: usize,
    pub details: Vec<BacktestDetail>,
}

impl BacktestResult {
    pub fn mean_hits(&self) -> f64 {
        if self.total_bets == 0 {
            return 0.0;
        }
        let total: usize = self.hits_distribution.iter().map(|(h, n)| h * n).sum();
        total as f64 / self.total_bets as f64
    }

    pub fn occurrences(&self, hits: usize) -> usize {
        self.hits_distribution.get(&hits).copied().unwrap_or(0)
    }
}

pub fn count_hits(prediction: &[u8], actual: &[u8]) -> usize {
    prediction.iter().filter(|n| actual.contains(n)).count()
}

pub type PredictorFactory = Box<dyn Fn() -> Box<dyn Predictor> + Send + Sync>;

/// Rejeu chronologique : au tour i, un prédicteur neuf est entraîné sur history[..i]
/// puis confronté au tirage i.
pub struct Backtester {
    rules: GameRules,
    factory: PredictorFactory,
    prices: Arc<PriceTable>,
    warmup_margin: usize,
    silent: bool,
}

impl Backtester {
    pub fn new(rules: &GameRules, factory: PredictorFactory) -> Self {
        Self {
            prices: Arc::new(PriceTable::for_game(rules)),
            rules: rules.clone(),
            factory,
            warmup_margin: DEFAULT_WARMUP_MARGIN,
            silent: false,
        }
    }

    pub fn from_config(rules: &GameRules, config: PredictorConfig) -> Self {
        let factory_rules = rules.clone();
        Self::new(rules, Box::new(move || config.build(&factory_rules)))
    }

    pub fn with_prices(mut self, prices: Arc<PriceTable>) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_warmup_margin(mut self, margin: usize) -> Self {
        self.warmup_margin = margin;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn run(&self, history: &[Draw], draws_to_test: usize, prediction_size: usize) -> Result<BacktestResult> {
        if prediction_size == 0 {
            return Err(PredictError::invalid("taille de prédiction nulle"));
        }
        check_count(&self.rules, prediction_size)?;

        let n = history.len();
        let window = draws_to_test.min(n);
        let start = n - window;
        let name = (self.factory)().name().to_string();

        if window > 0 && start < self.warmup_margin {
            log::warn!(
                "{name} : premier tour à l'index {start}, sous la marge de chauffe ({} tirages)",
                self.warmup_margin
            );
        }
        if !self.silent {
            log::info!("Backtest {name} : {window} tours, {prediction_size} numéros par pari");
        }

        let mut result = BacktestResult {
            predictor: name.clone(),
            prediction_size,
            total_bets: 0,
            total_cost: 0.0,
            hits_distribution: BTreeMap::new(),
            skipped: 0,
            details: Vec::with_capacity(window),
        };

        for i in start..n {
            let train = &history[..i];
            let target = &history[i];

            let mut predictor = (self.factory)();
            let outcome = predictor
                .train(train)
                .and_then(|_| predictor.predict(prediction_size));
            let prediction = match outcome {
                Ok(p) => p,
                Err(e @ PredictError::InvalidParameter(_)) => return Err(e),
                Err(e) => {
                    log::debug!("{name} : tour {i} ignoré ({e})");
                    result.skipped += 1;
                    continue;
                }
            };

            let hits = count_hits(&prediction, &target.numbers);
            let cost = self.prices.cost(prediction.len());
            result.total_bets += 1;
            result.total_cost += cost;
            *result.hits_distribution.entry(hits).or_insert(0) += 1;
            result.details.push(BacktestDetail {
                draw_index: i,
                contest: target.contest,
                date: target.date.clone(),
                prediction,
                actual: target.numbers.clone(),
                hits,
                cost,
            });
        }

        if !self.silent {
            log::info!(
                "Backtest {name} terminé : {} paris, {} ignorés, coût {:.2}",
                result.total_bets,
                result.skipped,
                result.total_cost
            );
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{make_test_draws, PredictorKind};
    use preloto_db::models::Game;
    use std::sync::Mutex;

    /// Prédicteur espion : enregistre l'historique vu à chaque entraînement.
    struct Recorder {
        seen: Arc<Mutex<Vec<Vec<u32>>>>,
        trained: bool,
    }

    impl Predictor for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn train(&mut self, history: &[Draw]) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(history.iter().map(|d| d.contest).collect());
            if history.is_empty() {
                return Err(PredictError::InsufficientData { needed: 1, available: 0 });
            }
            self.trained = true;
            Ok(())
        }

        fn predict(&self, count: usize) -> Result<Vec<u8>> {
            assert!(self.trained);
            Ok((1..=count as u8).collect())
        }

        fn save_snapshot(&self) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }

        fn load_snapshot(&mut self, _state: serde_json::Value) -> Result<()> {
            Ok(())
        }
    }

    fn recorder_backtester(rules: &GameRules, seen: Arc<Mutex<Vec<Vec<u32>>>>) -> Backtester {
        Backtester::new(
            rules,
            Box::new(move || {
                Box::new(Recorder {
                    seen: Arc::clone(&seen),
                    trained: false,
                })
            }),
        )
    }

    #[test]
    fn test_no_lookahead() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(30, &rules);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bt = recorder_backtester(&rules, Arc::clone(&seen)).silent(true);
        let result = bt.run(&history, 10, 5).unwrap();

        let seen = seen.lock().unwrap();
        // l'instance créée pour lire le nom n'est jamais entraînée
        assert_eq!(seen.len(), 10);
        for (detail, contests) in result.details.iter().zip(seen.iter()) {
            assert_eq!(contests.len(), detail.draw_index);
            assert!(contests.iter().all(|&c| c < detail.contest));
        }
    }

    #[test]
    fn test_round_zero_skipped() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(5, &rules);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bt = recorder_backtester(&rules, seen).silent(true);
        let result = bt.run(&history, 50, 5).unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.total_bets, 4);
        assert_eq!(result.details[0].draw_index, 1);
    }

    #[test]
    fn test_histogram_conservation() {
        let rules = Game::Megasena.rules();
        let history = make_test_draws(80, &rules);
        let bt = Backtester::from_config(&rules, PredictorConfig::default_for(PredictorKind::Hybrid));
        let result = bt.run(&history, 40, 10).unwrap();
        let total: usize = result.hits_distribution.values().sum();
        assert_eq!(total, result.total_bets);
        assert_eq!(result.total_bets, 40);
        assert!(result.hits_distribution.keys().all(|&h| h <= 10));
        assert_eq!(result.details.len(), 40);
        assert!(result.details.windows(2).all(|w| w[0].draw_index < w[1].draw_index));
    }

    #[test]
    fn test_cost_uses_price_table() {
        let rules = Game::Megasena.rules();
        let history = make_test_draws(20, &rules);
        let bt = Backtester::from_config(&rules, PredictorConfig::Gap).silent(true);
        let result = bt.run(&history, 4, 7).unwrap();
        assert_eq!(result.total_bets, 4);
        assert!((result.total_cost - 4.0 * 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_prediction_size() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(20, &rules);
        let bt = Backtester::from_config(&rules, PredictorConfig::Gap);
        assert!(matches!(bt.run(&history, 5, 0), Err(PredictError::InvalidParameter(_))));
    }

    #[test]
    fn test_window_larger_than_history() {
        let rules = Game::Quina.rules();
        let history = make_test_draws(6, &rules);
        let bt = Backtester::from_config(&rules, PredictorConfig::Gap).silent(true);
        let result = bt.run(&history, 100, 5).unwrap();
        assert_eq!(result.total_bets + result.skipped, 6);
    }

    #[test]
    fn test_count_hits() {
        assert_eq!(count_hits(&[1, 2, 3, 4], &[2, 4, 6]), 2);
        assert_eq!(count_hits(&[], &[2, 4, 6]), 0);
    }
}
