use std::collections::BTreeMap;
use std::sync::Arc;

use preloto_db::models::{Draw, GameRules};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::Backtester;
use crate::error::{PredictError, Result};
use crate::models::surfing::DEFAULT_WINDOW;
use crate::models::{check_count, HybridParams, PredictorConfig, Weights};
use crate::pricing::PriceTable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub mutation_delta: f64,
    pub gene_min: f64,
    pub gene_max: f64,
    /// Tirages rejoués pour évaluer un individu.
    pub fitness_window: usize,
    /// Taille des paris simulés, par défaut le jeu par défaut du loto.
    pub prediction_size: Option<usize>,
    /// Fenêtre de surf du mélange évalué.
    pub surf_window: usize,
    pub seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population: 20,
            generations: 10,
            mutation_rate: 0.1,
            mutation_delta: 1.0,
            gene_min: 0.0,
            gene_max: 10.0,
            fitness_window: 50,
            prediction_size: None,
            surf_window: DEFAULT_WINDOW,
            seed: 42,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population < 2 {
            return Err(PredictError::invalid(format!(
                "population trop petite ({}), 2 minimum",
                self.population
            )));
        }
        if self.generations == 0 {
            return Err(PredictError::invalid("au moins une génération requise"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(PredictError::invalid(format!(
                "taux de mutation hors de [0, 1] ({})",
                self.mutation_rate
            )));
        }
        if !self.mutation_delta.is_finite() || self.mutation_delta < 0.0 {
            return Err(PredictError::invalid(format!(
                "amplitude de mutation invalide ({})",
                self.mutation_delta
            )));
        }
        if !self.gene_min.is_finite() || !self.gene_max.is_finite() || self.gene_min > self.gene_max {
            return Err(PredictError::invalid(format!(
                "bornes des gènes invalides [{}, {}]",
                self.gene_min, self.gene_max
            )));
        }
        if self.gene_min < 0.0 {
            return Err(PredictError::invalid("les poids doivent rester positifs"));
        }
        if self.fitness_window == 0 || self.surf_window == 0 {
            return Err(PredictError::invalid("fenêtres d'évaluation nulles"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    pub best_fitness: f64,
    pub best_weights: Weights,
    pub mean_fitness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub game: String,
    pub best: Weights,
    pub best_fitness: f64,
    pub evaluations: usize,
    pub generations: Vec<GenerationReport>,
}

/// Score d'un histogramme : somme des bons numéros, plus un bonus
/// de 100 × 10^rang pour chaque palier de gain atteint.
pub fn score_histogram(hits: &BTreeMap<usize, usize>, prize_tiers: &[usize]) -> f64 {
    hits.iter()
        .map(|(&h, &occurrences)| {
            let base = (h * occurrences) as f64;
            let bonus = prize_tiers
                .iter()
                .position(|&t| t == h)
                .map(|tier| 100.0 * 10f64.powi(tier as i32) * occurrences as f64)
                .unwrap_or(0.0);
            base + bonus
        })
        .sum()
}

/// Algorithme génétique sur les poids (gap, freq, surf) du mélange hybride.
pub struct GeneticOptimizer {
    rules: GameRules,
    config: OptimizerConfig,
    prices: Arc<PriceTable>,
}

impl GeneticOptimizer {
    pub fn new(rules: &GameRules, config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            prices: Arc::new(PriceTable::for_game(rules)),
            rules: rules.clone(),
            config,
        })
    }

    pub fn with_prices(mut self, prices: Arc<PriceTable>) -> Self {
        self.prices = prices;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn prediction_size(&self) -> usize {
        self.config.prediction_size.unwrap_or(self.rules.default_play)
    }

    /// Backtest du mélange hybride sur les derniers `fitness_window` tirages.
    pub fn fitness(&self, history: &[Draw], weights: &Weights) -> Result<f64> {
        let config = PredictorConfig::Hybrid(HybridParams::from_weights(*weights, self.config.surf_window));
        let result = Backtester::from_config(&self.rules, config)
            .with_prices(Arc::clone(&self.prices))
            .silent(true)
            .run(history, self.config.fitness_window, self.prediction_size())?;
        Ok(score_histogram(&result.hits_distribution, &self.rules.prize_tiers))
    }

    pub fn run(&self, history: &[Draw], on_generation: impl FnMut(&GenerationReport)) -> Result<OptimizationResult> {
        check_count(&self.rules, self.prediction_size())?;
        log::info!(
            "Optimisation {} : population {}, {} générations, fenêtre {}",
            self.rules.slug,
            self.config.population,
            self.config.generations,
            self.config.fitness_window
        );
        let result = self.run_with_fitness(|w| self.fitness(history, w), on_generation)?;
        log::info!("Optimisation terminée : {} (fitness {:.1})", result.best, result.best_fitness);
        Ok(result)
    }

    fn random_gene(&self, rng: &mut StdRng) -> f64 {
        if self.config.gene_max > self.config.gene_min {
            rng.random_range(self.config.gene_min..=self.config.gene_max)
        } else {
            self.config.gene_min
        }
    }

    fn breed(&self, parents: &[Weights], rng: &mut StdRng) -> Weights {
        let a = parents[rng.random_range(0..parents.len())].as_array();
        let b = parents[rng.random_range(0..parents.len())].as_array();
        let mut genes = [0.0; 3];
        for i in 0..3 {
            genes[i] = (a[i] + b[i]) / 2.0;
        }
        if self.config.mutation_delta > 0.0 && rng.random::<f64>() < self.config.mutation_rate {
            let idx = rng.random_range(0..3);
            let delta = self.config.mutation_delta;
            genes[idx] += rng.random_range(-delta..=delta);
        }
        for g in &mut genes {
            *g = g.clamp(self.config.gene_min, self.config.gene_max);
        }
        Weights::from_array(genes)
    }

    /// Boucle génétique avec une fonction de fitness arbitraire.
    /// Une évaluation en échec vaut 0. L'élite garde sa fitness d'une génération à l'autre.
    pub fn run_with_fitness<F>(&self, fitness: F, mut on_generation: impl FnMut(&GenerationReport)) -> Result<OptimizationResult>
    where
        F: Fn(&Weights) -> Result<f64> + Sync,
    {
        self.config.validate()?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let size = self.config.population;

        let mut population: Vec<Weights> = (0..size)
            .map(|_| {
                let gap = self.random_gene(&mut rng);
                let freq = self.random_gene(&mut rng);
                let surf = self.random_gene(&mut rng);
                Weights::new(gap, freq, surf)
            })
            .collect();
        let mut elite: Option<(Weights, f64)> = None;
        let mut reports = Vec::with_capacity(self.config.generations);
        let mut evaluations = 0usize;

        for generation in 0..self.config.generations {
            // l'élite est toujours en tête : on réutilise sa fitness
            let skip = usize::from(elite.is_some());
            let fresh: Vec<f64> = population[skip..]
                .par_iter()
                .map(|w| match fitness(w) {
                    Ok(score) => score,
                    Err(e) => {
                        log::warn!("Évaluation échouée pour {w} : {e}");
                        0.0
                    }
                })
                .collect();
            evaluations += fresh.len();

            let mut scores = Vec::with_capacity(size);
            if let Some((_, score)) = elite {
                scores.push(score);
            }
            scores.extend(fresh);

            let mut ranked: Vec<(Weights, f64)> = population.iter().copied().zip(scores.iter().copied()).collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            let (best_weights, best_fitness) = ranked[0];
            let mean_fitness = scores.iter().sum::<f64>() / scores.len() as f64;
            let report = GenerationReport {
                generation: generation + 1,
                best_fitness,
                best_weights,
                mean_fitness,
            };
            log::debug!(
                "Génération {} : meilleur {:.1} ({}), moyenne {:.1}",
                report.generation,
                best_fitness,
                best_weights,
                mean_fitness
            );
            on_generation(&report);
            reports.push(report);
            elite = Some((best_weights, best_fitness));

            if generation + 1 < self.config.generations {
                let n_parents = (size / 2).max(1);
                let parents: Vec<Weights> = ranked.iter().take(n_parents).map(|(w, _)| *w).collect();
                let mut next = Vec::with_capacity(size);
                next.push(best_weights);
                while next.len() < size {
                    next.push(self.breed(&parents, &mut rng));
                }
                population = next;
            }
        }

        let (best, best_fitness) = elite.ok_or_else(|| PredictError::invalid("aucune génération exécutée"))?;
        Ok(OptimizationResult {
            game: self.rules.slug.clone(),
            best,
            best_fitness,
            evaluations,
            generations: reports,
        })
    }
}
