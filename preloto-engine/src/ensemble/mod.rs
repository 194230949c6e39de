pub mod consensus;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use preloto_db::models::{Draw, GameRules};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::{count_hits, DEFAULT_WARMUP_MARGIN};
use crate::error::{PredictError, Result};
use crate::models::{check_count, Predictor, PredictorConfig, PredictorKind};
use crate::snapshot::{read_snapshot, SnapshotStore};

pub use consensus::{ConsensusSet, VoteTally};

/// Un membre de l'ensemble : un nom, sa configuration et un snapshot éventuel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSpec {
    pub name: String,
    pub config: PredictorConfig,
    #[serde(default)]
    pub snapshot: Option<PathBuf>,
}

impl MemberSpec {
    pub fn new(name: impl Into<String>, config: PredictorConfig) -> Self {
        Self {
            name: name.into(),
            config,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot = Some(path);
        self
    }
}

/// Composition par défaut.
pub fn default_lineup() -> Vec<MemberSpec> {
    [
        PredictorKind::MonteCarlo,
        PredictorKind::RandomForest,
        PredictorKind::Frequency,
        PredictorKind::Gap,
        PredictorKind::Surfing,
    ]
    .into_iter()
    .map(|kind| MemberSpec::new(kind.as_str(), PredictorConfig::default_for(kind)))
    .collect()
}

/// Rattache à chaque membre sans chemin explicite son emplacement dans le magasin.
pub fn bind_snapshots(specs: Vec<MemberSpec>, store: &SnapshotStore, game_slug: &str) -> Vec<MemberSpec> {
    specs
        .into_iter()
        .map(|spec| {
            if spec.snapshot.is_some() {
                spec
            } else {
                let path = store.path_for(game_slug, &spec.name);
                spec.with_snapshot(path)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberMode {
    /// Snapshot chargé : jamais réentraîné.
    Frozen,
    /// Prédicteur neuf entraîné à chaque tour.
    Retrain,
}

struct Member {
    spec: MemberSpec,
    mode: MemberMode,
    frozen: Option<Box<dyn Predictor>>,
}

impl Member {
    fn prepare(spec: MemberSpec, rules: &GameRules) -> Self {
        let frozen = spec.snapshot.as_ref().and_then(|path| {
            match read_snapshot(path, spec.config.kind()) {
                Ok(Some(snapshot)) => match snapshot.restore(rules) {
                    Ok(predictor) => {
                        log::info!(
                            "{} : snapshot {:?} chargé ({} tirages)",
                            spec.name,
                            path,
                            snapshot.trained_on
                        );
                        Some(predictor)
                    }
                    Err(e) => {
                        log::warn!("{} : snapshot {:?} inutilisable ({e}), réentraînement", spec.name, path);
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    log::warn!("{} : snapshot illisible ({e:#}), réentraînement", spec.name);
                    None
                }
            }
        });
        let mode = if frozen.is_some() { MemberMode::Frozen } else { MemberMode::Retrain };
        Self { spec, mode, frozen }
    }

    fn predict_round(&self, rules: &GameRules, train: &[Draw], count: usize) -> Result<Vec<u8>> {
        match &self.frozen {
            Some(predictor) => predictor.predict(count),
            None => {
                let mut predictor = self.spec.config.build(rules);
                predictor.train(train)?;
                predictor.predict(count)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPrediction {
    pub name: String,
    pub numbers: Vec<u8>,
    pub hits: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub threshold: usize,
    pub numbers: Vec<u8>,
    pub hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleRound {
    pub draw_index: usize,
    pub contest: u32,
    pub target: Vec<u8>,
    pub predictions: Vec<MemberPrediction>,
    pub consensus: Vec<ConsensusRecord>,
    pub suggestion: Vec<u8>,
    pub suggestion_hits: usize,
    /// membre -> erreur
    pub failures: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleBacktest {
    pub members: Vec<(String, MemberMode)>,
    pub count: usize,
    pub rounds_simulated: usize,
    pub member_hits: BTreeMap<String, usize>,
    /// seuil -> total des bons numéros de l'ensemble consensuel
    pub consensus_hits: BTreeMap<usize, usize>,
    pub suggestion_hits: usize,
    pub rounds: Vec<EnsembleRound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePrediction {
    pub members: Vec<(String, MemberMode)>,
    pub trained_on: usize,
    pub predictions: Vec<MemberPrediction>,
    pub ranking: Vec<(u8, usize)>,
    pub consensus: Vec<ConsensusSet>,
    pub suggestion: Vec<u8>,
    pub failures: BTreeMap<String, String>,
}

struct RoundVotes {
    predictions: Vec<MemberPrediction>,
    tally: VoteTally,
    failures: BTreeMap<String, String>,
}

/// Moteur de consensus : plusieurs prédicteurs votent, les numéros les plus cités gagnent.
pub struct EnsembleEngine {
    rules: GameRules,
    members: Vec<Member>,
    warmup_margin: usize,
}

impl EnsembleEngine {
    /// Valide les membres et fixe une fois pour toutes le mode de chacun.
    pub fn new(rules: &GameRules, specs: Vec<MemberSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(PredictError::invalid("ensemble vide"));
        }
        let mut names = HashSet::new();
        for spec in &specs {
            spec.config.validate()?;
            if !names.insert(spec.name.clone()) {
                return Err(PredictError::invalid(format!("membre en double : {}", spec.name)));
            }
        }
        let members = specs.into_iter().map(|spec| Member::prepare(spec, rules)).collect();
        Ok(Self {
            rules: rules.clone(),
            members,
            warmup_margin: DEFAULT_WARMUP_MARGIN,
        })
    }

    pub fn with_warmup_margin(mut self, margin: usize) -> Self {
        self.warmup_margin = margin;
        self
    }

    pub fn modes(&self) -> Vec<(String, MemberMode)> {
        self.members.iter().map(|m| (m.spec.name.clone(), m.mode)).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn play_round(&self, train: &[Draw], count: usize) -> RoundVotes {
        let outcomes: Vec<(String, Result<Vec<u8>>)> = self
            .members
            .par_iter()
            .map(|m| (m.spec.name.clone(), m.predict_round(&self.rules, train, count)))
            .collect();

        let mut predictions = Vec::with_capacity(outcomes.len());
        let mut failures = BTreeMap::new();
        for (name, outcome) in outcomes {
            let numbers = match outcome {
                Ok(numbers) => numbers,
                Err(e) => {
                    log::warn!("{name} : aucun vote ({e})");
                    failures.insert(name.clone(), e.to_string());
                    Vec::new()
                }
            };
            predictions.push(MemberPrediction { name, numbers, hits: None });
        }
        let tally = VoteTally::from_predictions(predictions.iter().map(|p| p.numbers.as_slice()));
        RoundVotes {
            predictions,
            tally,
            failures,
        }
    }

    pub fn run_backtest(&self, history: &[Draw], draws_to_test: usize, count: usize) -> Result<EnsembleBacktest> {
        self.run_backtest_with(history, draws_to_test, count, |_| {})
    }

    /// Rejeu chronologique ; `on_round` est appelé après chaque tour simulé.
    pub fn run_backtest_with(
        &self,
        history: &[Draw],
        draws_to_test: usize,
        count: usize,
        mut on_round: impl FnMut(&EnsembleRound),
    ) -> Result<EnsembleBacktest> {
        check_count(&self.rules, count)?;
        let n = history.len();
        let window = draws_to_test.min(n);
        let start = n - window;
        if window > 0 && start < self.warmup_margin {
            log::warn!(
                "Ensemble : premier tour à l'index {start}, sous la marge de chauffe ({} tirages)",
                self.warmup_margin
            );
        }
        log::info!("Ensemble : {} membres, {window} tours, {count} numéros", self.members.len());

        let mut report = EnsembleBacktest {
            members: self.modes(),
            count,
            rounds_simulated: 0,
            member_hits: self.members.iter().map(|m| (m.spec.name.clone(), 0)).collect(),
            consensus_hits: (2..=self.members.len()).map(|t| (t, 0)).collect(),
            suggestion_hits: 0,
            rounds: Vec::with_capacity(window),
        };

        for i in start..n {
            let target = &history[i];
            let votes = self.play_round(&history[..i], count);

            let mut predictions = votes.predictions;
            for p in &mut predictions {
                let hits = count_hits(&p.numbers, &target.numbers);
                p.hits = Some(hits);
                if let Some(total) = report.member_hits.get_mut(&p.name) {
                    *total += hits;
                }
            }

            let consensus: Vec<ConsensusRecord> = votes
                .tally
                .consensus_sets()
                .into_iter()
                .map(|set| {
                    let hits = count_hits(&set.numbers, &target.numbers);
                    *report.consensus_hits.entry(set.threshold).or_insert(0) += hits;
                    ConsensusRecord {
                        threshold: set.threshold,
                        numbers: set.numbers,
                        hits,
                    }
                })
                .collect();

            let suggestion = votes.tally.suggestion(count);
            let suggestion_hits = count_hits(&suggestion, &target.numbers);
            report.suggestion_hits += suggestion_hits;
            report.rounds_simulated += 1;

            let round = EnsembleRound {
                draw_index: i,
                contest: target.contest,
                target: target.numbers.clone(),
                predictions,
                consensus,
                suggestion,
                suggestion_hits,
                failures: votes.failures,
            };
            on_round(&round);
            report.rounds.push(round);
        }

        log::info!(
            "Ensemble terminé : {} tours, suggestion {} bons numéros au total",
            report.rounds_simulated,
            report.suggestion_hits
        );
        Ok(report)
    }

    /// Un seul tour sur l'historique complet.
    pub fn predict_live(&self, history: &[Draw], count: usize) -> Result<LivePrediction> {
        check_count(&self.rules, count)?;
        let votes = self.play_round(history, count);
        Ok(LivePrediction {
            members: self.modes(),
            trained_on: history.len(),
            ranking: votes.tally.ranking(),
            consensus: votes.tally.consensus_sets(),
            suggestion: votes.tally.suggestion(count),
            predictions: votes.predictions,
            failures: votes.failures,
        })
    }
}
