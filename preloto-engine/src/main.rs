use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use preloto_db::db::{count_draws, db_path, fetch_history, migrate, open_db};
use preloto_db::models::{Draw, Game, GameRules};
use preloto_engine::backtest::Backtester;
use preloto_engine::config::{EngineConfig, DEFAULT_CONFIG_FILE};
use preloto_engine::display;
use preloto_engine::ensemble::{bind_snapshots, EnsembleEngine, MemberSpec};
use preloto_engine::filters::{predict_filtered, PredictionFilter};
use preloto_engine::models::{parse_param, HybridParams, PredictorConfig, PredictorKind};
use preloto_engine::optimizer::GeneticOptimizer;
use preloto_engine::pricing::PriceTable;
use preloto_engine::snapshot::{Snapshot, SnapshotStore};

#[derive(Parser)]
#[command(name = "preloto-engine", about = "Backtest, consensus d'ensemble et optimisation des poids")]
struct Cli {
    /// Jeu
    #[arg(short, long, global = true, default_value = "megasena")]
    game: Game,

    /// Fichier de configuration du moteur
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Grille de prix JSON (remplace la grille calculée)
    #[arg(long, global = true)]
    prices: Option<PathBuf>,

    /// Afficher le résultat en JSON
    #[arg(long, global = true)]
    json: bool,

    /// Écrire le résultat JSON dans ce fichier
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Entraîner un prédicteur sur tout l'historique et prédire le prochain tirage
    Predict {
        /// Prédicteur
        #[arg(short, long, default_value = "hybrid")]
        model: PredictorKind,

        /// Paramètres du prédicteur (clé=valeur, répétable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Nombre de numéros (défaut : jeu par défaut du loto)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Filtres statistiques, ex. "sum:100-200,odd:3"
        #[arg(short, long)]
        filters: Option<String>,

        /// Seed pour les prédicteurs aléatoires (défaut : date du jour YYYYMMDD)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Rejouer l'historique avec un prédicteur
    Backtest {
        #[arg(short, long, default_value = "hybrid")]
        model: PredictorKind,

        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Nombre de tirages rejoués
        #[arg(short, long)]
        draws: Option<usize>,

        /// Nombre de numéros par pari
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Nombre de tours détaillés à afficher
        #[arg(long, default_value = "10")]
        last: usize,
    },

    /// Consensus de plusieurs prédicteurs
    Ensemble {
        /// Rejouer l'historique au lieu de prédire le prochain tirage
        #[arg(long)]
        backtest: bool,

        #[arg(short, long)]
        draws: Option<usize>,

        /// Nombre de numéros par membre (défaut : taille du tirage)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Ignorer les snapshots existants
        #[arg(long)]
        no_snapshots: bool,

        #[arg(long, default_value = "10")]
        last: usize,
    },

    /// Optimiser les poids du mélange hybride par algorithme génétique
    Optimize {
        #[arg(long)]
        population: Option<usize>,

        #[arg(long)]
        generations: Option<usize>,

        /// Tirages rejoués par évaluation
        #[arg(long)]
        window: Option<usize>,

        #[arg(short = 'n', long)]
        count: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Entraîner les membres de l'ensemble et sauvegarder leurs snapshots
    Snapshot {
        /// Membres à entraîner (défaut : tous)
        members: Vec<String>,
    },
}

fn date_seed() -> u64 {
    let today = chrono::Local::now().date_naive();
    let y = today.year() as u64;
    let m = today.month() as u64;
    let d = today.day() as u64;
    y * 10_000 + m * 100 + d
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

struct Session {
    game: Game,
    rules: GameRules,
    config: EngineConfig,
    prices: Arc<PriceTable>,
    json: bool,
    output: Option<PathBuf>,
}

impl Session {
    fn emit<T: Serialize>(&self, value: &T, show: impl FnOnce()) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            show();
        }
        if let Some(path) = &self.output {
            let json = serde_json::to_string_pretty(value)?;
            std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
            if !self.json {
                println!("\nRésultat sauvegardé dans : {}", path.display());
            }
        }
        Ok(())
    }

    fn snapshot_store(&self) -> SnapshotStore {
        match &self.config.snapshot_dir {
            Some(dir) => SnapshotStore::new(dir),
            None => SnapshotStore::default(),
        }
    }
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    match EngineConfig::load(path)? {
        Some(config) => Ok(config),
        None => {
            if path != Path::new(DEFAULT_CONFIG_FILE) {
                bail!("Fichier de configuration introuvable : {}", path.display());
            }
            println!("(Pas de fichier {}, utilisation des réglages par défaut)", DEFAULT_CONFIG_FILE);
            Ok(EngineConfig::default())
        }
    }
}

fn load_history(conn: &preloto_db::rusqlite::Connection, game: Game) -> Result<Vec<Draw>> {
    let n = count_draws(conn, game)?;
    if n == 0 {
        bail!("Base vide pour {}. Lancez d'abord : preloto import {}", game.name(), game.slug());
    }
    fetch_history(conn, game)
}

fn build_config(kind: PredictorKind, raw: &[String], surf_window: usize) -> Result<PredictorConfig> {
    let mut params = raw
        .iter()
        .map(|p| parse_param(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    // la fenêtre de surf du fichier de configuration sert de défaut
    let takes_window = matches!(kind, PredictorKind::Surfing | PredictorKind::Hybrid);
    if takes_window && !params.iter().any(|(k, _)| k == "window") {
        params.insert(0, ("window".to_string(), surf_window.to_string()));
    }
    Ok(PredictorConfig::from_params(kind, &params)?)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let rules = cli.game.rules();
    let prices_path = cli.prices.clone().or_else(|| config.prices.clone());
    let prices = match prices_path {
        Some(path) => PriceTable::from_json_file(&path)?,
        None => PriceTable::for_game(&rules),
    };

    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;
    let history = load_history(&conn, cli.game)?;

    let ctx = Session {
        game: cli.game,
        rules,
        config,
        prices: Arc::new(prices),
        json: cli.json,
        output: cli.output,
    };

    match cli.command {
        Command::Predict { model, params, count, filters, seed } => {
            cmd_predict(&ctx, &history, model, &params, count, filters.as_deref(), seed)
        }
        Command::Backtest { model, params, draws, count, last } => {
            cmd_backtest(&ctx, &history, model, &params, draws, count, last)
        }
        Command::Ensemble { backtest, draws, count, no_snapshots, last } => {
            cmd_ensemble(&ctx, &history, backtest, draws, count, no_snapshots, last)
        }
        Command::Optimize { population, generations, window, count, seed } => {
            cmd_optimize(&ctx, &history, population, generations, window, count, seed)
        }
        Command::Snapshot { members } => cmd_snapshot(&ctx, &history, &members),
    }
}

fn cmd_predict(
    ctx: &Session,
    history: &[Draw],
    model: PredictorKind,
    params: &[String],
    count: Option<usize>,
    filters: Option<&str>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = build_config(model, params, ctx.config.surf_window)?;
    if config.is_stochastic() {
        let explicit = params.iter().any(|p| p.trim_start().starts_with("seed"));
        if !explicit {
            let effective = seed.unwrap_or_else(|| {
                let ds = date_seed();
                if !ctx.json {
                    println!("(Seed du jour : {ds})");
                }
                ds
            });
            config = config.with_seed(effective);
        }
    }

    let count = count.unwrap_or(ctx.rules.default_play);
    let filter = match filters {
        Some(spec) => PredictionFilter::parse(spec)?,
        None => PredictionFilter::default(),
    };

    let prediction = predict_filtered(&config, &ctx.rules, history, count, &filter)?;
    let cost = ctx.prices.cost(prediction.numbers.len());

    #[derive(Serialize)]
    struct PredictOutput<'a> {
        game: &'a str,
        config: &'a PredictorConfig,
        trained_on: usize,
        filters: &'a PredictionFilter,
        numbers: &'a [u8],
        attempts: usize,
        cost: f64,
    }
    let out = PredictOutput {
        game: ctx.game.slug(),
        config: &config,
        trained_on: history.len(),
        filters: &filter,
        numbers: &prediction.numbers,
        attempts: prediction.attempts,
        cost,
    };
    ctx.emit(&out, || display::display_prediction(model.as_str(), &prediction, cost))
}

fn cmd_backtest(
    ctx: &Session,
    history: &[Draw],
    model: PredictorKind,
    params: &[String],
    draws: Option<usize>,
    count: Option<usize>,
    last: usize,
) -> Result<()> {
    let config = build_config(model, params, ctx.config.surf_window)?;
    let draws = draws.unwrap_or(ctx.config.draws_to_test);
    let count = count.unwrap_or(ctx.rules.default_play);

    if !ctx.json {
        println!(
            "Backtest {} sur les {} derniers tirages de {} ({} en base)...",
            model,
            draws.min(history.len()),
            ctx.game.name(),
            history.len()
        );
    }

    let result = Backtester::from_config(&ctx.rules, config)
        .with_prices(Arc::clone(&ctx.prices))
        .with_warmup_margin(ctx.config.warmup_margin)
        .run(history, draws, count)?;

    ctx.emit(&result, || display::display_backtest(&result, &ctx.rules, last))
}

fn cmd_ensemble(
    ctx: &Session,
    history: &[Draw],
    backtest: bool,
    draws: Option<usize>,
    count: Option<usize>,
    no_snapshots: bool,
    last: usize,
) -> Result<()> {
    let mut specs: Vec<MemberSpec> = ctx.config.ensemble.clone();
    if no_snapshots {
        for spec in &mut specs {
            spec.snapshot = None;
        }
    } else {
        specs = bind_snapshots(specs, &ctx.snapshot_store(), ctx.game.slug());
    }

    let engine = EnsembleEngine::new(&ctx.rules, specs)?.with_warmup_margin(ctx.config.warmup_margin);
    let count = count.unwrap_or(ctx.rules.draw_count);

    if backtest {
        let draws = draws.unwrap_or(ctx.config.draws_to_test);
        let pb = progress_bar(draws.min(history.len()) as u64);
        let report = engine.run_backtest_with(history, draws, count, |round| {
            pb.set_message(format!("concours {}", round.contest));
            pb.inc(1);
        })?;
        pb.finish_with_message("Ensemble terminé");
        ctx.emit(&report, || display::display_ensemble_backtest(&report, &ctx.rules, last))
    } else {
        let live = engine.predict_live(history, count)?;
        ctx.emit(&live, || display::display_live(&live))
    }
}

fn cmd_optimize(
    ctx: &Session,
    history: &[Draw],
    population: Option<usize>,
    generations: Option<usize>,
    window: Option<usize>,
    count: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = ctx.config.optimizer.clone();
    if let Some(p) = population {
        config.population = p;
    }
    if let Some(g) = generations {
        config.generations = g;
    }
    if let Some(w) = window {
        config.fitness_window = w;
    }
    if let Some(n) = count {
        config.prediction_size = Some(n);
    }
    if let Some(s) = seed {
        config.seed = s;
    }
    config.surf_window = ctx.config.surf_window;

    let optimizer = GeneticOptimizer::new(&ctx.rules, config)?.with_prices(Arc::clone(&ctx.prices));
    let generations = optimizer.config().generations;
    if !ctx.json {
        println!(
            "Optimisation sur {} : population {}, {} générations, {} tirages rejoués, {} numéros",
            ctx.game.name(),
            optimizer.config().population,
            generations,
            optimizer.config().fitness_window,
            optimizer.prediction_size()
        );
    }

    let pb = progress_bar(generations as u64);
    let result = optimizer.run(history, |report| {
        pb.set_message(format!("meilleur {:.1}", report.best_fitness));
        pb.inc(1);
    })?;
    pb.finish_with_message("Optimisation terminée");

    #[derive(Serialize)]
    struct OptimizeOutput<'a> {
        #[serde(flatten)]
        result: &'a preloto_engine::optimizer::OptimizationResult,
        hybrid: PredictorConfig,
    }
    let out = OptimizeOutput {
        result: &result,
        hybrid: PredictorConfig::Hybrid(HybridParams::from_weights(result.best, ctx.config.surf_window)),
    };
    ctx.emit(&out, || display::display_optimization(&result))
}

fn cmd_snapshot(ctx: &Session, history: &[Draw], members: &[String]) -> Result<()> {
    let store = ctx.snapshot_store();
    let selected: Vec<&MemberSpec> = ctx
        .config
        .ensemble
        .iter()
        .filter(|m| members.is_empty() || members.contains(&m.name))
        .collect();
    if selected.is_empty() {
        bail!("Aucun membre ne correspond à {:?}", members);
    }

    let pb = progress_bar(selected.len() as u64);
    let mut rows = Vec::new();
    let last_contest = history.last().map(|d| d.contest);
    for spec in selected {
        pb.set_message(spec.name.clone());
        let mut predictor = spec.config.build(&ctx.rules);
        if let Err(e) = predictor.train(history) {
            log::warn!("{} : entraînement impossible ({e})", spec.name);
            pb.inc(1);
            continue;
        }
        let snapshot = Snapshot::capture(&spec.config, predictor.as_ref(), history.len(), last_contest)?;
        let path = spec
            .snapshot
            .clone()
            .unwrap_or_else(|| store.path_for(ctx.game.slug(), &spec.name));
        store.save(&path, &snapshot)?;
        rows.push((spec.name.clone(), path.display().to_string(), history.len()));
        pb.inc(1);
    }
    pb.finish_with_message("Snapshots sauvegardés");

    ctx.emit(&rows, || display::display_snapshots(&rows))
}
