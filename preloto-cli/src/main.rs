mod analysis;
mod display;
mod import;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::analysis::{analyze, compute_stats};
use crate::display::{display_analysis, display_draws, display_import_summary, display_stats};
use preloto_db::db::{count_draws, db_path, fetch_history, fetch_last_draws, migrate, open_db};
use preloto_db::models::Game;
use preloto_db::rusqlite::Connection;

#[derive(Parser)]
#[command(name = "preloto", about = "Historique et statistiques des loteries de la Caixa")]
struct Cli {
    /// Jeu
    #[arg(short, long, global = true, default_value = "megasena")]
    game: Game,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer les tirages depuis un fichier CSV (export Caixa)
    Import {
        /// Chemin vers le fichier CSV
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages
    List {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Afficher les statistiques (fréquences et retards)
    Stats {
        /// Fenêtre d'analyse (nombre de tirages)
        #[arg(short, long, default_value = "100")]
        window: u32,
    },

    /// Rapport d'analyse sur tout l'historique
    Analyze {
        /// Afficher le rapport en JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, cli.game, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, cli.game, last),
        Command::Stats { window } => cmd_stats(&conn, cli.game, window),
        Command::Analyze { json } => cmd_analyze(&conn, cli.game, json),
    }
}

/// Nombre de tirages en base, `None` (avec message) si la base est vide.
fn require_draws(conn: &Connection, game: Game) -> Result<Option<u32>> {
    let n = count_draws(conn, game)?;
    if n == 0 {
        println!("Base vide pour {}. Lancez d'abord : preloto import -g {} <fichier.csv>", game.name(), game.slug());
        return Ok(None);
    }
    Ok(Some(n))
}

fn cmd_import(conn: &Connection, game: Game, file: &PathBuf) -> Result<()> {
    let result = import::import_csv(conn, game, file)?;
    display_import_summary(game, &result);
    Ok(())
}

fn cmd_list(conn: &Connection, game: Game, last: u32) -> Result<()> {
    if require_draws(conn, game)?.is_none() {
        return Ok(());
    }
    let draws = fetch_last_draws(conn, game, last)?;
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(conn: &Connection, game: Game, window: u32) -> Result<()> {
    let Some(n) = require_draws(conn, game)? else {
        return Ok(());
    };
    let effective_window = window.min(n);
    let draws = fetch_last_draws(conn, game, effective_window)?;
    let stats = compute_stats(&draws, &game.rules());
    display_stats(&stats, game, effective_window);
    Ok(())
}

fn cmd_analyze(conn: &Connection, game: Game, json: bool) -> Result<()> {
    if require_draws(conn, game)?.is_none() {
        return Ok(());
    }
    let history = fetch_history(conn, game)?;
    let report = analyze(&history, &game.rules());
    if json {
        let out = serde_json::to_string_pretty(&report).context("Sérialisation du rapport")?;
        println!("{out}");
    } else {
        display_analysis(&report, game);
    }
    Ok(())
}
