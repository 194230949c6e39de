use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use preloto_db::rusqlite::Connection;
use std::path::Path;

use preloto_db::db::insert_draw;
use preloto_db::models::{Draw, Game, GameRules, validate_draw};

/// Position des colonnes utiles dans l'en-tête du CSV.
#[derive(Debug, Clone, PartialEq)]
struct Columns {
    contest: usize,
    date: usize,
    balls: Vec<usize>,
}

fn normalize(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect()
}

fn locate_columns(headers: &csv::StringRecord, rules: &GameRules) -> Result<Columns> {
    let names: Vec<String> = headers.iter().map(normalize).collect();

    let contest = names
        .iter()
        .position(|h| h == "concurso")
        .context("Colonne 'Concurso' introuvable")?;
    let date = names
        .iter()
        .position(|h| h.starts_with("data"))
        .context("Colonne 'Data' introuvable")?;
    let balls: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("bola") || h.starts_with("dezena"))
        .map(|(i, _)| i)
        .take(rules.draw_count)
        .collect();

    if balls.len() != rules.draw_count {
        bail!(
            "{} colonnes Bola attendues, {} trouvées",
            rules.draw_count,
            balls.len()
        );
    }
    Ok(Columns { contest, date, balls })
}

pub fn parse_date(raw: &str) -> Result<String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%d/%m/%Y")
        .with_context(|| format!("Format de date invalide: '{}'", raw))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

fn parse_record(record: &csv::StringRecord, columns: &Columns, rules: &GameRules) -> Result<Draw> {
    let get = |idx: usize| -> Result<&str> {
        record
            .get(idx)
            .map(str::trim)
            .with_context(|| format!("Champ manquant à l'index {}", idx))
    };

    let raw_contest = get(columns.contest)?;
    let contest = raw_contest
        .parse::<u32>()
        .with_context(|| format!("Concurso invalide: '{}'", raw_contest))?;
    let date = parse_date(get(columns.date)?)?;

    let numbers = columns
        .balls
        .iter()
        .map(|&idx| {
            let s = get(idx)?;
            s.parse::<u8>()
                .with_context(|| format!("Impossible de parser '{}' (index {})", s, idx))
        })
        .collect::<Result<Vec<u8>>>()?;

    validate_draw(&numbers, rules)
        .with_context(|| format!("Concurso {} invalide", contest))?;
    Ok(Draw::new(contest, date, &numbers))
}

/// Les exports Caixa circulent avec `;` ou `,` comme séparateur.
fn sniff_delimiter(path: &Path) -> Result<u8> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {:?}", path))?;
    let first = content.lines().next().unwrap_or_default();
    Ok(if first.matches(';').count() >= first.matches(',').count() {
        b';'
    } else {
        b','
    })
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub skipped: u32,
    pub errors: u32,
}

pub fn import_csv(conn: &Connection, game: Game, path: &Path) -> Result<ImportResult> {
    let rules = game.rules();
    let delimiter = sniff_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let headers = reader.headers().context("En-tête CSV illisible")?.clone();
    let columns = locate_columns(&headers, &rules)?;

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    let mut result = ImportResult::default();

    for record_result in reader.records() {
        result.total_records += 1;
        let draw = match record_result
            .map_err(anyhow::Error::from)
            .and_then(|record| parse_record(&record, &columns, &rules))
        {
            Ok(draw) => draw,
            Err(e) => {
                log::warn!("Ligne {} ignorée : {:#}", result.total_records, e);
                result.errors += 1;
                continue;
            }
        };
        match insert_draw(&tx, game, &draw) {
            Ok(true) => result.inserted += 1,
            Ok(false) => result.skipped += 1,
            Err(e) => {
                log::warn!("Erreur insertion concurso {}: {}", draw.contest, e);
                result.errors += 1;
            }
        }
    }

    tx.commit().context("Échec du commit")?;
    log::info!(
        "Import {} : {} insérés, {} doublons, {} erreurs",
        game.slug(),
        result.inserted,
        result.skipped,
        result.errors
    );
    Ok(result)
}
