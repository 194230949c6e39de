use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

use crate::models::{Draw, Game};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    game      TEXT NOT NULL,
    contest   INTEGER NOT NULL,
    date      TEXT NOT NULL,
    numbers   TEXT NOT NULL,
    PRIMARY KEY (game, contest)
);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("preloto.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

fn encode_numbers(numbers: &[u8]) -> String {
    numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(" ")
}

fn decode_numbers(raw: &str) -> rusqlite::Result<Vec<u8>> {
    raw.split_whitespace()
        .map(|s| {
            s.parse::<u8>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
            })
        })
        .collect()
}

fn row_to_draw(row: &rusqlite::Row<'_>) -> rusqlite::Result<Draw> {
    let contest: u32 = row.get(0)?;
    let date: String = row.get(1)?;
    let raw: String = row.get(2)?;
    let numbers = decode_numbers(&raw)?;
    Ok(Draw::new(contest, date, &numbers))
}

pub fn insert_draw(conn: &Connection, game: Game, draw: &Draw) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO draws (game, contest, date, numbers) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            game.slug(),
            draw.contest,
            draw.date,
            encode_numbers(&draw.numbers),
        ],
    ).context("Échec de l'insertion")?;
    Ok(changed > 0)
}

/// Historique complet en ordre chronologique : index 0 = tirage le plus ancien.
pub fn fetch_history(conn: &Connection, game: Game) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(
        "SELECT contest, date, numbers FROM draws WHERE game = ?1
         ORDER BY date ASC, contest ASC"
    )?;
    let draws = stmt
        .query_map([game.slug()], row_to_draw)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

/// Derniers tirages, le plus récent en premier (affichage).
pub fn fetch_last_draws(conn: &Connection, game: Game, limit: u32) -> Result<Vec<Draw>> {
    let mut stmt = conn.prepare(
        "SELECT contest, date, numbers FROM draws WHERE game = ?1
         ORDER BY date DESC, contest DESC LIMIT ?2"
    )?;
    let draws = stmt
        .query_map(rusqlite::params![game.slug(), limit], row_to_draw)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(draws)
}

pub fn count_draws(conn: &Connection, game: Game) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM draws WHERE game = ?1",
        [game.slug()],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_draw(contest: u32, date: &str) -> Draw {
        Draw::new(contest, date, &[4, 8, 15, 16, 23, 42])
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        conn
    }

    #[test]
    fn test_insert_and_count() {
        let conn = memory_db();
        assert_eq!(count_draws(&conn, Game::Megasena).unwrap(), 0);

        insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        assert_eq!(count_draws(&conn, Game::Megasena).unwrap(), 1);
        assert_eq!(count_draws(&conn, Game::Quina).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_ignored() {
        let conn = memory_db();

        let inserted = insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        assert!(inserted);
        let inserted = insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        assert!(!inserted);
        assert_eq!(count_draws(&conn, Game::Megasena).unwrap(), 1);
    }

    #[test]
    fn test_same_contest_other_game() {
        let conn = memory_db();
        insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        let inserted = insert_draw(&conn, Game::Quina, &Draw::new(1, "2024-01-01", &[1, 2, 3, 4, 5])).unwrap();
        assert!(inserted);
    }

    #[test]
    fn test_history_is_chronological() {
        let conn = memory_db();
        insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        insert_draw(&conn, Game::Megasena, &test_draw(3, "2024-01-05")).unwrap();
        insert_draw(&conn, Game::Megasena, &test_draw(2, "2024-01-03")).unwrap();

        let history = fetch_history(&conn, Game::Megasena).unwrap();
        let contests: Vec<u32> = history.iter().map(|d| d.contest).collect();
        assert_eq!(contests, vec![1, 2, 3]);
        assert_eq!(history[0].numbers, vec![4, 8, 15, 16, 23, 42]);
    }

    #[test]
    fn test_last_draws_most_recent_first() {
        let conn = memory_db();
        insert_draw(&conn, Game::Megasena, &test_draw(1, "2024-01-01")).unwrap();
        insert_draw(&conn, Game::Megasena, &test_draw(2, "2024-01-05")).unwrap();
        insert_draw(&conn, Game::Megasena, &test_draw(3, "2024-01-03")).unwrap();

        let draws = fetch_last_draws(&conn, Game::Megasena, 2).unwrap();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].date, "2024-01-05");
        assert_eq!(draws[1].date, "2024-01-03");
    }
}
