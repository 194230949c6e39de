use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL, Cell, Color};

use crate::analysis::AnalysisReport;
use crate::import::ImportResult;
use preloto_db::models::{Draw, Game, NumberStats};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:02}", n))
        .collect::<Vec<_>>()
        .join(" - ")
}

pub fn display_draws(draws: &[Draw]) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let mut table = new_table();
    table.set_header(vec!["Concurso", "Date", "Numéros", "Somme", "Impairs"]);

    for draw in draws {
        table.add_row(vec![
            Cell::new(draw.contest),
            Cell::new(&draw.date),
            Cell::new(format_numbers(&draw.numbers)),
            Cell::new(draw.sum()),
            Cell::new(draw.odd_count()),
        ]);
    }

    println!("{table}");
}

pub fn display_import_summary(game: Game, result: &ImportResult) {
    println!("Import {} terminé :", game.name());
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Doublons ignorés  : {}", result.skipped);
    if result.errors > 0 {
        println!("  Erreurs           : {} (RUST_LOG=warn pour le détail)", result.errors);
    }
}

pub fn display_stats(stats: &[NumberStats], game: Game, window: u32) {
    println!("\n📊 {} : statistiques sur les {} derniers tirages\n", game.name(), window);

    let mut table = new_table();
    table.set_header(vec!["Numéro", "Fréquence", "Retard"]);

    let mut sorted = stats.to_vec();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));

    let max_gap = sorted.iter().map(|s| s.gap).max().unwrap_or(0);
    for stat in &sorted {
        let gap_color = if max_gap > 0 && stat.gap == max_gap { Color::Red } else { Color::White };
        table.add_row(vec![
            Cell::new(format!("{:2}", stat.number)),
            Cell::new(stat.frequency),
            Cell::new(stat.gap).fg(gap_color),
        ]);
    }
    println!("{table}");
}

pub fn display_analysis(report: &AnalysisReport, game: Game) {
    println!("\n🔎 Analyse {} : {} tirages\n", game.name(), report.total_draws);

    let mut table = new_table();
    table.set_header(vec!["Indicateur", "Moyenne", "Écart-type", "Min", "Max"]);
    table.add_row(vec![
        Cell::new("Somme"),
        Cell::new(format!("{:.2}", report.sum.mean)),
        Cell::new(format!("{:.2}", report.sum.stdev)),
        Cell::new(report.sum.min),
        Cell::new(report.sum.max),
    ]);
    table.add_row(vec![
        Cell::new("Impairs"),
        Cell::new(format!("{:.2}", report.odd.mean)),
        Cell::new("—"),
        Cell::new(report.odd.distribution.keys().next().copied().unwrap_or(0)),
        Cell::new(report.odd.distribution.keys().next_back().copied().unwrap_or(0)),
    ]);
    table.add_row(vec![
        Cell::new("Écart max-min"),
        Cell::new(format!("{:.2}", report.spread.mean)),
        Cell::new("—"),
        Cell::new(report.spread.min),
        Cell::new(report.spread.max),
    ]);
    println!("{table}");

    println!("\n── Répartition des impairs ──");
    let mut table = new_table();
    table.set_header(vec!["Impairs", "Tirages", "Part"]);
    let total = report.total_draws.max(1) as f64;
    for (&odd, &n) in &report.odd.distribution {
        table.add_row(vec![
            Cell::new(odd),
            Cell::new(n),
            Cell::new(format!("{:.1}%", n as f64 / total * 100.0)),
        ]);
    }
    println!("{table}");

    println!("\n── Fréquences ──");
    let mut table = new_table();
    table.set_header(vec!["Numéro", "Fréquence"]);
    let top = report.frequencies.first().map(|&(_, f)| f).unwrap_or(0);
    for &(number, freq) in &report.frequencies {
        let color = if freq == top { Color::Green } else { Color::White };
        table.add_row(vec![Cell::new(format!("{:2}", number)), Cell::new(freq).fg(color)]);
    }
    println!("{table}");
}
