use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use textplots::Plot;

use preloto_db::models::GameRules;
use crate::backtest::BacktestResult;
use crate::ensemble::{EnsembleBacktest, LivePrediction, MemberMode};
use crate::filters::FilteredPrediction;
use crate::optimizer::OptimizationResult;

pub fn format_numbers(numbers: &[u8]) -> String {
    if numbers.is_empty() {
        return "—".to_string();
    }
    numbers.iter().map(|n| format!("{:02}", n)).collect::<Vec<_>>().join(" ")
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn hits_color(hits: usize, rules: &GameRules) -> Color {
    match rules.tier_index(hits) {
        Some(_) => Color::Green,
        None if hits * 2 >= rules.draw_count => Color::Yellow,
        None => Color::White,
    }
}

pub fn display_prediction(name: &str, prediction: &FilteredPrediction, cost: f64) {
    println!("\n== Prédiction {} ==\n", name);
    let mut table = new_table();
    table.set_header(vec!["Numéros", "Quantité", "Coût", "Essais"]);
    table.add_row(vec![
        Cell::new(format_numbers(&prediction.numbers)).fg(Color::Green),
        Cell::new(prediction.numbers.len()),
        Cell::new(format!("{:.2}", cost)),
        Cell::new(prediction.attempts),
    ]);
    println!("{table}");
    if let Some(seed) = prediction.seed {
        println!("(Seed : {seed})");
    }
}

pub fn display_backtest(result: &BacktestResult, rules: &GameRules, last: usize) {
    println!(
        "\n== Backtest {} : {} paris de {} numéros ==\n",
        result.predictor, result.total_bets, result.prediction_size
    );

    let skip = result.details.len().saturating_sub(last);
    if last > 0 && !result.details.is_empty() {
        let mut table = new_table();
        table.set_header(vec!["Index", "Concours", "Date", "Prédiction", "Tirage", "Bons"]);
        for d in &result.details[skip..] {
            table.add_row(vec![
                Cell::new(d.draw_index),
                Cell::new(d.contest),
                Cell::new(&d.date),
                Cell::new(format_numbers(&d.prediction)),
                Cell::new(format_numbers(&d.actual)),
                Cell::new(d.hits).fg(hits_color(d.hits, rules)),
            ]);
        }
        println!("{table}");
    }

    let mut table = new_table();
    table.set_header(vec!["Bons numéros", "Occurrences", "Part", ""]);
    for (&hits, &n) in &result.hits_distribution {
        let share = n as f64 / result.total_bets.max(1) as f64;
        let bar = "█".repeat((share * 30.0).round() as usize);
        let label = match rules.tier_index(hits) {
            Some(_) => format!("{hits} ★"),
            None => hits.to_string(),
        };
        table.add_row(vec![
            Cell::new(label).fg(hits_color(hits, rules)),
            Cell::new(n),
            Cell::new(format!("{:.1}%", share * 100.0)),
            Cell::new(bar),
        ]);
    }
    println!("{table}");

    println!(
        "  Moyenne : {:.3} bons numéros | Coût total : {:.2} | Tours ignorés : {}",
        result.mean_hits(),
        result.total_cost,
        result.skipped
    );
}

fn mode_label(mode: MemberMode) -> &'static str {
    match mode {
        MemberMode::Frozen => "snapshot",
        MemberMode::Retrain => "réentraîné",
    }
}

pub fn display_ensemble_backtest(report: &EnsembleBacktest, rules: &GameRules, last: usize) {
    println!(
        "\n== Ensemble : {} tours, {} numéros par membre ==\n",
        report.rounds_simulated, report.count
    );

    let skip = report.rounds.len().saturating_sub(last);
    if last > 0 {
        let mut header = vec!["Concours".to_string(), "Tirage".to_string()];
        header.extend(report.members.iter().map(|(name, _)| name.clone()));
        header.push("Suggestion".to_string());
        let mut table = new_table();
        table.set_header(&header);
        for round in &report.rounds[skip..] {
            let mut row = vec![Cell::new(round.contest), Cell::new(format_numbers(&round.target))];
            for p in &round.predictions {
                let cell = match p.hits {
                    Some(h) if !round.failures.contains_key(&p.name) => Cell::new(h).fg(hits_color(h, rules)),
                    _ => Cell::new("échec").fg(Color::Red),
                };
                row.push(cell);
            }
            row.push(Cell::new(format!("{} ({})", format_numbers(&round.suggestion), round.suggestion_hits)));
            table.add_row(row);
        }
        println!("{table}");
    }

    let rounds = report.rounds_simulated.max(1) as f64;
    let mut table = new_table();
    table.set_header(vec!["Membre", "Mode", "Bons numéros", "Moyenne / tour", "Échecs"]);
    for (name, mode) in &report.members {
        let hits = report.member_hits.get(name).copied().unwrap_or(0);
        let failures = report.rounds.iter().filter(|r| r.failures.contains_key(name)).count();
        table.add_row(vec![
            Cell::new(name),
            Cell::new(mode_label(*mode)),
            Cell::new(hits),
            Cell::new(format!("{:.3}", hits as f64 / rounds)),
            Cell::new(failures).fg(if failures > 0 { Color::Yellow } else { Color::White }),
        ]);
    }
    println!("{table}");

    let mut table = new_table();
    table.set_header(vec!["Consensus", "Bons numéros", "Taille moyenne"]);
    for (&threshold, &hits) in &report.consensus_hits {
        let mean_size = report
            .rounds
            .iter()
            .filter_map(|r| r.consensus.iter().find(|c| c.threshold == threshold))
            .map(|c| c.numbers.len())
            .sum::<usize>() as f64
            / rounds;
        table.add_row(vec![
            Cell::new(format!("≥ {threshold} votes")),
            Cell::new(hits),
            Cell::new(format!("{:.1}", mean_size)),
        ]);
    }
    table.add_row(vec![
        Cell::new("Suggestion").fg(Color::Green),
        Cell::new(report.suggestion_hits).fg(Color::Green),
        Cell::new(report.count),
    ]);
    println!("{table}");
}

pub fn display_live(live: &LivePrediction) {
    println!("\n== Ensemble : prédiction sur {} tirages ==\n", live.trained_on);

    let mut table = new_table();
    table.set_header(vec!["Membre", "Mode", "Numéros"]);
    for (p, (_, mode)) in live.predictions.iter().zip(&live.members) {
        let numbers = match live.failures.get(&p.name) {
            Some(err) => Cell::new(format!("échec : {err}")).fg(Color::Red),
            None => Cell::new(format_numbers(&p.numbers)),
        };
        table.add_row(vec![Cell::new(&p.name), Cell::new(mode_label(*mode)), numbers]);
    }
    println!("{table}");

    let mut table = new_table();
    table.set_header(vec!["Votes", "Numéros"]);
    let max_votes = live.ranking.first().map(|&(_, v)| v).unwrap_or(0);
    for votes in (1..=max_votes).rev() {
        let numbers: Vec<u8> = live.ranking.iter().filter(|&&(_, v)| v == votes).map(|&(n, _)| n).collect();
        if numbers.is_empty() {
            continue;
        }
        let color = if votes >= 2 { Color::Green } else { Color::White };
        table.add_row(vec![Cell::new(votes).fg(color), Cell::new(format_numbers(&numbers))]);
    }
    println!("{table}");

    for set in &live.consensus {
        println!("  Consensus ≥ {} : {}", set.threshold, format_numbers(&set.numbers));
    }
    println!("\n  Suggestion : {}", format_numbers(&live.suggestion));
}

pub fn display_optimization(result: &OptimizationResult) {
    println!("\n== Optimisation génétique ({}) ==\n", result.game);

    let mut table = new_table();
    table.set_header(vec!["Génération", "Meilleure fitness", "Moyenne", "w_gap", "w_freq", "w_surf"]);
    for r in &result.generations {
        table.add_row(vec![
            Cell::new(r.generation),
            Cell::new(format!("{:.1}", r.best_fitness)),
            Cell::new(format!("{:.1}", r.mean_fitness)),
            Cell::new(format!("{:.3}", r.best_weights.gap)),
            Cell::new(format!("{:.3}", r.best_weights.freq)),
            Cell::new(format!("{:.3}", r.best_weights.surf)),
        ]);
    }
    println!("{table}");

    display_fitness_chart(result);

    println!(
        "\n  Meilleurs poids : {} (fitness {:.1}, {} évaluations)",
        result.best, result.best_fitness, result.evaluations
    );
}

fn display_fitness_chart(result: &OptimizationResult) {
    if result.generations.len() < 2 {
        return;
    }
    let best: Vec<(f32, f32)> = result
        .generations
        .iter()
        .map(|r| (r.generation as f32, r.best_fitness as f32))
        .collect();
    let mean: Vec<(f32, f32)> = result
        .generations
        .iter()
        .map(|r| (r.generation as f32, r.mean_fitness as f32))
        .collect();

    let y_min = mean.iter().map(|p| p.1).fold(f32::MAX, f32::min);
    let y_max = best.iter().map(|p| p.1).fold(f32::MIN, f32::max);
    let margin = ((y_max - y_min) * 0.1).max(1.0);
    let x_max = result.generations.len() as f32;

    println!("\n== Fitness par génération (meilleure / moyenne) ==\n");
    let best_shape = textplots::Shape::Lines(&best);
    let mean_shape = textplots::Shape::Points(&mean);
    let mut chart = textplots::Chart::new_with_y_range(120, 40, 1.0, x_max, y_min - margin, y_max + margin);
    println!("{}", chart.lineplot(&best_shape).lineplot(&mean_shape));
}

pub fn display_snapshots(rows: &[(String, String, usize)]) {
    let mut table = new_table();
    table.set_header(vec!["Membre", "Fichier", "Tirages"]);
    for (name, path, n) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(path), Cell::new(n)]);
    }
    println!("{table}");
}
