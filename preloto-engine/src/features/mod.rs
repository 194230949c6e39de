pub mod compute;

use std::collections::VecDeque;

use preloto_db::models::{Draw, GameRules};
use serde::{Deserialize, Serialize};

pub use compute::{mean_stdev, normalize_by_max, summarize, window_counts};

/// Caractéristiques d'un numéro à un instant donné de l'historique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberFeatures {
    pub number: u8,
    pub gap: usize,
    pub frequency: u32,
    pub window_frequency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawSummary {
    pub sum: u32,
    pub odd: usize,
    pub even: usize,
    pub spread: u8,
}

/// Suivi incrémental des retards et fréquences pendant le rejeu de l'historique.
/// Chaque entraînement construit le sien : aucun état n'est partagé entre deux runs.
#[derive(Debug, Clone)]
pub struct FeatureTracker {
    rules: GameRules,
    window: usize,
    seen: usize,
    gaps: Vec<usize>,
    frequencies: Vec<u32>,
    window_counts: Vec<u32>,
    recent: VecDeque<Vec<u8>>,
    last: Option<DrawSummary>,
}

impl FeatureTracker {
    pub fn new(rules: &GameRules, window: usize) -> Self {
        let size = rules.size();
        Self {
            rules: rules.clone(),
            window: window.max(1),
            seen: 0,
            gaps: vec![0; size],
            frequencies: vec![0; size],
            window_counts: vec![0; size],
            recent: VecDeque::with_capacity(window.max(1) + 1),
            last: None,
        }
    }

    pub fn from_history(rules: &GameRules, history: &[Draw], window: usize) -> Self {
        let mut tracker = Self::new(rules, window);
        for draw in history {
            tracker.update(draw);
        }
        tracker
    }

    /// Intègre le tirage suivant. Les numéros hors plage sont ignorés.
    pub fn update(&mut self, draw: &Draw) {
        let in_range: Vec<u8> = draw
            .numbers
            .iter()
            .copied()
            .filter(|&n| self.rules.index_of(n).is_some())
            .collect();

        for gap in &mut self.gaps {
            *gap += 1;
        }
        for &n in &in_range {
            if let Some(idx) = self.rules.index_of(n) {
                self.gaps[idx] = 0;
                self.frequencies[idx] += 1;
                self.window_counts[idx] += 1;
            }
        }

        self.recent.push_back(in_range);
        if self.recent.len() > self.window {
            if let Some(expired) = self.recent.pop_front() {
                for n in expired {
                    if let Some(idx) = self.rules.index_of(n) {
                        self.window_counts[idx] -= 1;
                    }
                }
            }
        }

        self.seen += 1;
        self.last = Some(summarize(draw));
    }

    pub fn draws_seen(&self) -> usize {
        self.seen
    }

    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    pub fn frequencies(&self) -> &[u32] {
        &self.frequencies
    }

    pub fn window_counts(&self) -> &[u32] {
        &self.window_counts
    }

    pub fn last_summary(&self) -> Option<DrawSummary> {
        self.last
    }

    pub fn snapshot(&self) -> Vec<NumberFeatures> {
        (0..self.rules.size())
            .map(|idx| NumberFeatures {
                number: self.rules.number_at(idx),
                gap: self.gaps[idx],
                frequency: self.frequencies[idx],
                window_frequency: self.window_counts[idx],
            })
            .collect()
    }
}
