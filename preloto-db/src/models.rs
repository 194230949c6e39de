use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Un tirage enregistré. Les numéros sont stockés triés, le tirage est immuable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    pub contest: u32,
    pub date: String,
    pub numbers: Vec<u8>,
}

impl Draw {
    pub fn new(contest: u32, date: impl Into<String>, numbers: &[u8]) -> Self {
        let mut numbers = numbers.to_vec();
        numbers.sort_unstable();
        Self {
            contest,
            date: date.into(),
            numbers,
        }
    }

    pub fn contains(&self, number: u8) -> bool {
        self.numbers.contains(&number)
    }

    pub fn sum(&self) -> u32 {
        self.numbers.iter().map(|&n| n as u32).sum()
    }

    pub fn odd_count(&self) -> usize {
        self.numbers.iter().filter(|&&n| n % 2 == 1).count()
    }

    pub fn even_count(&self) -> usize {
        self.numbers.iter().filter(|&&n| n % 2 == 0).count()
    }

    /// max - min, 0 pour un tirage vide.
    pub fn spread(&self) -> u8 {
        match (self.numbers.iter().min(), self.numbers.iter().max()) {
            (Some(&lo), Some(&hi)) => hi - lo,
            _ => 0,
        }
    }
}

/// Jeux supportés.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Megasena,
    Lotofacil,
    Quina,
}

impl Game {
    pub fn slug(&self) -> &'static str {
        match self {
            Game::Megasena => "megasena",
            Game::Lotofacil => "lotofacil",
            Game::Quina => "quina",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Game::Megasena => "Mega Sena",
            Game::Lotofacil => "Lotofácil",
            Game::Quina => "Quina",
        }
    }

    pub fn rules(&self) -> GameRules {
        match self {
            Game::Megasena => GameRules {
                slug: self.slug().to_string(),
                range_min: 1,
                range_max: 60,
                draw_count: 6,
                default_play: 20,
                max_play: 20,
                prize_tiers: vec![4, 5, 6],
                base_price: 5.0,
            },
            Game::Lotofacil => GameRules {
                slug: self.slug().to_string(),
                range_min: 1,
                range_max: 25,
                draw_count: 15,
                default_play: 20,
                max_play: 20,
                prize_tiers: vec![11, 12, 13, 14, 15],
                base_price: 3.0,
            },
            Game::Quina => GameRules {
                slug: self.slug().to_string(),
                range_min: 1,
                range_max: 80,
                draw_count: 5,
                default_play: 15,
                max_play: 20,
                prize_tiers: vec![2, 3, 4, 5],
                base_price: 2.5,
            },
        }
    }
}

impl std::fmt::Display for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Règles d'un jeu : plage des numéros, taille du tirage, paliers de gain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRules {
    pub slug: String,
    pub range_min: u8,
    pub range_max: u8,
    pub draw_count: usize,
    pub default_play: usize,
    pub max_play: usize,
    pub prize_tiers: Vec<usize>,
    pub base_price: f64,
}

impl GameRules {
    /// Règles ad hoc sans paliers de gain ni prix.
    pub fn custom(range_min: u8, range_max: u8, draw_count: usize) -> Self {
        let size = (range_max - range_min) as usize + 1;
        Self {
            slug: "custom".to_string(),
            range_min,
            range_max,
            draw_count,
            default_play: draw_count,
            max_play: size,
            prize_tiers: Vec::new(),
            base_price: 0.0,
        }
    }

    pub fn size(&self) -> usize {
        (self.range_max - self.range_min) as usize + 1
    }

    pub fn numbers(&self) -> impl Iterator<Item = u8> {
        self.range_min..=self.range_max
    }

    /// Index 0-based d'un numéro dans la plage (None si hors plage).
    pub fn index_of(&self, number: u8) -> Option<usize> {
        if number < self.range_min || number > self.range_max {
            None
        } else {
            Some((number - self.range_min) as usize)
        }
    }

    pub fn number_at(&self, index: usize) -> u8 {
        self.range_min + index as u8
    }

    pub fn tier_index(&self, hits: usize) -> Option<usize> {
        self.prize_tiers.iter().position(|&t| t == hits)
    }
}

pub fn validate_draw(numbers: &[u8], rules: &GameRules) -> Result<()> {
    if numbers.len() != rules.draw_count {
        bail!(
            "{} numéros attendus, {} reçus",
            rules.draw_count,
            numbers.len()
        );
    }
    for &n in numbers {
        if rules.index_of(n).is_none() {
            bail!(
                "Numéro {} hors limites ({}-{})",
                n,
                rules.range_min,
                rules.range_max
            );
        }
    }
    for i in 0..numbers.len() {
        for j in (i + 1)..numbers.len() {
            if numbers[i] == numbers[j] {
                bail!("Numéro en double : {}", numbers[i]);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NumberStats {
    pub number: u8,
    pub frequency: u32,
    pub gap: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_draw_ok() {
        let rules = Game::Megasena.rules();
        assert!(validate_draw(&[1, 2, 3, 4, 5, 6], &rules).is_ok());
        assert!(validate_draw(&[60, 59, 58, 57, 56, 55], &rules).is_ok());
    }

    #[test]
    fn test_validate_draw_out_of_range() {
        let rules = Game::Megasena.rules();
        assert!(validate_draw(&[0, 2, 3, 4, 5, 6], &rules).is_err());
        assert!(validate_draw(&[1, 2, 3, 4, 5, 61], &rules).is_err());
    }

    #[test]
    fn test_validate_draw_wrong_count() {
        let rules = Game::Quina.rules();
        assert!(validate_draw(&[1, 2, 3, 4], &rules).is_err());
        assert!(validate_draw(&[1, 2, 3, 4, 5, 6], &rules).is_err());
    }

    #[test]
    fn test_validate_draw_duplicates() {
        let rules = Game::Quina.rules();
        assert!(validate_draw(&[1, 1, 3, 4, 5], &rules).is_err());
    }

    #[test]
    fn test_draw_summary_features() {
        let draw = Draw::new(1, "2024-01-01", &[10, 3, 7, 22]);
        assert_eq!(draw.numbers, vec![3, 7, 10, 22]);
        assert_eq!(draw.sum(), 42);
        assert_eq!(draw.odd_count(), 2);
        assert_eq!(draw.even_count(), 2);
        assert_eq!(draw.spread(), 19);
    }

    #[test]
    fn test_empty_draw_spread() {
        let draw = Draw::new(1, "2024-01-01", &[]);
        assert_eq!(draw.spread(), 0);
    }

    #[test]
    fn test_rules_size_and_index() {
        let rules = Game::Lotofacil.rules();
        assert_eq!(rules.size(), 25);
        assert_eq!(rules.index_of(1), Some(0));
        assert_eq!(rules.index_of(25), Some(24));
        assert_eq!(rules.index_of(26), None);
        assert_eq!(rules.number_at(24), 25);
    }

    #[test]
    fn test_tier_index() {
        let rules = Game::Megasena.rules();
        assert_eq!(rules.tier_index(4), Some(0));
        assert_eq!(rules.tier_index(6), Some(2));
        assert_eq!(rules.tier_index(3), None);
    }
}
