use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use preloto_db::models::GameRules;

/// Coût d'un pari selon le nombre de numéros joués.
#[derive(Debug, Default)]
pub struct PriceTable {
    prices: BTreeMap<usize, f64>,
    warned: Mutex<HashSet<usize>>,
}

impl Clone for PriceTable {
    fn clone(&self) -> Self {
        Self::from_prices(self.prices.clone())
    }
}

pub fn combinations(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0f64, |acc, i| acc * (n - i) as f64 / (i + 1) as f64).round()
}

impl PriceTable {
    pub fn from_prices(prices: BTreeMap<usize, f64>) -> Self {
        Self {
            prices,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Grille par défaut : C(n, K) paris simples au prix de base, pour n = K..=max_play.
    pub fn for_game(rules: &GameRules) -> Self {
        let prices = (rules.draw_count..=rules.max_play.max(rules.draw_count))
            .map(|size| (size, combinations(size, rules.draw_count) * rules.base_price))
            .collect();
        Self::from_prices(prices)
    }

    /// Charge une grille JSON `{ "6": 5.0, "7": 35.0 }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire la grille de prix {:?}", path))?;
        Self::from_json_str(&content).with_context(|| format!("Grille de prix invalide {:?}", path))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, f64> = serde_json::from_str(content)?;
        let mut prices = BTreeMap::new();
        for (key, price) in raw {
            let size: usize = key
                .trim()
                .parse()
                .with_context(|| format!("Taille de pari invalide : '{key}'"))?;
            prices.insert(size, price);
        }
        Ok(Self::from_prices(prices))
    }

    /// Prix d'un pari de `size` numéros, 0 (avec un avertissement unique) si absent.
    pub fn cost(&self, size: usize) -> f64 {
        match self.prices.get(&size) {
            Some(&price) => price,
            None => {
                if let Ok(mut warned) = self.warned.lock() {
                    if warned.insert(size) {
                        log::warn!("Pas de prix pour un pari de {size} numéros, coût compté à 0");
                    }
                }
                0.0
            }
        }
    }

    pub fn get(&self, size: usize) -> Option<f64> {
        self.prices.get(&size).copied()
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.prices.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preloto_db::models::Game;

    #[test]
    fn test_combinations() {
        assert_eq!(combinations(6, 6), 1.0);
        assert_eq!(combinations(7, 6), 7.0);
        assert_eq!(combinations(20, 6), 38760.0);
        assert_eq!(combinations(3, 5), 0.0);
    }

    #[test]
    fn test_megasena_default_grid() {
        let table = PriceTable::for_game(&Game::Megasena.rules());
        assert_eq!(table.get(6), Some(5.0));
        assert_eq!(table.get(7), Some(35.0));
        assert_eq!(table.get(20), Some(38760.0 * 5.0));
        assert_eq!(table.get(21), None);
    }

    #[test]
    fn test_missing_price_costs_zero() {
        let table = PriceTable::for_game(&Game::Quina.rules());
        assert_eq!(table.cost(3), 0.0);
        assert_eq!(table.cost(3), 0.0);
        assert_eq!(table.cost(5), 2.5);
    }

    #[test]
    fn test_from_json() {
        let table = PriceTable::from_json_str(r#"{ "6": 5.0, "7": 35.0 }"#).unwrap();
        assert_eq!(table.cost(7), 35.0);
        assert_eq!(table.sizes().collect::<Vec<_>>(), vec![6, 7]);
        assert!(PriceTable::from_json_str(r#"{ "six": 5.0 }"#).is_err());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let path = std::env::temp_dir().join("preloto_test_prices.json");
        std::fs::write(&path, r#"{ "15": 3.0 }"#).unwrap();
        let table = PriceTable::from_json_file(&path).unwrap();
        assert_eq!(table.cost(15), 3.0);
        let _ = std::fs::remove_file(&path);
    }
}
