use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backtest::DEFAULT_WARMUP_MARGIN;
use crate::ensemble::{default_lineup, MemberSpec};
use crate::models::surfing::DEFAULT_WINDOW;
use crate::optimizer::OptimizerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "preloto.json";

/// Réglages optionnels du moteur (`preloto.json`). Tout champ absent prend sa valeur par défaut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub surf_window: usize,
    pub warmup_margin: usize,
    pub draws_to_test: usize,
    pub optimizer: OptimizerConfig,
    pub ensemble: Vec<MemberSpec>,
    pub snapshot_dir: Option<PathBuf>,
    /// Grille de prix JSON remplaçant la grille calculée.
    pub prices: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            surf_window: DEFAULT_WINDOW,
            warmup_margin: DEFAULT_WARMUP_MARGIN,
            draws_to_test: 50,
            optimizer: OptimizerConfig::default(),
            ensemble: default_lineup(),
            snapshot_dir: None,
            prices: None,
        }
    }
}

impl EngineConfig {
    /// `Ok(None)` si le fichier n'existe pas.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Impossible de lire {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&json)
            .with_context(|| format!("Configuration invalide {:?}", path))?;
        config.optimizer.validate().context("Section optimizer invalide")?;
        for member in &config.ensemble {
            member
                .config
                .validate()
                .with_context(|| format!("Membre {} invalide", member.name))?;
        }
        Ok(Some(config))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }
}
