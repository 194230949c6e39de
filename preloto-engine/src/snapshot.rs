use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use preloto_db::models::GameRules;
use serde::{Deserialize, Serialize};

use crate::models::{Predictor, PredictorConfig, PredictorKind};

/// État figé d'un prédicteur entraîné.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: PredictorKind,
    pub config: PredictorConfig,
    /// Nombre de tirages vus à l'entraînement.
    pub trained_on: usize,
    pub last_contest: Option<u32>,
    pub saved_at: String,
    pub state: serde_json::Value,
}

impl Snapshot {
    pub fn capture(config: &PredictorConfig, predictor: &dyn Predictor, trained_on: usize, last_contest: Option<u32>) -> crate::error::Result<Self> {
        Ok(Self {
            kind: config.kind(),
            config: config.clone(),
            trained_on,
            last_contest,
            saved_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            state: predictor.save_snapshot()?,
        })
    }

    /// Reconstruit un prédicteur prêt à prédire, sans réentraînement.
    pub fn restore(&self, rules: &GameRules) -> crate::error::Result<Box<dyn Predictor>> {
        let mut predictor = self.config.build(rules);
        predictor.load_snapshot(self.state.clone())?;
        Ok(predictor)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(default_snapshot_dir())
    }
}

pub fn default_snapshot_dir() -> PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("snapshots");
    path
}

impl SnapshotStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base_dir}/{jeu}/{membre}.json`
    pub fn path_for(&self, game_slug: &str, member_name: &str) -> PathBuf {
        self.base_dir.join(game_slug).join(format!("{member_name}.json"))
    }

    pub fn save(&self, path: &Path, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
        Ok(())
    }

    /// `Ok(None)` si le fichier n'existe pas ; erreur s'il est corrompu ou d'un autre type.
    pub fn load(&self, path: &Path, expected: PredictorKind) -> Result<Option<Snapshot>> {
        read_snapshot(path, expected)
    }
}

pub fn read_snapshot(path: &Path, expected: PredictorKind) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {:?}", path))?;
    let snapshot: Snapshot = serde_json::from_str(&json)
        .with_context(|| format!("Snapshot corrompu {:?}", path))?;
    if snapshot.kind != expected || snapshot.config.kind() != expected {
        bail!(
            "Snapshot {:?} de type {}, {} attendu",
            path,
            snapshot.kind,
            expected
        );
    }
    Ok(Some(snapshot))
}
