use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error("Historique insuffisant : {needed} tirages requis, {available} disponibles")]
    InsufficientData { needed: usize, available: usize },

    #[error("Paramètre invalide : {0}")]
    InvalidParameter(String),

    #[error("Le modèle {0} n'a pas été entraîné")]
    NotTrained(String),

    #[error("Échec du modèle : {0}")]
    ModelFailure(String),

    #[error("Snapshot invalide : {0}")]
    Snapshot(String),
}

impl PredictError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        PredictError::InvalidParameter(msg.into())
    }

    /// Erreurs récupérables localement (tour ignoré, vote nul).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PredictError::InvalidParameter(_))
    }
}

impl From<serde_json::Error> for PredictError {
    fn from(e: serde_json::Error) -> Self {
        PredictError::Snapshot(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;
