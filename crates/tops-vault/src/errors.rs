use thiserror::Error;
use tops_core::ApiError;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Traffic Vault database error: {0}")]
    Database(String),

    #[error("Traffic Vault data is malformed: {0}")]
    Serialization(String),

    #[error("Unknown Traffic Vault backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid Traffic Vault configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation not supported by the {backend} Traffic Vault backend")]
    NotImplemented { backend: String },

    #[error("Traffic Vault is unavailable: {0}")]
    Unavailable(String),
}

impl From<sea_orm::DbErr> for VaultError {
    fn from(error: sea_orm::DbErr) -> Self {
        VaultError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(error: serde_json::Error) -> Self {
        VaultError::Serialization(error.to_string())
    }
}

impl From<VaultError> for ApiError {
    fn from(error: VaultError) -> Self {
        match error {
            VaultError::NotImplemented { .. } => {
                ApiError::user(tops_core::StatusCode::NOT_IMPLEMENTED, error.to_string())
            }
            other => ApiError::system(other.to_string()),
        }
    }
}
