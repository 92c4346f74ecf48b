//! Error types for identity provisioning

use thiserror::Error;

use crate::models::IdClass;

#[derive(Error, Debug)]
pub enum EnrolError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("No free {class} left in range [{start}, {max})")]
    RangeExhausted { class: IdClass, start: u32, max: u32 },

    #[error("Duplicate {entity_type}: {name} already exists")]
    Duplicate { entity_type: String, name: String },

    #[error("Directory transport error: {message}")]
    TransportError { message: String },

    #[error("Directory service is not configured")]
    DirectoryUnavailable,

    #[error("Failed to load {material} from {path}: {message}")]
    MaterialLoad {
        material: String,
        path: String,
        message: String,
    },

    #[error("Record store error: {message}")]
    StoreError { message: String },

    #[error("Entity not found: {entity_type} {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl EnrolError {
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn duplicate(entity_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            name: name.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    pub fn material_load(
        material: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MaterialLoad {
            material: material.into(),
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn store_error(message: impl Into<String>) -> Self {
        Self::StoreError {
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Errors expected when the directory is absent or unreachable. Other
    /// errors reaching the fallback path point at a misconfiguration.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransportError { .. } | Self::DirectoryUnavailable)
    }
}

pub type Result<T> = std::result::Result<T, EnrolError>;
