use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{entity} '{key}' already exists")]
    UniqueViolation { entity: &'static str, key: String },

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("invalid template configuration: {0}")]
    Config(String),

    #[error("invalid legacy data on {owner}: {reason}")]
    InvalidLegacyData { owner: String, reason: String },

    #[error("locked by another process: {0}")]
    Locked(String),

    #[error("{0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl MigrateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UniqueViolation { .. } => "unique_violation",
            Self::DatabaseNotFound(_) => "database_not_found",
            Self::Config(_) => "config_error",
            Self::InvalidLegacyData { .. } => "invalid_legacy_data",
            Self::Locked(_) => "locked",
            Self::Store(_) => "store_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::Db(_) => "db_error",
        }
    }

    /// Duplicate-key failures are resolved by lookup; everything else is a real failure.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unique_violation_is_recoverable() {
        let dup = MigrateError::UniqueViolation {
            entity: "label",
            key: "Bug".into(),
        };
        assert!(dup.is_unique_violation());
        assert_eq!(dup.code(), "unique_violation");
        assert_eq!(dup.to_string(), "label 'Bug' already exists");

        let other = MigrateError::Store("disk full".into());
        assert!(!other.is_unique_violation());
        assert_eq!(other.code(), "store_error");
    }
}
