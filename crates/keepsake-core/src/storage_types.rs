use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Role a backend plays for new uploads.
///
/// Persisted on every photo row, so the variant names are part of the database
/// contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "photo_backend", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Primary,
    Secondary,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Primary => "primary",
            BackendKind::Secondary => "secondary",
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(BackendKind::Primary),
            "secondary" => Ok(BackendKind::Secondary),
            _ => Err(anyhow::anyhow!("Invalid backend kind: {}", s)),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Storage backend implementation types
///
/// Which object store implementation sits behind a [`BackendKind`]. The primary is
/// always S3-compatible; the secondary may also be a local directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!(
            "PRIMARY".parse::<BackendKind>().unwrap(),
            BackendKind::Primary
        );
        assert_eq!(
            "secondary".parse::<BackendKind>().unwrap(),
            BackendKind::Secondary
        );
        assert!("tertiary".parse::<BackendKind>().is_err());
    }

    #[test]
    fn storage_backend_display_matches_parse() {
        for backend in [StorageBackend::S3, StorageBackend::Local] {
            assert_eq!(
                backend.to_string().parse::<StorageBackend>().unwrap(),
                backend
            );
        }
    }

    #[test]
    fn backend_kind_serializes_lowercase() {
        let json = serde_json::to_string(&BackendKind::Secondary).unwrap();
        assert_eq!(json, "\"secondary\"");
    }
}
