use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend kinds.
///
/// Defined in core because it is referenced from configuration and from the
/// per-entity storage references; the implementations live in arlink-storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    S3,
    Local,
    CloudDisk,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(BackendKind::S3),
            "local" => Ok(BackendKind::Local),
            "cloud" | "clouddisk" | "cloud_disk" => Ok(BackendKind::CloudDisk),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackendKind::S3 => write!(f, "s3"),
            BackendKind::Local => write!(f, "local"),
            BackendKind::CloudDisk => write!(f, "cloud_disk"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_round_trip() {
        for kind in [BackendKind::S3, BackendKind::Local, BackendKind::CloudDisk] {
            let parsed: BackendKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn backend_kind_rejects_unknown() {
        assert!("gopher".parse::<BackendKind>().is_err());
    }
}
