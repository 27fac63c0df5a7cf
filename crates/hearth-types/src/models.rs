use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What a deletion operation is tearing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionTargetKind {
    Server,
    Channel,
}

impl DeletionTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Channel => "channel",
        }
    }
}

impl fmt::Display for DeletionTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionTargetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server" => Ok(Self::Server),
            "channel" => Ok(Self::Channel),
            other => Err(format!("unknown deletion target kind: {}", other)),
        }
    }
}

/// Lifecycle of a deletion operation. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    InProgress,
    Completed,
}

impl DeletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for DeletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown deletion status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_match_storage_form() {
        for status in [DeletionStatus::InProgress, DeletionStatus::Completed] {
            assert_eq!(status.as_str().parse::<DeletionStatus>().unwrap(), status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert!(DeletionStatus::Completed.is_terminal());
        assert!(!DeletionStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert_eq!("channel".parse::<DeletionTargetKind>().unwrap(), DeletionTargetKind::Channel);
        assert!("guild".parse::<DeletionTargetKind>().is_err());
    }
}
