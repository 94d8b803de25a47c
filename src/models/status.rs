use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing status persisted alongside the identifier.
///
/// An unset status is modelled as `Option<Status>::None` on the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The last attempt produced no usable keywords and should be retried.
    Retry,
    /// Generation failed after exhausting retries.
    Failed,
    /// Description and keywords were generated and written.
    Success,
}

impl Status {
    /// Returns the value written to the status metadata field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Failed => "failed",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a metadata value is not a known status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "failed" => Ok(Self::Failed),
            "success" => Ok(Self::Success),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
