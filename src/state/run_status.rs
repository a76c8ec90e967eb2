use std::fmt;

/// Final status of one monitoring cycle, as recorded in crawl history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// Walk, diff and commit all completed
    Success,

    /// Some results were committed despite errors. Stored and readable, but
    /// no cycle currently produces it.
    PartialSuccess,

    /// The cycle failed after site validation; nothing was committed
    Failed,
}

impl RunStatus {
    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial_success" => Some(Self::PartialSuccess),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 3] {
        [Self::Success, Self::PartialSuccess, Self::Failed]
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
