//! Classified findings produced from model output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity tag of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Clause that should stop the user from accepting
    Blocker,
    /// Unfavourable clause
    Bad,
    /// Favourable clause
    Good,
    /// Informational clause
    Neutral,
}

impl Severity {
    /// All severities, in display order
    pub const ALL: [Severity; 4] = [
        Severity::Blocker,
        Severity::Bad,
        Severity::Good,
        Severity::Neutral,
    ];

    /// Tag as it appears inside the brackets
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocker => "BLOCKER",
            Self::Bad => "BAD",
            Self::Good => "GOOD",
            Self::Neutral => "NEUTRAL",
        }
    }

    /// Icon class used by the HTML renderer
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Blocker => "fa-solid fa-ban",
            Self::Bad => "fa-solid fa-circle-exclamation",
            Self::Good => "fa-solid fa-check-circle",
            Self::Neutral => "fa-solid fa-circle-info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BLOCKER" => Ok(Self::Blocker),
            "BAD" => Ok(Self::Bad),
            "GOOD" => Ok(Self::Good),
            "NEUTRAL" => Ok(Self::Neutral),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// One classified clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Severity tag
    pub severity: Severity,
    /// Short title (may be empty while the line is still streaming)
    pub title: String,
    /// Explanation (may be empty)
    pub explanation: String,
    /// Index of the chunk whose output produced this finding
    pub chunk_index: usize,
}
