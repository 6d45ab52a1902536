use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a board lays out its cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Flowchart,
    Freeform,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flowchart => "flowchart",
            Self::Freeform => "freeform",
        }
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flowchart" => Ok(Self::Flowchart),
            "freeform" => Ok(Self::Freeform),
            other => Err(format!("invalid view mode: {}", other)),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of an ingested email. Stored as an integer code.
///
/// `Processed` and `Ignored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailState {
    Unprocessed,
    Processed,
    Ignored,
}

impl EmailState {
    pub fn code(self) -> i64 {
        match self {
            Self::Unprocessed => 0,
            Self::Processed => 1,
            Self::Ignored => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Unprocessed),
            1 => Some(Self::Processed),
            2 => Some(Self::Ignored),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Unprocessed)
    }
}

/// Output format of a board export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    #[default]
    Png,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "png" => Ok(Self::Png),
            other => Err(format!("invalid export format: {}", other)),
        }
    }
}
