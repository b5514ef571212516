use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What to do with symbolic links met during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPolicy {
    /// Links contribute nothing and are never resolved.
    #[default]
    Skip,
    /// Resolve links; each canonical directory and file is visited once.
    Follow,
}

/// What to do when a directory below the root cannot be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadablePolicy {
    /// Fail the whole computation with the first error.
    #[default]
    Abort,
    /// Treat the subtree as empty and record it in the report.
    CountAsZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorOptions {
    pub links: LinkPolicy,
    pub unreadable: UnreadablePolicy,
}

impl AggregatorOptions {
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.links = if follow { LinkPolicy::Follow } else { LinkPolicy::Skip };
        self
    }

    pub fn skip_unreadable(mut self, skip: bool) -> Self {
        self.unreadable = if skip {
            UnreadablePolicy::CountAsZero
        } else {
            UnreadablePolicy::Abort
        };
        self
    }

    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
