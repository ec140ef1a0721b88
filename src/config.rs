use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use thiserror::Error;

use crate::{api::FeedParams, feed::DEFAULT_PAGE_CAP};

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base url of the data server, e.g. `https://pds.example.com`.
    pub service: String,
    /// Account used for likes and reposts.
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_method: Option<String>,

    /// Base query of the feed. `before` is managed by the controller.
    #[serde(default)]
    pub feed: FeedParams,
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open config: {0}")]
    Open(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

fn default_page_cap() -> usize {
    DEFAULT_PAGE_CAP
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_yaml::from_reader(file)?)
    }
}
