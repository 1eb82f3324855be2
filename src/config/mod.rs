use crate::config::cli::Args;
use crate::error::Result;
use crate::fetch;
use clap::Parser;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

pub(crate) mod cli;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub league_uuid: String,
    #[serde(default)]
    pub team_uuid: String,
    #[serde(default)]
    pub season_uuid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Rss,
    Html,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub url: String,
    #[serde(default = "default_source_kind", rename = "type")]
    pub kind: SourceKind,
    #[serde(default = "default_source_limit")]
    pub limit: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_source_kind() -> SourceKind {
    SourceKind::Rss
}

fn default_source_limit() -> usize {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub news_sources: Vec<NewsSource>,
}

pub struct Config {
    pub args: Args,
    pub app: AppConfig,
    pub http_client: Client,
}

impl Config {
    pub fn new() -> Result<Self> {
        let args = Args::parse();

        let app = if args.config_file.exists() {
            let raw = std::fs::read_to_string(&args.config_file)?;
            let mut parsed: AppConfig = serde_json::from_str(&raw)?;
            // Entries without a name or URL are useless downstream.
            parsed
                .news_sources
                .retain(|source| !source.name.trim().is_empty() && !source.url.trim().is_empty());
            parsed
        } else {
            AppConfig::default()
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(fetch::USER_AGENT)
            .build()?;

        Ok(Self {
            args,
            app,
            http_client,
        })
    }

    /// API key from the command line/environment wins over the config file.
    pub fn api_key(&self) -> Option<String> {
        if let Some(key) = &self.args.vbl_api_key {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        self.app
            .api
            .as_ref()
            .map(|api| api.api_key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if !self.args.data_dir.exists() {
            std::fs::create_dir_all(&self.args.data_dir)?;
        }
        if !self.args.cache_dir.exists() {
            std::fs::create_dir_all(&self.args.cache_dir)?;
        }

        info!("Data and cache dirs exist");
        Ok(())
    }
}
