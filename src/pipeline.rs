//! Orchestration of the four commands. Each run works through its stages
//! sequentially with polite pauses between upstream requests, caching every
//! intermediate result under the cache directory.

use crate::clients::mvp::{self, MvpSection};
use crate::clients::vbl::VblApi;
use crate::config::cli::{Command, OutputFormat};
use crate::config::Config;
use crate::dates::berlin_now;
use crate::error::{Result, ScrapeError};
use crate::fetch;
use crate::lineups::{self, LineupDataset, LineupOptions};
use crate::report::{self, html::build_html_report, ReportData};
use crate::scrapers::news::{self, NewsItem, NEWS_LOOKBACK_DAYS};
use crate::scrapers::roster;
use crate::scrapers::schedule::{
    self, find_last_matches_for_team, find_next_match_for_team, find_next_usc_home_match, Match,
};
use crate::scrapers::transfers;
use crate::stats;
use crate::storage::FileStore;
use crate::teams::USC_CANONICAL_NAME;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const POLITE_DELAY: Duration = Duration::from_secs(1);

pub struct Pipeline {
    config: Config,
    store: FileStore,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_directories()?;
        let store = FileStore::new(&config.args.data_dir, &config.args.cache_dir)
            .with_skip_cache(config.args.skip_cache);
        Ok(Self { config, store })
    }

    pub async fn run(&self) -> Result<()> {
        match &self.config.args.command {
            None => self.run_report(OutputFormat::Html, 2, None).await,
            Some(Command::Report {
                format,
                limit,
                output,
            }) => self.run_report(*format, *limit, output.clone()).await,
            Some(Command::Lineups {
                limit,
                schedule_url,
                schedule_page_url,
                output,
            }) => {
                let options = LineupOptions {
                    limit: *limit,
                    schedule_url: schedule_url
                        .clone()
                        .unwrap_or_else(|| schedule::DEFAULT_SCHEDULE_URL.to_string()),
                    schedule_page_url: schedule_page_url
                        .clone()
                        .unwrap_or_else(|| schedule::SCHEDULE_PAGE_URL.to_string()),
                };
                self.run_lineups(&options, output.clone()).await
            }
            Some(Command::Mvp { limit, output }) => self.run_mvp(*limit, output.clone()).await,
            Some(Command::Standings {
                format,
                limit,
                next_games,
            }) => self.run_standings(*format, *limit, *next_games).await,
        }
    }

    /// Schedule export plus the detail links from the schedule page.
    async fn load_schedule(&self) -> Result<Vec<Match>> {
        let client = &self.config.http_client;
        let csv_path = self.store.cache_path(None, "spielplan.csv");
        let csv_text = match self.store.read_cached_text(&csv_path)? {
            Some(cached) => cached,
            None => {
                info!("Fetching schedule export");
                let text = fetch::fetch_text(client, schedule::DEFAULT_SCHEDULE_URL).await?;
                self.store.write_text(&csv_path, &text)?;
                text
            }
        };
        let mut matches = schedule::parse_schedule(&csv_text)?;

        let page_path = self.store.cache_path(None, "spielplan.html");
        let page_html = match self.store.read_cached_text(&page_path)? {
            Some(cached) => cached,
            None => {
                info!("Fetching schedule page");
                let html = fetch::fetch_html(client, schedule::SCHEDULE_PAGE_URL).await?;
                self.store.write_text(&page_path, &html)?;
                html
            }
        };
        let metadata = schedule::parse_schedule_metadata(&page_html)?;
        schedule::merge_metadata(&mut matches, &metadata);
        Ok(matches)
    }

    async fn run_report(
        &self,
        format: OutputFormat,
        limit: usize,
        output: Option<PathBuf>,
    ) -> Result<()> {
        let client = &self.config.http_client;
        let now = berlin_now();

        info!("Step 1: Getting schedule data...");
        let matches = self.load_schedule().await?;
        let next_home = find_next_usc_home_match(&matches, &now)
            .ok_or_else(|| ScrapeError::Other("No upcoming USC home match found".to_string()))?
            .clone();
        let opponent_name = next_home.away_team.clone();
        info!("Next home match against {opponent_name}");

        let usc_recent: Vec<Match> =
            find_last_matches_for_team(&matches, USC_CANONICAL_NAME, limit, &now)
                .into_iter()
                .cloned()
                .collect();
        let opponent_recent: Vec<Match> =
            find_last_matches_for_team(&matches, &opponent_name, limit, &now)
                .into_iter()
                .cloned()
                .collect();
        let usc_next = find_next_match_for_team(&matches, USC_CANONICAL_NAME, &now).cloned();
        let opponent_next = find_next_match_for_team(&matches, &opponent_name, &now).cloned();

        info!("Step 2: Getting rosters...");
        let usc_roster = roster::collect_team_roster(client, &self.store, USC_CANONICAL_NAME)
            .await
            .unwrap_or_default();
        sleep(POLITE_DELAY).await;
        let opponent_roster = roster::collect_team_roster(client, &self.store, &opponent_name)
            .await
            .unwrap_or_default();

        info!("Step 3: Getting news...");
        let (usc_news, opponent_news) = self.collect_news(&opponent_name).await;

        info!("Step 4: Getting transfers...");
        let transfer_map = transfers::fetch_transfers(client).await.unwrap_or_else(|err| {
            warn!("Transfer board unavailable: {err}");
            Default::default()
        });
        let usc_transfers =
            transfers::transfers_for_team(&transfer_map, USC_CANONICAL_NAME).to_vec();
        let opponent_transfers =
            transfers::transfers_for_team(&transfer_map, &opponent_name).to_vec();

        info!("Step 5: Getting match statistics...");
        let stats_targets: Vec<&Match> = usc_recent.iter().chain(opponent_recent.iter()).collect();
        let match_stats =
            stats::collect_match_stats_totals(client, &self.store, &stats_targets).await;

        info!("Step 6: Getting MVP rankings...");
        let mvp_sections = self
            .collect_mvp_sections(&opponent_name, 5)
            .await
            .unwrap_or_else(|err| {
                warn!("MVP rankings unavailable: {err}");
                Vec::new()
            });

        let data = ReportData {
            next_home,
            usc_recent,
            opponent_recent,
            usc_next,
            opponent_next,
            usc_news,
            opponent_news,
            usc_roster,
            opponent_roster,
            usc_transfers,
            opponent_transfers,
            match_stats,
            mvp_sections,
            generated_at: now,
        };

        info!("Step 7: Rendering report...");
        let content = match format {
            OutputFormat::Html => build_html_report(&data),
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "generated_at": data.generated_at.to_rfc3339(),
                "next_home": &data.next_home,
                "usc_recent": &data.usc_recent,
                "opponent_recent": &data.opponent_recent,
                "usc_news": &data.usc_news,
                "opponent_news": &data.opponent_news,
                "usc_roster": &data.usc_roster,
                "opponent_roster": &data.opponent_roster,
                "usc_transfers": &data.usc_transfers,
                "opponent_transfers": &data.opponent_transfers,
                "mvp": &data.mvp_sections,
            }))?,
            OutputFormat::Markdown => report::render_report_markdown(&data),
        };

        match output {
            Some(path) => self.write_output(&path, &content)?,
            None => {
                let default_name = match format {
                    OutputFormat::Html => "index.html",
                    OutputFormat::Json => "report.json",
                    OutputFormat::Markdown => "report.md",
                };
                let path = self.store.data_path(default_name);
                self.write_output(&path, &content)?;
            }
        }
        Ok(())
    }

    /// Team feeds plus the league-wide news and press review, keyword
    /// filtered per team.
    async fn collect_news(&self, opponent_name: &str) -> (Vec<NewsItem>, Vec<NewsItem>) {
        let client = &self.config.http_client;
        let now = berlin_now();

        let usc_own = news::fetch_team_news(client, USC_CANONICAL_NAME, &now, NEWS_LOOKBACK_DAYS)
            .await
            .unwrap_or_else(|err| {
                warn!("USC news unavailable: {err}");
                Vec::new()
            });
        sleep(POLITE_DELAY).await;
        let opponent_own = news::fetch_team_news(client, opponent_name, &now, NEWS_LOOKBACK_DAYS)
            .await
            .unwrap_or_else(|err| {
                warn!("Opponent news unavailable: {err}");
                Vec::new()
            });

        let vbl_articles = match fetch::fetch_html(client, news::VBL_NEWS_URL).await {
            Ok(html) => news::parse_vbl_articles(
                &html,
                news::VBL_NEWS_URL,
                "Volleyball Bundesliga",
                &now,
                NEWS_LOOKBACK_DAYS,
            )
            .unwrap_or_default(),
            Err(err) => {
                warn!("VBL news unavailable: {err}");
                Vec::new()
            }
        };
        sleep(POLITE_DELAY).await;
        let vbl_press = match fetch::fetch_html(client, news::VBL_PRESS_URL).await {
            Ok(html) => {
                news::parse_vbl_press(&html, &now, NEWS_LOOKBACK_DAYS).unwrap_or_default()
            }
            Err(err) => {
                warn!("VBL press review unavailable: {err}");
                Vec::new()
            }
        };

        let mut combined = vbl_articles;
        combined.extend(vbl_press);
        let combined = news::deduplicate_news(combined);

        let usc_keywords = crate::teams::get_team_keywords(USC_CANONICAL_NAME);
        let opponent_keywords = crate::teams::get_team_keywords(opponent_name);

        let mut usc_all = usc_own;
        usc_all.extend(news::filter_by_keywords(&combined, &usc_keywords));
        let mut opponent_all = opponent_own;
        opponent_all.extend(news::filter_by_keywords(&combined, &opponent_keywords));

        // Configured extra sources land on the USC side of the report.
        let configured =
            news::gather_configured_news(client, &self.config.app.news_sources).await;
        usc_all.extend(configured);

        (
            news::deduplicate_news(usc_all),
            news::deduplicate_news(opponent_all),
        )
    }

    async fn collect_mvp_sections(
        &self,
        opponent_name: &str,
        limit: usize,
    ) -> Result<Vec<MvpSection>> {
        let teams = vec![
            USC_CANONICAL_NAME.to_string(),
            opponent_name.to_string(),
        ];
        mvp::collect_mvp_rankings(self.config.http_client.clone(), &teams, limit).await
    }

    async fn run_lineups(&self, options: &LineupOptions, output: Option<PathBuf>) -> Result<()> {
        let dataset = lineups::build_lineup_dataset(
            &self.config.http_client,
            &self.store,
            options,
        )
        .await?;
        let path = output
            .unwrap_or_else(|| self.store.data_path(lineups::LINEUP_DATASET_FILENAME));
        self.store.write_json(&path, &dataset)?;
        info!(
            "Lineup dataset with {} matches written to {}",
            dataset.matches.len(),
            path.display()
        );
        Ok(())
    }

    /// The opponent comes from the published lineup dataset when present,
    /// from the schedule otherwise.
    async fn resolve_opponent(&self) -> Result<String> {
        let dataset_path = self.store.data_path(lineups::LINEUP_DATASET_FILENAME);
        if dataset_path.exists() {
            let raw = std::fs::read_to_string(&dataset_path)?;
            if let Ok(dataset) = serde_json::from_str::<LineupDataset>(&raw) {
                if !dataset.opponent_team.is_empty() {
                    return Ok(dataset.opponent_team);
                }
            }
        }
        let matches = self.load_schedule().await?;
        let now = berlin_now();
        find_next_usc_home_match(&matches, &now)
            .map(|entry| entry.away_team.clone())
            .ok_or_else(|| {
                ScrapeError::Other("Could not determine the opponent team".to_string())
            })
    }

    async fn run_mvp(&self, limit: usize, output: Option<PathBuf>) -> Result<()> {
        let opponent_name = self.resolve_opponent().await?;
        info!("Building MVP dataset for {USC_CANONICAL_NAME} and {opponent_name}");
        let sections = self.collect_mvp_sections(&opponent_name, limit).await?;
        let dataset = mvp::build_mvp_dataset(
            &sections,
            USC_CANONICAL_NAME,
            &opponent_name,
            limit,
            berlin_now().to_rfc3339(),
        );
        let path = output.unwrap_or_else(|| self.store.data_path("mvp_top3.json"));
        self.store.write_json(&path, &dataset)?;
        info!("MVP dataset written to {}", path.display());
        Ok(())
    }

    async fn run_standings(
        &self,
        format: OutputFormat,
        limit: usize,
        next_games: usize,
    ) -> Result<()> {
        let client = &self.config.http_client;
        let mut standings = Vec::new();
        let mut league_matches = Vec::new();
        let mut usc_matches = Vec::new();

        let api_section = self.config.app.api.clone();
        match (self.config.api_key(), api_section) {
            (Some(api_key), Some(api_config)) if !api_config.league_uuid.is_empty() => {
                let api = VblApi::new(client.clone(), api_key);
                standings = api.get_league_rankings(&api_config.league_uuid).await?;
                league_matches = api.get_league_matches(&api_config.league_uuid).await?;
                if !api_config.team_uuid.is_empty() {
                    usc_matches = api.get_team_matches(&api_config.team_uuid).await?;
                }
            }
            _ => {
                eprintln!(
                    "⚠️  Kein API-Schlüssel angegeben – Tabellen- und Spielplandaten werden übersprungen."
                );
            }
        }

        let articles = news::gather_configured_news(client, &self.config.app.news_sources).await;

        let content = match format {
            OutputFormat::Json => serde_json::to_string_pretty(&report::standings_json_payload(
                &standings,
                &league_matches,
                &usc_matches,
                &articles,
            ))?,
            _ => report::render_standings_markdown(
                &standings,
                &league_matches,
                &usc_matches,
                &articles,
                limit,
                next_games,
                &berlin_now(),
            ),
        };
        println!("{content}");
        Ok(())
    }

    fn write_output(&self, path: &Path, content: &str) -> Result<()> {
        self.store.write_text(path, content)?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}
