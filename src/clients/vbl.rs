//! Minimal client for the Volleyball Bundesliga SAMS REST API.

use crate::dates::BerlinTime;
use crate::error::{Result, ScrapeError};
use chrono::DateTime;
use chrono_tz::Europe::Berlin;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

const BASE_URL: &str = "https://www.volleyball-bundesliga.de/api/v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueRanking {
    pub rank: u32,
    pub team_name: String,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points: i32,
    pub set_ratio: Option<f64>,
    pub ball_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeagueMatch {
    pub uuid: String,
    pub date: Option<BerlinTime>,
    pub team_home: String,
    pub team_away: String,
    pub venue: Option<String>,
    pub results: Option<String>,
}

impl LeagueMatch {
    pub fn is_finished(&self) -> bool {
        self.results.is_some()
    }
}

pub struct VblApi {
    client: Client,
    api_key: String,
}

impl VblApi {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into().trim().to_string(),
        }
    }

    async fn request(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(ScrapeError::Other(
                "A VBL API key is required to query league data".to_string(),
            ));
        }
        let url = format!("{BASE_URL}{path}");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Api-Key", &self.api_key)
            .query(params)
            .send()
            .await?;
        let response = response.error_for_status().map_err(|err| {
            error!("API request failed: {err}");
            err
        })?;
        Ok(response.json().await?)
    }

    async fn paginate(&self, path: &str, params: &[(String, String)]) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u64 = 0;
        loop {
            let mut merged: Vec<(String, String)> = params.to_vec();
            merged.push(("page".to_string(), page.to_string()));
            if !merged.iter().any(|(key, _)| key == "size") {
                merged.push(("size".to_string(), "100".to_string()));
            }
            let payload = self.request(path, &merged).await?;
            let content = match payload.get("content") {
                Some(Value::Array(content)) => content.clone(),
                // HAL style embedding
                _ => match payload.get("_embedded") {
                    Some(Value::Array(embedded)) => embedded.clone(),
                    _ => Vec::new(),
                },
            };
            if content.is_empty() {
                break;
            }
            items.extend(content);
            if payload.get("last").and_then(Value::as_bool).unwrap_or(true) {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    pub async fn find_league_by_name(
        &self,
        name: &str,
        season_uuid: Option<&str>,
    ) -> Result<Option<Value>> {
        let mut params = Vec::new();
        if let Some(season) = season_uuid {
            params.push(("season".to_string(), season.to_string()));
        }
        let target = name.trim().to_lowercase();
        let leagues = self.paginate("/leagues", &params).await?;
        Ok(leagues.into_iter().find(|item| {
            item.get("name")
                .and_then(Value::as_str)
                .map(|league| league.trim().to_lowercase() == target)
                .unwrap_or(false)
        }))
    }

    pub async fn get_league_rankings(&self, league_uuid: &str) -> Result<Vec<LeagueRanking>> {
        let params = vec![("size".to_string(), "100".to_string())];
        let payload = self
            .request(&format!("/leagues/{league_uuid}/rankings"), &params)
            .await?;
        let rows = payload
            .get("content")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut rankings: Vec<LeagueRanking> = rows.iter().map(ranking_from_payload).collect();
        rankings.sort_by_key(|row| row.rank);
        Ok(rankings)
    }

    pub async fn get_league_matches(&self, league_uuid: &str) -> Result<Vec<LeagueMatch>> {
        let params = vec![("for-league".to_string(), league_uuid.to_string())];
        let matches = self.paginate("/league-matches", &params).await?;
        Ok(matches.iter().map(match_from_payload).collect())
    }

    pub async fn get_team_matches(&self, team_uuid: &str) -> Result<Vec<LeagueMatch>> {
        let params = vec![("for-team".to_string(), team_uuid.to_string())];
        let matches = self.paginate("/league-matches", &params).await?;
        Ok(matches.iter().map(match_from_payload).collect())
    }
}

fn string_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn u32_field(payload: &Value, key: &str) -> u32 {
    match payload.get(key) {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0) as u32,
        Some(Value::String(raw)) => raw.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn ranking_from_payload(payload: &Value) -> LeagueRanking {
    LeagueRanking {
        rank: u32_field(payload, "rank"),
        team_name: string_field(payload, "teamName"),
        matches_played: u32_field(payload, "matchesPlayed"),
        wins: u32_field(payload, "wins"),
        losses: u32_field(payload, "losses"),
        points: u32_field(payload, "points") as i32,
        set_ratio: parse_ratio(payload.get("setRatio")),
        ball_ratio: parse_ratio(payload.get("ballRatio")),
    }
}

fn match_from_payload(payload: &Value) -> LeagueMatch {
    let date = payload
        .get("date")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Berlin).fixed_offset());
    let venue = payload
        .get("location")
        .and_then(|location| location.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let results = payload
        .get("results")
        .and_then(|results| results.get("setPoints"))
        .and_then(Value::as_str)
        .filter(|set_points| !set_points.is_empty())
        .map(str::to_string);
    LeagueMatch {
        uuid: string_field(payload, "uuid"),
        date,
        team_home: string_field(payload, "team1Description"),
        team_away: string_field(payload, "team2Description"),
        venue,
        results,
    }
}

/// Ratios arrive either as numbers or as `sets_won:sets_lost` strings.
fn parse_ratio(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            if let Ok(parsed) = raw.parse::<f64>() {
                return Some(parsed);
            }
            let (numerator, denominator) = raw.split_once(':')?;
            let numerator: f64 = numerator.trim().parse().ok()?;
            let denominator: f64 = denominator.trim().parse().ok()?;
            if denominator == 0.0 {
                return None;
            }
            Some(numerator / denominator)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ratio_formats() {
        assert_eq!(parse_ratio(Some(&serde_json::json!(1.5))), Some(1.5));
        assert_eq!(parse_ratio(Some(&serde_json::json!("2.25"))), Some(2.25));
        assert_eq!(parse_ratio(Some(&serde_json::json!("3:2"))), Some(1.5));
        assert_eq!(parse_ratio(Some(&serde_json::json!("3:0"))), None);
        assert_eq!(parse_ratio(Some(&serde_json::json!(""))), None);
        assert_eq!(parse_ratio(None), None);
    }

    #[test]
    fn converts_match_payloads() {
        let payload = serde_json::json!({
            "uuid": "abc-123",
            "date": "2025-01-12T17:00:00+01:00",
            "team1Description": "USC Münster",
            "team2Description": "VC Wiesbaden",
            "location": {"name": "Sporthalle Berg Fidel"},
            "results": {"setPoints": "3:1"}
        });
        let entry = match_from_payload(&payload);
        assert_eq!(entry.uuid, "abc-123");
        assert_eq!(entry.venue.as_deref(), Some("Sporthalle Berg Fidel"));
        assert_eq!(entry.results.as_deref(), Some("3:1"));
        assert!(entry.is_finished());
        assert_eq!(
            entry.date.unwrap().format("%d.%m.%Y %H:%M").to_string(),
            "12.01.2025 17:00"
        );

        let open = serde_json::json!({
            "uuid": "def-456",
            "team1Description": "A",
            "team2Description": "B",
            "results": {"setPoints": ""}
        });
        assert!(!match_from_payload(&open).is_finished());
    }

    #[test]
    fn converts_ranking_rows() {
        let payload = serde_json::json!({
            "rank": 1,
            "teamName": "SSC Palmberg Schwerin",
            "matchesPlayed": 10,
            "wins": 9,
            "losses": 1,
            "points": 27,
            "setRatio": "28:7",
            "ballRatio": 1.18
        });
        let ranking = ranking_from_payload(&payload);
        assert_eq!(ranking.rank, 1);
        assert_eq!(ranking.set_ratio, Some(4.0));
        assert_eq!(ranking.ball_ratio, Some(1.18));
    }
}
