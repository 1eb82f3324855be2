//! League schedule handling: the semicolon-delimited CSV export with German
//! column headers, and the schedule HTML page that carries per-match detail
//! links (match details, statistics PDF, scoresheet PDF).

use crate::dates::{berlin_local, BerlinTime};
use crate::error::Result;
use crate::fetch;
use crate::scrapers::{absolutize, element_text, parse_selector};
use crate::teams::{is_same_team, is_usc};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_SCHEDULE_URL: &str =
    "https://www.volleyball-bundesliga.de/servlet/league/PlayingScheduleCsvExport?matchSeriesId=776311171";
pub const SCHEDULE_PAGE_URL: &str = "https://www.volleyball-bundesliga.de/cms/home/\
1_bundesliga_frauen/statistik/hauptrunde/spielplan.xhtml?playingScheduleMode=full";
pub const VBL_BASE_URL: &str = "https://www.volleyball-bundesliga.de/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub score: String,
    pub total_points: Option<String>,
    pub sets: Vec<String>,
}

impl MatchResult {
    /// `3:1 / 97:81 (25:20 23:25 25:18 25:18)`
    pub fn summary(&self) -> String {
        let mut segments = vec![self.score.clone()];
        if let Some(points) = &self.total_points {
            segments.push(format!("/ {points}"));
        }
        if !self.sets.is_empty() {
            segments.push(format!("({})", self.sets.join(" ")));
        }
        segments.join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub kickoff: BerlinTime,
    pub home_team: String,
    pub away_team: String,
    pub host: String,
    pub location: String,
    pub result: Option<MatchResult>,
    pub match_number: Option<String>,
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub info_url: Option<String>,
    #[serde(default)]
    pub stats_url: Option<String>,
    #[serde(default)]
    pub scoresheet_url: Option<String>,
    #[serde(default)]
    pub referees: Vec<String>,
    #[serde(default)]
    pub attendance: Option<String>,
    #[serde(default)]
    pub competition: String,
    #[serde(default)]
    pub season: String,
}

impl Match {
    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchMetadata {
    pub match_id: Option<String>,
    pub info_url: Option<String>,
    pub stats_url: Option<String>,
    pub scoresheet_url: Option<String>,
}

fn header_index(headers: &csv::StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.trim().to_string(), idx))
        .collect()
}

fn field<'a>(
    index: &HashMap<String, usize>,
    record: &'a csv::StringRecord,
    name: &str,
) -> &'a str {
    index
        .get(name)
        .and_then(|&idx| record.get(idx))
        .unwrap_or("")
        .trim()
}

pub fn parse_kickoff(date_str: &str, time_str: &str) -> Option<BerlinTime> {
    let combined = format!("{} {}", date_str.trim(), time_str.trim());
    let naive = NaiveDateTime::parse_from_str(&combined, "%d.%m.%Y %H:%M:%S").ok()?;
    berlin_local(naive)
}

/// `-` and `–` are the export's placeholders for "no value yet".
fn normalize_field(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() || value == "-" || value == "–" {
        return None;
    }
    Some(value.to_string())
}

fn parse_referee_field(raw: &str) -> Vec<String> {
    static SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[;,/]").unwrap());
    match normalize_field(raw) {
        Some(value) => SPLIT_RE
            .split(&value)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

static RESULT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<score>\d+:\d+)(?:\s*/\s*(?P<points>\d+:\d+))?(?:\s*\((?P<sets>[^)]+)\))?")
        .unwrap()
});

/// Parse a combined result label such as `3:1 / 97:81 (25:20 23:25 ...)`.
/// Labels that carry no recognizable score are kept verbatim.
fn parse_result_text(raw: &str) -> Option<MatchResult> {
    let cleaned = normalize_field(raw)?;
    let Some(caps) = RESULT_RE.captures(&cleaned) else {
        return Some(MatchResult {
            score: cleaned,
            total_points: None,
            sets: Vec::new(),
        });
    };
    let sets = caps
        .name("sets")
        .map(|m| {
            m.as_str()
                .replace(',', " ")
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(MatchResult {
        score: caps["score"].to_string(),
        total_points: caps.name("points").map(|m| m.as_str().to_string()),
        sets,
    })
}

/// Build a result from the structured columns, falling back to the combined
/// `Ergebnis` label for whatever pieces the export left blank.
fn build_match_result(
    index: &HashMap<String, usize>,
    record: &csv::StringRecord,
) -> Option<MatchResult> {
    let fallback = parse_result_text(field(index, record, "Ergebnis"));

    let score = field(index, record, "Satzpunkte").to_string();
    let total_points = field(index, record, "Ballpunkte").to_string();

    let mut sets: Vec<String> = Vec::new();
    for set in 1..=5 {
        let home = field(index, record, &format!("Satz {set} - Ballpunkte 1"));
        let away = field(index, record, &format!("Satz {set} - Ballpunkte 2"));
        if !home.is_empty() && !away.is_empty() {
            sets.push(format!("{home}:{away}"));
        }
    }

    if !score.is_empty() || !total_points.is_empty() || !sets.is_empty() {
        let score = if score.is_empty() {
            fallback.as_ref().map(|f| f.score.clone()).unwrap_or_default()
        } else {
            score
        };
        let total_points = if total_points.is_empty() {
            fallback.as_ref().and_then(|f| f.total_points.clone())
        } else {
            Some(total_points)
        };
        if sets.is_empty() {
            if let Some(fallback) = &fallback {
                sets = fallback.sets.clone();
            }
        }
        if score.is_empty() {
            return None;
        }
        return Some(MatchResult {
            score,
            total_points,
            sets,
        });
    }

    fallback
}

pub fn parse_schedule(csv_text: &str) -> Result<Vec<Match>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();
    let index = header_index(&headers);

    let mut matches = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(kickoff) = parse_kickoff(
            field(&index, &record, "Datum"),
            field(&index, &record, "Uhrzeit"),
        ) else {
            continue;
        };

        matches.push(Match {
            kickoff,
            home_team: field(&index, &record, "Mannschaft 1").to_string(),
            away_team: field(&index, &record, "Mannschaft 2").to_string(),
            host: field(&index, &record, "Gastgeber").to_string(),
            location: field(&index, &record, "Austragungsort").to_string(),
            result: build_match_result(&index, &record),
            match_number: normalize_field(field(&index, &record, "#")),
            match_id: None,
            info_url: None,
            stats_url: None,
            scoresheet_url: None,
            referees: parse_referee_field(field(&index, &record, "Schiedsgericht")),
            attendance: normalize_field(field(&index, &record, "Zuschauerzahl")),
            competition: field(&index, &record, "Spielrunde").to_string(),
            season: field(&index, &record, "Saison").to_string(),
        });
    }
    Ok(matches)
}

pub async fn fetch_schedule_csv(client: &Client, url: &str) -> Result<String> {
    fetch::fetch_text(client, url).await
}

static MATCH_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"match_(\d+)").unwrap());

/// Per-match detail links from the schedule page. Rows carry a hidden
/// `match_<id>` cell; the match number in the second column ties the links
/// back to the CSV export.
pub fn parse_schedule_metadata(html: &str) -> Result<HashMap<String, MatchMetadata>> {
    let document = Html::parse_document(html);
    let row_selector = parse_selector("table tr")?;
    let cell_selector = parse_selector("td")?;
    let anchor_selector = parse_selector("a[href]")?;

    let mut metadata: HashMap<String, MatchMetadata> = HashMap::new();
    let mut current_match_id: Option<String> = None;

    for row in document.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        for cell in &cells {
            if let Some(id) = cell.value().attr("id") {
                if let Some(caps) = MATCH_ID_RE.captures(id) {
                    current_match_id = Some(caps[1].to_string());
                }
            }
        }
        if cells.len() < 2 {
            continue;
        }
        let number_text = element_text(&cells[1]);
        if number_text.is_empty() || !number_text.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }

        let entry = metadata.entry(number_text).or_default();
        if let Some(match_id) = &current_match_id {
            entry.match_id = Some(match_id.clone());
        }

        for anchor in row.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let full_href = absolutize(VBL_BASE_URL, href);
            let title = anchor.value().attr("title").unwrap_or("").to_lowercase();
            let href_lower = href.to_lowercase();
            if href_lower.contains("matchdetails") {
                entry.info_url = Some(full_href);
            } else if href_lower.contains("scoresheet") {
                entry.scoresheet_url = Some(full_href);
            } else if title.contains("statistik") || href_lower.contains("uploads") {
                entry.stats_url = Some(full_href);
            }
        }
    }

    Ok(metadata)
}

pub fn merge_metadata(matches: &mut [Match], metadata: &HashMap<String, MatchMetadata>) {
    for entry in matches.iter_mut() {
        let Some(number) = &entry.match_number else {
            continue;
        };
        if let Some(meta) = metadata.get(number) {
            entry.match_id = meta.match_id.clone();
            entry.info_url = meta.info_url.clone();
            entry.stats_url = meta.stats_url.clone();
            entry.scoresheet_url = meta.scoresheet_url.clone();
        }
    }
}

static SCORESHEET_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/(\d{4})/?$").unwrap());

/// Map match number to scoresheet PDF URL from the schedule page.
pub fn parse_scoresheet_links(html: &str) -> Result<HashMap<String, String>> {
    let document = Html::parse_document(html);
    let anchor_selector = parse_selector("a[href]")?;

    let mut links = HashMap::new();
    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains("scoresheet/pdf") {
            continue;
        }
        if let Some(caps) = SCORESHEET_NUMBER_RE.captures(href) {
            links.insert(caps[1].to_string(), absolutize(VBL_BASE_URL, href));
        }
    }
    Ok(links)
}

pub fn team_in_match(team_name: &str, entry: &Match) -> bool {
    is_same_team(team_name, &entry.home_team) || is_same_team(team_name, &entry.away_team)
}

pub fn find_next_usc_home_match<'a>(
    matches: &'a [Match],
    reference: &BerlinTime,
) -> Option<&'a Match> {
    matches
        .iter()
        .filter(|entry| is_usc(&entry.host) && entry.kickoff >= *reference)
        .min_by_key(|entry| entry.kickoff)
}

pub fn find_last_matches_for_team<'a>(
    matches: &'a [Match],
    team_name: &str,
    limit: usize,
    reference: &BerlinTime,
) -> Vec<&'a Match> {
    let mut relevant: Vec<&Match> = matches
        .iter()
        .filter(|entry| {
            entry.is_finished() && entry.kickoff < *reference && team_in_match(team_name, entry)
        })
        .collect();
    relevant.sort_by(|a, b| b.kickoff.cmp(&a.kickoff));
    relevant.truncate(limit);
    relevant
}

pub fn find_next_match_for_team<'a>(
    matches: &'a [Match],
    team_name: &str,
    reference: &BerlinTime,
) -> Option<&'a Match> {
    matches
        .iter()
        .filter(|entry| entry.kickoff >= *reference && team_in_match(team_name, entry))
        .min_by_key(|entry| entry.kickoff)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEDULE_CSV: &str = "\
#;Datum;Uhrzeit;Mannschaft 1;Mannschaft 2;Gastgeber;Austragungsort;Ergebnis;Satzpunkte;Ballpunkte;Satz 1 - Ballpunkte 1;Satz 1 - Ballpunkte 2;Satz 2 - Ballpunkte 1;Satz 2 - Ballpunkte 2;Satz 3 - Ballpunkte 1;Satz 3 - Ballpunkte 2;Satz 4 - Ballpunkte 1;Satz 4 - Ballpunkte 2;Satz 5 - Ballpunkte 1;Satz 5 - Ballpunkte 2;Schiedsgericht;Zuschauerzahl;Saison;Spielrunde
1001;12.01.2025;17:00:00;USC M\u{fc}nster;VC Wiesbaden;USC M\u{fc}nster;Sporthalle Berg Fidel;3:1 / 97:81;3:1;97:81;25;20;23;25;25;18;25;18;;;Meier, Schulze;1.512;2024/25;Hauptrunde
1002;19.01.2025;16:00:00;Dresdner SC;USC M\u{fc}nster;Dresdner SC;Margon Arena;\u{2013};;;;;;;;;;;;;;-;2024/25;Hauptrunde
;;;;;;;;;;;;;;;;;;;;;;;
";

    fn parsed() -> Vec<Match> {
        parse_schedule(SCHEDULE_CSV).unwrap()
    }

    #[test]
    fn parses_rows_and_skips_incomplete_ones() {
        let matches = parsed();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].home_team, "USC Münster");
        assert_eq!(matches[0].match_number.as_deref(), Some("1001"));
        assert_eq!(matches[0].attendance.as_deref(), Some("1.512"));
        assert_eq!(matches[0].referees, vec!["Meier", "Schulze"]);
        assert_eq!(matches[0].competition, "Hauptrunde");
    }

    #[test]
    fn kickoff_is_berlin_local_time() {
        let matches = parsed();
        assert_eq!(matches[0].kickoff.offset().local_minus_utc(), 3600);
        assert_eq!(
            matches[0].kickoff.format("%d.%m.%Y %H:%M").to_string(),
            "12.01.2025 17:00"
        );
    }

    #[test]
    fn builds_results_from_set_columns() {
        let matches = parsed();
        let result = matches[0].result.as_ref().unwrap();
        assert_eq!(result.score, "3:1");
        assert_eq!(result.total_points.as_deref(), Some("97:81"));
        assert_eq!(result.sets, vec!["25:20", "23:25", "25:18", "25:18"]);
        assert!(matches[0].is_finished());
        assert!(!matches[1].is_finished());
    }

    #[test]
    fn result_label_fallback_fills_missing_columns() {
        let result = parse_result_text("3:2 / 110:105 (25:20, 23:25, 25:18, 20:25, 17:15)").unwrap();
        assert_eq!(result.score, "3:2");
        assert_eq!(result.total_points.as_deref(), Some("110:105"));
        assert_eq!(result.sets.len(), 5);
        assert_eq!(result.summary(), "3:2 / 110:105 (25:20 23:25 25:18 20:25 17:15)");

        assert!(parse_result_text("–").is_none());
        assert!(parse_result_text("").is_none());
        let verbatim = parse_result_text("abgesagt").unwrap();
        assert_eq!(verbatim.score, "abgesagt");
    }

    #[test]
    fn finds_home_and_recent_matches() {
        let matches = parsed();
        let reference = crate::dates::parse_date_label("15.01.2025").unwrap();

        let last = find_last_matches_for_team(&matches, "USC Münster", 5, &reference);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].match_number.as_deref(), Some("1001"));

        let next = find_next_match_for_team(&matches, "usc muenster", &reference).unwrap();
        assert_eq!(next.match_number.as_deref(), Some("1002"));

        // Next home match: Dresden hosts, so nothing for USC.
        assert!(find_next_usc_home_match(&matches, &reference).is_none());
    }

    #[test]
    fn extracts_metadata_links_from_schedule_page() {
        let html = r#"
        <table>
          <tr>
            <td id="match_998877"></td>
            <td>1001</td>
            <td><a href="/popup/matchSeries/matchDetails.xhtml?matchId=998877" title="Details">Info</a></td>
            <td><a href="https://www.volleyball-bundesliga.de/uploads/stats/1001.pdf" title="Statistik">Statistik</a></td>
            <td><a href="/servlet/league/scoresheet/pdf/1001/">Spielbericht</a></td>
          </tr>
        </table>
        "#;
        let metadata = parse_schedule_metadata(html).unwrap();
        let entry = metadata.get("1001").unwrap();
        assert_eq!(entry.match_id.as_deref(), Some("998877"));
        assert!(entry.info_url.as_deref().unwrap().contains("matchDetails"));
        assert!(entry.stats_url.as_deref().unwrap().contains("uploads"));
        assert!(entry.scoresheet_url.as_deref().unwrap().contains("scoresheet"));

        let links = parse_scoresheet_links(html).unwrap();
        assert_eq!(
            links.get("1001").map(String::as_str),
            Some("https://www.volleyball-bundesliga.de/servlet/league/scoresheet/pdf/1001/")
        );
    }
}
