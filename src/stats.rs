//! Match statistics totals from the official statistics PDFs. The PDFs are
//! text-extracted; the per-team block below the `Spieler insgesamt` marker
//! carries the totals line, which is normalized and parsed into a 13-field
//! metrics record. Extraction artifacts (glued compounds, stray spaces in
//! percentages) are repaired before parsing.

use crate::error::Result;
use crate::fetch;
use crate::scrapers::schedule::Match;
use crate::storage::FileStore;
use crate::teams::slugify_team_name;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatsMetrics {
    pub serves_attempts: u32,
    pub serves_errors: u32,
    pub serves_points: u32,
    pub receptions_attempts: u32,
    pub receptions_errors: u32,
    pub receptions_positive_pct: String,
    pub receptions_perfect_pct: String,
    pub attacks_attempts: u32,
    pub attacks_errors: u32,
    pub attacks_blocked: u32,
    pub attacks_points: u32,
    pub attacks_success_pct: String,
    pub blocks_points: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatsTotals {
    pub team_name: String,
    pub header_lines: Vec<String>,
    pub totals_line: String,
    pub metrics: Option<MatchStatsMetrics>,
}

fn normalize_header_line(line: &str) -> String {
    static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    let stripped = line.trim();
    if stripped.is_empty() {
        return String::new();
    }
    let stripped = match stripped.find("Satz") {
        Some(idx) => &stripped[idx..],
        None => stripped,
    };
    WS_RE.replace_all(stripped, " ").to_string()
}

/// Repair text-extraction artifacts in a totals line so the metrics pattern
/// has a chance: dashes glued to following digits, spaced parentheses,
/// percent signs fused with the next number, compound `a+b` values glued to
/// their neighbor.
fn normalize_totals_line(line: &str) -> String {
    static DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\s+").unwrap());
    static OPEN_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*").unwrap());
    static CLOSE_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\)").unwrap());
    static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    static COMPOUND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\+\d{1,2})(\d+)").unwrap());
    static PCT_DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"%(\d)").unwrap());

    let stripped = DASH_RE.replace_all(line.trim(), "-");
    let stripped = OPEN_PAREN_RE.replace_all(&stripped, "(");
    let stripped = CLOSE_PAREN_RE.replace_all(&stripped, ")");
    let stripped = WS_RE.replace_all(&stripped, " ");
    let stripped = COMPOUND_RE.replace_all(&stripped, "$1 $2");
    let stripped = stripped.replace("%(", "% (");
    PCT_DIGIT_RE.replace_all(&stripped, "% $1").to_string()
}

static METRICS_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?P<serve_attempts>\d+)\s+(?P<serve_combo>\d+)\s+(?P<reception_attempts>\d+)\s+(?P<reception_errors>\d+)\s+(?P<reception_pos>\d+%)\s+\((?P<reception_perf>\d+%)\)\s+(?P<attack_attempts>\d+)\s+(?P<attack_errors>\d+)\s+(?P<attack_combo>\d+)\s+(?P<attack_pct>\d+%)\s+(?P<block_points>\d+)",
    )
    .unwrap()
});

/// Split a glued `errors+points` compound such as `512` into `(5, 12)`,
/// trying suffix lengths until both halves stay in plausible bounds.
fn split_compound_value(value: &str, first_max: u32, second_max: u32) -> Option<(u32, u32)> {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let max_second_len = digits.len().min(3);
    for second_len in 1..=max_second_len {
        let split_at = digits.len() - second_len;
        let first_digits = &digits[..split_at];
        let second_digits = &digits[split_at..];
        let first_value: u32 = if first_digits.is_empty() {
            0
        } else {
            first_digits.parse().ok()?
        };
        let second_value: u32 = second_digits.parse().ok()?;
        if first_value <= first_max && second_value <= second_max {
            return Some((first_value, second_value));
        }
    }
    None
}

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+%|\d+\+\d+|\d+").unwrap());

pub fn parse_match_stats_metrics(line: &str) -> Option<MatchStatsMetrics> {
    let normalized = normalize_totals_line(line);
    if let Some(caps) = METRICS_LINE_RE.captures(&normalized) {
        let (serves_errors, serves_points) =
            split_compound_value(&caps["serve_combo"], 150, 60)?;
        let (attacks_blocked, attacks_points) =
            split_compound_value(&caps["attack_combo"], 60, 150)?;
        return Some(MatchStatsMetrics {
            serves_attempts: caps["serve_attempts"].parse().ok()?,
            serves_errors,
            serves_points,
            receptions_attempts: caps["reception_attempts"].parse().ok()?,
            receptions_errors: caps["reception_errors"].parse().ok()?,
            receptions_positive_pct: caps["reception_pos"].to_string(),
            receptions_perfect_pct: caps["reception_perf"].to_string(),
            attacks_attempts: caps["attack_attempts"].parse().ok()?,
            attacks_errors: caps["attack_errors"].parse().ok()?,
            attacks_blocked,
            attacks_points,
            attacks_success_pct: caps["attack_pct"].to_string(),
            blocks_points: caps["block_points"].parse().ok()?,
        });
    }

    // Fallback for layouts where the set points column keeps its `a+b`
    // notation: tokenize and pick fields by position.
    let mut tokens: Vec<String> = TOKEN_RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect();
    if tokens.len() > 13 && tokens[1].contains('+') {
        if let Some((_, suffix)) = tokens[1].clone().split_once('+') {
            if suffix.len() == 1
                && suffix.chars().all(|c| c.is_ascii_digit())
                && tokens[2].chars().all(|c| c.is_ascii_digit())
            {
                let merged = format!("{}{}", tokens[1], tokens[2]);
                tokens[1] = merged;
                tokens.remove(2);
            }
        }
    }
    if tokens.len() < 13 || !tokens[1].contains('+') {
        return None;
    }
    let (serves_errors, serves_points) = split_compound_value(&tokens[3], 60, 60)?;
    let (attacks_blocked, attacks_points) = split_compound_value(&tokens[10], 40, 150)?;
    Some(MatchStatsMetrics {
        serves_attempts: tokens[2].parse().ok()?,
        serves_errors,
        serves_points,
        receptions_attempts: tokens[4].parse().ok()?,
        receptions_errors: tokens[5].parse().ok()?,
        receptions_positive_pct: tokens[6].clone(),
        receptions_perfect_pct: tokens[7].clone(),
        attacks_attempts: tokens[8].parse().ok()?,
        attacks_errors: tokens[9].parse().ok()?,
        attacks_blocked,
        attacks_points,
        attacks_success_pct: tokens[11].clone(),
        blocks_points: tokens[12].parse().ok()?,
    })
}

static STATS_TEAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Spielbericht\s+)?(.+?)\s+\d+\s*$").unwrap());

fn extract_stats_team_names(lines: &[&str]) -> Vec<String> {
    let mut names = Vec::new();
    for line in lines {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        let Some(caps) = STATS_TEAM_RE.captures(stripped) else {
            continue;
        };
        let candidate = caps[1].trim().to_string();
        if candidate.is_empty() || candidate.to_lowercase() == "spielbericht" {
            continue;
        }
        names.push(candidate);
        if names.len() >= 2 {
            break;
        }
    }
    names
}

static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-zÄÖÜäöüß]").unwrap());
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").unwrap());

/// Totals per team from extracted statistics-PDF text. One block per
/// `Spieler insgesamt` marker; the last digits-only line before the next
/// `Satz` section is the totals line.
pub fn parse_stats_totals_text(text: &str) -> Vec<MatchStatsTotals> {
    let cleaned = text.replace('\0', "");
    let lines: Vec<&str> = cleaned.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }
    let markers: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == "Spieler insgesamt")
        .map(|(idx, _)| idx)
        .collect();
    if markers.is_empty() {
        return Vec::new();
    }
    let team_names = extract_stats_team_names(&lines);

    let mut summaries = Vec::new();
    for (marker_index, &marker) in markers.iter().enumerate() {
        let mut header_lines: Vec<String> = Vec::new();
        let mut cursor = marker;
        while cursor > 0 && header_lines.len() < 3 {
            cursor -= 1;
            let candidate = lines[cursor].trim();
            if !candidate.is_empty() {
                header_lines.push(normalize_header_line(candidate));
            }
        }
        header_lines.reverse();

        let mut totals_line: Option<&str> = None;
        for probe in lines.iter().skip(marker + 1) {
            let candidate = probe.trim();
            if candidate.is_empty() {
                continue;
            }
            if candidate.starts_with("Satz") {
                break;
            }
            if LETTER_RE.is_match(candidate) {
                continue;
            }
            if DIGIT_RE.is_match(candidate) {
                totals_line = Some(candidate);
            }
        }
        let Some(totals_line) = totals_line else {
            continue;
        };
        let normalized_totals = normalize_totals_line(totals_line);
        let team_name = team_names
            .get(marker_index)
            .cloned()
            .unwrap_or_else(|| format!("Team {}", marker_index + 1));
        summaries.push(MatchStatsTotals {
            team_name,
            metrics: parse_match_stats_metrics(&normalized_totals),
            header_lines,
            totals_line: normalized_totals,
        });
    }
    summaries
}

pub fn parse_stats_totals_pdf(data: &[u8]) -> Vec<MatchStatsTotals> {
    match pdf_extract::extract_text_from_mem(data) {
        Ok(text) => parse_stats_totals_text(&text),
        Err(err) => {
            warn!("Could not extract statistics PDF text: {err}");
            Vec::new()
        }
    }
}

async fn fetch_match_stats_totals(
    client: &Client,
    store: &FileStore,
    stats_url: &str,
) -> Result<Vec<MatchStatsTotals>> {
    let filename = format!("{}.pdf", slugify_team_name(stats_url));
    let cache_path = store.cache_path(Some("stats"), &filename);
    let data = match store.read_cached_bytes(&cache_path)? {
        Some(cached) => cached,
        None => {
            info!("Fetching match statistics from {stats_url}");
            let data = fetch::fetch_bytes(client, stats_url).await?;
            store.write_bytes(&cache_path, &data)?;
            data
        }
    };
    Ok(parse_stats_totals_pdf(&data))
}

/// Statistics totals for every finished match carrying a stats link, keyed
/// by the stats URL. Unreachable PDFs are skipped, not fatal.
pub async fn collect_match_stats_totals(
    client: &Client,
    store: &FileStore,
    matches: &[&Match],
) -> HashMap<String, Vec<MatchStatsTotals>> {
    let mut collected: HashMap<String, Vec<MatchStatsTotals>> = HashMap::new();
    for entry in matches {
        if !entry.is_finished() {
            continue;
        }
        let Some(stats_url) = &entry.stats_url else {
            continue;
        };
        if collected.contains_key(stats_url) {
            continue;
        }
        match fetch_match_stats_totals(client, store, stats_url).await {
            Ok(summaries) if !summaries.is_empty() => {
                collected.insert(stats_url.clone(), summaries);
            }
            Ok(_) => {}
            Err(err) => warn!("Statistics for {stats_url} failed: {err}"),
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_extraction_artifacts() {
        assert_eq!(
            normalize_totals_line("85  7+9 4  76 8  55%( 29%) 120  19 8+43  38%5"),
            "85 7+9 4 76 8 55% (29%) 120 19 8+43 38% 5"
        );
    }

    #[test]
    fn splits_compound_values_within_bounds() {
        // The shortest suffix wins as long as both halves stay in bounds.
        assert_eq!(split_compound_value("512", 150, 60), Some((51, 2)));
        assert_eq!(split_compound_value("512", 5, 60), Some((5, 12)));
        assert_eq!(split_compound_value("1043", 60, 150), Some((10, 43)));
        assert_eq!(split_compound_value("", 10, 10), None);
        // No split keeps both halves in bounds.
        assert_eq!(split_compound_value("999999", 5, 5), None);
    }

    #[test]
    fn parses_primary_totals_layout() {
        let line = "85 115 76 8 55% (29%) 120 19 1043 38% 9";
        let metrics = parse_match_stats_metrics(line).unwrap();
        assert_eq!(metrics.serves_attempts, 85);
        assert_eq!(metrics.serves_errors, 11);
        assert_eq!(metrics.serves_points, 5);
        assert_eq!(metrics.receptions_attempts, 76);
        assert_eq!(metrics.receptions_errors, 8);
        assert_eq!(metrics.receptions_positive_pct, "55%");
        assert_eq!(metrics.receptions_perfect_pct, "29%");
        assert_eq!(metrics.attacks_attempts, 120);
        assert_eq!(metrics.attacks_blocked, 10);
        assert_eq!(metrics.attacks_points, 43);
        assert_eq!(metrics.blocks_points, 9);
    }

    #[test]
    fn falls_back_to_token_layout_with_set_points() {
        // Layout with a leading rank and `a+b` set points column.
        let line = "1 25+23 85 115 76 8 55% 29% 120 19 1043 38% 9 4";
        let metrics = parse_match_stats_metrics(line).unwrap();
        assert_eq!(metrics.serves_attempts, 85);
        assert_eq!(metrics.serves_errors, 11);
        assert_eq!(metrics.serves_points, 5);
        assert_eq!(metrics.blocks_points, 9);

        assert!(parse_match_stats_metrics("nur Text ohne Zahlen").is_none());
    }

    #[test]
    fn extracts_totals_blocks_per_team() {
        let text = "\
Spielbericht USC Münster 3\n\
VC Wiesbaden 1\n\
Satz 1 2 3 4\n\
Aufschlag Annahme Angriff Block\n\
Name Auf Fhl Pkt\n\
Spieler insgesamt\n\
85 115 76 8 55% (29%) 120 19 1043 38% 9\n\
Satz 2\n\
irrelevant\n\
Spieler insgesamt\n\
80 310 70 10 48% (22%) 110 21 938 35% 7\n";
        let summaries = parse_stats_totals_text(text);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].team_name, "USC Münster");
        assert_eq!(summaries[1].team_name, "VC Wiesbaden");
        assert!(summaries[0].metrics.is_some());
        assert_eq!(summaries[0].header_lines.len(), 3);
        assert_eq!(
            summaries[1].metrics.as_ref().unwrap().serves_attempts,
            80
        );
    }
}
