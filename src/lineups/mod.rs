//! Starting line-up datasets: the most recent scoresheets of USC and the
//! upcoming opponent, resolved against the official roster exports and
//! serialized for the static site (`aufstellungen.json`).

use crate::dates::{berlin_now, BerlinTime};
use crate::error::{Result, ScrapeError};
use crate::fetch;
use crate::scrapers::roster::{self, RosterMember};
use crate::scrapers::schedule::{
    self, find_last_matches_for_team, find_next_usc_home_match, Match,
};
use crate::storage::FileStore;
use crate::teams::{choose_preferred_player_name, is_usc, short_display_name, USC_CANONICAL_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use scoresheet::{simplify, Scoresheet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub(crate) mod scoresheet;

pub const POSITION_SLOTS: [&str; 6] = ["I", "II", "III", "IV", "V", "VI"];
pub const LINEUP_DATASET_FILENAME: &str = "aufstellungen.json";

#[derive(Debug, Clone)]
pub struct LineupOptions {
    pub limit: usize,
    pub schedule_url: String,
    pub schedule_page_url: String,
}

impl Default for LineupOptions {
    fn default() -> Self {
        Self {
            limit: 2,
            schedule_url: schedule::DEFAULT_SCHEDULE_URL.to_string(),
            schedule_page_url: schedule::SCHEDULE_PAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupSlot {
    pub slot: String,
    pub number: Option<String>,
    pub full_name: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupTeamMeta {
    pub code: String,
    pub name: String,
    pub is_focus: bool,
    pub is_usc: bool,
    pub is_opponent: bool,
    pub setters: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupSetEntry {
    pub number: u8,
    pub lineups: BTreeMap<String, Vec<LineupSlot>>,
    pub scores: BTreeMap<String, String>,
    pub score_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupMatchEntry {
    pub focus: String,
    pub focus_team_code: Option<String>,
    pub focus_team_name: String,
    pub match_number: String,
    pub kickoff: String,
    pub date_label: String,
    pub home_team: String,
    pub away_team: String,
    pub competition: String,
    pub venue: String,
    pub season: String,
    pub result: String,
    pub home_code: Option<String>,
    pub away_code: Option<String>,
    pub set_scores: Vec<String>,
    pub pdf_url: String,
    pub team_codes: BTreeMap<String, String>,
    pub usc_code: Option<String>,
    pub opponent_code: Option<String>,
    pub teams: Vec<LineupTeamMeta>,
    pub sets: Vec<LineupSetEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupDataset {
    pub generated_at: String,
    pub usc_team: String,
    pub opponent_team: String,
    pub matches: Vec<LineupMatchEntry>,
}

struct MatchLineups {
    row: Match,
    pdf_url: String,
    sheet: Scoresheet,
}

/// Roster-derived facts per team, keyed by simplified team name.
#[derive(Default)]
struct RosterLookup {
    setters: HashMap<String, Vec<String>>,
    numbers: HashMap<String, HashMap<String, String>>,
}

impl RosterLookup {
    fn insert(&mut self, team_name: &str, roster: &[RosterMember]) {
        let key = simplify(team_name);
        if key.is_empty() || self.numbers.contains_key(&key) {
            return;
        }
        self.setters
            .insert(key.clone(), roster::setter_numbers(roster));
        self.numbers.insert(key, roster::number_to_name(roster));
    }

    fn setters_for(&self, team_name: &str) -> Vec<String> {
        self.setters
            .get(&simplify(team_name))
            .cloned()
            .unwrap_or_default()
    }

    fn names_for(&self, team_name: &str) -> Option<&HashMap<String, String>> {
        self.numbers.get(&simplify(team_name))
    }
}

fn find_team_code<'a>(
    team_names: &'a BTreeMap<String, String>,
    target_name: &str,
) -> Option<&'a str> {
    let normalized_target = simplify(target_name);
    team_names
        .iter()
        .find(|(_, name)| simplify(name) == normalized_target)
        .map(|(code, _)| code.as_str())
}

/// Finished USC matches, newest first. Matched via `is_usc` so that
/// non-canonical spellings in the export still count.
fn find_recent_usc_matches<'a>(
    matches: &'a [Match],
    limit: usize,
    reference: &BerlinTime,
) -> Vec<&'a Match> {
    let mut rows: Vec<&Match> = matches
        .iter()
        .filter(|entry| {
            entry.is_finished()
                && entry.kickoff < *reference
                && (is_usc(&entry.home_team) || is_usc(&entry.away_team))
        })
        .collect();
    rows.sort_by(|a, b| b.kickoff.cmp(&a.kickoff));
    rows.truncate(limit);
    rows
}

pub async fn build_lineup_dataset(
    client: &Client,
    store: &FileStore,
    options: &LineupOptions,
) -> Result<LineupDataset> {
    let now = berlin_now();

    info!("Fetching schedule export");
    let csv_text = schedule::fetch_schedule_csv(client, &options.schedule_url).await?;
    let matches = schedule::parse_schedule(&csv_text)?;

    let recent_rows = find_recent_usc_matches(&matches, options.limit, &now);
    if recent_rows.is_empty() {
        return Err(ScrapeError::Other(
            "No finished USC matches found".to_string(),
        ));
    }

    let next_home = find_next_usc_home_match(&matches, &now).ok_or_else(|| {
        ScrapeError::Other("No upcoming USC home match found".to_string())
    })?;
    let opponent_name = next_home.away_team.clone();

    let opponent_rows =
        find_last_matches_for_team(&matches, &opponent_name, options.limit, &now);

    info!("Fetching scoresheet links");
    let page_html = fetch::fetch_html(client, &options.schedule_page_url).await?;
    let pdf_links = schedule::parse_scoresheet_links(&page_html)?;

    let mut match_requests: Vec<(&str, &Match)> =
        recent_rows.iter().map(|row| ("usc", *row)).collect();
    match_requests.extend(opponent_rows.iter().map(|row| ("opponent", *row)));
    if match_requests.is_empty() {
        return Err(ScrapeError::Other(
            "No matches relevant for the lineup analysis".to_string(),
        ));
    }

    let bar = ProgressBar::new(match_requests.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .map_err(|e| ScrapeError::Other(e.to_string()))?,
    );

    let mut sheets: HashMap<String, Scoresheet> = HashMap::new();
    let mut collected: Vec<(String, MatchLineups)> = Vec::new();
    for (focus, row) in &match_requests {
        let match_number = row
            .match_number
            .clone()
            .ok_or_else(|| ScrapeError::Other("Match without a number".to_string()))?;
        let pdf_url = pdf_links.get(&match_number).cloned().ok_or_else(|| {
            ScrapeError::Other(format!("No scoresheet link for match {match_number}"))
        })?;

        bar.set_message(format!("Scoresheet {match_number}"));
        if !sheets.contains_key(&match_number) {
            let cache_path = store.cache_path(Some("lineups"), &format!("{match_number}.pdf"));
            let data = match store.read_cached_bytes(&cache_path)? {
                Some(cached) => cached,
                None => {
                    let data = fetch::fetch_bytes(client, &pdf_url).await?;
                    store.write_bytes(&cache_path, &data)?;
                    data
                }
            };
            let text = pdf_extract::extract_text_from_mem(&data)?;
            sheets.insert(match_number.clone(), scoresheet::parse_scoresheet_text(&text)?);
        }
        collected.push((
            focus.to_string(),
            MatchLineups {
                row: (*row).clone(),
                pdf_url,
                sheet: sheets[&match_number].clone(),
            },
        ));
        bar.inc(1);
    }
    bar.finish_with_message("Scoresheets ready");

    let mut rosters = RosterLookup::default();
    for (_, entry) in &collected {
        for name in entry.sheet.team_names.values() {
            let roster = roster::collect_team_roster(client, store, name)
                .await
                .unwrap_or_default();
            rosters.insert(name, &roster);
        }
    }

    Ok(serialize_dataset(
        &collected,
        USC_CANONICAL_NAME,
        &opponent_name,
        &rosters,
    ))
}

fn serialize_dataset(
    collected: &[(String, MatchLineups)],
    usc_team: &str,
    opponent_team: &str,
    rosters: &RosterLookup,
) -> LineupDataset {
    let mut serialized = Vec::new();
    for (focus, entry) in collected {
        let team_names = &entry.sheet.team_names;
        let usc_code = entry.sheet.usc_code().map(str::to_string);
        let opponent_code = entry.sheet.opponent_code().map(str::to_string);
        let home_code = find_team_code(team_names, &entry.row.home_team).map(str::to_string);
        let away_code = find_team_code(team_names, &entry.row.away_team).map(str::to_string);

        let focus_code = match focus.as_str() {
            "usc" => usc_code.clone(),
            "opponent" => find_team_code(team_names, opponent_team).map(str::to_string),
            _ => None,
        };

        let teams: Vec<LineupTeamMeta> = team_names
            .iter()
            .map(|(code, name)| LineupTeamMeta {
                code: code.clone(),
                name: name.clone(),
                is_focus: focus_code.as_deref() == Some(code.as_str()),
                is_usc: usc_code.as_deref() == Some(code.as_str()),
                is_opponent: simplify(name) == simplify(opponent_team),
                setters: rosters.setters_for(name),
            })
            .collect();

        let schedule_set_scores: Vec<String> = entry
            .row
            .result
            .as_ref()
            .map(|result| result.sets.clone())
            .unwrap_or_default();

        let mut sets = Vec::new();
        for set_lineup in &entry.sheet.sets {
            let mut lineups: BTreeMap<String, Vec<LineupSlot>> = BTreeMap::new();
            for (code, positions) in &set_lineup.lineups {
                let team_name = team_names.get(code).map(String::as_str).unwrap_or("");
                let official_roster = rosters.names_for(team_name);
                let mut entries: Vec<LineupSlot> = POSITION_SLOTS
                    .iter()
                    .zip(positions.iter().take(6))
                    .map(|(slot, number)| {
                        let official = official_roster
                            .and_then(|lookup| lookup.get(number))
                            .map(String::as_str);
                        let full_name = choose_preferred_player_name(None, official);
                        let short_name = short_display_name(full_name.as_deref());
                        LineupSlot {
                            slot: slot.to_string(),
                            number: Some(number.clone()),
                            full_name,
                            short_name,
                        }
                    })
                    .collect();
                // Pad when the heuristics recognized fewer than six slots.
                while entries.len() < 6 {
                    entries.push(LineupSlot {
                        slot: POSITION_SLOTS[entries.len()].to_string(),
                        number: None,
                        full_name: None,
                        short_name: None,
                    });
                }
                lineups.insert(code.clone(), entries);
            }

            let mut score_entries = set_lineup.scores.clone();
            let mut score_label = None;
            if let (Some(home_code), Some(away_code)) = (&home_code, &away_code) {
                let home_score = set_lineup.scores.get(home_code);
                let away_score = set_lineup.scores.get(away_code);
                match (home_score, away_score) {
                    (Some(home_score), Some(away_score)) => {
                        score_label = Some(format!("{home_score}:{away_score}"));
                    }
                    _ => {
                        let index = set_lineup.number as usize;
                        if index >= 1 && index <= schedule_set_scores.len() {
                            let fallback = schedule_set_scores[index - 1].clone();
                            if let Some((home_part, away_part)) = fallback.split_once(':') {
                                score_entries
                                    .insert(home_code.clone(), home_part.to_string());
                                score_entries
                                    .insert(away_code.clone(), away_part.to_string());
                            }
                            score_label = Some(fallback);
                        }
                    }
                }
            }

            sets.push(LineupSetEntry {
                number: set_lineup.number,
                lineups,
                scores: score_entries,
                score_label,
            });
        }

        let set_scores = if !schedule_set_scores.is_empty() {
            schedule_set_scores.clone()
        } else if let (Some(home_code), Some(away_code)) = (&home_code, &away_code) {
            entry
                .sheet
                .sets
                .iter()
                .filter_map(|set_lineup| {
                    let home_score = set_lineup.scores.get(home_code)?;
                    let away_score = set_lineup.scores.get(away_code)?;
                    Some(format!("{home_score}:{away_score}"))
                })
                .collect()
        } else {
            Vec::new()
        };

        let result = entry
            .row
            .result
            .as_ref()
            .map(|result| result.score.clone())
            .unwrap_or_default();

        let focus_team_name = focus_code
            .as_ref()
            .and_then(|code| team_names.get(code))
            .cloned()
            .unwrap_or_else(|| {
                if focus.as_str() == "opponent" {
                    opponent_team.to_string()
                } else {
                    usc_team.to_string()
                }
            });

        serialized.push(LineupMatchEntry {
            focus: focus.clone(),
            focus_team_code: focus_code,
            focus_team_name,
            match_number: entry.row.match_number.clone().unwrap_or_default(),
            kickoff: entry.row.kickoff.to_rfc3339(),
            date_label: entry.row.kickoff.format("%d.%m.%Y").to_string(),
            home_team: entry.row.home_team.clone(),
            away_team: entry.row.away_team.clone(),
            competition: entry.row.competition.clone(),
            venue: entry.row.location.clone(),
            season: entry.row.season.clone(),
            result,
            home_code,
            away_code,
            set_scores,
            pdf_url: entry.pdf_url.clone(),
            team_codes: team_names.clone(),
            usc_code,
            opponent_code,
            teams,
            sets,
        });
    }

    LineupDataset {
        generated_at: berlin_now().to_rfc3339(),
        usc_team: usc_team.to_string(),
        opponent_team: opponent_team.to_string(),
        matches: serialized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::schedule::parse_schedule;

    fn sample_sheet() -> Scoresheet {
        let text = "\
A USC Münster vs. VC Wiesbaden B\n\
SATZ 1\n\
I II III IV V VI I II III IV V VI\n\
10 2 7 12 5 9 4 11 3 8 14 6\n\
SATZ 2\n\
I II III IV V VI I II III IV V VI\n\
10 2 7 12 5 9 6 11 3 8 14 4\n";
        scoresheet::parse_scoresheet_text(text).unwrap()
    }

    fn sample_match() -> Match {
        let csv = "\
#;Datum;Uhrzeit;Mannschaft 1;Mannschaft 2;Gastgeber;Austragungsort;Ergebnis;Satzpunkte;Ballpunkte;Satz 1 - Ballpunkte 1;Satz 1 - Ballpunkte 2;Satz 2 - Ballpunkte 1;Satz 2 - Ballpunkte 2;Schiedsgericht;Zuschauerzahl;Saison;Spielrunde
1001;12.01.2025;17:00:00;USC M\u{fc}nster;VC Wiesbaden;USC M\u{fc}nster;Sporthalle Berg Fidel;2:0;2:0;50:38;25;20;23;25;;;2024/25;Hauptrunde
";
        parse_schedule(csv).unwrap().remove(0)
    }

    #[test]
    fn serializes_dataset_with_roster_names_and_fallback_scores() {
        let mut rosters = RosterLookup::default();
        let roster_csv = "\
Trikot;Titel Vorname Nachname;Position/Funktion Offizieller;Größe;Geburtsdatum;Staatsangehörigkeit
10;Weber, Lena;Zuspielerin;;;
2;Anders, Maja;Außenangreiferin;;;
";
        let members = crate::scrapers::roster::parse_roster(roster_csv).unwrap();
        rosters.insert("USC Münster", &members);

        let collected = vec![(
            "usc".to_string(),
            MatchLineups {
                row: sample_match(),
                pdf_url: "https://example.com/scoresheet/pdf/1001/".to_string(),
                sheet: sample_sheet(),
            },
        )];
        let dataset = serialize_dataset(&collected, "USC Münster", "VC Wiesbaden", &rosters);

        assert_eq!(dataset.matches.len(), 1);
        let entry = &dataset.matches[0];
        assert_eq!(entry.focus, "usc");
        assert_eq!(entry.focus_team_code.as_deref(), Some("A"));
        assert_eq!(entry.usc_code.as_deref(), Some("A"));
        assert_eq!(entry.home_code.as_deref(), Some("A"));
        assert_eq!(entry.away_code.as_deref(), Some("B"));
        assert_eq!(entry.result, "2:0");
        assert_eq!(entry.date_label, "12.01.2025");

        let first_set = &entry.sets[0];
        let slot_one = &first_set.lineups["A"][0];
        assert_eq!(slot_one.slot, "I");
        assert_eq!(slot_one.number.as_deref(), Some("10"));
        assert_eq!(slot_one.full_name.as_deref(), Some("Weber, Lena"));
        assert_eq!(slot_one.short_name.as_deref(), Some("Weber"));

        // No score in the sheet, so the schedule's per-set points fill in.
        assert_eq!(first_set.score_label.as_deref(), Some("25:20"));
        assert_eq!(first_set.scores.get("A").map(String::as_str), Some("25"));

        // Opponent team is marked even without being the focus.
        let wiesbaden = entry.teams.iter().find(|team| team.code == "B").unwrap();
        assert!(wiesbaden.is_opponent);
        assert!(!wiesbaden.is_usc);

        // USC setters resolved from the roster.
        let usc_meta = entry.teams.iter().find(|team| team.code == "A").unwrap();
        assert_eq!(usc_meta.setters, vec!["10"]);
    }

    #[test]
    fn recent_usc_matches_are_sorted_and_capped() {
        let csv = "\
#;Datum;Uhrzeit;Mannschaft 1;Mannschaft 2;Gastgeber;Austragungsort;Ergebnis;Satzpunkte;Ballpunkte;Saison;Spielrunde
1001;05.01.2025;17:00:00;USC M\u{fc}nster;VC Wiesbaden;USC M\u{fc}nster;Halle;3:0;3:0;75:50;2024/25;Hauptrunde
1002;12.01.2025;17:00:00;Dresdner SC;USC M\u{fc}nster;Dresdner SC;Halle;3:2;3:2;105:100;2024/25;Hauptrunde
1003;19.01.2025;17:00:00;VC Wiesbaden;Dresdner SC;VC Wiesbaden;Halle;3:1;3:1;90:80;2024/25;Hauptrunde
";
        let matches = parse_schedule(csv).unwrap();
        let reference = crate::dates::parse_date_label("01.02.2025").unwrap();
        let recent = find_recent_usc_matches(&matches, 1, &reference);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].match_number.as_deref(), Some("1002"));

        let all = find_recent_usc_matches(&matches, 5, &reference);
        assert_eq!(all.len(), 2);
    }
}
