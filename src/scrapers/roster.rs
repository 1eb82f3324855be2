//! Team roster CSV exports: players with jersey numbers, officials without.

use crate::error::Result;
use crate::fetch;
use crate::storage::FileStore;
use crate::teams::{get_team_roster_url, slugify_team_name};
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    pub number_label: Option<String>,
    pub number_value: Option<u32>,
    pub name: String,
    pub role: String,
    pub is_official: bool,
    pub height: Option<String>,
    pub birthdate_label: Option<String>,
    pub nationality: Option<String>,
}

impl RosterMember {
    pub fn birthdate_value(&self) -> Option<NaiveDate> {
        let value = self.birthdate_label.as_deref()?.trim();
        if value.is_empty() {
            return None;
        }
        for format in ["%d.%m.%Y", "%d.%m.%y"] {
            if let Ok(parsed) = NaiveDate::parse_from_str(value, format) {
                return Some(parsed);
            }
        }
        None
    }

    pub fn formatted_birthdate(&self) -> Option<String> {
        if let Some(parsed) = self.birthdate_value() {
            return Some(parsed.format("%d.%m.%Y").to_string());
        }
        let value = self.birthdate_label.as_deref()?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

const OFFICIAL_ROLE_PRIORITY: [&str; 6] = [
    "Trainer",
    "Co-Trainer",
    "Co-Trainer (Scout)",
    "Statistiker",
    "Physiotherapeut",
    "Arzt",
];

fn official_sort_key(member: &RosterMember) -> (usize, String, String) {
    let role = member.role.trim();
    let normalized = role.to_lowercase();
    let order = OFFICIAL_ROLE_PRIORITY
        .iter()
        .position(|label| label.to_lowercase() == normalized)
        .unwrap_or(OFFICIAL_ROLE_PRIORITY.len());
    (order, normalized, member.name.to_lowercase())
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

/// Players first (by jersey number, then name), officials afterwards in
/// their conventional role order.
pub fn parse_roster(csv_text: &str) -> Result<Vec<RosterMember>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let headers = reader.headers()?.clone();
    let index = header_index(&headers);

    let mut players: Vec<RosterMember> = Vec::new();
    let mut officials: Vec<RosterMember> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let name = field(&index, &record, "Titel Vorname Nachname").to_string();
        if name.is_empty() {
            continue;
        }
        let number_raw = field(&index, &record, "Trikot").to_string();
        let role = field(&index, &record, "Position/Funktion Offizieller").to_string();
        let height = field(&index, &record, "Größe").to_string();
        let birthdate = field(&index, &record, "Geburtsdatum").to_string();
        let nationality = field(&index, &record, "Staatsangehörigkeit").to_string();

        let compact: String = number_raw.chars().filter(|c| !c.is_whitespace()).collect();
        let number_value: Option<u32> = if !compact.is_empty() && compact.chars().all(|c| c.is_ascii_digit()) {
            compact.parse().ok()
        } else {
            None
        };

        let member = RosterMember {
            number_label: (!number_raw.is_empty()).then_some(number_raw),
            number_value,
            name,
            role,
            is_official: number_value.is_none(),
            height: (!height.is_empty()).then_some(height),
            birthdate_label: (!birthdate.is_empty()).then_some(birthdate),
            nationality: (!nationality.is_empty()).then_some(nationality),
        };
        if member.is_official {
            officials.push(member);
        } else {
            players.push(member);
        }
    }

    players.sort_by_key(|member| {
        (
            member.number_value.unwrap_or(10_000),
            member.name.to_lowercase(),
        )
    });
    officials.sort_by_key(official_sort_key);

    players.extend(officials);
    Ok(players)
}

/// Download a team's roster export, keep a copy in the cache directory, and
/// parse it. Teams without a known roster id resolve to an empty roster.
pub async fn collect_team_roster(
    client: &Client,
    store: &FileStore,
    team_name: &str,
) -> Result<Vec<RosterMember>> {
    let Some(url) = get_team_roster_url(team_name) else {
        return Ok(Vec::new());
    };
    let slug = {
        let slug = slugify_team_name(team_name);
        if slug.is_empty() {
            "team".to_string()
        } else {
            slug
        }
    };
    let cache_path = store.cache_path(Some("rosters"), &format!("{slug}.csv"));
    let csv_text = match store.read_cached_text(&cache_path)? {
        Some(cached) => cached,
        None => {
            info!("Fetching roster for {team_name}");
            let csv_text = fetch::fetch_latin1(client, &url).await?;
            store.write_text(&cache_path, &csv_text)?;
            csv_text
        }
    };
    parse_roster(&csv_text)
}

/// Jersey numbers of the roster's setters, sorted numerically.
pub fn setter_numbers(roster: &[RosterMember]) -> Vec<String> {
    let mut numbers: Vec<u32> = roster
        .iter()
        .filter(|member| !member.is_official)
        .filter(|member| {
            let role = member.role.to_lowercase();
            role.contains("zuspiel") || role.contains("setter")
        })
        .filter_map(|member| member.number_value)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers.into_iter().map(|n| n.to_string()).collect()
}

/// Jersey number to player name, officials excluded.
pub fn number_to_name(roster: &[RosterMember]) -> HashMap<String, String> {
    roster
        .iter()
        .filter(|member| !member.is_official)
        .filter_map(|member| {
            let number = member.number_value?;
            let name = member.name.trim();
            if name.is_empty() {
                return None;
            }
            Some((number.to_string(), name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER_CSV: &str = "\
Trikot;Titel Vorname Nachname;Position/Funktion Offizieller;Größe;Geburtsdatum;Staatsangehörigkeit
10;Weber, Lena;Zuspielerin;1,78 m;03.04.1999;Deutschland
2;Anders, Maja;Außenangreiferin;1,84 m;15.07.01;Deutschland
;Koch, Stefan;Trainer;;;Deutschland
;Berg, Paul;Physiotherapeut;;;Deutschland
;Lang, Eva;Co-Trainer;;;Deutschland
;;;;;
";

    #[test]
    fn splits_players_and_officials_with_ordering() {
        let roster = parse_roster(ROSTER_CSV).unwrap();
        let names: Vec<&str> = roster.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Anders, Maja",
                "Weber, Lena",
                "Koch, Stefan",
                "Lang, Eva",
                "Berg, Paul",
            ]
        );
        assert!(!roster[0].is_official);
        assert!(roster[2].is_official);
        assert_eq!(roster[1].number_value, Some(10));
    }

    #[test]
    fn parses_two_and_four_digit_birth_years() {
        let roster = parse_roster(ROSTER_CSV).unwrap();
        let weber = roster.iter().find(|m| m.name.starts_with("Weber")).unwrap();
        assert_eq!(weber.formatted_birthdate().as_deref(), Some("03.04.1999"));
        let anders = roster.iter().find(|m| m.name.starts_with("Anders")).unwrap();
        assert_eq!(anders.formatted_birthdate().as_deref(), Some("15.07.2001"));
    }

    #[test]
    fn resolves_setters_and_number_lookup() {
        let roster = parse_roster(ROSTER_CSV).unwrap();
        assert_eq!(setter_numbers(&roster), vec!["10"]);

        let lookup = number_to_name(&roster);
        assert_eq!(lookup.get("2").map(String::as_str), Some("Anders, Maja"));
        assert_eq!(lookup.get("10").map(String::as_str), Some("Weber, Lena"));
        assert!(lookup.get("99").is_none());
    }
}
