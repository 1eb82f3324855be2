//! Heuristics for official scoresheet PDFs. The extracted text keeps the
//! reading order of the layout: a match header naming both teams with their
//! `A`/`B` codes, then one block per set. Each set block repeats the six
//! rotation slots (`I` to `VI`) for both teams as a roman-numeral header
//! row followed by the row of starting shirt numbers.

use crate::error::{Result, ScrapeError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLineup {
    pub number: u8,
    /// Team code to the six starting shirt numbers (slot I first).
    pub lineups: BTreeMap<String, Vec<String>>,
    /// Team code to final set score, when the block carries one.
    pub scores: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scoresheet {
    /// Team code (`A`/`B`) to team name.
    pub team_names: BTreeMap<String, String>,
    /// Codes in reading order: left team, right team.
    pub code_order: (String, String),
    pub sets: Vec<SetLineup>,
}

impl Scoresheet {
    pub fn usc_code(&self) -> Option<&str> {
        self.team_names
            .iter()
            .find(|(_, name)| simplify(name).contains("usc"))
            .map(|(code, _)| code.as_str())
    }

    pub fn opponent_code(&self) -> Option<&str> {
        let usc = self.usc_code()?;
        self.team_names
            .keys()
            .find(|code| code.as_str() != usc)
            .map(String::as_str)
    }
}

pub(crate) fn simplify(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

static TEAM_CODES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([AB])\s+(.+?)\s+vs\.?\s+(.+?)\s+([AB])\b").unwrap()
});

fn extract_team_codes(text: &str) -> Result<(BTreeMap<String, String>, (String, String))> {
    // The header sits near the top of the first page.
    let head: String = text
        .split_whitespace()
        .take(200)
        .collect::<Vec<_>>()
        .join(" ");
    let caps = TEAM_CODES_RE
        .captures(&head)
        .ok_or_else(|| ScrapeError::Parse("Could not determine team codes".to_string()))?;
    let left_code = caps[1].to_string();
    let right_code = caps[4].to_string();
    let mut names = BTreeMap::new();
    names.insert(left_code.clone(), caps[2].trim().to_string());
    names.insert(right_code.clone(), caps[3].trim().to_string());
    Ok((names, (left_code, right_code)))
}

static SET_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"SAT[ZS](\d)").unwrap());

fn detect_set_number(line: &str) -> Option<u8> {
    let condensed: String = line.split_whitespace().collect();
    SET_MARKER_RE
        .captures(&condensed)
        .and_then(|caps| caps[1].parse().ok())
}

const ROMAN_SLOTS: [&str; 6] = ["I", "II", "III", "IV", "V", "VI"];

fn roman_token_count(line: &str) -> usize {
    line.split_whitespace()
        .filter(|token| ROMAN_SLOTS.contains(token))
        .count()
}

static NUMBER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,2}\b").unwrap());
static LETTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-zÄÖÜäöüß]").unwrap());
static SET_SCORE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{1,2})\s*:\s*(\d{1,2})\b").unwrap());

fn numeric_tokens(line: &str) -> Vec<String> {
    NUMBER_TOKEN_RE
        .find_iter(line)
        .map(|m| m.as_str().to_string())
        .collect()
}

const SKIP_KEYWORDS: [&str; 3] = ["Punkte", "Wechsel", "Auszeit"];

/// The starting rotation is the first plausible 12-number run in a set
/// block: preferably the line right below the roman-numeral header row,
/// otherwise the first letter-free line carrying at least 12 small numbers.
fn find_lineup_row(section: &[&str]) -> Option<Vec<String>> {
    for (idx, line) in section.iter().enumerate() {
        if roman_token_count(line) >= 12 {
            for candidate in section.iter().skip(idx + 1).take(3) {
                if SKIP_KEYWORDS.iter().any(|keyword| candidate.contains(keyword)) {
                    continue;
                }
                let numbers = numeric_tokens(candidate);
                if numbers.len() >= 12 {
                    return Some(numbers);
                }
            }
        }
    }
    section
        .iter()
        .filter(|line| !LETTER_RE.is_match(line))
        .map(|line| numeric_tokens(line))
        .find(|numbers| numbers.len() >= 12)
}

/// A plausible volleyball set score: someone reached at least 15, nobody
/// 46. Only the `Punkte` line is considered, otherwise start times and the
/// running score grid would qualify.
fn find_set_score(section: &[&str]) -> Option<(String, String)> {
    for line in section.iter().filter(|line| line.contains("Punkte")) {
        for caps in SET_SCORE_RE.captures_iter(line) {
            let left: u32 = caps[1].parse().ok()?;
            let right: u32 = caps[2].parse().ok()?;
            if left.max(right) >= 15 && left <= 45 && right <= 45 {
                return Some((caps[1].to_string(), caps[2].to_string()));
            }
        }
    }
    None
}

pub fn parse_scoresheet_text(text: &str) -> Result<Scoresheet> {
    let (team_names, code_order) = extract_team_codes(text)?;
    let lines: Vec<&str> = text.lines().collect();

    // Split the document into per-set sections at the SATZ markers.
    let mut markers: Vec<(usize, u8)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if let Some(number) = detect_set_number(line) {
            markers.push((idx, number));
        }
    }
    if markers.is_empty() {
        return Err(ScrapeError::Parse(
            "No set blocks found in scoresheet".to_string(),
        ));
    }

    let mut sets: Vec<SetLineup> = Vec::new();
    for (marker_index, &(start, number)) in markers.iter().enumerate() {
        if !(1..=5).contains(&number) {
            continue;
        }
        let end = markers
            .get(marker_index + 1)
            .map(|&(next, _)| next)
            .unwrap_or(lines.len());
        let section = &lines[start..end];

        let Some(numbers) = find_lineup_row(section) else {
            continue;
        };
        let mut lineups = BTreeMap::new();
        lineups.insert(code_order.0.clone(), numbers[..6].to_vec());
        lineups.insert(code_order.1.clone(), numbers[6..12].to_vec());

        let mut scores = BTreeMap::new();
        if let Some((left, right)) = find_set_score(section) {
            scores.insert(code_order.0.clone(), left);
            scores.insert(code_order.1.clone(), right);
        }

        if sets.iter().any(|existing| existing.number == number) {
            continue;
        }
        sets.push(SetLineup {
            number,
            lineups,
            scores,
        });
    }
    sets.sort_by_key(|set| set.number);

    if sets.is_empty() {
        return Err(ScrapeError::Parse(
            "No starting rotations found in scoresheet".to_string(),
        ));
    }

    Ok(Scoresheet {
        team_names,
        code_order,
        sets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET_TEXT: &str = "\
Spielbericht 1. Bundesliga Frauen\n\
A USC Münster vs. VC Wiesbaden B Halle Berg Fidel\n\
S A T Z 1 Beginn 17:02\n\
A Aufstellung I II III IV V VI I II III IV V VI B\n\
10 2 7 12 5 9 4 11 3 8 14 6\n\
Punkte 25 : 20 Wechsel 2\n\
SATZ 2 Beginn 17:31\n\
I II III IV V VI I II III IV V VI\n\
10 2 7 12 5 9 6 11 3 8 14 4\n\
Punkte 23 : 25\n\
";

    #[test]
    fn extracts_team_codes_in_reading_order() {
        let sheet = parse_scoresheet_text(SHEET_TEXT).unwrap();
        assert_eq!(sheet.code_order, ("A".to_string(), "B".to_string()));
        assert_eq!(sheet.team_names.get("A").map(String::as_str), Some("USC Münster"));
        assert_eq!(sheet.team_names.get("B").map(String::as_str), Some("VC Wiesbaden"));
        assert_eq!(sheet.usc_code(), Some("A"));
        assert_eq!(sheet.opponent_code(), Some("B"));
    }

    #[test]
    fn extracts_rotations_per_set() {
        let sheet = parse_scoresheet_text(SHEET_TEXT).unwrap();
        assert_eq!(sheet.sets.len(), 2);

        let first = &sheet.sets[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.lineups["A"], vec!["10", "2", "7", "12", "5", "9"]);
        assert_eq!(first.lineups["B"], vec!["4", "11", "3", "8", "14", "6"]);

        let second = &sheet.sets[1];
        assert_eq!(second.number, 2);
        assert_eq!(second.lineups["B"][5], "4");
    }

    #[test]
    fn picks_plausible_set_scores() {
        let sheet = parse_scoresheet_text(SHEET_TEXT).unwrap();
        assert_eq!(sheet.sets[0].scores.get("A").map(String::as_str), Some("25"));
        assert_eq!(sheet.sets[0].scores.get("B").map(String::as_str), Some("20"));
        assert_eq!(sheet.sets[1].scores.get("B").map(String::as_str), Some("25"));
    }

    #[test]
    fn rejects_sheets_without_sets() {
        let text = "A USC Münster vs. VC Wiesbaden B\nkein Inhalt";
        assert!(parse_scoresheet_text(text).is_err());
    }
}
