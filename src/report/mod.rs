//! Report assembly: the data bundle for the matchday report plus the
//! markdown/JSON renderings used by the `standings` command.

use crate::clients::mvp::MvpSection;
use crate::clients::vbl::{LeagueMatch, LeagueRanking};
use crate::dates::BerlinTime;
use crate::scrapers::news::NewsItem;
use crate::scrapers::roster::RosterMember;
use crate::scrapers::schedule::Match;
use crate::scrapers::transfers::TransferItem;
use crate::stats::MatchStatsTotals;
use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::collections::HashMap;

pub(crate) mod html;

pub struct ReportData {
    pub next_home: Match,
    pub usc_recent: Vec<Match>,
    pub opponent_recent: Vec<Match>,
    pub usc_next: Option<Match>,
    pub opponent_next: Option<Match>,
    pub usc_news: Vec<NewsItem>,
    pub opponent_news: Vec<NewsItem>,
    pub usc_roster: Vec<RosterMember>,
    pub opponent_roster: Vec<RosterMember>,
    pub usc_transfers: Vec<TransferItem>,
    pub opponent_transfers: Vec<TransferItem>,
    pub match_stats: HashMap<String, Vec<MatchStatsTotals>>,
    pub mvp_sections: Vec<MvpSection>,
    pub generated_at: BerlinTime,
}

pub fn calculate_age(birthdate: NaiveDate, reference: NaiveDate) -> Option<i32> {
    if birthdate > reference {
        return None;
    }
    let mut years = reference.year() - birthdate.year();
    if (reference.month(), reference.day()) < (birthdate.month(), birthdate.day()) {
        years -= 1;
    }
    Some(years)
}

/// Players whose birthday falls on the match day or in the preceding week.
pub fn collect_birthday_notes(
    match_date: NaiveDate,
    rosters: &[(&str, &[RosterMember])],
) -> Vec<String> {
    let mut notes: Vec<(i64, String)> = Vec::new();
    for (_team_name, roster) in rosters {
        for member in roster.iter() {
            if member.is_official {
                continue;
            }
            let Some(birthdate) = member.birthdate_value() else {
                continue;
            };
            // 29.02. in a non-leap year resolves to the previous year's
            // occurrence, like any birthday after the match day.
            let occurrence = NaiveDate::from_ymd_opt(
                match_date.year(),
                birthdate.month(),
                birthdate.day(),
            )
            .or_else(|| {
                NaiveDate::from_ymd_opt(match_date.year() - 1, birthdate.month(), birthdate.day())
            });
            let Some(mut occurrence) = occurrence else {
                continue;
            };
            if occurrence > match_date {
                let Some(previous) = NaiveDate::from_ymd_opt(
                    match_date.year() - 1,
                    birthdate.month(),
                    birthdate.day(),
                ) else {
                    continue;
                };
                occurrence = previous;
            }
            let delta = (match_date - occurrence).num_days();
            if !(0..=7).contains(&delta) {
                continue;
            }
            let age = calculate_age(birthdate, match_date);
            let name = member.name.trim();
            let note = if delta == 0 {
                match age {
                    Some(age) => format!("{name} hat heute Geburtstag ({age} Jahre)!"),
                    None => format!("{name} hat heute Geburtstag!"),
                }
            } else {
                let date_label = occurrence.format("%d.%m.%Y");
                match age {
                    Some(age) => {
                        format!("{name} hatte am {date_label} Geburtstag ({age} Jahre).")
                    }
                    None => format!("{name} hatte am {date_label} Geburtstag."),
                }
            };
            notes.push((delta, note));
        }
    }
    notes.sort();
    notes.into_iter().map(|(_, note)| note).collect()
}

fn format_league_match(entry: &LeagueMatch) -> String {
    let date_label = entry
        .date
        .map(|date| date.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "Termin offen".to_string());
    let mut parts = vec![format!(
        "- {date_label}: {} vs. {}",
        entry.team_home, entry.team_away
    )];
    if let Some(venue) = &entry.venue {
        parts.push(format!(" (Spielort: {venue})"));
    }
    if let Some(results) = &entry.results {
        parts.push(format!(" – Ergebnis: {results}"));
    }
    parts.concat()
}

fn future_matches<'a>(matches: &'a [LeagueMatch], reference: &BerlinTime) -> Vec<&'a LeagueMatch> {
    let mut future: Vec<&LeagueMatch> = matches
        .iter()
        .filter(|entry| entry.date.map(|date| date >= *reference).unwrap_or(false))
        .collect();
    future.sort_by_key(|entry| entry.date);
    future
}

/// Markdown rendition of standings, schedule and news for the terminal.
pub fn render_standings_markdown(
    standings: &[LeagueRanking],
    league_matches: &[LeagueMatch],
    usc_matches: &[LeagueMatch],
    articles: &[NewsItem],
    limit: usize,
    next_games: usize,
    reference: &BerlinTime,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("## Tabelle".to_string());
    if standings.is_empty() {
        lines.push("Keine Tabellendaten verfügbar. Bitte API-Konfiguration prüfen.".to_string());
    } else {
        lines.push(
            "| Platz | Team | Spiele | Siege | Niederlagen | Punkte | Satzquotient | Ballquotient |"
                .to_string(),
        );
        lines.push("| --- | --- | --- | --- | --- | --- | --- | --- |".to_string());
        for row in standings {
            let set_ratio = row
                .set_ratio
                .map(|ratio| format!("{ratio:.2}"))
                .unwrap_or_else(|| "-".to_string());
            let ball_ratio = row
                .ball_ratio
                .map(|ratio| format!("{ratio:.2}"))
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} | {set_ratio} | {ball_ratio} |",
                row.rank, row.team_name, row.matches_played, row.wins, row.losses, row.points,
            ));
        }
    }

    lines.push(String::new());
    lines.push("## Spielplan".to_string());
    if league_matches.is_empty() {
        lines.push("Keine Spieldaten verfügbar.".to_string());
    } else {
        let mut sorted: Vec<&LeagueMatch> = league_matches.iter().collect();
        sorted.sort_by_key(|entry| entry.date);
        for entry in sorted.into_iter().take(limit) {
            lines.push(format_league_match(entry));
        }
    }

    lines.push(String::new());
    lines.push("## Nächste Spiele USC Münster".to_string());
    let upcoming = future_matches(usc_matches, reference);
    if upcoming.is_empty() {
        lines.push("Keine anstehenden Spiele gefunden.".to_string());
    } else {
        for entry in upcoming.into_iter().take(next_games) {
            lines.push(format_league_match(entry));
        }
    }

    lines.push(String::new());
    lines.push("## Aktuelle Berichte".to_string());
    if articles.is_empty() {
        lines.push("Keine Artikel gefunden.".to_string());
    } else {
        let mut by_source: Vec<(&str, Vec<&NewsItem>)> = Vec::new();
        for article in articles {
            match by_source
                .iter_mut()
                .find(|(source, _)| *source == article.source)
            {
                Some((_, items)) => items.push(article),
                None => by_source.push((article.source.as_str(), vec![article])),
            }
        }
        for (source, items) in by_source {
            lines.push(format!("### {source}"));
            for item in items {
                lines.push(format!("- [{}]({})", item.title, item.url));
            }
        }
    }

    lines.join("\n")
}

/// Compact markdown rendition of the matchday bundle for terminals.
pub fn render_report_markdown(data: &ReportData) -> String {
    let mut lines: Vec<String> = Vec::new();
    let next = &data.next_home;
    lines.push(format!(
        "# Nächstes Heimspiel: {} – {}",
        next.home_team, next.away_team
    ));
    lines.push(format!(
        "Anpfiff: {} Uhr · Spielort: {}",
        next.kickoff.format("%d.%m.%Y %H:%M"),
        next.location
    ));

    for (team, recent) in [
        (next.home_team.as_str(), &data.usc_recent),
        (next.away_team.as_str(), &data.opponent_recent),
    ] {
        lines.push(String::new());
        lines.push(format!("## Letzte Spiele {team}"));
        if recent.is_empty() {
            lines.push("Keine abgeschlossenen Spiele gefunden.".to_string());
        }
        for entry in recent.iter() {
            let result = entry
                .result
                .as_ref()
                .map(|result| format!(" – {}", result.summary()))
                .unwrap_or_default();
            lines.push(format!(
                "- {}: {} vs. {}{result}",
                entry.kickoff.format("%d.%m.%Y"),
                entry.home_team,
                entry.away_team,
            ));
        }
    }

    for (team, news) in [
        (next.home_team.as_str(), &data.usc_news),
        (next.away_team.as_str(), &data.opponent_news),
    ] {
        lines.push(String::new());
        lines.push(format!("## Aktuelle Berichte {team}"));
        if news.is_empty() {
            lines.push("Keine Artikel gefunden.".to_string());
        }
        for item in news.iter() {
            lines.push(format!("- [{}]({}) – {}", item.title, item.url, item.source));
        }
    }

    lines.join("\n")
}

/// The JSON payload the static site consumes for standings pages.
pub fn standings_json_payload(
    standings: &[LeagueRanking],
    league_matches: &[LeagueMatch],
    usc_matches: &[LeagueMatch],
    articles: &[NewsItem],
) -> serde_json::Value {
    json!({
        "standings": standings,
        "league_matches": league_matches,
        "usc_matches": usc_matches,
        "articles": articles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date_label;

    fn member(name: &str, birthdate: &str) -> RosterMember {
        RosterMember {
            number_label: Some("7".to_string()),
            number_value: Some(7),
            name: name.to_string(),
            role: "Außenangreiferin".to_string(),
            is_official: false,
            height: None,
            birthdate_label: Some(birthdate.to_string()),
            nationality: None,
        }
    }

    #[test]
    fn computes_ages_relative_to_match_day() {
        let birthdate = NaiveDate::from_ymd_opt(1999, 4, 3).unwrap();
        let before = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        let on_day = NaiveDate::from_ymd_opt(2025, 4, 3).unwrap();
        assert_eq!(calculate_age(birthdate, before), Some(25));
        assert_eq!(calculate_age(birthdate, on_day), Some(26));
        assert_eq!(
            calculate_age(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(), on_day),
            None
        );
    }

    #[test]
    fn collects_birthday_notes_within_a_week() {
        let match_date = NaiveDate::from_ymd_opt(2025, 1, 18).unwrap();
        let roster = vec![
            member("Weber, Lena", "18.01.1999"),
            member("Anders, Maja", "13.01.2001"),
            member("Koch, Pia", "01.12.2000"),
        ];
        let rosters: Vec<(&str, &[RosterMember])> = vec![("USC Münster", roster.as_slice())];
        let notes = collect_birthday_notes(match_date, &rosters);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].contains("hat heute Geburtstag (26 Jahre)!"));
        assert!(notes[1].contains("hatte am 13.01.2025 Geburtstag (24 Jahre)."));
    }

    #[test]
    fn renders_report_markdown_summary() {
        use crate::scrapers::schedule::parse_schedule;
        let csv = "\
#;Datum;Uhrzeit;Mannschaft 1;Mannschaft 2;Gastgeber;Austragungsort;Ergebnis;Satzpunkte;Ballpunkte;Saison;Spielrunde
1001;12.01.2025;17:00:00;USC M\u{fc}nster;VC Wiesbaden;USC M\u{fc}nster;Sporthalle Berg Fidel;3:1 / 97:81;3:1;97:81;2024/25;Hauptrunde
1002;26.01.2025;16:00:00;USC M\u{fc}nster;Dresdner SC;USC M\u{fc}nster;Sporthalle Berg Fidel;;;;2024/25;Hauptrunde
";
        let matches = parse_schedule(csv).unwrap();
        let data = ReportData {
            next_home: matches[1].clone(),
            usc_recent: vec![matches[0].clone()],
            opponent_recent: Vec::new(),
            usc_next: None,
            opponent_next: None,
            usc_news: Vec::new(),
            opponent_news: Vec::new(),
            usc_roster: Vec::new(),
            opponent_roster: Vec::new(),
            usc_transfers: Vec::new(),
            opponent_transfers: Vec::new(),
            match_stats: HashMap::new(),
            mvp_sections: Vec::new(),
            generated_at: parse_date_label("20.01.2025").unwrap(),
        };
        let rendered = render_report_markdown(&data);
        assert!(rendered.contains("# Nächstes Heimspiel: USC Münster – Dresdner SC"));
        assert!(rendered.contains("- 12.01.2025: USC Münster vs. VC Wiesbaden – 3:1 / 97:81"));
        assert!(rendered.contains("Keine abgeschlossenen Spiele gefunden."));
    }

    #[test]
    fn renders_standings_markdown_sections() {
        let standings = vec![LeagueRanking {
            rank: 1,
            team_name: "SSC Palmberg Schwerin".to_string(),
            matches_played: 10,
            wins: 9,
            losses: 1,
            points: 27,
            set_ratio: Some(4.0),
            ball_ratio: None,
        }];
        let matches = vec![LeagueMatch {
            uuid: "m1".to_string(),
            date: parse_date_label("25.01.2025, 19:00"),
            team_home: "USC Münster".to_string(),
            team_away: "Dresdner SC".to_string(),
            venue: Some("Sporthalle Berg Fidel".to_string()),
            results: None,
        }];
        let reference = parse_date_label("20.01.2025").unwrap();
        let rendered = render_standings_markdown(
            &standings,
            &matches,
            &matches,
            &[],
            10,
            5,
            &reference,
        );
        assert!(rendered.contains("| 1 | SSC Palmberg Schwerin | 10 | 9 | 1 | 27 | 4.00 | - |"));
        assert!(rendered.contains("## Nächste Spiele USC Münster"));
        assert!(rendered.contains("- 25.01.2025 19:00: USC Münster vs. Dresdner SC (Spielort: Sporthalle Berg Fidel)"));
        assert!(rendered.contains("Keine Artikel gefunden."));
    }
}
