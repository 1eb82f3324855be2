//! Rendering of the matchday report as one self-contained German HTML
//! document. Everything user-visible is escaped; styling is inline so the
//! file can be dropped onto any static host as-is.

use crate::dates::{format_generation_timestamp, german_weekday};
use crate::report::{collect_birthday_notes, ReportData};
use crate::scrapers::news::NewsItem;
use crate::scrapers::roster::RosterMember;
use crate::scrapers::schedule::Match;
use crate::scrapers::transfers::TransferItem;
use crate::stats::MatchStatsTotals;
use crate::teams::{
    get_team_homepage, get_team_instagram, get_team_page_url, is_usc, normalize_name, pretty_name,
    USC_CANONICAL_NAME, USC_HOMEPAGE,
};

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn highlight_class(team_name: &str, opponent_name: &str) -> Option<&'static str> {
    if is_usc(team_name) {
        return Some("team-usc");
    }
    if normalize_name(team_name) == normalize_name(opponent_name) {
        return Some("team-opponent");
    }
    None
}

fn format_team(team_name: &str, opponent_name: &str) -> String {
    let display = escape_html(&pretty_name(team_name));
    match highlight_class(team_name, opponent_name) {
        Some(class) => format!("<strong class=\"{class}\">{display}</strong>"),
        None => display,
    }
}

fn format_stats_block(stats: &[MatchStatsTotals]) -> String {
    let mut lines = Vec::new();
    for totals in stats {
        let Some(metrics) = &totals.metrics else {
            continue;
        };
        lines.push(format!(
            "<div class=\"match-stats\">{team}: Aufschlag {sa} ({sp} Punkte, {se} Fehler) · \
Annahme {ra} ({rp} positiv) · Angriff {aa} ({ap} Punkte, {apct}) · Block {bp}</div>",
            team = escape_html(&totals.team_name),
            sa = metrics.serves_attempts,
            sp = metrics.serves_points,
            se = metrics.serves_errors,
            ra = metrics.receptions_attempts,
            rp = escape_html(&metrics.receptions_positive_pct),
            aa = metrics.attacks_attempts,
            ap = metrics.attacks_points,
            apct = escape_html(&metrics.attacks_success_pct),
            bp = metrics.blocks_points,
        ));
    }
    lines.concat()
}

/// One match as a list item: date, teams, venue, result summary, optional
/// statistics block.
pub fn format_match_line(
    entry: &Match,
    opponent_name: &str,
    stats: Option<&[MatchStatsTotals]>,
    extra_classes: &[&str],
) -> String {
    let mut classes = vec!["match-item"];
    classes.extend(extra_classes);
    let date_label = format!(
        "{} ({}) {}",
        entry.kickoff.format("%d.%m.%Y"),
        german_weekday(&entry.kickoff),
        entry.kickoff.format("%H:%M"),
    );
    let mut line = format!(
        "<li class=\"{}\"><span class=\"match-date\">{}</span> {} vs. {}",
        classes.join(" "),
        escape_html(&date_label),
        format_team(&entry.home_team, opponent_name),
        format_team(&entry.away_team, opponent_name),
    );
    if !entry.location.is_empty() {
        line.push_str(&format!(
            " <span class=\"match-venue\">({})</span>",
            escape_html(&pretty_name(&entry.location))
        ));
    }
    if let Some(result) = &entry.result {
        line.push_str(&format!(
            " <span class=\"match-result\">{}</span>",
            escape_html(&result.summary())
        ));
    }
    if let Some(stats) = stats {
        line.push_str(&format_stats_block(stats));
    }
    line.push_str("</li>");
    line
}

pub fn format_news_list(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "<li>Keine aktuellen Berichte gefunden.</li>".to_string();
    }
    items
        .iter()
        .map(|item| {
            let date_part = item
                .formatted_date()
                .map(|date| format!(" <span class=\"news-date\">({date})</span>"))
                .unwrap_or_default();
            format!(
                "<li><a href=\"{}\">{}</a> <span class=\"news-source\">– {}</span>{date_part}</li>",
                escape_html(&item.url),
                escape_html(&item.title),
                escape_html(&item.source),
            )
        })
        .collect::<Vec<_>>()
        .join("\n      ")
}

pub fn format_roster_rows(roster: &[RosterMember]) -> String {
    if roster.is_empty() {
        return "<tr><td colspan=\"5\">Keine Kaderdaten gefunden.</td></tr>".to_string();
    }
    roster
        .iter()
        .map(|member| {
            let number = match &member.number_label {
                Some(label) if label.trim().chars().all(|c| c.is_ascii_digit()) => {
                    format!("#{}", label.trim())
                }
                Some(label) => label.trim().to_string(),
                None => "Staff".to_string(),
            };
            let height = member
                .height
                .as_deref()
                .filter(|_| !member.is_official)
                .unwrap_or("–");
            let birthdate = member.formatted_birthdate().unwrap_or_else(|| "–".to_string());
            let nationality = member.nationality.as_deref().unwrap_or("–");
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&number),
                escape_html(&member.name),
                escape_html(&member.role),
                escape_html(height),
                escape_html(&format!("{birthdate} / {nationality}")),
            )
        })
        .collect::<Vec<_>>()
        .join("\n        ")
}

pub fn format_transfer_list(items: &[TransferItem]) -> String {
    if items.is_empty() {
        return "<li>Keine Wechsel gemeldet.</li>".to_string();
    }
    items
        .iter()
        .map(|item| {
            let name_html = match &item.url {
                Some(url) => format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(url),
                    escape_html(&item.name)
                ),
                None => escape_html(&item.name),
            };
            let category = item
                .category
                .as_deref()
                .map(|category| format!(" <span class=\"transfer-category\">[{}]</span>", escape_html(category)))
                .unwrap_or_default();
            let related = if item.related_club.is_empty() {
                String::new()
            } else {
                format!(" – {}", escape_html(&item.related_club))
            };
            format!(
                "<li>{}: {name_html}{category}{related}</li>",
                escape_html(&item.formatted_date()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n      ")
}

fn format_mvp_tables(data: &ReportData) -> String {
    if data.mvp_sections.is_empty() {
        return "  <p>Keine MVP-Daten verfügbar.</p>".to_string();
    }
    let mut out = Vec::new();
    for section in &data.mvp_sections {
        out.push(format!("  <h3>{}</h3>", escape_html(&section.label)));
        if section.rows.is_empty() {
            out.push("  <p>Keine Daten für diesen Indikator.</p>".to_string());
            continue;
        }
        out.push("  <table class=\"mvp-table\">".to_string());
        let header_cells: String = section
            .headers
            .iter()
            .map(|header| format!("<th>{}</th>", escape_html(header)))
            .collect();
        out.push(format!("    <thead><tr>{header_cells}</tr></thead>"));
        out.push("    <tbody>".to_string());
        for row in &section.rows {
            let cells: String = row
                .iter()
                .map(|cell| format!("<td>{}</td>", escape_html(cell)))
                .collect();
            out.push(format!("      <tr>{cells}</tr>"));
        }
        out.push("    </tbody>".to_string());
        out.push("  </table>".to_string());
    }
    out.join("\n")
}

fn combined_match_items(
    next_match: Option<&Match>,
    recent: &[Match],
    opponent_name: &str,
    data: &ReportData,
) -> String {
    let mut items: Vec<String> = Vec::new();
    let mut seen: Vec<(String, String, String)> = Vec::new();
    let ordered: Vec<(&Match, bool)> = next_match
        .into_iter()
        .map(|entry| (entry, true))
        .chain(recent.iter().map(|entry| (entry, false)))
        .collect();
    for (entry, is_next) in ordered {
        let signature = (
            entry.kickoff.to_rfc3339(),
            normalize_name(&entry.home_team),
            normalize_name(&entry.away_team),
        );
        if seen.contains(&signature) {
            continue;
        }
        seen.push(signature);
        let stats = entry
            .stats_url
            .as_ref()
            .and_then(|url| data.match_stats.get(url))
            .map(Vec::as_slice);
        let mut extra: Vec<&str> = Vec::new();
        if entry.is_finished() {
            extra.push("match-item--finished");
        } else {
            extra.push("match-item--upcoming");
            if is_next {
                extra.push("match-item--next");
            }
        }
        items.push(format_match_line(entry, opponent_name, stats, &extra));
    }
    if items.is_empty() {
        return "<li>Keine Daten verfügbar.</li>".to_string();
    }
    items.join("\n      ")
}

fn team_links(team_name: &str) -> String {
    let mut links = Vec::new();
    if let Some(homepage) = get_team_homepage(team_name) {
        links.push(format!(
            "<a href=\"{}\">Homepage</a>",
            escape_html(homepage)
        ));
    }
    if let Some(instagram) = get_team_instagram(team_name) {
        links.push(format!(
            "<a href=\"{}\">Instagram</a>",
            escape_html(instagram)
        ));
    }
    if let Some(team_page) = get_team_page_url(team_name) {
        links.push(format!(
            "<a href=\"{}\">VBL-Teamseite</a>",
            escape_html(&team_page)
        ));
    }
    if links.is_empty() {
        String::new()
    } else {
        format!("  <p class=\"team-links\">{}</p>", links.join(" · "))
    }
}

pub fn build_html_report(data: &ReportData) -> String {
    let opponent = pretty_name(&data.next_home.away_team);
    let kickoff = &data.next_home.kickoff;
    let kickoff_label = format!(
        "{} ({}) {} Uhr",
        kickoff.format("%d.%m.%Y"),
        german_weekday(kickoff),
        kickoff.format("%H:%M"),
    );
    let location = pretty_name(&data.next_home.location);
    let match_day = kickoff.date_naive();

    let usc_items = combined_match_items(
        data.usc_next.as_ref(),
        &data.usc_recent,
        &data.next_home.away_team,
        data,
    );
    let opponent_items = combined_match_items(
        data.opponent_next.as_ref(),
        &data.opponent_recent,
        &data.next_home.away_team,
        data,
    );

    let rosters: Vec<(&str, &[RosterMember])> = vec![
        (USC_CANONICAL_NAME, data.usc_roster.as_slice()),
        (&data.next_home.away_team, data.opponent_roster.as_slice()),
    ];
    let birthday_notes = collect_birthday_notes(match_day, &rosters);
    let birthday_block = if birthday_notes.is_empty() {
        String::new()
    } else {
        let items: String = birthday_notes
            .iter()
            .map(|note| format!("    <li>{}</li>\n", escape_html(note)))
            .collect();
        format!("  <section>\n  <h2>Geburtstage</h2>\n  <ul>\n{items}  </ul>\n  </section>\n")
    };

    let usc_homepage = get_team_homepage(USC_CANONICAL_NAME).unwrap_or(USC_HOMEPAGE);

    format!(
        r#"<!DOCTYPE html>
<html lang="de">
<head>
  <meta charset="utf-8" />
  <title>USC Münster – {opponent_title}</title>
  <style>
    body {{ font-family: Arial, sans-serif; margin: 2rem; color: #222; }}
    h1, h2, h3 {{ color: #134b96; }}
    table {{ border-collapse: collapse; width: 100%; margin-bottom: 1.5rem; }}
    th, td {{ border: 1px solid #ccc; padding: 0.4rem; text-align: left; }}
    ul {{ margin-bottom: 1.5rem; }}
    .team-usc {{ color: #0a7d33; }}
    .team-opponent {{ color: #b4231f; }}
    .match-item--next {{ background: #f3f7ee; }}
    .match-stats {{ font-size: 0.85em; color: #555; }}
    .news-source, .news-date {{ color: #777; font-size: 0.9em; }}
  </style>
</head>
<body>
  <h1>Nächstes Heimspiel: USC Münster – {opponent_title}</h1>
  <p>Anpfiff: {kickoff_label} · Spielort: {location_label}</p>
  <p>Stand: {generated_label}</p>
  <p><a href="{usc_homepage}">USC Münster</a>{opponent_links}</p>
  <nav>
    <ul>
      <li><a href="aufstellungen.html">Startaufstellungen der letzten Begegnungen</a></li>
    </ul>
  </nav>
{birthday_block}  <section>
  <h2>USC Münster – Begegnungen</h2>
  <ul>
      {usc_items}
  </ul>
{usc_links}  </section>
  <section>
  <h2>{opponent_title} – Begegnungen</h2>
  <ul>
      {opponent_items}
  </ul>
{opponent_team_links}  </section>
  <section>
  <h2>Aktuelle Berichte USC Münster</h2>
  <ul>
      {usc_news}
  </ul>
  <h2>Aktuelle Berichte {opponent_title}</h2>
  <ul>
      {opponent_news}
  </ul>
  </section>
  <section>
  <h2>Kader USC Münster</h2>
  <table>
    <thead><tr><th>Nr.</th><th>Name</th><th>Position</th><th>Größe</th><th>Geburtsdatum / Nation</th></tr></thead>
    <tbody>
        {usc_roster}
    </tbody>
  </table>
  <h2>Kader {opponent_title}</h2>
  <table>
    <thead><tr><th>Nr.</th><th>Name</th><th>Position</th><th>Größe</th><th>Geburtsdatum / Nation</th></tr></thead>
    <tbody>
        {opponent_roster}
    </tbody>
  </table>
  </section>
  <section>
  <h2>Wechselbörse</h2>
  <h3>USC Münster</h3>
  <ul>
      {usc_transfers}
  </ul>
  <h3>{opponent_title}</h3>
  <ul>
      {opponent_transfers}
  </ul>
  </section>
  <section>
  <h2>MVP-Rankings</h2>
{mvp_tables}
  </section>
</body>
</html>
"#,
        opponent_title = escape_html(&opponent),
        kickoff_label = escape_html(&kickoff_label),
        location_label = escape_html(&location),
        generated_label = escape_html(&format_generation_timestamp(&data.generated_at)),
        usc_homepage = escape_html(usc_homepage),
        opponent_links = get_team_homepage(&data.next_home.away_team)
            .map(|url| format!(
                " · <a href=\"{}\">{}</a>",
                escape_html(url),
                escape_html(&opponent)
            ))
            .unwrap_or_default(),
        birthday_block = birthday_block,
        usc_items = usc_items,
        usc_links = team_links(USC_CANONICAL_NAME),
        opponent_items = opponent_items,
        opponent_team_links = team_links(&data.next_home.away_team),
        usc_news = format_news_list(&data.usc_news),
        opponent_news = format_news_list(&data.opponent_news),
        usc_roster = format_roster_rows(&data.usc_roster),
        opponent_roster = format_roster_rows(&data.opponent_roster),
        usc_transfers = format_transfer_list(&data.usc_transfers),
        opponent_transfers = format_transfer_list(&data.opponent_transfers),
        mvp_tables = format_mvp_tables(data),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date_label;
    use crate::scrapers::schedule::parse_schedule;
    use std::collections::HashMap;

    fn sample_matches() -> Vec<Match> {
        let csv = "\
#;Datum;Uhrzeit;Mannschaft 1;Mannschaft 2;Gastgeber;Austragungsort;Ergebnis;Satzpunkte;Ballpunkte;Saison;Spielrunde
1001;12.01.2025;17:00:00;USC M\u{fc}nster;VC Wiesbaden;USC M\u{fc}nster;Sporthalle Berg Fidel;3:1 / 97:81 (25:20 23:25 25:18 25:18);3:1;97:81;2024/25;Hauptrunde
1002;26.01.2025;16:00:00;USC M\u{fc}nster;Dresdner SC;USC M\u{fc}nster;Sporthalle Berg Fidel;;;;2024/25;Hauptrunde
";
        parse_schedule(csv).unwrap()
    }

    fn sample_data() -> ReportData {
        let matches = sample_matches();
        ReportData {
            next_home: matches[1].clone(),
            usc_recent: vec![matches[0].clone()],
            opponent_recent: Vec::new(),
            usc_next: Some(matches[1].clone()),
            opponent_next: None,
            usc_news: Vec::new(),
            opponent_news: Vec::new(),
            usc_roster: Vec::new(),
            opponent_roster: Vec::new(),
            usc_transfers: Vec::new(),
            opponent_transfers: Vec::new(),
            match_stats: HashMap::new(),
            mvp_sections: Vec::new(),
            generated_at: parse_date_label("20.01.2025, 12:00").unwrap(),
        }
    }

    #[test]
    fn escapes_html_entities() {
        assert_eq!(
            escape_html(r#"<a href="x">Müller & Söhne</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Müller &amp; Söhne&lt;/a&gt;"
        );
    }

    #[test]
    fn match_lines_carry_result_and_highlight() {
        let matches = sample_matches();
        let line = format_match_line(&matches[0], "VC Wiesbaden", None, &["match-item--finished"]);
        assert!(line.contains("12.01.2025 (So) 17:00"));
        assert!(line.contains("team-usc"));
        assert!(line.contains("team-opponent"));
        assert!(line.contains("3:1 / 97:81 (25:20 23:25 25:18 25:18)"));
        assert!(line.contains("match-item--finished"));
    }

    #[test]
    fn builds_a_complete_document() {
        let html = build_html_report(&sample_data());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Nächstes Heimspiel: USC Münster – Dresdner SC"));
        assert!(html.contains("26.01.2025 (So) 16:00 Uhr"));
        assert!(html.contains("aufstellungen.html"));
        assert!(html.contains("Keine aktuellen Berichte gefunden."));
        assert!(html.contains("Keine Kaderdaten gefunden."));
        assert!(html.contains("Stand: Montag, 20. Januar 2025 um 12:00"));
        // The upcoming home match is marked.
        assert!(html.contains("match-item--next"));
    }

    #[test]
    fn deduplicates_combined_match_lists() {
        let data = sample_data();
        let items = combined_match_items(
            data.usc_next.as_ref(),
            &[data.next_home.clone()],
            "Dresdner SC",
            &data,
        );
        assert_eq!(items.matches("<li").count(), 1);
    }
}
