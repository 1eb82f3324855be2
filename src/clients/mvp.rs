//! Client for the MVP ranking page. The page is a JSF application: the
//! initial GET carries a `jakarta.faces.ViewState` token, and both the
//! indicator dropdown and the table filters are driven by partial-AJAX
//! POSTs that answer with an XML `<partial-response>` whose `<update>`
//! elements hold replacement HTML and a fresh ViewState.

use crate::error::{Result, ScrapeError};
use crate::fetch;
use crate::scrapers::{element_text, parse_selector};
use crate::teams::resolve_ranking_filter;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const MVP_URL: &str = "https://www.volleyball-bundesliga.de/cms/home/\
1_bundesliga_frauen/statistik/mvp_rankings/spielerinnenranking_hauptrunde.xhtml";

const FORM_ID: &str = "samsCmsComponentSubViewForComponent30088103:componentForm_30088103";
const TABLE_ID: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:rankingTable";
const SELECTOR_ID: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:indicatorSelector_30088103";
const VIEWSTATE_ID: &str = "jakarta.faces.ViewState";
pub const DEFAULT_INDICATOR_ID: &str = "60245649";

const FILTER_NAME_FIELD: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:rankingTable:j_idt165:filter";
const FILTER_POSITION_FIELD: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:rankingTable:j_idt176:filter";
const FILTER_TEAM_FIELD: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:rankingTable:j_idt179:filter";
const FILTER_METRIC_FIELD: &str =
    "samsCmsComponentSubViewForComponent30088103:componentForm_30088103:rankingTable:j_idt189:filter";

pub const MVP_HEADERS: [&str; 13] = [
    "Rang",
    "",
    "Name",
    "Sätze",
    "Spiele",
    "Position",
    "Mannschaft",
    "Nation",
    "Wert1",
    "Wert2",
    "Wert3",
    "Kennzahl",
    "Wertung",
];

/// Indicator ids in the order the page lists them.
pub const MVP_INDICATORS: [(&str, &str); 11] = [
    ("60245649", "alle Spielelemente / Top-Scorer"),
    ("29593924", "Aufschlag / Quote Aufschläge mit Wirkung"),
    ("31385020", "Annahme / Quote perfekte oder gute Annahme"),
    ("29593922", "Aufschlag / Quote Aufschlagpunkte"),
    ("60245660", "Annahme / Annahmeeffizienz"),
    ("29593918", "Angriff / Angriffseffizienz"),
    ("29593928", "Block / Blockpunkte"),
    ("29593923", "Aufschlag / Aufschlagpunkte"),
    ("29593919", "Angriff / Quote Angriffspunkte"),
    ("29593920", "Angriff / Angriffspunkte"),
    ("60245659", "Aufschlag / Aufschlageffizienz"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvpSection {
    pub id: String,
    pub label: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

pub struct MvpClient {
    client: Client,
    viewstate: String,
    indicator: String,
}

impl MvpClient {
    pub async fn create(client: Client) -> Result<Self> {
        let html = fetch::fetch_html(&client, MVP_URL).await?;
        let viewstate = extract_viewstate(&html)?;
        Ok(Self {
            client,
            viewstate,
            indicator: DEFAULT_INDICATOR_ID.to_string(),
        })
    }

    pub async fn select_indicator(&mut self, indicator_id: &str) -> Result<()> {
        if indicator_id == self.indicator {
            return Ok(());
        }
        let selector_input = format!("{SELECTOR_ID}_input");
        let params: Vec<(&str, &str)> = vec![
            ("jakarta.faces.partial.ajax", "true"),
            ("jakarta.faces.source", SELECTOR_ID),
            ("jakarta.faces.partial.execute", SELECTOR_ID),
            ("jakarta.faces.partial.render", TABLE_ID),
            ("jakarta.faces.behavior.event", "change"),
            ("jakarta.faces.partial.event", "change"),
            (FORM_ID, FORM_ID),
            (&selector_input, indicator_id),
            (VIEWSTATE_ID, &self.viewstate),
        ];
        let text = self.post(&params).await?;
        let (_, new_viewstate) = parse_partial_response(&text)?;
        if let Some(new_viewstate) = new_viewstate {
            self.viewstate = new_viewstate;
        }
        self.indicator = indicator_id.to_string();
        Ok(())
    }

    pub async fn fetch_team_rows(&mut self, team_filter: &str) -> Result<Vec<Vec<String>>> {
        self.fetch_team_rows_with_page_size(team_filter, 100).await
    }

    async fn fetch_team_rows_with_page_size(
        &mut self,
        team_filter: &str,
        rows_per_page: u32,
    ) -> Result<Vec<Vec<String>>> {
        let filtering = format!("{TABLE_ID}_filtering");
        let encode = format!("{TABLE_ID}_encodeFeature");
        let first = format!("{TABLE_ID}_first");
        let rows_field = format!("{TABLE_ID}_rows");
        let rows_value = rows_per_page.to_string();
        let params: Vec<(&str, &str)> = vec![
            ("jakarta.faces.partial.ajax", "true"),
            ("jakarta.faces.source", TABLE_ID),
            ("jakarta.faces.partial.execute", TABLE_ID),
            ("jakarta.faces.partial.render", TABLE_ID),
            ("jakarta.faces.behavior.event", "filter"),
            ("jakarta.faces.partial.event", "filter"),
            (TABLE_ID, TABLE_ID),
            (&filtering, "true"),
            (&encode, "true"),
            (&first, "0"),
            (&rows_field, &rows_value),
            (FILTER_NAME_FIELD, ""),
            (FILTER_POSITION_FIELD, ""),
            (FILTER_TEAM_FIELD, team_filter),
            (FILTER_METRIC_FIELD, ""),
            (VIEWSTATE_ID, &self.viewstate),
        ];
        let text = self.post(&params).await?;
        let (table_html, new_viewstate) = parse_partial_response(&text)?;
        if let Some(new_viewstate) = new_viewstate {
            self.viewstate = new_viewstate;
        }
        extract_table_rows(&table_html)
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<String> {
        let response = self
            .client
            .post(MVP_URL)
            .form(params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

pub fn extract_viewstate(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let selector = parse_selector("input[name='jakarta.faces.ViewState']")?;
    document
        .select(&selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ScrapeError::Parse("Could not determine the MVP ranking ViewState".to_string())
        })
}

/// Pull the table fragment and the fresh ViewState out of an XML partial
/// response. Fragments arrive inside CDATA sections.
pub fn parse_partial_response(xml: &str) -> Result<(String, Option<String>)> {
    let mut reader = Reader::from_str(xml);
    let mut table_html = String::new();
    let mut viewstate: Option<String> = None;
    let mut current_id: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) if start.name().as_ref() == b"update" => {
                current_id = start
                    .try_get_attribute("id")
                    .map_err(quick_xml::Error::from)?
                    .map(|attr| String::from_utf8_lossy(&attr.value).into_owned());
            }
            Event::CData(data) => {
                if let Some(id) = current_id.as_deref() {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    if id == TABLE_ID {
                        table_html.push_str(&text);
                    } else if id == VIEWSTATE_ID {
                        viewstate = Some(text);
                    }
                }
            }
            Event::Text(text) => {
                if let Some(id) = current_id.as_deref() {
                    let raw = String::from_utf8_lossy(text.as_ref()).into_owned();
                    if raw.trim().is_empty() {
                        continue;
                    }
                    if id == TABLE_ID {
                        table_html.push_str(&raw);
                    } else if id == VIEWSTATE_ID {
                        viewstate = Some(raw.trim().to_string());
                    }
                }
            }
            Event::End(end) if end.name().as_ref() == b"update" => {
                current_id = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok((table_html, viewstate))
}

/// Rows of the ranking table fragment, reordered so that the set and game
/// counts follow the name column.
pub fn extract_table_rows(table_html: &str) -> Result<Vec<Vec<String>>> {
    if table_html.trim().is_empty() {
        return Ok(Vec::new());
    }
    let cleaned = table_html.replace('\u{a0}', " ");
    // The fragment is the table's inner content; without a surrounding
    // <table> the HTML parser would drop the orphan <tr> elements.
    let document = Html::parse_document(&format!("<table>{cleaned}</table>"));
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;

    let mut rows = Vec::new();
    for row in document.select(&row_selector) {
        let columns: Vec<String> = row
            .select(&cell_selector)
            .map(|cell| element_text(&cell))
            .collect();
        if !columns.is_empty() {
            rows.push(reorder_row(columns));
        }
    }
    Ok(rows)
}

/// The table renders set and game counts at the tail; the report wants them
/// directly behind the name column.
fn reorder_row(columns: Vec<String>) -> Vec<String> {
    if columns.len() < 5 {
        // Nothing to reorder (e.g. placeholder rows from the website).
        return columns;
    }
    let len = columns.len();
    let set_count = columns[len - 3].clone();
    let game_count = columns[len - 2].clone();

    let mut reordered = Vec::with_capacity(len);
    reordered.extend_from_slice(&columns[..3]);
    reordered.push(set_count);
    reordered.push(game_count);
    reordered.extend_from_slice(&columns[3..len - 3]);
    reordered.push(columns[len - 1].clone());
    reordered
}

fn build_placeholder_row(team_label: &str) -> Vec<String> {
    let mut row: Vec<String> = vec!["–".to_string(), String::new()];
    row.extend((2..MVP_HEADERS.len()).map(|_| "–".to_string()));
    // Position 6 corresponds to Mannschaft.
    row[6] = team_label.to_string();
    row
}

fn ensure_row_limit(rows: Vec<Vec<String>>, team_label: &str, limit: usize) -> Vec<Vec<String>> {
    let mut limited: Vec<Vec<String>> = rows.into_iter().take(limit).collect();
    while limited.len() < limit {
        limited.push(build_placeholder_row(team_label));
    }
    limited
}

/// All indicators for the given teams, each team block padded to `limit`
/// rows so the rendered tables align.
pub async fn collect_mvp_rankings(
    client: Client,
    team_names: &[String],
    limit: usize,
) -> Result<Vec<MvpSection>> {
    let filters: Vec<(String, String)> = team_names
        .iter()
        .filter_map(|name| {
            let filter = resolve_ranking_filter(name);
            if filter.is_none() {
                warn!("No ranking filter for team '{name}'");
            }
            Some((name.clone(), filter?))
        })
        .collect();
    if filters.is_empty() {
        return Ok(Vec::new());
    }

    let mut mvp_client = MvpClient::create(client).await?;
    let mut sections = Vec::new();
    for (indicator_id, label) in MVP_INDICATORS {
        if let Err(err) = mvp_client.select_indicator(indicator_id).await {
            warn!("MVP indicator '{label}' could not be loaded: {err}");
            sections.push(MvpSection {
                id: indicator_id.to_string(),
                label: label.to_string(),
                headers: MVP_HEADERS.iter().map(|h| h.to_string()).collect(),
                rows: Vec::new(),
            });
            continue;
        }

        let mut combined_rows: Vec<Vec<String>> = Vec::new();
        for (name, team_filter) in &filters {
            let rows = match mvp_client.fetch_team_rows(team_filter).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!("MVP ranking for {name} ({label}) failed: {err}");
                    Vec::new()
                }
            };
            combined_rows.extend(ensure_row_limit(rows, team_filter, limit));
        }
        sections.push(MvpSection {
            id: indicator_id.to_string(),
            label: label.to_string(),
            headers: MVP_HEADERS.iter().map(|h| h.to_string()).collect(),
            rows: combined_rows,
        });
    }
    Ok(sections)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvpIndicatorPayload {
    pub id: String,
    pub label: String,
    pub usc: Vec<BTreeMap<String, String>>,
    pub opponent: Vec<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MvpDataset {
    pub generated_at: String,
    pub usc_team: String,
    pub opponent_team: String,
    pub limit: usize,
    pub indicators: Vec<MvpIndicatorPayload>,
}

fn placeholder_for_headers(headers: &[String], team_label: &str) -> Vec<String> {
    let mut placeholder: Vec<String> = headers.iter().map(|_| "\u{2013}".to_string()).collect();
    if let Some(team_index) = headers.iter().position(|header| header == "Mannschaft") {
        placeholder[team_index] = team_label.to_string();
    }
    placeholder
}

fn select_team_rows(
    headers: &[String],
    rows: &[Vec<String>],
    team_label: &str,
    limit: usize,
) -> Vec<Vec<String>> {
    let team_index = headers.iter().position(|header| header == "Mannschaft");
    let mut filtered: Vec<Vec<String>> = match team_index {
        Some(team_index) => rows
            .iter()
            .filter(|row| row.get(team_index).map(String::as_str) == Some(team_label))
            .cloned()
            .collect(),
        None => rows.to_vec(),
    };
    filtered.truncate(limit);
    while filtered.len() < limit {
        filtered.push(placeholder_for_headers(headers, team_label));
    }
    filtered
}

/// Header-keyed row maps plus a combined `ranking` display value.
fn rows_to_dicts(headers: &[String], rows: &[Vec<String>]) -> Vec<BTreeMap<String, String>> {
    let max_columns = rows
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(headers.len())
        .max(headers.len());
    let cleaned_headers: Vec<String> = (0..max_columns)
        .map(|index| {
            headers
                .get(index)
                .filter(|header| !header.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("column_{index}"))
        })
        .collect();

    rows.iter()
        .map(|row| {
            let mut map: BTreeMap<String, String> = cleaned_headers
                .iter()
                .enumerate()
                .map(|(index, header)| {
                    (header.clone(), row.get(index).cloned().unwrap_or_default())
                })
                .collect();
            let wert1 = map.get("Wert1").map(String::as_str).unwrap_or("").trim();
            let wertung = map.get("Wertung").map(String::as_str).unwrap_or("").trim();
            let ranking = match (wert1.is_empty(), wertung.is_empty()) {
                (false, false) => format!("{wert1} | {wertung}"),
                (false, true) => wert1.to_string(),
                (true, false) => wertung.to_string(),
                (true, true) => String::new(),
            };
            if !ranking.is_empty() {
                map.insert("ranking".to_string(), ranking);
            }
            map
        })
        .collect()
}

/// The published `mvp_top3` dataset: per indicator, the top rows for USC
/// and the upcoming opponent.
pub fn build_mvp_dataset(
    sections: &[MvpSection],
    usc_team: &str,
    opponent_team: &str,
    limit: usize,
    generated_at: String,
) -> MvpDataset {
    let usc_label = resolve_ranking_filter(usc_team).unwrap_or_else(|| usc_team.to_string());
    let opponent_label =
        resolve_ranking_filter(opponent_team).unwrap_or_else(|| opponent_team.to_string());

    let indicators = MVP_INDICATORS
        .iter()
        .map(|(indicator_id, label)| {
            let section = sections.iter().find(|section| section.id == *indicator_id);
            match section {
                Some(section) if !section.rows.is_empty() => {
                    let usc_rows =
                        select_team_rows(&section.headers, &section.rows, &usc_label, limit);
                    let opponent_rows =
                        select_team_rows(&section.headers, &section.rows, &opponent_label, limit);
                    MvpIndicatorPayload {
                        id: indicator_id.to_string(),
                        label: label.to_string(),
                        usc: rows_to_dicts(&section.headers, &usc_rows),
                        opponent: rows_to_dicts(&section.headers, &opponent_rows),
                    }
                }
                _ => MvpIndicatorPayload {
                    id: indicator_id.to_string(),
                    label: label.to_string(),
                    usc: Vec::new(),
                    opponent: Vec::new(),
                },
            }
        })
        .collect();

    MvpDataset {
        generated_at,
        usc_team: usc_team.to_string(),
        opponent_team: opponent_team.to_string(),
        limit,
        indicators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_viewstate_from_form() {
        let html = r#"
        <form id="form"><input type="hidden" name="jakarta.faces.ViewState" value="-813:442" /></form>
        "#;
        assert_eq!(extract_viewstate(html).unwrap(), "-813:442");
        assert!(extract_viewstate("<form></form>").is_err());
    }

    #[test]
    fn parses_partial_response_updates() {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?><partial-response id=\"j_id1\"><changes>\
<update id=\"{TABLE_ID}\"><![CDATA[<tbody><tr><td>1</td></tr></tbody>]]></update>\
<update id=\"jakarta.faces.ViewState\"><![CDATA[-814:443]]></update>\
</changes></partial-response>"
        );
        let (table_html, viewstate) = parse_partial_response(&xml).unwrap();
        assert!(table_html.contains("<td>1</td>"));
        assert_eq!(viewstate.as_deref(), Some("-814:443"));
    }

    #[test]
    fn extracts_and_reorders_table_rows() {
        // Raw column order: rank, medal, name, 8 metric values, sets, games, score.
        let table_html = "<tbody>\
<tr><td>1</td><td></td><td>Weber, Lena</td>\
<td>120</td><td>12</td><td>30</td><td>55%</td><td>44%</td><td>2.1</td><td>0.8</td><td>17</td>\
<td>36</td><td>10</td><td>231</td></tr>\
<tr><td>leer</td></tr>\
</tbody>";
        let rows = extract_table_rows(table_html).unwrap();
        assert_eq!(rows.len(), 2);
        let first = &rows[0];
        assert_eq!(first[2], "Weber, Lena");
        // Set and game counts moved right behind the name.
        assert_eq!(first[3], "36");
        assert_eq!(first[4], "10");
        assert_eq!(first.last().map(String::as_str), Some("231"));
        // Short rows stay untouched.
        assert_eq!(rows[1], vec!["leer".to_string()]);
    }

    #[test]
    fn builds_datasets_per_indicator_and_team() {
        let headers: Vec<String> = MVP_HEADERS.iter().map(|h| h.to_string()).collect();
        let mut row_a = vec![String::new(); headers.len()];
        row_a[0] = "1".to_string();
        row_a[2] = "Weber, Lena".to_string();
        row_a[6] = "M\u{fc}nster".to_string();
        row_a[8] = "231".to_string();
        row_a[12] = "4.5".to_string();
        let mut row_b = row_a.clone();
        row_b[2] = "Neu, Carla".to_string();
        row_b[6] = "Wiesbaden".to_string();
        let sections = vec![MvpSection {
            id: MVP_INDICATORS[0].0.to_string(),
            label: MVP_INDICATORS[0].1.to_string(),
            headers: headers.clone(),
            rows: vec![row_a, row_b],
        }];
        let dataset = build_mvp_dataset(
            &sections,
            "USC M\u{fc}nster",
            "VC Wiesbaden",
            2,
            "2025-01-20T12:00:00+01:00".to_string(),
        );
        assert_eq!(dataset.indicators.len(), MVP_INDICATORS.len());

        let first = &dataset.indicators[0];
        assert_eq!(first.usc.len(), 2);
        assert_eq!(
            first.usc[0].get("Name").map(String::as_str),
            Some("Weber, Lena")
        );
        assert_eq!(
            first.usc[0].get("ranking").map(String::as_str),
            Some("231 | 4.5")
        );
        // Padded placeholder keeps the team column.
        assert_eq!(
            first.usc[1].get("Mannschaft").map(String::as_str),
            Some("M\u{fc}nster")
        );
        assert_eq!(
            first.opponent[0].get("Name").map(String::as_str),
            Some("Neu, Carla")
        );

        // Indicators without data stay empty.
        assert!(dataset.indicators[1].usc.is_empty());
    }

    #[test]
    fn pads_missing_rows_with_placeholders() {
        let rows = vec![vec!["1".to_string(); MVP_HEADERS.len()]];
        let padded = ensure_row_limit(rows, "Münster", 3);
        assert_eq!(padded.len(), 3);
        assert_eq!(padded[1][6], "Münster");
        assert_eq!(padded[1][0], "–");
    }
}
