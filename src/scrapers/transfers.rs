//! The Wechselbörse (transfer board): one `h2` heading per team, followed by
//! tables of dated transfer rows. Rows whose first cell is not a date carry
//! the running category label instead.

use crate::dates::{parse_date_label, starts_with_date_label, BerlinTime};
use crate::error::Result;
use crate::fetch;
use crate::scrapers::{absolutize, element_text, parse_selector};
use crate::teams::normalize_name;
use reqwest::Client;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const WECHSELBOERSE_URL: &str = "https://www.volleyball-bundesliga.de/cms/home/\
1_bundesliga_frauen/teams_spielerinnen/wechselboerse.xhtml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferItem {
    pub date: Option<BerlinTime>,
    pub date_label: String,
    pub category: Option<String>,
    pub type_code: String,
    pub name: String,
    pub url: Option<String>,
    pub nationality: String,
    pub info: String,
    pub related_club: String,
}

impl TransferItem {
    pub fn formatted_date(&self) -> String {
        match self.date {
            Some(date) => date.format("%d.%m.%Y").to_string(),
            None => self.date_label.clone(),
        }
    }
}

fn parse_transfer_table(table: &ElementRef) -> Result<Vec<TransferItem>> {
    let row_selector = parse_selector("tr")?;
    let cell_selector = parse_selector("td")?;
    let header_selector = parse_selector("th")?;
    let anchor_selector = parse_selector("a[href]")?;

    let mut items = Vec::new();
    let mut current_category: Option<String> = None;
    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.is_empty() {
            if let Some(header) = row.select(&header_selector).next() {
                let label = element_text(&header);
                if !label.is_empty() {
                    current_category = Some(label);
                }
            }
            continue;
        }
        let texts: Vec<String> = cells.iter().map(element_text).collect();
        if texts.iter().all(|text| text.is_empty()) {
            continue;
        }
        let first = texts[0].clone();
        let parsed_date = parse_date_label(&first);
        if parsed_date.is_none() && !starts_with_date_label(&first) {
            if !first.is_empty() {
                current_category = Some(first);
            }
            continue;
        }
        let name_cell = cells.get(2);
        let name = name_cell.map(element_text).unwrap_or_default();
        if name.is_empty() {
            continue;
        }
        let url = name_cell
            .and_then(|cell| cell.select(&anchor_selector).next())
            .and_then(|anchor| anchor.value().attr("href"))
            .map(|href| absolutize(WECHSELBOERSE_URL, href));
        items.push(TransferItem {
            date: parsed_date,
            date_label: first,
            category: current_category.clone(),
            type_code: texts.get(1).cloned().unwrap_or_default(),
            name,
            url,
            nationality: texts.get(3).cloned().unwrap_or_default(),
            info: texts.get(4).cloned().unwrap_or_default(),
            related_club: texts.get(5).cloned().unwrap_or_default(),
        });
    }
    Ok(items)
}

/// Transfers grouped by normalized team name; `h2` headings delimit teams.
pub fn parse_transfer_page(html: &str) -> Result<HashMap<String, Vec<TransferItem>>> {
    let document = Html::parse_document(html);
    let heading_selector = parse_selector("h2")?;

    let mut mapping: HashMap<String, Vec<TransferItem>> = HashMap::new();
    for heading in document.select(&heading_selector) {
        let team_name = element_text(&heading);
        if team_name.is_empty() {
            continue;
        }
        let mut collected = Vec::new();
        let mut sibling = heading.next_sibling();
        while let Some(node) = sibling {
            if let Some(element) = ElementRef::wrap(node) {
                let tag = element.value().name();
                if tag == "h2" {
                    break;
                }
                if tag == "table" {
                    collected.extend(parse_transfer_table(&element)?);
                }
            }
            sibling = node.next_sibling();
        }
        if !collected.is_empty() {
            mapping.insert(normalize_name(&team_name), collected);
        }
    }
    Ok(mapping)
}

pub async fn fetch_transfers(client: &Client) -> Result<HashMap<String, Vec<TransferItem>>> {
    let html = fetch::fetch_html(client, WECHSELBOERSE_URL).await?;
    parse_transfer_page(&html)
}

pub fn transfers_for_team<'a>(
    mapping: &'a HashMap<String, Vec<TransferItem>>,
    team_name: &str,
) -> &'a [TransferItem] {
    mapping
        .get(&normalize_name(team_name))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_HTML: &str = r#"
    <h2>USC Münster</h2>
    <table>
      <tr><th>Zugänge</th></tr>
      <tr>
        <td>01.07.2025</td>
        <td>Z</td>
        <td><a href="/cms/player/weber.xhtml">Weber, Lena</a></td>
        <td>GER</td>
        <td>Zuspielerin</td>
        <td>VC Wiesbaden</td>
      </tr>
      <tr>
        <td>Abgänge</td>
      </tr>
      <tr>
        <td>15.06.2025</td>
        <td>A</td>
        <td>Anders, Maja</td>
        <td>GER</td>
        <td>Außenangreiferin</td>
        <td>Dresdner SC</td>
      </tr>
    </table>
    <h2>VC Wiesbaden</h2>
    <table>
      <tr>
        <td>02.07.2025</td>
        <td>Z</td>
        <td>Neu, Carla</td>
        <td>GER</td>
        <td></td>
        <td></td>
      </tr>
    </table>
    "#;

    #[test]
    fn groups_transfers_by_team_with_categories() {
        let mapping = parse_transfer_page(TRANSFER_HTML).unwrap();
        let usc = transfers_for_team(&mapping, "usc muenster");
        assert_eq!(usc.len(), 2);
        assert_eq!(usc[0].name, "Weber, Lena");
        assert_eq!(usc[0].category.as_deref(), Some("Zugänge"));
        assert_eq!(
            usc[0].url.as_deref(),
            Some("https://www.volleyball-bundesliga.de/cms/player/weber.xhtml")
        );
        assert_eq!(usc[0].formatted_date(), "01.07.2025");
        assert_eq!(usc[1].category.as_deref(), Some("Abgänge"));
        assert_eq!(usc[1].related_club, "Dresdner SC");

        let wiesbaden = transfers_for_team(&mapping, "VC Wiesbaden");
        assert_eq!(wiesbaden.len(), 1);
        assert!(transfers_for_team(&mapping, "Dresdner SC").is_empty());
    }
}
