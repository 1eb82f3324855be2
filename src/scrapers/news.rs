//! News collection: RSS feeds, the VBL news and press-review pages, plus
//! generic club pages configured in the config file. League-wide feeds are
//! narrowed down per team through keyword matching.

use crate::config::{NewsSource, SourceKind};
use crate::dates::{berlin_now, parse_date_label, BerlinTime};
use crate::error::Result;
use crate::fetch;
use crate::scrapers::{absolutize, element_text, parse_selector};
use crate::teams::{matches_keywords, normalize_name, KeywordSet};
use chrono::Duration;
use chrono_tz::Europe::Berlin;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub const VBL_NEWS_URL: &str =
    "https://www.volleyball-bundesliga.de/cms/home/1_bundesliga_frauen/news/news.xhtml";
pub const VBL_PRESS_URL: &str =
    "https://www.volleyball-bundesliga.de/cms/home/1_bundesliga_frauen/news/pressespiegel.xhtml";
pub const NEWS_LOOKBACK_DAYS: i64 = 14;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published: Option<BerlinTime>,
    #[serde(default)]
    pub search_text: String,
}

impl NewsItem {
    pub fn formatted_date(&self) -> Option<String> {
        self.published
            .map(|published| published.format("%d.%m.%Y %H:%M").to_string())
    }
}

fn within_lookback(published: Option<&BerlinTime>, reference: &BerlinTime, lookback_days: i64) -> bool {
    match published {
        Some(published) => *published >= *reference - Duration::days(lookback_days),
        None => false,
    }
}

/// Keep the first occurrence of every URL, preserving order.
pub fn deduplicate_news(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let key = item.url.trim().to_string();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

pub fn filter_by_keywords(items: &[NewsItem], keyword_set: &KeywordSet) -> Vec<NewsItem> {
    items
        .iter()
        .filter(|item| {
            let haystack = if item.search_text.is_empty() {
                &item.title
            } else {
                &item.search_text
            };
            matches_keywords(haystack, keyword_set)
        })
        .cloned()
        .collect()
}

/// RSS feeds carry RFC 2822 `pubDate`s; items without one are dropped by the
/// lookback filter.
pub fn parse_rss_news(
    rss_text: &str,
    label: &str,
    reference: &BerlinTime,
    lookback_days: i64,
) -> Result<Vec<NewsItem>> {
    let channel = rss::Channel::read_from(rss_text.as_bytes())?;
    let mut items = Vec::new();
    for item in channel.items() {
        let title = item.title().unwrap_or("").trim().to_string();
        let link = item.link().unwrap_or("").trim().to_string();
        if title.is_empty() || link.is_empty() {
            continue;
        }
        let published = item.pub_date().and_then(|raw| {
            chrono::DateTime::parse_from_rfc2822(raw)
                .ok()
                .map(|parsed| parsed.with_timezone(&Berlin).fixed_offset())
        });
        if !within_lookback(published.as_ref(), reference, lookback_days) {
            continue;
        }
        let description = item.description().unwrap_or("").trim();
        items.push(NewsItem {
            search_text: format!("{title} {description}"),
            title,
            url: link,
            source: label.to_string(),
            published,
        });
    }
    Ok(deduplicate_news(items))
}

/// Articles on the VBL news page: `div.samsArticle` blocks with a header
/// link, a date line and a teaser.
pub fn parse_vbl_articles(
    html: &str,
    base_url: &str,
    label: &str,
    reference: &BerlinTime,
    lookback_days: i64,
) -> Result<Vec<NewsItem>> {
    let document = Html::parse_document(html);
    let article_selector = parse_selector("div.samsArticle")?;
    let header_selector = parse_selector(".samsArticleHeader a")?;
    let info_selector = parse_selector(".samsArticleInfo")?;
    let teaser_selector = parse_selector(".samsCmsComponentContent")?;
    let category_selector = parse_selector(".samsArticleCategory")?;

    let mut items = Vec::new();
    for article in document.select(&article_selector) {
        let Some(header_link) = article.select(&header_selector).next() else {
            continue;
        };
        let Some(href) = header_link.value().attr("href") else {
            continue;
        };
        let title = element_text(&header_link);
        if title.is_empty() {
            continue;
        }
        let published = article
            .select(&info_selector)
            .next()
            .and_then(|info| parse_date_label(&element_text(&info)));
        if !within_lookback(published.as_ref(), reference, lookback_days) {
            continue;
        }
        let teaser = article
            .select(&teaser_selector)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        let category = article
            .select(&category_selector)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        items.push(NewsItem {
            search_text: format!("{title} {teaser} {category}"),
            url: absolutize(base_url, href),
            title,
            source: label.to_string(),
            published,
        });
    }
    Ok(deduplicate_news(items))
}

/// Press-review rows: link, publishing outlet, date.
pub fn parse_vbl_press(
    html: &str,
    reference: &BerlinTime,
    lookback_days: i64,
) -> Result<Vec<NewsItem>> {
    let document = Html::parse_document(html);
    let row_selector = parse_selector("table.samsDataTable tbody tr")?;
    let cell_selector = parse_selector("td")?;
    let anchor_selector = parse_selector("a[href]")?;

    let mut items = Vec::new();
    for row in document.select(&row_selector) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() < 3 {
            continue;
        }
        let Some(link_elem) = cells[0].select(&anchor_selector).next() else {
            continue;
        };
        let Some(href) = link_elem.value().attr("href") else {
            continue;
        };
        let title = element_text(&link_elem);
        if title.is_empty() {
            continue;
        }
        let outlet = element_text(&cells[1]);
        let published = parse_date_label(&element_text(&cells[2]));
        if !within_lookback(published.as_ref(), reference, lookback_days) {
            continue;
        }
        items.push(NewsItem {
            search_text: format!("{title} {outlet}"),
            title,
            url: href.to_string(),
            source: format!("{outlet} via VBL Pressespiegel"),
            published,
        });
    }
    Ok(deduplicate_news(items))
}

/// The ETV club page lists news as `div[id^=news-]` blocks.
pub fn parse_etv_news(
    html: &str,
    base_url: &str,
    label: &str,
    reference: &BerlinTime,
    lookback_days: i64,
) -> Result<Vec<NewsItem>> {
    let block_selector = parse_selector("div[id^=news-]")?;
    let date_selector = parse_selector(".newsDate .date")?;
    let title_selector = parse_selector(".headline2")?;
    let link_selector = parse_selector("a[href]")?;
    let summary_selector = parse_selector(".text-wrapper")?;

    let document = Html::parse_document(html);
    let mut items = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for block in document.select(&block_selector) {
        let block_id = block.value().attr("id").unwrap_or("").to_string();
        if !seen_ids.insert(block_id.clone()) {
            continue;
        }
        let Some(title_elem) = block.select(&title_selector).next() else {
            continue;
        };
        let title = element_text(&title_elem);
        if title.is_empty() {
            continue;
        }
        let url = title_elem
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(|href| absolutize(base_url, href))
            .unwrap_or_else(|| format!("{}#{}", base_url.trim_end_matches('/'), block_id));
        let published = block
            .select(&date_selector)
            .next()
            .and_then(|el| parse_date_label(&element_text(&el)));
        if !within_lookback(published.as_ref(), reference, lookback_days) {
            continue;
        }
        let summary = block
            .select(&summary_selector)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();
        items.push(NewsItem {
            search_text: format!("{title} {summary}"),
            title,
            url,
            source: label.to_string(),
            published,
        });
    }
    Ok(deduplicate_news(items))
}

/// Generic fallback for configured club pages: any `article a`, `h2 a` or
/// `h3 a` anchor counts as a headline. No dates here, so no lookback filter.
pub fn parse_generic_news(html: &str, source: &NewsSource) -> Result<Vec<NewsItem>> {
    let document = Html::parse_document(html);
    let anchor_selector = parse_selector("article a, h2 a, h3 a")?;

    let mut items = Vec::new();
    for anchor in document.select(&anchor_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let title = element_text(&anchor);
        if title.is_empty() {
            continue;
        }
        items.push(NewsItem {
            search_text: title.clone(),
            title,
            url: absolutize(&source.url, href),
            source: source.name.clone(),
            published: None,
        });
        if items.len() >= source.limit * 2 {
            break;
        }
    }
    let mut deduped = deduplicate_news(items);
    deduped.truncate(source.limit);
    Ok(deduped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeamFeedKind {
    Rss,
    Etv,
}

struct TeamFeed {
    kind: TeamFeedKind,
    url: &'static str,
    label: &'static str,
}

static TEAM_NEWS_CONFIG: Lazy<HashMap<String, TeamFeed>> = Lazy::new(|| {
    let mut config = HashMap::new();
    config.insert(
        normalize_name("USC Münster"),
        TeamFeed {
            kind: TeamFeedKind::Rss,
            url: "https://www.usc-muenster.de/feed/",
            label: "Homepage USC Münster",
        },
    );
    config.insert(
        normalize_name("ETV Hamburger Volksbank Volleys"),
        TeamFeed {
            kind: TeamFeedKind::Etv,
            url: "https://www.etv-hamburg.de/de/etv-hamburger-volksbank-volleys/",
            label: "Homepage ETV Hamburger Volksbank Volleys",
        },
    );
    config
});

/// A team's own news feed, when we know one.
pub async fn fetch_team_news(
    client: &Client,
    team_name: &str,
    reference: &BerlinTime,
    lookback_days: i64,
) -> Result<Vec<NewsItem>> {
    let Some(feed) = TEAM_NEWS_CONFIG.get(&normalize_name(team_name)) else {
        return Ok(Vec::new());
    };
    match feed.kind {
        TeamFeedKind::Rss => {
            let text = fetch::fetch_rss(client, feed.url).await?;
            parse_rss_news(&text, feed.label, reference, lookback_days)
        }
        TeamFeedKind::Etv => {
            let html = fetch::fetch_html(client, feed.url).await?;
            parse_etv_news(&html, feed.url, feed.label, reference, lookback_days)
        }
    }
}

/// Extra sources from the config file; failures are logged and skipped so a
/// single dead feed does not sink the report.
pub async fn gather_configured_news(
    client: &Client,
    sources: &[NewsSource],
) -> Vec<NewsItem> {
    let reference = berlin_now();
    let mut items = Vec::new();
    for source in sources {
        let fetched = match source.kind {
            SourceKind::Rss => match fetch::fetch_rss(client, &source.url).await {
                Ok(text) => parse_rss_news(&text, &source.name, &reference, NEWS_LOOKBACK_DAYS),
                Err(err) => Err(err),
            },
            SourceKind::Html => match fetch::fetch_html(client, &source.url).await {
                Ok(html) => parse_generic_news(&html, source),
                Err(err) => Err(err),
            },
        };
        match fetched {
            Ok(mut fetched) => items.append(&mut fetched),
            Err(err) => warn!("Failed to collect articles from {}: {err}", source.url),
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teams::get_team_keywords;

    fn reference() -> BerlinTime {
        parse_date_label("20.01.2025, 12:00").unwrap()
    }

    #[test]
    fn parses_rss_and_applies_lookback() {
        let rss_text = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Homepage USC Münster</title>
  <link>https://www.usc-muenster.de/</link>
  <description>Newsfeed</description>
  <item>
    <title>USC Münster gewinnt Topspiel</title>
    <link>https://www.usc-muenster.de/news/topspiel/</link>
    <description>3:1 gegen Wiesbaden</description>
    <pubDate>Sun, 12 Jan 2025 18:30:00 +0100</pubDate>
  </item>
  <item>
    <title>Saisonvorschau</title>
    <link>https://www.usc-muenster.de/news/vorschau/</link>
    <pubDate>Mon, 02 Sep 2024 10:00:00 +0200</pubDate>
  </item>
</channel></rss>"#;
        let items = parse_rss_news(rss_text, "Homepage USC Münster", &reference(), 14).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "USC Münster gewinnt Topspiel");
        assert_eq!(items[0].formatted_date().as_deref(), Some("12.01.2025 18:30"));
        assert!(items[0].search_text.contains("Wiesbaden"));
    }

    #[test]
    fn parses_vbl_article_blocks() {
        let html = r#"
        <div class="samsArticle">
          <div class="samsArticleHeader"><a href="/cms/article-1.xhtml">Münster meldet sich zurück</a></div>
          <div class="samsArticleInfo">14.01.2025, 09:15</div>
          <div class="samsArticleCategory">1. Bundesliga Frauen</div>
          <div class="samsCmsComponentContent">Der USC Münster zeigt sich formverbessert.</div>
        </div>
        <div class="samsArticle">
          <div class="samsArticleHeader"><a href="/cms/article-2.xhtml">Rückblick September</a></div>
          <div class="samsArticleInfo">05.09.2024</div>
        </div>
        "#;
        let items = parse_vbl_articles(
            html,
            VBL_NEWS_URL,
            "Volleyball Bundesliga",
            &reference(),
            14,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Münster meldet sich zurück");
        assert_eq!(
            items[0].url,
            "https://www.volleyball-bundesliga.de/cms/article-1.xhtml"
        );
    }

    #[test]
    fn parses_press_review_rows() {
        let html = r#"
        <table class="samsDataTable"><tbody>
          <tr>
            <td><a href="https://zeitung.example/usc">USC vor dem Spitzenspiel</a></td>
            <td>Westfälische Nachrichten</td>
            <td>18.01.2025</td>
          </tr>
          <tr><td>kaputte Zeile</td></tr>
        </tbody></table>
        "#;
        let items = parse_vbl_press(html, &reference(), 14).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].source,
            "Westfälische Nachrichten via VBL Pressespiegel"
        );
    }

    #[test]
    fn dedup_and_keyword_filter_work_together() {
        let items = vec![
            NewsItem {
                title: "USC Münster gewinnt".into(),
                url: "https://example.com/a".into(),
                source: "VBL".into(),
                published: None,
                search_text: "USC Münster gewinnt".into(),
            },
            NewsItem {
                title: "USC Münster gewinnt".into(),
                url: "https://example.com/a".into(),
                source: "VBL".into(),
                published: None,
                search_text: "USC Münster gewinnt".into(),
            },
            NewsItem {
                title: "Schwerin souverän".into(),
                url: "https://example.com/b".into(),
                source: "VBL".into(),
                published: None,
                search_text: "SSC Palmberg Schwerin souverän".into(),
            },
        ];
        let deduped = deduplicate_news(items);
        assert_eq!(deduped.len(), 2);

        let usc = filter_by_keywords(&deduped, &get_team_keywords("USC Münster"));
        assert_eq!(usc.len(), 1);
        assert_eq!(usc[0].url, "https://example.com/a");
    }

    #[test]
    fn generic_news_respects_source_limit() {
        let html = r#"
        <article><a href="/news/1">Bericht eins</a></article>
        <h2><a href="/news/2">Bericht zwei</a></h2>
        <h3><a href="/news/3">Bericht drei</a></h3>
        "#;
        let source = NewsSource {
            name: "Verein".into(),
            url: "https://club.example/".into(),
            kind: SourceKind::Html,
            limit: 2,
            tags: Vec::new(),
        };
        let items = parse_generic_news(html, &source).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://club.example/news/1");
    }
}
