//! Team identity: name normalization, canonical spellings and the static
//! metadata tables (homepages, Instagram accounts, roster export ids,
//! keyword synonyms) the scrapers key their lookups on.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use strsim::normalized_levenshtein;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const USC_CANONICAL_NAME: &str = "USC Münster";
pub const USC_HOMEPAGE: &str = "https://www.usc-muenster.de/";

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NAME_COMPARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zäöüß\s]").unwrap());

/// Transliterate German umlauts, lowercase and collapse whitespace, keeping
/// punctuation intact. Used for keyword matching and slugs.
pub fn simplify_text(value: &str) -> String {
    let mut folded = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            'ä' | 'Ä' => folded.push_str("ae"),
            'ö' | 'Ö' => folded.push_str("oe"),
            'ü' | 'Ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            _ => folded.extend(ch.to_lowercase()),
        }
    }
    WS_RE.replace_all(&folded, " ").trim().to_string()
}

/// Aggressive normalization for team-name comparisons: umlauts and accents
/// folded to ASCII, `muenster` variants unified, everything but `[a-z0-9]`
/// collapsed to single spaces.
pub fn normalize_name(value: &str) -> String {
    let lowered = value.to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        match ch {
            'ä' => folded.push_str("ae"),
            'ö' => folded.push_str("oe"),
            'ü' => folded.push_str("ue"),
            'ß' => folded.push_str("ss"),
            _ => folded.push(ch),
        }
    }
    let stripped: String = folded.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let stripped = stripped
        .replace("muenster", "munster")
        .replace("mnster", "munster");
    let cleaned = NON_ALNUM_RE.replace_all(&stripped, " ");
    WS_RE.replace_all(&cleaned, " ").trim().to_string()
}

pub fn slugify_team_name(value: &str) -> String {
    static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
    SLUG_RE
        .replace_all(&simplify_text(value), "-")
        .trim_matches('-')
        .to_string()
}

pub fn is_usc(name: &str) -> bool {
    let normalized = normalize_name(name);
    normalized.contains("usc") && normalized.contains("munster")
}

pub fn is_same_team(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

const TEAM_PAGE_URL: &str =
    "https://www.volleyball-bundesliga.de/cms/home/1_bundesliga_frauen/teams_spielerinnen/mannschaften.xhtml";
const ROSTER_EXPORT_URL: &str =
    "https://www.volleyball-bundesliga.de/servlet/sportsclub/TeamMemberCsvExport";

static TEAM_HOMEPAGES: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let pairs = [
        ("Allianz MTV Stuttgart", "https://www.stuttgarts-schoenster-sport.de/"),
        ("Binder Blaubären TSV Flacht", "https://binderblaubaeren.de/"),
        ("Dresdner SC", "https://www.dscvolley.de/"),
        (
            "ETV Hamburger Volksbank Volleys",
            "https://www.etv-hamburg.de/de/etv-hamburger-volksbank-volleys/",
        ),
        ("Ladies in Black Aachen", "https://ladies-in-black.de/"),
        ("SSC Palmberg Schwerin", "https://www.schweriner-sc.com/"),
        ("Schwarz-Weiß Erfurt", "https://schwarz-weiss-erfurt.de/"),
        ("Skurios Volleys Borken", "https://www.skurios-volleys-borken.de/"),
        ("USC Münster", USC_HOMEPAGE),
        ("VC Wiesbaden", "https://www.vc-wiesbaden.de/"),
        ("VfB Suhl LOTTO Thüringen", "https://volleyball-suhl.de/"),
    ];
    pairs
        .into_iter()
        .map(|(name, url)| (normalize_name(name), url))
        .collect()
});

static TEAM_INSTAGRAM: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let pairs = [
        ("Allianz MTV Stuttgart", "https://www.instagram.com/allianzmtvstuttgart/"),
        (
            "Binder Blaubären TSV Flacht",
            "https://www.instagram.com/binderblaubaerenflacht/",
        ),
        ("Dresdner SC", "https://www.instagram.com/dsc1898/"),
        (
            "ETV Hamburger Volksbank Volleys",
            "https://www.instagram.com/etv.hamburgervolksbank.volleys/",
        ),
        ("Ladies in Black Aachen", "https://www.instagram.com/ladiesinblackaachen/"),
        ("SSC Palmberg Schwerin", "https://www.instagram.com/sscpalmbergschwerin/"),
        ("Schwarz-Weiß Erfurt", "https://www.instagram.com/schwarzweisserfurt/"),
        ("Skurios Volleys Borken", "https://www.instagram.com/skurios_volleys_borken/"),
        ("USC Münster", "https://www.instagram.com/uscmuenster/"),
        ("VC Wiesbaden", "https://www.instagram.com/vc_wiesbaden/"),
        ("VfB Suhl LOTTO Thüringen", "https://www.instagram.com/vfbsuhl_lottothueringen/"),
    ];
    pairs
        .into_iter()
        .map(|(name, url)| (normalize_name(name), url))
        .collect()
});

static TEAM_ROSTER_IDS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let pairs = [
        ("Allianz MTV Stuttgart", "776311283"),
        ("Binder Blaubären TSV Flacht", "776308950"),
        ("Dresdner SC", "776311462"),
        ("ETV Hamburger Volksbank Volleys", "776308974"),
        ("Ladies in Black Aachen", "776311428"),
        ("SSC Palmberg Schwerin", "776311399"),
        ("Schwarz-Weiß Erfurt", "776311376"),
        ("Skurios Volleys Borken", "776309053"),
        ("USC Münster", "776311313"),
        ("VC Wiesbaden", "776311253"),
        ("VfB Suhl LOTTO Thüringen", "776311348"),
    ];
    pairs
        .into_iter()
        .map(|(name, id)| (normalize_name(name), id))
        .collect()
});

static TEAM_KEYWORD_SYNONYMS: Lazy<HashMap<String, Vec<&'static str>>> = Lazy::new(|| {
    let pairs: [(&str, &[&str]); 11] = [
        ("Allianz MTV Stuttgart", &["MTV Stuttgart"]),
        (
            "Binder Blaubären TSV Flacht",
            &["Binder Blaubären", "TSV Flacht", "Binder Blaubären Flacht"],
        ),
        ("Dresdner SC", &["DSC Volleys"]),
        (
            "ETV Hamburger Volksbank Volleys",
            &["ETV Hamburg", "Hamburg Volleys", "ETV Hamburger Volksbank V."],
        ),
        ("Ladies in Black Aachen", &["Ladies in Black", "Aachen Ladies"]),
        ("SSC Palmberg Schwerin", &["SSC Schwerin", "Palmberg Schwerin"]),
        ("Schwarz-Weiß Erfurt", &["Schwarz Weiss Erfurt"]),
        ("Skurios Volleys Borken", &["Skurios Borken"]),
        ("USC Münster", &["USC Muenster"]),
        ("VC Wiesbaden", &["VCW Wiesbaden"]),
        ("VfB Suhl LOTTO Thüringen", &["VfB Suhl"]),
    ];
    pairs
        .into_iter()
        .map(|(name, synonyms)| (normalize_name(name), synonyms.to_vec()))
        .collect()
});

static TEAM_SHORT_NAMES: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let pairs = [
        ("Allianz MTV Stuttgart", "Stuttgart"),
        ("Binder Blaubären TSV Flacht", "Flacht"),
        ("Dresdner SC", "Dresden"),
        ("ETV Hamburger Volksbank Volleys", "Hamburg"),
        ("Ladies in Black Aachen", "Aachen"),
        ("SSC Palmberg Schwerin", "Schwerin"),
        ("Schwarz-Weiß Erfurt", "Erfurt"),
        ("Skurios Volleys Borken", "Borken"),
        ("USC Münster", "Münster"),
        ("VC Wiesbaden", "Wiesbaden"),
        ("VfB Suhl LOTTO Thüringen", "Suhl"),
    ];
    pairs
        .into_iter()
        .map(|(name, short)| (normalize_name(name), short))
        .collect()
});

static TEAM_CANONICAL_NAMES: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let names = [
        "Allianz MTV Stuttgart",
        "Binder Blaubären TSV Flacht",
        "Dresdner SC",
        "ETV Hamburger Volksbank Volleys",
        "Ladies in Black Aachen",
        "SSC Palmberg Schwerin",
        "Schwarz-Weiß Erfurt",
        "Skurios Volleys Borken",
        "USC Münster",
        "VC Wiesbaden",
        "VfB Suhl LOTTO Thüringen",
    ];
    names
        .into_iter()
        .map(|name| (normalize_name(name), name))
        .collect()
});

// Synonyms and short labels resolve to the same canonical entry, so that
// e.g. "VfB Suhl" and "Suhl" both find the full name.
static TEAM_CANONICAL_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut lookup = TEAM_CANONICAL_NAMES.clone();
    for (normalized, synonyms) in TEAM_KEYWORD_SYNONYMS.iter() {
        if let Some(canonical) = TEAM_CANONICAL_NAMES.get(normalized) {
            for alias in synonyms {
                lookup.insert(normalize_name(alias), canonical);
            }
        }
    }
    for (normalized, short) in TEAM_SHORT_NAMES.iter() {
        if let Some(canonical) = TEAM_CANONICAL_NAMES.get(normalized) {
            lookup.insert(normalize_name(short), canonical);
        }
    }
    lookup
});

static TEAM_SHORT_NAME_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut lookup = TEAM_SHORT_NAMES.clone();
    for (normalized, synonyms) in TEAM_KEYWORD_SYNONYMS.iter() {
        if let Some(short) = TEAM_SHORT_NAMES.get(normalized) {
            for alias in synonyms {
                lookup.insert(normalize_name(alias), short);
            }
        }
    }
    lookup
});

/// Filter values understood by the MVP ranking table, keyed like the other
/// tables by normalized team name.
static TEAM_RANKING_FILTERS: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    TEAM_SHORT_NAMES
        .iter()
        .map(|(normalized, short)| (normalized.clone(), *short))
        .collect()
});

pub fn get_team_homepage(team_name: &str) -> Option<&'static str> {
    TEAM_HOMEPAGES.get(&normalize_name(team_name)).copied()
}

pub fn get_team_instagram(team_name: &str) -> Option<&'static str> {
    TEAM_INSTAGRAM.get(&normalize_name(team_name)).copied()
}

pub fn get_team_roster_url(team_name: &str) -> Option<String> {
    let team_id = TEAM_ROSTER_IDS.get(&normalize_name(team_name))?;
    Some(format!("{ROSTER_EXPORT_URL}?teamId={team_id}"))
}

pub fn get_team_page_url(team_name: &str) -> Option<String> {
    let team_id = TEAM_ROSTER_IDS.get(&normalize_name(team_name))?;
    Some(format!("{TEAM_PAGE_URL}?c.teamId={team_id}&c.view=teamMain"))
}

/// MVP table filter for a team, falling back to the last word of the name.
pub fn resolve_ranking_filter(team_name: &str) -> Option<String> {
    if let Some(mapped) = TEAM_RANKING_FILTERS.get(&normalize_name(team_name)) {
        return Some((*mapped).to_string());
    }
    team_name
        .replace('-', " ")
        .split_whitespace()
        .last()
        .map(|part| part.to_string())
}

/// Restore the canonical team spelling, repairing names that lost their
/// umlauts somewhere along an upstream export.
pub fn pretty_name(name: &str) -> String {
    if is_usc(name) {
        return USC_CANONICAL_NAME.to_string();
    }
    if let Some(canonical) = TEAM_CANONICAL_LOOKUP.get(&normalize_name(name)) {
        return (*canonical).to_string();
    }
    name.replace("Mnster", "Münster")
        .replace("Munster", "Münster")
        .replace("Thringen", "Thüringen")
        .replace("Wei", "Weiß")
        .replace("wei", "weiß")
}

pub fn get_team_short_label(name: &str) -> String {
    if let Some(short) = TEAM_SHORT_NAME_LOOKUP.get(&normalize_name(name)) {
        return (*short).to_string();
    }
    pretty_name(name)
}

#[derive(Debug, Clone)]
pub struct KeywordSet {
    pub keywords: Vec<String>,
    pub strong: Vec<String>,
}

pub fn build_keywords(names: &[&str]) -> KeywordSet {
    let mut keywords: BTreeSet<String> = BTreeSet::new();
    let mut strong: BTreeSet<String> = BTreeSet::new();
    for name in names {
        let simplified = simplify_text(name);
        if simplified.is_empty() {
            continue;
        }
        keywords.insert(simplified.clone());
        strong.insert(simplified.clone());
        let condensed = simplified.replace(' ', "");
        if !condensed.is_empty() {
            keywords.insert(condensed.clone());
            if condensed != simplified {
                strong.insert(condensed);
            }
        }
        for token in NON_ALNUM_RE.split(&simplified) {
            if !token.is_empty() {
                keywords.insert(token.to_string());
            }
        }
    }
    KeywordSet {
        keywords: keywords.into_iter().collect(),
        strong: strong.into_iter().collect(),
    }
}

/// A text matches when it contains a full team phrase, two independent
/// tokens, or a strong keyword such as the condensed team name. Single
/// generic tokens ("Volleys") are not enough.
pub fn matches_keywords(text: &str, keyword_set: &KeywordSet) -> bool {
    let haystack = simplify_text(text);
    if haystack.is_empty() || keyword_set.keywords.is_empty() {
        return false;
    }

    for keyword in &keyword_set.keywords {
        if keyword.contains(' ') && haystack.contains(keyword.as_str()) {
            return true;
        }
    }

    let hits: Vec<&String> = keyword_set
        .keywords
        .iter()
        .filter(|keyword| !keyword.is_empty() && haystack.contains(keyword.as_str()))
        .collect();
    if hits.is_empty() {
        return false;
    }
    if hits.len() >= 2 {
        return true;
    }
    hits.iter()
        .any(|hit| keyword_set.strong.iter().any(|strong| strong == *hit))
}

pub fn get_team_keywords(team_name: &str) -> KeywordSet {
    let normalized = normalize_name(team_name);
    let mut names: Vec<&str> = vec![team_name];
    if let Some(synonyms) = TEAM_KEYWORD_SYNONYMS.get(&normalized) {
        names.extend(synonyms.iter().copied());
    }
    build_keywords(&names)
}

fn simplify_player_name_for_compare(value: &str) -> String {
    let lowered = value.to_lowercase();
    let cleaned = NAME_COMPARE_RE.replace_all(&lowered, " ");
    WS_RE.replace_all(&cleaned, " ").trim().to_string()
}

/// Prefer the official roster spelling of a player over the spelling found
/// in a scoresheet PDF when the two plausibly refer to the same person.
pub fn choose_preferred_player_name(
    pdf_name: Option<&str>,
    official_name: Option<&str>,
) -> Option<String> {
    let pdf_clean = pdf_name.map(str::trim).unwrap_or("");
    let official_clean = official_name.map(str::trim).unwrap_or("");

    if !official_clean.is_empty() {
        if pdf_clean.is_empty() {
            return Some(official_clean.to_string());
        }

        let simplified_pdf = simplify_player_name_for_compare(pdf_clean);
        let simplified_official = simplify_player_name_for_compare(official_clean);
        if !simplified_pdf.is_empty() && !simplified_official.is_empty() {
            if simplified_pdf == simplified_official {
                return Some(official_clean.to_string());
            }
            let ratio = normalized_levenshtein(&simplified_pdf, &simplified_official);
            if ratio >= 0.6
                || simplified_official.contains(&simplified_pdf)
                || simplified_pdf.contains(&simplified_official)
            {
                return Some(official_clean.to_string());
            }
        }

        if official_clean.len() > pdf_clean.len() {
            return Some(official_clean.to_string());
        }
    }

    if !pdf_clean.is_empty() {
        return Some(pdf_clean.to_string());
    }
    if !official_clean.is_empty() {
        return Some(official_clean.to_string());
    }
    None
}

/// Shorten "Lastname, Firstname" or "Firstname Lastname" to the last name.
pub fn short_display_name(full_name: Option<&str>) -> Option<String> {
    let full_name = full_name?.trim();
    if full_name.is_empty() {
        return None;
    }
    if let Some((last, _)) = full_name.split_once(',') {
        let last = last.trim();
        return if last.is_empty() {
            None
        } else {
            Some(last.to_string())
        };
    }
    full_name
        .split_whitespace()
        .last()
        .map(|part| part.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_umlauts_and_punctuation() {
        assert_eq!(normalize_name("USC Münster"), "usc munster");
        assert_eq!(normalize_name("Schwarz-Weiß Erfurt"), "schwarz weiss erfurt");
        assert_eq!(normalize_name("Allianz MTV Stuttgart"), "allianz mtv stuttgart");
    }

    #[test]
    fn normalizes_accented_characters() {
        assert_eq!(normalize_name("Clément"), "clement");
        assert_eq!(normalize_name("Sán-José"), "san jose");
    }

    #[test]
    fn recognizes_usc_spellings() {
        assert!(is_usc("USC Münster"));
        assert!(is_usc("usc muenster"));
        assert!(is_usc("USC Mnster"));
        assert!(!is_usc("VC Wiesbaden"));
    }

    #[test]
    fn slugifies_team_names() {
        assert_eq!(slugify_team_name("USC Münster"), "usc-muenster");
        assert_eq!(slugify_team_name("Schwarz-Weiß Erfurt"), "schwarz-weiss-erfurt");
    }

    #[test]
    fn canonical_lookup_covers_synonyms_and_short_labels() {
        assert_eq!(pretty_name("VfB Suhl"), "VfB Suhl LOTTO Thüringen");
        assert_eq!(pretty_name("Suhl"), "VfB Suhl LOTTO Thüringen");
        assert_eq!(pretty_name("usc muenster"), "USC Münster");
    }

    #[test]
    fn short_labels_fall_back_to_pretty_name() {
        assert_eq!(get_team_short_label("Dresdner SC"), "Dresden");
        assert_eq!(get_team_short_label("Ladies in Black"), "Aachen");
        assert_eq!(get_team_short_label("Some Other Club"), "Some Other Club");
    }

    #[test]
    fn ranking_filter_falls_back_to_last_word() {
        assert_eq!(resolve_ranking_filter("USC Münster").as_deref(), Some("Münster"));
        assert_eq!(resolve_ranking_filter("SC Potsdam").as_deref(), Some("Potsdam"));
    }

    #[test]
    fn keyword_matching_requires_strong_or_double_hits() {
        let keywords = get_team_keywords("USC Münster");
        assert!(matches_keywords("Der USC Münster gewinnt erneut", &keywords));
        assert!(matches_keywords("uscmuenster legt nach", &keywords));
        assert!(!matches_keywords("Volleyball am Wochenende", &keywords));

        let hamburg = get_team_keywords("ETV Hamburger Volksbank Volleys");
        assert!(matches_keywords("ETV Hamburg siegt im Tiebreak", &hamburg));
        assert!(!matches_keywords("Die Volleys aus Berlin", &hamburg));
    }

    #[test]
    fn prefers_official_player_spelling() {
        assert_eq!(
            choose_preferred_player_name(Some("Mueller A"), Some("Müller, Anna")).as_deref(),
            Some("Müller, Anna"),
        );
        assert_eq!(
            choose_preferred_player_name(Some("Smith"), None).as_deref(),
            Some("Smith"),
        );
        assert_eq!(choose_preferred_player_name(None, None), None);
    }

    #[test]
    fn shortens_display_names() {
        assert_eq!(short_display_name(Some("Müller, Anna")).as_deref(), Some("Müller"));
        assert_eq!(short_display_name(Some("Anna Müller")).as_deref(), Some("Müller"));
        assert_eq!(short_display_name(Some("  ")), None);
    }
}
