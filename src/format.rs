//! Human-readable rendering of snapshots and update events.

use num_format::{Locale, ToFormattedString};

use crate::bus::UpdateEvent;
use crate::stats::StatsSnapshot;

/// Title shown while a fetch is running
pub const FETCHING_TITLE: &str = "⏳";

/// Title shown after a failed fetch
pub const FAILED_TITLE: &str = "⚠️";

/// Map a locale tag to a `num_format::Locale`.
///
/// Supported tags (case-insensitive): `en`, `us`, `en_US`, `de`, `de_DE`, `german`,
/// `fr`, `es`, `it`, `pt`, `nl`. Anything else falls back to English.
pub fn map_locale(tag: &str) -> &'static Locale {
    match tag.to_lowercase().as_str() {
        "de" | "de_de" | "german" => &Locale::de,
        "fr" | "fr_fr" => &Locale::fr,
        "es" | "es_es" => &Locale::es,
        "it" | "it_it" => &Locale::it,
        "pt" | "pt_pt" | "pt_br" => &Locale::pt,
        "nl" | "nl_nl" => &Locale::nl,
        _ => &Locale::en,
    }
}

/// Stateless text renderer
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    locale: &'static Locale,
}

impl Default for Formatter {
    fn default() -> Self {
        Self { locale: &Locale::en }
    }
}

impl Formatter {
    pub fn new(locale_tag: &str) -> Self {
        Self {
            locale: map_locale(locale_tag),
        }
    }

    /// Integer with locale thousands separators
    pub fn number(&self, n: i64) -> String {
        n.to_formatted_string(self.locale)
    }

    /// Tray title: active cases, deaths and recoveries
    pub fn title(&self, snapshot: &StatsSnapshot) -> String {
        format!(
            "😷 {}  ☠️ {}  🥳 {}",
            self.number(snapshot.active),
            self.number(snapshot.deaths),
            self.number(snapshot.recovered)
        )
    }

    /// Tray title for an event
    pub fn event_title(&self, event: &UpdateEvent) -> String {
        match event {
            UpdateEvent::Fetching => FETCHING_TITLE.to_string(),
            UpdateEvent::Ready { snapshot, .. } => self.title(snapshot),
            UpdateEvent::Failed { kind, .. } => format!("{} {}", FAILED_TITLE, kind),
        }
    }

    /// Where the data comes from: a country name or "World"
    pub fn source<'a>(&self, snapshot: &'a StatsSnapshot) -> &'a str {
        snapshot.scope_label()
    }

    /// Total case count
    pub fn cases(&self, snapshot: &StatsSnapshot) -> String {
        self.number(snapshot.cases)
    }

    /// Provider update time, or "-" when unknown
    pub fn updated(&self, snapshot: &StatsSnapshot) -> String {
        snapshot
            .updated_at()
            .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    }

    /// Multi-line detail view
    pub fn details(&self, snapshot: &StatsSnapshot) -> String {
        let rows = [
            ("Source", self.source(snapshot).to_string()),
            ("Updated", self.updated(snapshot)),
            ("Cases", self.cases(snapshot)),
            ("Today", self.number(snapshot.today_cases)),
            ("Active", self.number(snapshot.active)),
            ("Critical", self.number(snapshot.critical)),
            ("Deaths", self.number(snapshot.deaths)),
            ("Today deaths", self.number(snapshot.today_deaths)),
            ("Recovered", self.number(snapshot.recovered)),
            ("Tests", self.number(snapshot.tests)),
        ];

        rows.iter()
            .map(|(name, value)| format!("{:<13} {}", format!("{}:", name), value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ErrorKind;

    fn sample() -> StatsSnapshot {
        StatsSnapshot {
            updated_at_millis: 1589106525130,
            cases: 150000,
            deaths: 2000,
            recovered: 25000,
            active: 123000,
            scope: Some(String::new()),
            ..Default::default()
        }
    }

    #[test]
    fn test_title() {
        let fmt = Formatter::default();
        assert_eq!(fmt.title(&sample()), "😷 123,000  ☠️ 2,000  🥳 25,000");
        assert_eq!(fmt.title(&StatsSnapshot::default()), "😷 0  ☠️ 0  🥳 0");
    }

    #[test]
    fn test_event_title() {
        let fmt = Formatter::default();
        assert_eq!(fmt.event_title(&UpdateEvent::Fetching), "⏳");
        let failed = UpdateEvent::Failed {
            kind: ErrorKind::Fetch,
            message: String::new(),
        };
        assert_eq!(fmt.event_title(&failed), "⚠️ fetch");
    }

    #[test]
    fn test_cases() {
        let fmt = Formatter::new("en");
        let with_cases = |cases| StatsSnapshot {
            cases,
            ..Default::default()
        };
        assert_eq!(fmt.cases(&with_cases(0)), "0");
        assert_eq!(fmt.cases(&with_cases(100)), "100");
        assert_eq!(fmt.cases(&with_cases(1000)), "1,000");
        assert_eq!(fmt.cases(&with_cases(123999999)), "123,999,999");
        assert_eq!(fmt.cases(&sample()), "150,000");
    }

    #[test]
    fn test_source() {
        let fmt = Formatter::default();
        assert_eq!(fmt.source(&sample()), "World");
        let narnia = StatsSnapshot {
            scope: Some("Narnia".into()),
            ..Default::default()
        };
        assert_eq!(fmt.source(&narnia), "Narnia");
    }

    #[test]
    fn test_locale_separators() {
        assert_eq!(Formatter::new("de").number(1234567), "1.234.567");
        assert_eq!(Formatter::new("unknown").number(1234567), "1,234,567");
    }

    #[test]
    fn test_details() {
        let text = Formatter::default().details(&sample());
        assert!(text.contains("Updated:      2020-05-10"));
        assert!(text.contains("Cases:        150,000"));
    }
}
