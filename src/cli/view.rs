//! Terminal stand-in for the tray icon and its status menu items.

use crate::bus::UpdateEvent;
use crate::format::{FAILED_TITLE, FETCHING_TITLE, Formatter};
use crate::orchestrator::WORLD_LABEL;
use crate::stats::StatsSnapshot;

/// What the tray currently shows
pub struct TrayView {
    fmt: Formatter,
    /// Tray title line
    pub title: String,
    /// "Current stats: ..." item
    pub current: String,
    /// "Cases: ..." item
    pub total: String,
    /// Selection and refresh items are disabled while true
    pub fetching: bool,
    /// Message of the last failure, cleared by the next successful fetch
    pub last_error: Option<String>,
    last_good: Option<StatsSnapshot>,
}

impl TrayView {
    pub fn new(fmt: Formatter) -> Self {
        Self {
            fmt,
            title: FETCHING_TITLE.to_string(),
            current: format!("Current stats: {}", WORLD_LABEL),
            total: "Cases: -".to_string(),
            fetching: false,
            last_error: None,
            last_good: None,
        }
    }

    /// Update the view for an event
    pub fn apply(&mut self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Fetching => {
                self.title = self.fmt.event_title(event);
                self.fetching = true;
            }
            UpdateEvent::Ready { snapshot, label } => {
                self.title = self.fmt.title(snapshot);
                self.current = format!("Current stats: {}", label);
                self.total = format!("Cases: {}", self.fmt.cases(snapshot));
                self.fetching = false;
                self.last_error = None;
                self.last_good = Some(snapshot.clone());
            }
            UpdateEvent::Failed { message, .. } => {
                // Keep showing the last good numbers, flagged as stale
                self.title = match &self.last_good {
                    Some(snapshot) => format!("{} {}", FAILED_TITLE, self.fmt.title(snapshot)),
                    None => self.fmt.event_title(event),
                };
                self.fetching = false;
                self.last_error = Some(message.clone());
            }
        }
    }

    /// Last successfully fetched snapshot
    pub fn last_good(&self) -> Option<&StatsSnapshot> {
        self.last_good.as_ref()
    }

    pub fn render(&self) -> String {
        let mut lines = vec![self.title.clone(), self.current.clone(), self.total.clone()];
        if let Some(error) = &self.last_error {
            lines.push(format!("Last error: {}", error));
        }
        lines.join("\n")
    }
}
