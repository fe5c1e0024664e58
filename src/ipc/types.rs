use std::path::PathBuf;

use serde::Deserialize;

use crate::ledger::Ledger;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The live scan loop for one class meeting. Scans carrying a stale id are
/// rejected so a lingering camera window cannot mark a later session.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub id: String,
    pub sheet: String,
    pub session_key: String,
}

pub struct AppState {
    pub workbook: Option<PathBuf>,
    pub ledger: Option<Ledger>,
    pub session: Option<ScanSession>,
    // Notification lines queued by handlers, flushed after the response.
    pub events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            workbook: None,
            ledger: None,
            session: None,
            events: Vec::new(),
        }
    }

    pub fn push_event(&mut self, event: serde_json::Value) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.events)
    }
}
