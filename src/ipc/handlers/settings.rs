use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::settings::{self, Settings};
use serde_json::json;
use std::path::PathBuf;

fn settings_dir(params: &serde_json::Value) -> PathBuf {
    params
        .get("dir")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn handle_settings_load(_state: &mut AppState, req: &Request) -> serde_json::Value {
    match settings::load(&settings_dir(&req.params)) {
        Ok(s) => ok(
            &req.id,
            json!({
                "workbookPath": s.workbook_path,
                "currentSheet": s.current_sheet
            }),
        ),
        Err(e) => err(&req.id, "settings_load_failed", format!("{e:#}"), None),
    }
}

fn handle_settings_store(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let s = Settings {
        workbook_path: req
            .params
            .get("workbookPath")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string()),
        current_sheet: req
            .params
            .get("currentSheet")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string()),
    };
    match settings::store(&settings_dir(&req.params), &s) {
        Ok(()) => ok(&req.id, json!({ "stored": true })),
        Err(e) => err(&req.id, "settings_store_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.load" => Some(handle_settings_load(state, req)),
        "settings.store" => Some(handle_settings_store(state, req)),
        _ => None,
    }
}
