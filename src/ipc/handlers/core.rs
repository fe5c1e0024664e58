use crate::ipc::error::{err, event, ok};
use crate::ipc::types::{AppState, Request};
use crate::workbook::{self, ScaffoldClass, ScaffoldStudent};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workbookPath": state.workbook.as_ref().map(|p| p.to_string_lossy().to_string()),
            "dirty": state.ledger.as_ref().map(|l| l.dirty).unwrap_or(false)
        }),
    )
}

fn handle_workbook_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match workbook::load(&path) {
        Ok(ledger) => {
            let sheet_count = ledger.sheets.len();
            state.workbook = Some(path.clone());
            state.ledger = Some(ledger);
            // A session never outlives its workbook.
            state.session = None;
            ok(
                &req.id,
                json!({
                    "workbookPath": path.to_string_lossy(),
                    "sheetCount": sheet_count
                }),
            )
        }
        Err(e) => err(&req.id, "workbook_open_failed", format!("{e:#}"), None),
    }
}

fn handle_workbook_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_mut() else {
        return err(&req.id, "no_workbook", "open a workbook first", None);
    };
    if !ledger.dirty {
        return ok(&req.id, json!({ "saved": false, "reason": "no pending changes" }));
    }
    match workbook::save(ledger) {
        Ok(()) => {
            ledger.dirty = false;
            let path = ledger.path.to_string_lossy().to_string();
            state.push_event(event("attendanceUpdated", json!({ "workbookPath": path })));
            ok(&req.id, json!({ "saved": true, "workbookPath": path }))
        }
        Err(e) => {
            log::warn!("workbook save failed, changes retained: {e:#}");
            err(
                &req.id,
                "workbook_save_failed",
                format!("{e:#}"),
                Some(json!({ "retained": true })),
            )
        }
    }
}

fn handle_workbook_scaffold(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let classes = match parse_scaffold_classes(&req.params) {
        Ok(v) => v,
        Err(message) => return err(&req.id, "bad_params", message, None),
    };

    match workbook::scaffold(&path, &classes) {
        Ok(ledger) => {
            let sheet_count = ledger.sheets.len();
            state.workbook = Some(path.clone());
            state.ledger = Some(ledger);
            state.session = None;
            ok(
                &req.id,
                json!({
                    "workbookPath": path.to_string_lossy(),
                    "sheetCount": sheet_count
                }),
            )
        }
        Err(e) => err(&req.id, "workbook_scaffold_failed", format!("{e:#}"), None),
    }
}

fn parse_scaffold_classes(params: &serde_json::Value) -> Result<Vec<ScaffoldClass>, String> {
    let Some(items) = params.get("classes").and_then(|v| v.as_array()) else {
        return Err("missing classes".to_string());
    };
    if items.is_empty() {
        return Err("classes must not be empty".to_string());
    }

    let mut classes = Vec::new();
    for item in items {
        let name = item
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let sessions = item
            .get("sessions")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        let students = item
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .map(|s| ScaffoldStudent {
                        grade: s
                            .get("grade")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        student_no: s
                            .get("studentNo")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        name: s
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        classes.push(ScaffoldClass {
            name,
            sessions,
            students,
        });
    }
    Ok(classes)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workbook.open" => Some(handle_workbook_open(state, req)),
        "workbook.save" => Some(handle_workbook_save(state, req)),
        "workbook.scaffold" => Some(handle_workbook_scaffold(state, req)),
        _ => None,
    }
}
