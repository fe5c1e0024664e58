use crate::decode;
use crate::frame;
use crate::ipc::error::{err, event, ok};
use crate::ipc::types::{AppState, Request, ScanSession};
use crate::ledger::{self, ScanOutcome};
use crate::workbook;
use serde_json::json;
use std::path::Path;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn no_workbook() -> HandlerErr {
    HandlerErr {
        code: "no_workbook",
        message: "open a workbook first".to_string(),
        details: None,
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string()
}

fn active_session(state: &AppState, params: &serde_json::Value) -> Result<ScanSession, HandlerErr> {
    let id = get_required_str(params, "sessionId")?;
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr {
            code: "no_session",
            message: "start a session first".to_string(),
            details: None,
        });
    };
    if session.id != id {
        return Err(HandlerErr {
            code: "stale_session",
            message: "session id does not match the active session".to_string(),
            details: None,
        });
    }
    Ok(session.clone())
}

fn session_start(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let sheet_name = get_required_str(params, "sheet")?;
    let session_key = get_required_str(params, "sessionKey")?.trim().to_string();
    if session_key.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "sessionKey must not be empty".to_string(),
            details: None,
        });
    }
    if !ledger::is_scannable(&sheet_name) {
        return Err(HandlerErr {
            code: "not_scannable",
            message: "the summary sheet cannot take scans".to_string(),
            details: None,
        });
    }
    let Some(ledger) = state.ledger.as_mut() else {
        return Err(no_workbook());
    };
    let Some(sheet) = ledger.sheet_mut(&sheet_name) else {
        return Err(HandlerErr {
            code: "not_found",
            message: "sheet not found".to_string(),
            details: None,
        });
    };

    let column_added = sheet.ensure_session(&session_key);
    let enrolled = sheet.students.len();
    if column_added {
        ledger.dirty = true;
    }

    let id = Uuid::new_v4().to_string();
    state.session = Some(ScanSession {
        id: id.clone(),
        sheet: sheet_name.clone(),
        session_key: session_key.clone(),
    });
    Ok(json!({
        "sessionId": id,
        "sheet": sheet_name,
        "sessionKey": session_key,
        "enrolled": enrolled,
        "columnAdded": column_added
    }))
}

// One reconciliation step, shared by single-payload and whole-frame scans.
fn scan_one(
    state: &mut AppState,
    session: &ScanSession,
    ev: &decode::ScanEvent,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(ledger) = state.ledger.as_mut() else {
        return Err(no_workbook());
    };
    let Some(sheet) = ledger.sheet_mut(&session.sheet) else {
        return Err(HandlerErr {
            code: "not_found",
            message: "session sheet is gone from the workbook".to_string(),
            details: None,
        });
    };

    let time = now_timestamp();
    match ledger::record_scan(sheet, &session.session_key, &ev.student_no, &ev.name, &time) {
        ScanOutcome::Recorded { time } => {
            ledger.dirty = true;
            Ok(json!({
                "status": "recorded",
                "studentNo": ev.student_no,
                "name": ev.name,
                "time": time
            }))
        }
        ScanOutcome::Duplicate { time } => Ok(json!({
            "status": "duplicate",
            "studentNo": ev.student_no,
            "name": ev.name,
            "time": time
        })),
        ScanOutcome::NotEnrolled => Ok(json!({
            "status": "notEnrolled",
            "studentNo": ev.student_no,
            "name": ev.name
        })),
    }
}

fn session_scan(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = active_session(state, params)?;
    let payload = get_required_str(params, "payload")?;
    match decode::parse_payload(&payload) {
        Ok(ev) => scan_one(state, &session, &ev),
        Err(e) => {
            // Malformed payloads are absorbed, not surfaced as failures.
            log::debug!("ignoring malformed payload: {e:#}");
            Ok(json!({ "status": "ignored", "reason": e.to_string() }))
        }
    }
}

fn session_scan_frame(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = active_session(state, params)?;
    let path = get_required_str(params, "path")?;
    let payloads = frame::decode_frame_file(Path::new(&path)).map_err(|e| HandlerErr {
        code: "frame_unreadable",
        message: format!("{e:#}"),
        details: None,
    })?;

    let mut results = Vec::new();
    for payload in &payloads {
        match decode::parse_payload(payload) {
            Ok(ev) => results.push(scan_one(state, &session, &ev)?),
            Err(e) => log::debug!("dropping malformed payload from frame: {e:#}"),
        }
    }
    Ok(json!({ "decoded": payloads.len(), "results": results }))
}

fn session_close(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = active_session(state, params)?;
    let Some(ledger) = state.ledger.as_mut() else {
        return Err(no_workbook());
    };
    let Some(sheet) = ledger.sheet_mut(&session.sheet) else {
        return Err(HandlerErr {
            code: "not_found",
            message: "session sheet is gone from the workbook".to_string(),
            details: None,
        });
    };

    let close = ledger::close_session(sheet, &session.session_key);
    if close.marked_absent > 0 {
        ledger.dirty = true;
    }
    let summary = ledger::rebuild_summary(&ledger.sheets);
    if summary != ledger.summary {
        ledger.summary = summary;
        ledger.dirty = true;
    }

    let mut saved = false;
    let mut save_error = None;
    if ledger.dirty {
        match workbook::save(ledger) {
            Ok(()) => {
                ledger.dirty = false;
                saved = true;
            }
            Err(e) => save_error = Some(format!("{e:#}")),
        }
    }
    let path = ledger.path.to_string_lossy().to_string();

    // The session is over either way; a failed write keeps the marks in
    // memory for a workbook.save retry.
    state.session = None;

    if let Some(message) = save_error {
        log::warn!("session close: workbook save failed, changes retained: {message}");
        return Err(HandlerErr {
            code: "workbook_save_failed",
            message,
            details: Some(json!({
                "retained": true,
                "sheet": session.sheet,
                "sessionKey": session.session_key
            })),
        });
    }
    if saved {
        state.push_event(event(
            "attendanceUpdated",
            json!({
                "workbookPath": path,
                "sheet": session.sheet.clone(),
                "sessionKey": session.session_key.clone()
            }),
        ));
    }
    Ok(json!({
        "sheet": session.sheet,
        "sessionKey": session.session_key,
        "present": close.present,
        "absent": close.absent,
        "markedAbsent": close.marked_absent,
        "saved": saved
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.start" => session_start(state, &req.params),
        "session.scan" => session_scan(state, &req.params),
        "session.scanFrame" => session_scan_frame(state, &req.params),
        "session.close" => session_close(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(error) => error.response(&req.id),
    })
}
