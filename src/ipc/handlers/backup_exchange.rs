use crate::backup;
use crate::ipc::error::{err, event, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::workbook;
use serde_json::json;
use std::path::PathBuf;

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

fn get_required_path(params: &serde_json::Value, key: &str) -> Result<PathBuf, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_backup_export_workbook_bundle(
    state: &mut AppState,
    req: &Request,
) -> serde_json::Value {
    let source = match req.params.get("workbookPath").and_then(|v| v.as_str()) {
        Some(p) => PathBuf::from(p),
        None => match state.workbook.as_ref() {
            Some(p) => p.clone(),
            None => return err(&req.id, "no_workbook", "open a workbook first", None),
        },
    };
    let out = match get_required_path(&req.params, "outPath") {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    match backup::export_workbook_bundle(&source, &out) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "sha256": summary.sha256,
                "outPath": out.to_string_lossy()
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:#}"), None),
    }
}

fn handle_backup_import_workbook_bundle(
    state: &mut AppState,
    req: &Request,
) -> serde_json::Value {
    let in_path = match get_required_path(&req.params, "inPath") {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    let workbook_path = match get_required_path(&req.params, "workbookPath") {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };

    let summary = match backup::import_workbook_bundle(&in_path, &workbook_path) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "backup_import_failed", format!("{e:#}"), None),
    };

    // If the restored file is the open workbook, the in-memory ledger is
    // stale; reload it and tell the host to refresh.
    let mut reloaded = false;
    if state.workbook.as_deref() == Some(workbook_path.as_path()) {
        match workbook::load(&workbook_path) {
            Ok(l) => {
                state.ledger = Some(l);
                state.session = None;
                reloaded = true;
                state.push_event(event(
                    "attendanceUpdated",
                    json!({ "workbookPath": workbook_path.to_string_lossy() }),
                ));
            }
            Err(e) => {
                state.ledger = None;
                state.session = None;
                return err(
                    &req.id,
                    "workbook_reload_failed",
                    format!("restored but could not reload: {e:#}"),
                    None,
                );
            }
        }
    }

    ok(
        &req.id,
        json!({
            "bundleFormatDetected": summary.bundle_format_detected,
            "workbookPath": workbook_path.to_string_lossy(),
            "reloaded": reloaded
        }),
    )
}

fn handle_exchange_export_sheet_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_ref() else {
        return err(&req.id, "no_workbook", "open a workbook first", None);
    };
    let name = match req.params.get("sheet").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing sheet", None),
    };
    let out = match get_required_path(&req.params, "outPath") {
        Ok(p) => p,
        Err(e) => return e.response(&req.id),
    };
    if !ledger::is_scannable(&name) {
        return err(
            &req.id,
            "not_scannable",
            "export the summary sheet from the workbook itself",
            None,
        );
    }
    let Some(sheet) = ledger.sheet(&name) else {
        return err(&req.id, "not_found", "sheet not found", None);
    };

    let mut csv = String::from("class,student_no,name,session,mark\n");
    let mut row_count = 0usize;
    for s in &sheet.students {
        for key in &sheet.sessions {
            csv.push_str(&format!(
                "{},{},{},{},{}\n",
                csv_quote(&sheet.name),
                csv_quote(&s.student_no),
                csv_quote(&s.name),
                csv_quote(key),
                csv_quote(&s.mark(key).to_cell())
            ));
            row_count += 1;
        }
    }

    if let Err(e) = std::fs::write(&out, csv) {
        return err(&req.id, "csv_write_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "outPath": out.to_string_lossy(), "rowCount": row_count }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkbookBundle" => Some(handle_backup_export_workbook_bundle(state, req)),
        "backup.importWorkbookBundle" => Some(handle_backup_import_workbook_bundle(state, req)),
        "exchange.exportSheetCsv" => Some(handle_exchange_export_sheet_csv(state, req)),
        _ => None,
    }
}
