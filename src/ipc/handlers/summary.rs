use crate::ipc::error::{err, event, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger;
use crate::workbook;
use serde_json::json;

fn handle_summary_rebuild(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_mut() else {
        return err(&req.id, "no_workbook", "open a workbook first", None);
    };

    let rows = ledger::rebuild_summary(&ledger.sheets);
    let changed = rows != ledger.summary;
    if changed {
        ledger.summary = rows;
        ledger.dirty = true;
    }

    let mut saved = false;
    if ledger.dirty {
        match workbook::save(ledger) {
            Ok(()) => {
                ledger.dirty = false;
                saved = true;
            }
            Err(e) => {
                log::warn!("summary rebuild: workbook save failed, changes retained: {e:#}");
                return err(
                    &req.id,
                    "workbook_save_failed",
                    format!("{e:#}"),
                    Some(json!({ "retained": true })),
                );
            }
        }
    }

    let rows_json: Vec<serde_json::Value> = ledger
        .summary
        .iter()
        .map(|r| {
            json!({
                "class": r.class,
                "grade": r.grade,
                "studentNo": r.student_no,
                "name": r.name,
                "meetings": r.meetings,
                "absences": r.absences
            })
        })
        .collect();
    let path = ledger.path.to_string_lossy().to_string();

    if saved {
        state.push_event(event("attendanceUpdated", json!({ "workbookPath": path })));
    }
    ok(
        &req.id,
        json!({ "rows": rows_json, "changed": changed, "saved": saved }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.rebuild" => Some(handle_summary_rebuild(state, req)),
        _ => None,
    }
}
