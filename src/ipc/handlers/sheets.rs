use crate::decode;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::ledger::{self, ClassSheet, GRADE_HEADER, NAME_HEADER, STUDENT_NO_HEADER, SUMMARY_SHEET};
use crate::workbook::SUMMARY_HEADERS;
use serde_json::json;

fn handle_sheets_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_ref() else {
        return ok(&req.id, json!({ "sheets": [] }));
    };

    let mut sheets: Vec<serde_json::Value> = ledger
        .sheets
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "scannable": ledger::is_scannable(&s.name),
                "studentCount": s.students.len(),
                "sessionCount": s.sessions.len()
            })
        })
        .collect();
    sheets.push(json!({
        "name": SUMMARY_SHEET,
        "scannable": false,
        "rowCount": ledger.summary.len()
    }));

    ok(&req.id, json!({ "sheets": sheets }))
}

fn class_sheet_table(sheet: &ClassSheet) -> serde_json::Value {
    let mut header: Vec<String> = vec![
        GRADE_HEADER.to_string(),
        STUDENT_NO_HEADER.to_string(),
        NAME_HEADER.to_string(),
    ];
    header.extend(sheet.sessions.iter().cloned());

    let rows: Vec<Vec<String>> = sheet
        .students
        .iter()
        .map(|s| {
            let mut row = vec![s.grade.clone(), s.student_no.clone(), s.name.clone()];
            row.extend(sheet.sessions.iter().map(|k| s.mark(k).to_cell()));
            row
        })
        .collect();

    json!({ "header": header, "rows": rows })
}

fn handle_sheet_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_ref() else {
        return err(&req.id, "no_workbook", "open a workbook first", None);
    };
    let name = match req.params.get("sheet").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing sheet", None),
    };

    if name == SUMMARY_SHEET {
        let header: Vec<String> = SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect();
        let rows: Vec<Vec<String>> = ledger
            .summary
            .iter()
            .map(|r| {
                vec![
                    r.class.clone(),
                    r.grade.clone(),
                    r.student_no.clone(),
                    r.name.clone(),
                    r.meetings.to_string(),
                    r.absences.to_string(),
                ]
            })
            .collect();
        return ok(
            &req.id,
            json!({ "sheet": name, "scannable": false, "header": header, "rows": rows }),
        );
    }

    let Some(sheet) = ledger.sheet(&name) else {
        return err(&req.id, "not_found", "sheet not found", None);
    };
    let mut table = class_sheet_table(sheet);
    table["sheet"] = json!(name);
    table["scannable"] = json!(true);
    ok(&req.id, table)
}

fn handle_sheet_qr_payloads(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(ledger) = state.ledger.as_ref() else {
        return err(&req.id, "no_workbook", "open a workbook first", None);
    };
    let name = match req.params.get("sheet").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing sheet", None),
    };
    if !ledger::is_scannable(&name) {
        return err(
            &req.id,
            "not_scannable",
            "the summary sheet has no enrollment codes",
            None,
        );
    }
    let Some(sheet) = ledger.sheet(&name) else {
        return err(&req.id, "not_found", "sheet not found", None);
    };

    let payloads: Vec<serde_json::Value> = sheet
        .students
        .iter()
        .map(|s| {
            json!({
                "studentNo": s.student_no,
                "name": s.name,
                "payload": decode::qr_payload(s)
            })
        })
        .collect();

    ok(&req.id, json!({ "sheet": name, "payloads": payloads }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sheets.list" => Some(handle_sheets_list(state, req)),
        "sheet.open" => Some(handle_sheet_open(state, req)),
        "sheet.qrPayloads" => Some(handle_sheet_qr_payloads(state, req)),
        _ => None,
    }
}
