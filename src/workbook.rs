use anyhow::{anyhow, Context};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use crate::ledger::{
    self, ClassSheet, Ledger, Mark, StudentRow, SummaryRow, GRADE_HEADER, NAME_HEADER,
    STUDENT_NO_HEADER, SUMMARY_SHEET,
};

// Class sheets lead with three identity columns; everything after them is a
// session column keyed by its header text.
const IDENTITY_COLUMNS: u32 = 3;

pub const SUMMARY_HEADERS: [&str; 6] = [
    "Class",
    GRADE_HEADER,
    STUDENT_NO_HEADER,
    NAME_HEADER,
    "Meetings",
    "Absences",
];

/// Load the whole workbook into memory. Every sheet except the summary sheet
/// parses as a class sheet.
pub fn load(path: &Path) -> anyhow::Result<Ledger> {
    let book = umya_spreadsheet::reader::xlsx::read(path)
        .with_context(|| format!("failed to read workbook {}", path.display()))?;

    let mut sheets = Vec::new();
    let mut summary = Vec::new();
    for ws in book.get_sheet_collection() {
        if ws.get_name() == SUMMARY_SHEET {
            summary = read_summary(ws);
        } else {
            sheets.push(read_class_sheet(ws));
        }
    }

    Ok(Ledger {
        path: path.to_path_buf(),
        sheets,
        summary,
        dirty: false,
    })
}

/// Write the ledger back as a whole-workbook replace. Callers gate this on
/// the dirty flag; re-saving identical state never reaches the file.
pub fn save(ledger: &Ledger) -> anyhow::Result<()> {
    let mut book = umya_spreadsheet::new_file();
    book.remove_sheet_by_name("Sheet1")
        .map_err(|e| anyhow!("failed to drop placeholder sheet: {e}"))?;

    for sheet in &ledger.sheets {
        let ws = book
            .new_sheet(sheet.name.as_str())
            .map_err(|e| anyhow!("failed to add sheet {}: {e}", sheet.name))?;
        write_class_sheet(ws, sheet);
    }
    let ws = book
        .new_sheet(SUMMARY_SHEET)
        .map_err(|e| anyhow!("failed to add sheet {SUMMARY_SHEET}: {e}"))?;
    write_summary(ws, &ledger.summary);

    umya_spreadsheet::writer::xlsx::write(&book, &ledger.path)
        .with_context(|| format!("failed to write workbook {}", ledger.path.display()))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ScaffoldStudent {
    pub grade: String,
    pub student_no: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct ScaffoldClass {
    pub name: String,
    pub sessions: Vec<String>,
    pub students: Vec<ScaffoldStudent>,
}

/// Create a fresh workbook: one sheet per class plus an empty summary sheet,
/// written to disk and returned as the open ledger.
pub fn scaffold(path: &Path, classes: &[ScaffoldClass]) -> anyhow::Result<Ledger> {
    let mut names = HashSet::new();
    for class in classes {
        let name = class.name.trim();
        if name.is_empty() {
            return Err(anyhow!("class name must not be empty"));
        }
        if name == SUMMARY_SHEET {
            return Err(anyhow!("class name {SUMMARY_SHEET:?} is reserved"));
        }
        if !names.insert(name.to_string()) {
            return Err(anyhow!("duplicate class name {name:?}"));
        }
        let mut keys = HashSet::new();
        for s in &class.students {
            let key = (s.student_no.trim().to_string(), s.name.trim().to_string());
            if key.0.is_empty() || key.1.is_empty() {
                return Err(anyhow!(
                    "class {name:?} has a student without identifier or name"
                ));
            }
            if !keys.insert(key.clone()) {
                return Err(anyhow!(
                    "class {name:?} enrolls {} {} twice",
                    key.0,
                    key.1
                ));
            }
        }
    }

    let sheets: Vec<ClassSheet> = classes
        .iter()
        .map(|class| ClassSheet {
            name: class.name.trim().to_string(),
            sessions: class
                .sessions
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            students: class
                .students
                .iter()
                .map(|s| StudentRow {
                    grade: s.grade.trim().to_string(),
                    student_no: s.student_no.trim().to_string(),
                    name: s.name.trim().to_string(),
                    marks: BTreeMap::new(),
                })
                .collect(),
        })
        .collect();

    let summary = ledger::rebuild_summary(&sheets);
    let ledger = Ledger {
        path: path.to_path_buf(),
        sheets,
        summary,
        dirty: false,
    };
    save(&ledger)?;
    Ok(ledger)
}

fn read_class_sheet(ws: &umya_spreadsheet::Worksheet) -> ClassSheet {
    let (max_col, max_row) = ws.get_highest_column_and_row();

    // (column, session key) pairs from the header row.
    let mut session_cols: Vec<(u32, String)> = Vec::new();
    for col in (IDENTITY_COLUMNS + 1)..=max_col {
        let header = ws.get_formatted_value((col, 1)).trim().to_string();
        if !header.is_empty() {
            session_cols.push((col, header));
        }
    }

    let mut students = Vec::new();
    for row in 2..=max_row {
        let grade = ws.get_formatted_value((1, row)).trim().to_string();
        let student_no = ws.get_formatted_value((2, row)).trim().to_string();
        let name = ws.get_formatted_value((3, row)).trim().to_string();
        if student_no.is_empty() && name.is_empty() {
            continue;
        }
        let mut marks = BTreeMap::new();
        for (col, key) in &session_cols {
            let mark = Mark::from_cell(&ws.get_formatted_value((*col, row)));
            if mark != Mark::Unset {
                marks.insert(key.clone(), mark);
            }
        }
        students.push(StudentRow {
            grade,
            student_no,
            name,
            marks,
        });
    }

    ClassSheet {
        name: ws.get_name().to_string(),
        sessions: session_cols.into_iter().map(|(_, k)| k).collect(),
        students,
    }
}

fn write_class_sheet(ws: &mut umya_spreadsheet::Worksheet, sheet: &ClassSheet) {
    ws.get_cell_mut((1u32, 1u32)).set_value_string(GRADE_HEADER);
    ws.get_cell_mut((2u32, 1u32))
        .set_value_string(STUDENT_NO_HEADER);
    ws.get_cell_mut((3u32, 1u32)).set_value_string(NAME_HEADER);
    for (i, key) in sheet.sessions.iter().enumerate() {
        ws.get_cell_mut((IDENTITY_COLUMNS + 1 + i as u32, 1u32))
            .set_value_string(key.as_str());
    }

    for (i, s) in sheet.students.iter().enumerate() {
        let row = i as u32 + 2;
        ws.get_cell_mut((1u32, row)).set_value_string(s.grade.as_str());
        ws.get_cell_mut((2u32, row))
            .set_value_string(s.student_no.as_str());
        ws.get_cell_mut((3u32, row)).set_value_string(s.name.as_str());
        for (j, key) in sheet.sessions.iter().enumerate() {
            let cell = s.mark(key).to_cell();
            if !cell.is_empty() {
                ws.get_cell_mut((IDENTITY_COLUMNS + 1 + j as u32, row))
                    .set_value_string(cell);
            }
        }
    }
}

fn read_summary(ws: &umya_spreadsheet::Worksheet) -> Vec<SummaryRow> {
    let (_, max_row) = ws.get_highest_column_and_row();
    let mut rows = Vec::new();
    for row in 2..=max_row {
        let class = ws.get_formatted_value((1, row)).trim().to_string();
        let student_no = ws.get_formatted_value((3, row)).trim().to_string();
        let name = ws.get_formatted_value((4, row)).trim().to_string();
        if class.is_empty() && student_no.is_empty() {
            continue;
        }
        rows.push(SummaryRow {
            class,
            grade: ws.get_formatted_value((2, row)).trim().to_string(),
            student_no,
            name,
            meetings: parse_count(&ws.get_formatted_value((5, row))),
            absences: parse_count(&ws.get_formatted_value((6, row))),
        });
    }
    rows
}

fn write_summary(ws: &mut umya_spreadsheet::Worksheet, rows: &[SummaryRow]) {
    for (i, header) in SUMMARY_HEADERS.iter().enumerate() {
        ws.get_cell_mut((i as u32 + 1, 1u32)).set_value_string(*header);
    }
    for (i, r) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        ws.get_cell_mut((1u32, row)).set_value_string(r.class.as_str());
        ws.get_cell_mut((2u32, row)).set_value_string(r.grade.as_str());
        ws.get_cell_mut((3u32, row))
            .set_value_string(r.student_no.as_str());
        ws.get_cell_mut((4u32, row)).set_value_string(r.name.as_str());
        ws.get_cell_mut((5u32, row))
            .set_value_number(r.meetings as f64);
        ws.get_cell_mut((6u32, row))
            .set_value_number(r.absences as f64);
    }
}

fn parse_count(raw: &str) -> usize {
    raw.trim().parse::<f64>().unwrap_or(0.0) as usize
}
