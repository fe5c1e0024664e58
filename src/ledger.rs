use std::collections::BTreeMap;
use std::path::PathBuf;

pub const GRADE_HEADER: &str = "Grade";
pub const STUDENT_NO_HEADER: &str = "Student No";
pub const NAME_HEADER: &str = "Name";
pub const SUMMARY_SHEET: &str = "Attendance Summary";

// Cell convention carried over from the workbook format: an absent mark is
// a literal "x", a present mark is the scan timestamp, unset is empty.
pub const ABSENT_CODE: &str = "x";

#[derive(Debug, Clone, PartialEq)]
pub enum Mark {
    Unset,
    Present { time: String },
    Absent,
}

impl Mark {
    pub fn from_cell(raw: &str) -> Mark {
        let t = raw.trim();
        if t.is_empty() {
            Mark::Unset
        } else if t.eq_ignore_ascii_case(ABSENT_CODE) {
            Mark::Absent
        } else {
            Mark::Present {
                time: t.to_string(),
            }
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            Mark::Unset => String::new(),
            Mark::Absent => ABSENT_CODE.to_string(),
            Mark::Present { time } => time.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub grade: String,
    pub student_no: String,
    pub name: String,
    // Keyed by session key; a missing entry means unset.
    pub marks: BTreeMap<String, Mark>,
}

impl StudentRow {
    pub fn mark(&self, session_key: &str) -> Mark {
        self.marks
            .get(session_key)
            .cloned()
            .unwrap_or(Mark::Unset)
    }
}

#[derive(Debug, Clone)]
pub struct ClassSheet {
    pub name: String,
    pub sessions: Vec<String>,
    pub students: Vec<StudentRow>,
}

impl ClassSheet {
    pub fn find_student(&self, student_no: &str, name: &str) -> Option<usize> {
        let no = student_no.trim();
        let name = name.trim();
        self.students
            .iter()
            .position(|s| s.student_no.trim() == no && s.name.trim() == name)
    }

    pub fn ensure_session(&mut self, session_key: &str) -> bool {
        if self.sessions.iter().any(|k| k == session_key) {
            return false;
        }
        self.sessions.push(session_key.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub class: String,
    pub grade: String,
    pub student_no: String,
    pub name: String,
    pub meetings: usize,
    pub absences: usize,
}

#[derive(Debug)]
pub struct Ledger {
    pub path: PathBuf,
    pub sheets: Vec<ClassSheet>,
    pub summary: Vec<SummaryRow>,
    pub dirty: bool,
}

impl Ledger {
    pub fn sheet(&self, name: &str) -> Option<&ClassSheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut ClassSheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }
}

pub fn is_scannable(sheet_name: &str) -> bool {
    sheet_name != SUMMARY_SHEET
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Recorded { time: String },
    Duplicate { time: String },
    NotEnrolled,
}

/// Reconcile one decoded scan against a class sheet. Exact trimmed
/// (student_no, name) match; first valid scan wins, repeats are no-ops,
/// unknown students never create a row.
pub fn record_scan(
    sheet: &mut ClassSheet,
    session_key: &str,
    student_no: &str,
    name: &str,
    time: &str,
) -> ScanOutcome {
    let Some(idx) = sheet.find_student(student_no, name) else {
        return ScanOutcome::NotEnrolled;
    };
    let row = &mut sheet.students[idx];
    if let Some(Mark::Present { time }) = row.marks.get(session_key) {
        return ScanOutcome::Duplicate { time: time.clone() };
    }
    row.marks.insert(
        session_key.to_string(),
        Mark::Present {
            time: time.to_string(),
        },
    );
    ScanOutcome::Recorded {
        time: time.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloseSummary {
    pub marked_absent: usize,
    pub present: usize,
    pub absent: usize,
}

/// Close the session column: every remaining unset mark becomes absent.
/// Closing an already-closed session transitions nothing.
pub fn close_session(sheet: &mut ClassSheet, session_key: &str) -> CloseSummary {
    let mut marked_absent = 0;
    let mut present = 0;
    let mut absent = 0;
    for row in &mut sheet.students {
        match row.marks.get(session_key) {
            Some(Mark::Present { .. }) => present += 1,
            Some(Mark::Absent) => absent += 1,
            Some(Mark::Unset) | None => {
                row.marks.insert(session_key.to_string(), Mark::Absent);
                marked_absent += 1;
                absent += 1;
            }
        }
    }
    CloseSummary {
        marked_absent,
        present,
        absent,
    }
}

/// Recompute the aggregate rows from the class sheets. Pure function of the
/// sheet state, so merging twice equals merging once.
pub fn rebuild_summary(sheets: &[ClassSheet]) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    for sheet in sheets {
        for s in &sheet.students {
            let absences = sheet
                .sessions
                .iter()
                .filter(|k| matches!(s.marks.get(k.as_str()), Some(Mark::Absent)))
                .count();
            rows.push(SummaryRow {
                class: sheet.name.clone(),
                grade: s.grade.clone(),
                student_no: s.student_no.clone(),
                name: s.name.clone(),
                meetings: sheet.sessions.len(),
                absences,
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sheet() -> ClassSheet {
        let student = |grade: &str, no: &str, name: &str| StudentRow {
            grade: grade.to_string(),
            student_no: no.to_string(),
            name: name.to_string(),
            marks: BTreeMap::new(),
        };
        ClassSheet {
            name: "Biology 1".to_string(),
            sessions: vec!["Meeting 1".to_string(), "Meeting 2".to_string()],
            students: vec![
                student("1", "S001", "Alice Garcia"),
                student("1", "S002", "Bob Ito"),
                student("2", "S003", "Carol Ng"),
            ],
        }
    }

    #[test]
    fn first_scan_records_then_duplicates() {
        let mut sheet = sample_sheet();
        let out = record_scan(&mut sheet, "Meeting 1", "S001", "Alice Garcia", "09:00:01");
        assert_eq!(
            out,
            ScanOutcome::Recorded {
                time: "09:00:01".to_string()
            }
        );
        // Repeat keeps the original timestamp and does not mutate.
        let out = record_scan(&mut sheet, "Meeting 1", "S001", "Alice Garcia", "09:00:09");
        assert_eq!(
            out,
            ScanOutcome::Duplicate {
                time: "09:00:01".to_string()
            }
        );
        assert_eq!(
            sheet.students[0].mark("Meeting 1"),
            Mark::Present {
                time: "09:00:01".to_string()
            }
        );
    }

    #[test]
    fn scan_matches_on_trimmed_identifier_and_name() {
        let mut sheet = sample_sheet();
        sheet.students[1].student_no = " S002 ".to_string();
        sheet.students[1].name = " Bob Ito ".to_string();
        let out = record_scan(&mut sheet, "Meeting 1", "S002", "Bob Ito", "09:01:00");
        assert!(matches!(out, ScanOutcome::Recorded { .. }));
    }

    #[test]
    fn unknown_student_never_creates_a_row() {
        let mut sheet = sample_sheet();
        let before = sheet.students.len();
        let out = record_scan(&mut sheet, "Meeting 1", "S999", "Nobody", "09:00:00");
        assert_eq!(out, ScanOutcome::NotEnrolled);
        assert_eq!(sheet.students.len(), before);
        assert!(sheet.students.iter().all(|s| s.marks.is_empty()));
    }

    #[test]
    fn name_mismatch_on_known_identifier_is_not_enrolled() {
        let mut sheet = sample_sheet();
        let out = record_scan(&mut sheet, "Meeting 1", "S001", "Alice Wrong", "09:00:00");
        assert_eq!(out, ScanOutcome::NotEnrolled);
    }

    #[test]
    fn close_marks_unscanned_absent() {
        let mut sheet = sample_sheet();
        record_scan(&mut sheet, "Meeting 1", "S001", "Alice Garcia", "09:00:01");
        let summary = close_session(&mut sheet, "Meeting 1");
        assert_eq!(summary.marked_absent, 2);
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 2);
        assert_eq!(sheet.students[1].mark("Meeting 1"), Mark::Absent);
        assert_eq!(sheet.students[2].mark("Meeting 1"), Mark::Absent);
    }

    #[test]
    fn reclosing_a_closed_session_transitions_nothing() {
        let mut sheet = sample_sheet();
        record_scan(&mut sheet, "Meeting 1", "S001", "Alice Garcia", "09:00:01");
        close_session(&mut sheet, "Meeting 1");
        let before = sheet.students.clone();
        let summary = close_session(&mut sheet, "Meeting 1");
        assert_eq!(summary.marked_absent, 0);
        for (a, b) in before.iter().zip(sheet.students.iter()) {
            assert_eq!(a.marks, b.marks);
        }
    }

    #[test]
    fn scan_after_close_upgrades_absent_to_present() {
        let mut sheet = sample_sheet();
        close_session(&mut sheet, "Meeting 1");
        let out = record_scan(&mut sheet, "Meeting 1", "S002", "Bob Ito", "10:12:00");
        assert!(matches!(out, ScanOutcome::Recorded { .. }));
        assert!(matches!(
            sheet.students[1].mark("Meeting 1"),
            Mark::Present { .. }
        ));
    }

    #[test]
    fn ensure_session_appends_once() {
        let mut sheet = sample_sheet();
        assert!(sheet.ensure_session("Meeting 3"));
        assert!(!sheet.ensure_session("Meeting 3"));
        assert_eq!(sheet.sessions.len(), 3);
    }

    #[test]
    fn summary_counts_absences_per_student() {
        let mut sheet = sample_sheet();
        record_scan(&mut sheet, "Meeting 1", "S001", "Alice Garcia", "09:00:01");
        close_session(&mut sheet, "Meeting 1");
        record_scan(&mut sheet, "Meeting 2", "S002", "Bob Ito", "09:00:02");
        close_session(&mut sheet, "Meeting 2");

        let rows = rebuild_summary(&[sheet]);
        assert_eq!(rows.len(), 3);
        let by_no = |no: &str| rows.iter().find(|r| r.student_no == no).unwrap();
        assert_eq!(by_no("S001").absences, 1);
        assert_eq!(by_no("S002").absences, 1);
        assert_eq!(by_no("S003").absences, 2);
        assert!(rows.iter().all(|r| r.meetings == 2));
    }

    #[test]
    fn summary_rebuild_is_idempotent() {
        let mut sheet = sample_sheet();
        close_session(&mut sheet, "Meeting 1");
        let sheets = vec![sheet];
        let once = rebuild_summary(&sheets);
        let twice = rebuild_summary(&sheets);
        assert_eq!(once, twice);
    }

    #[test]
    fn mark_cell_round_trip() {
        assert_eq!(Mark::from_cell(""), Mark::Unset);
        assert_eq!(Mark::from_cell("  "), Mark::Unset);
        assert_eq!(Mark::from_cell("x"), Mark::Absent);
        assert_eq!(Mark::from_cell("X"), Mark::Absent);
        let present = Mark::from_cell("2026/04/01 09:00:12");
        assert_eq!(present.to_cell(), "2026/04/01 09:00:12");
        assert_eq!(Mark::Absent.to_cell(), "x");
        assert_eq!(Mark::Unset.to_cell(), "");
    }
}
