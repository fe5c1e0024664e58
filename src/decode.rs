use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::ledger::StudentRow;

/// Identity decoded from one QR payload. Transient: it only ever drives a
/// mark update, it is never persisted itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    pub student_no: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Parse a QR payload in either wire format: a JSON object with `studentNo`
/// and `name`, or the older comma-delimited `student_no,name[,...]`.
pub fn parse_payload(raw: &str) -> anyhow::Result<ScanEvent> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(anyhow!("empty payload"));
    }

    let mut event = if t.starts_with('{') {
        serde_json::from_str::<ScanEvent>(t).context("payload is not a valid identity object")?
    } else {
        let mut fields = t.split(',');
        let student_no = fields.next().unwrap_or("").to_string();
        let name = fields.next().unwrap_or("").to_string();
        ScanEvent {
            grade: None,
            student_no,
            name,
            kana: None,
            email: None,
        }
    };

    event.student_no = event.student_no.trim().to_string();
    event.name = event.name.trim().to_string();
    event.grade = normalize_optional(event.grade);
    event.kana = normalize_optional(event.kana);
    event.email = normalize_optional(event.email);

    if event.student_no.is_empty() {
        return Err(anyhow!("payload has no student identifier"));
    }
    if event.name.is_empty() {
        return Err(anyhow!("payload has no student name"));
    }
    Ok(event)
}

fn normalize_optional(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Canonical payload for a student's enrollment QR code. The host renders
/// the actual image; parsing this payload resolves back to the same row.
pub fn qr_payload(row: &StudentRow) -> String {
    let event = ScanEvent {
        grade: normalize_optional(Some(row.grade.clone())),
        student_no: row.student_no.trim().to_string(),
        name: row.name.trim().to_string(),
        kana: None,
        email: None,
    };
    // ScanEvent serializes to a flat object of strings; this cannot fail.
    serde_json::to_string(&event).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parses_json_payload() {
        let ev = parse_payload(r#"{"grade":"2","studentNo":"S010","name":"Dana Reyes","email":"dana@example.edu"}"#)
            .expect("parse json payload");
        assert_eq!(ev.student_no, "S010");
        assert_eq!(ev.name, "Dana Reyes");
        assert_eq!(ev.grade.as_deref(), Some("2"));
        assert_eq!(ev.email.as_deref(), Some("dana@example.edu"));
        assert_eq!(ev.kana, None);
    }

    #[test]
    fn parses_comma_delimited_payload() {
        let ev = parse_payload("S011, Eli Moreau ,extra,ignored").expect("parse csv payload");
        assert_eq!(ev.student_no, "S011");
        assert_eq!(ev.name, "Eli Moreau");
        assert_eq!(ev.grade, None);
    }

    #[test]
    fn rejects_junk_payloads() {
        assert!(parse_payload("").is_err());
        assert!(parse_payload("   ").is_err());
        assert!(parse_payload("just-one-field").is_err());
        assert!(parse_payload("{not json").is_err());
        assert!(parse_payload(r#"{"studentNo":"S012","name":"   "}"#).is_err());
        assert!(parse_payload(",missing-identifier").is_err());
    }

    #[test]
    fn payload_round_trips_through_parse() {
        let row = StudentRow {
            grade: "3".to_string(),
            student_no: "S013".to_string(),
            name: "Fay Okafor".to_string(),
            marks: BTreeMap::new(),
        };
        let payload = qr_payload(&row);
        let ev = parse_payload(&payload).expect("round trip");
        assert_eq!(ev.student_no, row.student_no);
        assert_eq!(ev.name, row.name);
        assert_eq!(ev.grade.as_deref(), Some("3"));
    }

    #[test]
    fn blank_grade_is_omitted_from_payload() {
        let row = StudentRow {
            grade: "  ".to_string(),
            student_no: "S014".to_string(),
            name: "Gil Haas".to_string(),
            marks: BTreeMap::new(),
        };
        let payload = qr_payload(&row);
        assert!(!payload.contains("grade"));
    }
}
