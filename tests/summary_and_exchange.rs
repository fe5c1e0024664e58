use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn result_of(value: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "request failed: {}",
        value
    );
    value.get("result").expect("result")
}

fn consume_event(reader: &mut BufReader<ChildStdout>) {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read event line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse event json");
    assert_eq!(
        value.get("event").and_then(|v| v.as_str()),
        Some("attendanceUpdated")
    );
}

fn run_session(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id_prefix: &str,
    session_key: &str,
    scans: &[String],
) {
    let resp = request(
        stdin,
        reader,
        &format!("{id_prefix}-start"),
        "session.start",
        json!({ "sheet": "History 3", "sessionKey": session_key }),
    );
    let session_id = result_of(&resp)
        .get("sessionId")
        .and_then(|v| v.as_str())
        .expect("sessionId")
        .to_string();
    for (i, payload) in scans.iter().enumerate() {
        let resp = request(
            stdin,
            reader,
            &format!("{id_prefix}-scan-{i}"),
            "session.scan",
            json!({ "sessionId": session_id, "payload": payload }),
        );
        assert_eq!(
            result_of(&resp).get("status").and_then(|v| v.as_str()),
            Some("recorded"),
            "scan {} in {}",
            payload,
            session_key
        );
    }
    let resp = request(
        stdin,
        reader,
        &format!("{id_prefix}-close"),
        "session.close",
        json!({ "sessionId": session_id }),
    );
    assert_eq!(
        result_of(&resp).get("saved").and_then(|v| v.as_bool()),
        Some(true)
    );
    consume_event(reader);
}

#[test]
fn summary_counts_and_csv_export_line_up() {
    let dir = temp_dir("rollcall-summary");
    let workbook = dir.join("attendance.xlsx");
    let csv_out = dir.join("history.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workbook.scaffold",
        json!({
            "path": workbook.to_string_lossy(),
            "classes": [{
                "name": "History 3",
                "sessions": ["Meeting 1", "Meeting 2"],
                "students": [
                    { "grade": "3", "studentNo": "S301", "name": "Alice Garcia" },
                    { "grade": "3", "studentNo": "S302", "name": "Bob Ito" },
                    { "grade": "3", "studentNo": "S303", "name": "Reyes, Dana" }
                ]
            }]
        }),
    );
    result_of(&resp);

    run_session(
        &mut stdin,
        &mut reader,
        "m1",
        "Meeting 1",
        &["S301,Alice Garcia".to_string()],
    );
    // A name containing a comma has to travel as the JSON wire format.
    run_session(
        &mut stdin,
        &mut reader,
        "m2",
        "Meeting 2",
        &[
            "S302,Bob Ito".to_string(),
            json!({ "studentNo": "S303", "name": "Reyes, Dana" }).to_string(),
        ],
    );

    // Each session close already merged the summary; a rebuild changes
    // nothing and does not rewrite the file.
    let resp = request(&mut stdin, &mut reader, "2", "summary.rebuild", json!({}));
    let rebuilt = result_of(&resp);
    assert_eq!(rebuilt.get("changed").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(rebuilt.get("saved").and_then(|v| v.as_bool()), Some(false));
    let rows = rebuilt.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 3);
    let absences = |no: &str| {
        rows.iter()
            .find(|r| r.get("studentNo").and_then(|v| v.as_str()) == Some(no))
            .and_then(|r| r.get("absences"))
            .and_then(|v| v.as_u64())
            .expect("absences")
    };
    assert_eq!(absences("S301"), 1);
    assert_eq!(absences("S302"), 1);
    assert_eq!(absences("S303"), 1);
    assert!(rows
        .iter()
        .all(|r| r.get("meetings").and_then(|v| v.as_u64()) == Some(2)));

    // Reopen from disk and check the persisted summary sheet.
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "workbook.open",
        json!({ "path": workbook.to_string_lossy() }),
    );
    result_of(&resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "sheet.open",
        json!({ "sheet": "Attendance Summary" }),
    );
    let table = result_of(&resp);
    let rows = table.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 3);
    for r in rows {
        let cells: Vec<&str> = r
            .as_array()
            .expect("row")
            .iter()
            .map(|c| c.as_str().unwrap_or(""))
            .collect();
        assert_eq!(cells[0], "History 3");
        assert_eq!(cells[4], "2");
        assert_eq!(cells[5], "1");
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "exchange.exportSheetCsv",
        json!({
            "sheet": "History 3",
            "outPath": csv_out.to_string_lossy()
        }),
    );
    assert_eq!(
        result_of(&resp).get("rowCount").and_then(|v| v.as_u64()),
        Some(6)
    );

    let csv = std::fs::read_to_string(&csv_out).expect("read csv");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "class,student_no,name,session,mark");
    assert_eq!(lines.len(), 7);
    assert!(csv.contains("History 3,S301,Alice Garcia,Meeting 2,x"));
    // Comma-bearing names come out quoted.
    assert!(csv.contains("History 3,S303,\"Reyes, Dana\",Meeting 1,x"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(dir);
}
