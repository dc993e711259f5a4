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
    let exe = env!("CARGO_BIN_EXE_attendd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

fn bucket<'a>(summary: &'a serde_json::Value, name: &str) -> &'a serde_json::Value {
    summary["series"]
        .as_array()
        .expect("series array")
        .iter()
        .find(|b| b["name"] == json!(name))
        .unwrap_or_else(|| panic!("no bucket {}", name))
}

#[test]
fn dashboard_summary_counts_attendance_per_period() {
    let workspace = temp_dir("attendd-dashboard");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let anonymous = request(&mut stdin, &mut reader, "2", "students.count", json!({}));
    assert_eq!(error_code(&anonymous), Some("not_authenticated"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signUp",
        json!({
            "email": "instructor@example.com",
            "password": "Instruct0r",
            "firstName": "Maria",
            "lastName": "Santos",
            "role": "instructor"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.signIn",
        json!({ "email": "instructor@example.com", "password": "Instruct0r" }),
    );

    let blank = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "firstName": "  ", "lastName": "Cruz" }),
    );
    assert_eq!(error_code(&blank), Some("bad_params"));

    let s1 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "firstName": "Ana", "lastName": "Cruz", "studentNo": "2024-001" }),
    );
    let s1 = s1["studentId"].as_str().expect("student id").to_string();
    let s2 = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({ "firstName": "Ben", "lastName": "Lim" }),
    );
    let s2 = s2["studentId"].as_str().expect("student id").to_string();

    let listed = request_ok(&mut stdin, &mut reader, "8", "students.list", json!({}));
    let names: Vec<_> = listed["students"]
        .as_array()
        .expect("students")
        .iter()
        .map(|s| s["firstName"].clone())
        .collect();
    assert_eq!(names, vec![json!("Ana"), json!("Ben")]);
    let count = request_ok(&mut stdin, &mut reader, "9", "students.count", json!({}));
    assert_eq!(count["count"], json!(2));

    for (i, (student, date, status)) in [
        (&s1, "2024-03-15", "present"),
        (&s2, "2024-03-15", "absent"),
        (&s1, "2024-03-14", "late"),
        (&s2, "2024-03-14", "excused"),
        (&s1, "2024-03-01", "present"),
    ]
    .into_iter()
    .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("rec-{}", i),
            "attendance.record",
            json!({ "studentId": student, "date": date, "status": status }),
        );
    }

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "10",
        "attendance.record",
        json!({ "studentId": s1, "date": "15/03/2024", "status": "present" }),
    );
    assert_eq!(error_code(&bad_date), Some("bad_params"));
    let bad_status = request(
        &mut stdin,
        &mut reader,
        "11",
        "attendance.record",
        json!({ "studentId": s1, "date": "2024-03-15", "status": "tardy" }),
    );
    assert_eq!(error_code(&bad_status), Some("bad_params"));

    let week = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "dashboard.summary",
        json!({ "period": "week", "today": "2024-03-15", "hour": 9 }),
    );
    assert_eq!(week["title"], json!("Instructor Dashboard"));
    assert_eq!(week["greeting"], json!("Good morning"));
    assert_eq!(week["displayName"], json!("Maria Santos"));
    assert_eq!(week["totalStudents"], json!(2));
    assert_eq!(week["series"].as_array().map(|a| a.len()), Some(7));
    let fri = bucket(&week, "Fri");
    assert_eq!(fri["present"], json!(1));
    assert_eq!(fri["absent"], json!(1));
    assert_eq!(fri["presentPercentage"], json!(50));
    assert_eq!(fri["start"], json!("2024-03-15"));
    assert_eq!(fri["end"], json!("2024-03-15"));
    // Late counts as present; excused is left out.
    let thu = bucket(&week, "Thu");
    assert_eq!(thu["present"], json!(1));
    assert_eq!(thu["absent"], json!(0));
    assert_eq!(thu["presentPercentage"], json!(100));

    let year = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "dashboard.summary",
        json!({ "period": "year", "today": "2024-03-15", "hour": 19 }),
    );
    assert_eq!(year["greeting"], json!("Good evening"));
    assert_eq!(year["series"].as_array().map(|a| a.len()), Some(12));
    let mar = bucket(&year, "Mar");
    assert_eq!(mar["present"], json!(3));
    assert_eq!(mar["absent"], json!(1));
    assert_eq!(mar["presentPercentage"], json!(75));
    assert_eq!(mar["absentPercentage"], json!(25));

    // Recording the same student and day again replaces the earlier status.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.record",
        json!({ "studentId": s2, "date": "2024-03-15", "status": "present" }),
    );
    let week = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "dashboard.summary",
        json!({ "today": "2024-03-15", "hour": 14 }),
    );
    assert_eq!(week["greeting"], json!("Good afternoon"));
    let fri = bucket(&week, "Fri");
    assert_eq!(fri["present"], json!(2));
    assert_eq!(fri["absent"], json!(0));

    let bad_period = request(
        &mut stdin,
        &mut reader,
        "16",
        "dashboard.summary",
        json!({ "period": "decade" }),
    );
    assert_eq!(error_code(&bad_period), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn dashboard_rejects_out_of_range_dates_and_keeps_serving() {
    let workspace = temp_dir("attendd-dashboard-range");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.signUp",
        json!({ "email": "range@example.com", "password": "Range1Pass" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.signIn",
        json!({ "email": "range@example.com", "password": "Range1Pass" }),
    );

    for (i, (period, today)) in [
        ("month", "-262143-01-02"),
        ("year", "0000-06-01"),
        ("week", "+10000-01-01"),
    ]
    .into_iter()
    .enumerate()
    {
        let resp = request(
            &mut stdin,
            &mut reader,
            &format!("far-{}", i),
            "dashboard.summary",
            json!({ "period": period, "today": today }),
        );
        assert_eq!(error_code(&resp), Some("bad_params"), "today {}", today);
    }

    let earliest = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "dashboard.summary",
        json!({ "period": "year", "today": "0001-12-31", "hour": 8 }),
    );
    assert_eq!(earliest["series"].as_array().map(|a| a.len()), Some(12));

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert!(health["version"].is_string());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
