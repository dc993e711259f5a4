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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendd-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], json!(true));

    // Everything but health needs a workspace.
    let early = request(&mut stdin, &mut reader, "2", "sidebar.get", json!({}));
    assert_eq!(error_code(&early), Some("no_workspace"));

    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(&mut stdin, &mut reader, "4", "setup.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "auth.signUp",
        json!({ "email": "smoke@example.com", "password": "Sm0ke-pass" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "auth.signIn",
        json!({ "email": "smoke@example.com", "password": "Sm0ke-pass" }),
    );
    let _ = request(&mut stdin, &mut reader, "7", "auth.session", json!({}));
    let _ = request(&mut stdin, &mut reader, "8", "session.role", json!({}));
    let _ = request(&mut stdin, &mut reader, "9", "nav.items", json!({ "path": "/" }));
    let _ = request(&mut stdin, &mut reader, "10", "sidebar.toggle", json!({}));
    let _ = request(&mut stdin, &mut reader, "11", "sidebar.set", json!({ "collapsed": false }));
    let _ = request(&mut stdin, &mut reader, "12", "layout.viewport", json!({ "width": 1024 }));
    let _ = request(&mut stdin, &mut reader, "13", "layout.get", json!({}));
    let _ = request(&mut stdin, &mut reader, "14", "profile.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "profile.edit",
        json!({ "firstName": "Sam", "lastName": "Smoke", "phone": "" }),
    );
    let _ = request(&mut stdin, &mut reader, "16", "profile.autoSaveStatus", json!({}));
    let _ = request(&mut stdin, &mut reader, "17", "profile.flush", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "profile.passwordStrength",
        json!({ "password": "abc" }),
    );
    let _ = request(&mut stdin, &mut reader, "19", "students.count", json!({}));
    let _ = request(&mut stdin, &mut reader, "20", "students.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "21", "dashboard.summary", json!({}));
    let forbidden = request(
        &mut stdin,
        &mut reader,
        "22",
        "accounts.setRole",
        json!({ "userId": "nobody", "role": "admin" }),
    );
    assert_eq!(error_code(&forbidden), Some("forbidden"));
    let _ = request(&mut stdin, &mut reader, "23", "auth.signOut", json!({}));

    let unknown = request_raw(&mut stdin, &mut reader, "24", "grades.open");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json reply");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse reply");
    assert_eq!(error_code(&value), Some("bad_json"));

    // The loop keeps serving after a malformed line.
    let again = request(&mut stdin, &mut reader, "25", "health", json!({}));
    assert_eq!(again["ok"], json!(true));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn request_raw(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
) -> serde_json::Value {
    writeln!(stdin, "{}", json!({ "id": id, "method": method, "params": {} }))
        .expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}
