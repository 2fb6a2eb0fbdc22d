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

fn read_response(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_response(reader);
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

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("rollcall-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["result"]["openSessions"], 0);
    assert!(health["result"]["workspacePath"].is_null());

    // Workspace-bound methods refuse to run before a workspace is chosen.
    let early = request(
        &mut stdin,
        &mut reader,
        "1b",
        "checkin.open",
        json!({ "courseId": "x", "date": "2024-03-04" }),
    );
    assert_eq!(early["error"]["code"], "no_workspace");

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert!(workspace.join("rollcall.sqlite3").is_file());

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "name": "Smoke Course", "modules": ["only"] }),
    );
    let course_id = created
        .get("result")
        .and_then(|v| v.get("courseId"))
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let listed = request(&mut stdin, &mut reader, "4", "courses.list", json!({}));
    let courses = listed["result"]["courses"].as_array().cloned().unwrap_or_default();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["moduleCount"], 1);
    assert_eq!(courses[0]["studentCount"], 0);

    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.enroll",
        json!({
            "courseId": course_id,
            "name": "Smoke Student",
            "enrollmentDate": "2024-01-01"
        }),
    );
    let opened = request(
        &mut stdin,
        &mut reader,
        "6",
        "checkin.open",
        json!({ "courseId": course_id, "date": "2024-03-04" }),
    );
    let handle = opened["result"]["sessionHandle"]
        .as_str()
        .expect("sessionHandle")
        .to_string();
    assert!(opened["result"]["students"][0]["age"].is_null());

    for (i, method) in [
        "checkin.get",
        "checkin.markAllPresent",
        "checkin.resetAll",
        "checkin.validate",
    ]
    .iter()
    .enumerate()
    {
        let _ = request(
            &mut stdin,
            &mut reader,
            &format!("7-{}", i),
            method,
            json!({ "sessionHandle": handle }),
        );
    }
    let health = request(&mut stdin, &mut reader, "8", "health", json!({}));
    assert_eq!(health["result"]["openSessions"], 1);

    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "attendance.history",
        json!({ "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "checkin.close",
        json!({ "sessionHandle": handle }),
    );

    let unknown = {
        writeln!(
            stdin,
            "{}",
            json!({ "id": "11", "method": "reports.dashboard", "params": {} })
        )
        .expect("write request");
        stdin.flush().expect("flush request");
        read_response(&mut reader)
    };
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "this is not json").expect("write garbage");
    stdin.flush().expect("flush garbage");
    let bad = read_response(&mut reader);
    assert_eq!(bad["ok"], false);
    assert_eq!(bad["error"]["code"], "bad_json");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn startup_workspace_flag_preselects_database() {
    let workspace = temp_dir("rollcall-startup-ws");
    let exe = env!("CARGO_BIN_EXE_rollcalld");
    let mut child = Command::new(exe)
        .arg("--workspace")
        .arg(&workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollcalld");
    let mut stdin = child.stdin.take().expect("child stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("child stdout"));

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health["result"]["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
