#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn mecalink() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_mecalink"));
    command.arg("--format").arg("json");
    command
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind should work");
    listener
        .local_addr()
        .expect("listener should have an address")
        .port()
}

/// Start `mecalink device` on `port` and wait until it is listening.
fn spawn_device(port: u16, extra: &[&str]) -> Child {
    let mut child = mecalink()
        .arg("--log-level")
        .arg("info")
        .arg("device")
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("device command should start");

    let stderr = child.stderr.take().expect("stderr should be piped");
    let (ready_tx, ready_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if line.contains("listening") {
                let _ = ready_tx.send(());
            }
        }
    });

    ready_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("device should start listening");
    child
}

fn wait_for_exit(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        if child.try_wait().expect("device status should be readable").is_some() {
            return child.wait_with_output().expect("device output should be readable");
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("device did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn endpoint(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

#[test]
fn device_reports_move_then_brakes_on_disconnect() {
    let port = free_port();
    let device = spawn_device(port, &["--count", "3"]);

    let output = mecalink()
        .arg("send")
        .arg(endpoint(port))
        .arg("move")
        .arg("100")
        .arg("0")
        .arg("-20")
        .output()
        .expect("send command should run");
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output = wait_for_exit(device, Duration::from_secs(5));
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("device output should be UTF-8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "unexpected device output: {stdout}");
    assert!(lines[0].contains(r#""event":"connected""#));
    assert!(lines[1].contains(r#""event":"moved""#));
    assert!(lines[1].contains(r#""forward":100"#));
    assert!(lines[1].contains(r#""rotation":-20"#));
    assert!(lines[2].contains(r#""event":"disconnected""#));
}

#[test]
fn control_is_echoed_back_with_wait() {
    let port = free_port();
    let mut device = spawn_device(port, &[]);

    let output = mecalink()
        .arg("send")
        .arg(endpoint(port))
        .arg("control")
        .arg("--primary")
        .arg("--mode")
        .arg("auto")
        .arg("--wait")
        .output()
        .expect("send command should run");

    let _ = device.kill();
    let _ = device.wait();

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("send output should be UTF-8");
    assert!(stdout.contains(r#""event":"received""#), "stdout: {stdout}");
    assert!(stdout.contains(r#""type":"control""#));
    assert!(stdout.contains(r#""primary":true"#));
    assert!(stdout.contains(r#""mode":"auto""#));
}

#[test]
fn probe_measures_round_trips() {
    let port = free_port();
    let mut device = spawn_device(port, &[]);

    let output = mecalink()
        .arg("probe")
        .arg(endpoint(port))
        .arg("--count")
        .arg("2")
        .output()
        .expect("probe command should run");

    let _ = device.kill();
    let _ = device.wait();

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("probe output should be JSON");
    assert_eq!(report["samples"].as_array().map(Vec::len), Some(2));
    assert!(report["avg_ms"].as_f64().is_some());
}

#[test]
fn probe_against_closed_port_is_a_transport_error() {
    let port = free_port();
    let output = mecalink()
        .arg("probe")
        .arg(endpoint(port))
        .arg("--timeout")
        .arg("2s")
        .output()
        .expect("probe command should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn silent_peer_times_out() {
    // Accepted by the kernel backlog, never answered.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should work");
    let port = listener.local_addr().expect("address").port();

    let output = mecalink()
        .arg("probe")
        .arg(endpoint(port))
        .arg("--timeout")
        .arg("500ms")
        .output()
        .expect("probe command should run");
    drop(listener);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn invalid_endpoint_is_a_usage_error() {
    let output = mecalink()
        .arg("send")
        .arg("robot:notaport")
        .arg("heartbeat")
        .output()
        .expect("send command should run");
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid endpoint"));
}

#[test]
fn version_prints_name() {
    let output = Command::new(env!("CARGO_BIN_EXE_mecalink"))
        .arg("version")
        .output()
        .expect("version command should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("mecalink "));
}
