//! End-to-end `br` invocations against a live control socket.

use std::process::ExitCode;

use bladerunner_control::WireFormatKind;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::support::{FakeSupervisor, br, utf8};

#[fixture]
fn state_dir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[rstest]
#[case::line(WireFormatKind::Line)]
#[case::json(WireFormatKind::Json)]
fn ping_and_status_reach_the_supervisor(state_dir: TempDir, #[case] wire: WireFormatKind) {
    let dir = utf8(&state_dir);
    let _supervisor = FakeSupervisor::start(dir, wire, 4242);

    let ping = br(dir, &["--wire", wire.as_str(), "ping"]);
    assert_eq!(ping.exit, ExitCode::SUCCESS, "{}", ping.stderr);
    assert_eq!(ping.stdout, "pong\n");

    let status = br(dir, &["--wire", wire.as_str(), "status"]);
    assert_eq!(status.stdout, "running\n");
}

#[rstest]
fn absent_supervisor_reads_as_not_running(state_dir: TempDir) {
    let dir = utf8(&state_dir);

    let status = br(dir, &["status"]);
    assert_eq!(status.exit, ExitCode::SUCCESS);
    assert_eq!(status.stdout, "stopped\n");

    let commands: [&[&str]; 3] = [&["ping"], &["stop"], &["config", "get", "name"]];
    for command in commands {
        let outcome = br(dir, command);
        assert_eq!(outcome.exit, ExitCode::FAILURE);
        assert_eq!(outcome.stderr, "VM is not running\n");
    }
}

#[rstest]
fn stop_waits_for_the_socket_to_go_away(state_dir: TempDir) {
    let dir = utf8(&state_dir);
    let _supervisor = FakeSupervisor::start(dir, WireFormatKind::Line, 1);

    let stop = br(dir, &["stop", "--timeout", "5"]);
    assert_eq!(stop.exit, ExitCode::SUCCESS, "{}", stop.stderr);
    assert_eq!(stop.stdout, "stopped\n");
    assert!(!dir.join("control.sock").exists());
    assert_eq!(br(dir, &["status"]).stdout, "stopped\n");
}

#[rstest]
fn config_round_trips_through_the_supervisor(state_dir: TempDir) {
    let dir = utf8(&state_dir);
    let _supervisor = FakeSupervisor::start(dir, WireFormatKind::Line, 4242);

    assert_eq!(br(dir, &["config", "get", "pid"]).stdout, "4242\n");

    let url = "https://example.com/noble.img";
    let set = br(dir, &["config", "set", "base-image-url", url]);
    assert_eq!(set.exit, ExitCode::SUCCESS, "{}", set.stderr);
    assert_eq!(
        set.stdout,
        "base-image-url updated; takes effect after the VM is reset\n"
    );
    assert_eq!(
        br(dir, &["config", "get", "base-image-url"]).stdout,
        format!("{url}\n")
    );
}

#[rstest]
#[case(&["config", "set", "cpus", "8"], "config key cpus is read-only\n")]
#[case(&["config", "get", "colour"], "unknown config key: colour\n")]
#[case(
    &["config", "set", "base-image-url", "not a url"],
    "invalid value for base-image-url: relative URL without a base\n"
)]
#[case(
    &["config", "set", "base-image-url", "https://example.com/a b.img"],
    "invalid value for base-image-url: value must not be empty or contain whitespace or control characters\n"
)]
fn config_errors_name_the_key(
    state_dir: TempDir,
    #[case] args: &[&str],
    #[case] expected: &str,
) {
    let dir = utf8(&state_dir);
    let _supervisor = FakeSupervisor::start(dir, WireFormatKind::Line, 1);

    let outcome = br(dir, args);
    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.stderr, expected);
}

#[rstest]
fn config_keys_include_live_values_when_running(state_dir: TempDir) {
    let dir = utf8(&state_dir);

    let offline = br(dir, &["config", "keys"]);
    assert_eq!(offline.exit, ExitCode::SUCCESS);
    assert_eq!(offline.stdout.lines().count(), 20);
    assert!(!offline.stdout.contains(" = "));

    let _supervisor = FakeSupervisor::start(dir, WireFormatKind::Line, 4242);
    let online = br(dir, &["config", "keys"]);
    let pid = online
        .stdout
        .lines()
        .find(|line| line.starts_with("pid "))
        .expect("pid line");
    assert!(pid.ends_with("[runtime] = 4242"), "{pid}");
    let ssh_key = online
        .stdout
        .lines()
        .find(|line| line.starts_with("ssh-private-key-path "))
        .expect("ssh key line");
    assert!(!ssh_key.contains(" = "), "{ssh_key}");
}

#[rstest]
fn usage_errors_exit_with_status_two(state_dir: TempDir) {
    let outcome = br(utf8(&state_dir), &["reboot"]);
    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("reboot"), "{}", outcome.stderr);
}
