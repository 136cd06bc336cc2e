use std::path::PathBuf;
use std::process::Command;

fn run_agent(args: &[&str]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_storychat");
    Command::new(bin)
        .arg("agent")
        .args(args)
        .output()
        .expect("agent command should run")
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn state_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("storychat-agent-{}-{}.json", name, std::process::id()))
}

fn as_arg(path: &std::path::Path) -> &str {
    path.to_str().expect("path should be utf-8")
}

fn parse_state_out(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("STATE_OUT:").map(|v| v.to_string()))
        .filter(|value| value != "NONE")
}

#[test]
fn agent_fake_choice_flow_sends_the_player_line() {
    let story = sc_test_example::story_dir("late-night");
    let state_1 = state_path("fake-1");
    let state_2 = state_path("fake-2");

    let start = run_agent(&[
        "start",
        "--story-dir",
        as_arg(&story),
        "--state-out",
        as_arg(&state_1),
    ]);
    assert!(start.status.success(), "start failed");
    let start_stdout = stdout_of(&start);
    assert!(start_stdout.contains("RESULT:OK"));
    assert!(start_stdout.contains("EVENT:FAKE_CHOICES"));
    assert!(start_stdout.contains("CONVERSATION:amy"));
    assert!(start_stdout.contains("CHOICE:0|\"yeah\""));
    assert_eq!(
        parse_state_out(&start_stdout).as_deref(),
        Some(as_arg(&state_1))
    );

    let choose = run_agent(&[
        "fake-choice",
        "--state-in",
        as_arg(&state_1),
        "--state-out",
        as_arg(&state_2),
        "--index",
        "1",
    ]);
    assert!(choose.status.success(), "fake-choice failed");
    let choose_stdout = stdout_of(&choose);
    assert!(choose_stdout.contains("EVENT:MESSAGE"));
    assert!(choose_stdout.contains("can't sleep"));
    assert!(state_2.exists());
}

#[test]
fn agent_lock_flow_rejects_then_accepts_a_code() {
    let story = sc_test_example::story_dir("vip-room");
    let state_1 = state_path("lock-1");
    let state_2 = state_path("lock-2");
    let state_3 = state_path("lock-3");
    let state_4 = state_path("lock-4");

    let start = run_agent(&[
        "start",
        "--story-dir",
        as_arg(&story),
        "--state-out",
        as_arg(&state_1),
        "--steps",
        "20",
    ]);
    assert!(start.status.success(), "start failed");
    let start_stdout = stdout_of(&start);
    assert!(start_stdout.contains("welcome to the club"));
    assert!(start_stdout.contains("EVENT:LOCKED"));
    assert!(start_stdout.contains("LOCKED_FILE:vip.txt"));

    let denied = run_agent(&[
        "unlock-code",
        "--state-in",
        as_arg(&state_1),
        "--state-out",
        as_arg(&state_2),
        "--code",
        "SILVER-1",
    ]);
    assert!(denied.status.success(), "denied code should still succeed");
    let denied_stdout = stdout_of(&denied);
    assert!(denied_stdout.contains("CREDENTIAL:DENIED"));
    assert!(denied_stdout.contains("EVENT:LOCKED"));

    let granted = run_agent(&[
        "unlock-code",
        "--state-in",
        as_arg(&state_2),
        "--state-out",
        as_arg(&state_3),
        "--code",
        "GOLD-2024",
    ]);
    assert!(granted.status.success(), "granted code failed");
    let granted_stdout = stdout_of(&granted);
    assert!(granted_stdout.contains("CREDENTIAL:GRANTED"));
    assert!(granted_stdout.contains("EVENT:UNLOCKED"));
    assert!(granted_stdout.contains("UNLOCKED_FILE:vip.txt"));

    let advance = run_agent(&[
        "advance",
        "--state-in",
        as_arg(&state_3),
        "--state-out",
        as_arg(&state_4),
        "--steps",
        "20",
    ]);
    assert!(advance.status.success(), "advance failed");
    let advance_stdout = stdout_of(&advance);
    assert!(advance_stdout.contains("this is the VIP lounge"));
    assert!(advance_stdout.contains("THINKING_JSON:\"Is this worth it?\""));
}

#[test]
fn agent_errors_use_the_error_protocol() {
    let missing = state_path("missing-input");
    let output = run_agent(&[
        "advance",
        "--state-in",
        as_arg(&missing),
        "--state-out",
        as_arg(&state_path("never-written")),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("RESULT:ERROR"));
    assert!(stdout.contains("ERROR_CODE:CLI_STATE_NOT_FOUND"));
}
