use std::process::Command;

fn cleave() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cleave"))
}

fn dump() -> Command {
    Command::new(env!("CARGO_BIN_EXE_dump"))
}

const MODES: [&str; 4] = ["fork", "chimera", "thread", "user"];

fn assert_lists_modes(text: &str) {
    for mode in MODES {
        assert!(text.contains(&format!("- {mode}")), "{mode} missing from {text}");
    }
}

#[test]
fn missing_mode_prints_usage_and_fails() {
    let output = cleave().output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "{stderr}");
    assert_lists_modes(&stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn unknown_mode_fails_before_spawning() {
    let output = cleave().arg("vfork").output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid clone() mode: vfork"), "{stderr}");
    assert_lists_modes(&stderr);
    assert_eq!(output.status.code(), Some(2));
    // Nothing was reported, so nothing was spawned.
    assert!(output.stdout.is_empty());
}

#[test]
fn extra_arguments_are_rejected() {
    let output = cleave().args(["fork", "thread"]).output().unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn help_lists_modes() {
    let output = cleave().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_lists_modes(&stdout);
}

#[test]
fn thread_mode_runs_to_completion() {
    let output = cleave().arg("thread").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("> Hello from main!"), "{stdout}");
    assert!(stdout.contains(": Hello from child_entry"), "{stdout}");
    assert!(!stdout.contains("Created process: -1"), "{stdout}");

    // The child may already have counted before our first look, so only the trend is fixed.
    let counts: Vec<i64> = stdout
        .lines()
        .filter_map(|line| line.strip_prefix("counter = "))
        .map(|value| value.parse().unwrap())
        .collect();
    assert!(!counts.is_empty(), "{stdout}");
    assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]), "{counts:?}");

    let field = |label: &str| -> Vec<String> {
        stdout
            .lines()
            .filter_map(|line| line.strip_prefix(label))
            .map(str::to_owned)
            .collect()
    };
    // Same process, different thread.
    assert_eq!(field("> getpid()  = "), field(": getpid()  = "));
    assert_ne!(field("> gettid()  = "), field(": gettid()  = "));
}

#[test]
fn dump_concatenates_files() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    std::fs::write(&a, "first\n").unwrap();
    std::fs::write(&b, "second\n").unwrap();

    let output = dump().arg(&a).arg(&b).output().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, b"first\nsecond\n");
}

#[test]
fn dump_reports_missing_files_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    std::fs::write(&a, "present\n").unwrap();

    let output = dump()
        .arg(dir.path().join("missing"))
        .arg(&a)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(output.stdout, b"present\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to open"), "{stderr}");
}
