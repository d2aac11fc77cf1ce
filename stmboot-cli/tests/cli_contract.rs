//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("stmboot")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("stmboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("stmboot"))
        .stderr(predicate::str::is_empty());
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_zero_on_success() {
    let mut cmd = cli_cmd();
    cmd.arg("--help").assert().success().code(0);

    // completions bash exits 0 (doesn't require hardware)
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"]).assert().success().code(0);
}

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz").assert().failure().code(2);
}

#[test]
fn exit_code_two_for_erase_without_all() {
    let mut cmd = cli_cmd();
    cmd.args(["-p", "/dev/null-port", "erase"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--all"));
}

#[test]
fn exit_code_two_for_unknown_image_format() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("firmware.elf");
    fs::write(&image, b"\x7fELF").expect("write dummy image");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("/dev/null-port")
        .arg("flash")
        .arg(&image)
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--format"));
}

#[test]
fn exit_code_two_for_oversized_bin_block_size() {
    let mut cmd = cli_cmd();
    cmd.args([
        "-p",
        "/dev/null-port",
        "flash",
        "fw.bin",
        "--bin-block-size",
        "512",
    ])
    .assert()
    .failure()
    .code(2)
    .stderr(predicate::str::contains("--bin-block-size"));
}

#[test]
fn exit_code_one_for_missing_image_file() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("does_not_exist.hex");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("/dev/null-port")
        .arg("flash")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

// ============================================================================
// Unknown Command/Flag Suggestion Tests
// ============================================================================

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("flsah") // typo for flash
        .assert()
        .failure()
        .stderr(predicate::str::contains("flash").or(predicate::str::contains("did you mean")));
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("list-ports")
        .arg("--jason") // typo for --json
        .assert()
        .failure()
        .stderr(predicate::str::contains("json").or(predicate::str::contains("did you mean")));
}

// ============================================================================
// stdout/stderr Separation Tests
// ============================================================================

#[test]
fn flash_error_output_goes_to_stderr_only() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("missing.hex");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("/dev/null-port")
        .arg("flash")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::is_empty().not());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_stmboot()"));
}

// ============================================================================
// JSON Output Purity Tests
// ============================================================================

#[test]
fn list_ports_json_returns_valid_json() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    let stdout = String::from_utf8_lossy(&output.stdout);
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&stdout) {
        assert!(parsed.is_array(), "list-ports --json should return an array");
    }
}

#[test]
fn json_output_has_no_stderr_on_success() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .assert()
        .success()
        .get_output()
        .clone();

    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");
    assert!(
        stderr.is_empty(),
        "JSON output should not have stderr: got {stderr}"
    );
}

// ============================================================================
// -- Option Terminator Tests
// ============================================================================

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir.path().join("-weird.hex");

    let mut cmd = cli_cmd();
    cmd.arg("-p")
        .arg("/dev/null-port")
        .arg("flash")
        .arg("--")
        .arg(&image)
        .assert()
        .failure(); // File doesn't exist, but parses correctly
}

// ============================================================================
// Non-Interactive Mode Tests
// ============================================================================

#[test]
fn non_interactive_flag_is_recognized() {
    let mut cmd = cli_cmd();
    cmd.arg("--non-interactive")
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn non_interactive_environment_variable_works() {
    // Must use "true" not "1" for a boolean clap env var
    let mut cmd = cli_cmd();
    cmd.env("STMBOOT_NON_INTERACTIVE", "true")
        .arg("--version")
        .assert()
        .success();
}

// ============================================================================
// TTY Detection Tests (colors disabled on non-TTY)
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    let mut cmd = cli_cmd();
    let output = cmd.arg("--help").assert().success().get_output().clone();

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    assert!(
        !stdout.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
