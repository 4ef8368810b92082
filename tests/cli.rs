//! End-to-end tests driving the `minishell` binary.

#![cfg(unix)]

use anyhow::Context;
use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run_with_stdin(args: &[&str], input: &str) -> anyhow::Result<Output> {
    let shell_path = assert_cmd::cargo::cargo_bin!("minishell");
    let mut child = Command::new(shell_path)
        .args(args)
        .env_remove("HISTFILE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("Failed to spawn minishell")?;

    let stdin = child.stdin.as_mut().context("Failed to open stdin")?;
    stdin.write_all(input.as_bytes())?;
    drop(child.stdin.take());

    child.wait_with_output().context("Failed to wait for minishell")
}

#[test]
fn single_command_pipeline() -> anyhow::Result<()> {
    let output = run_with_stdin(&["-c", "echo hello | cat | wc -w"], "")?;
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1");
    Ok(())
}

#[test]
fn single_command_not_found() -> anyhow::Result<()> {
    let output = run_with_stdin(&["-c", "definitely-not-a-command-42"], "")?;
    assert_eq!(output.status.code(), Some(127));
    assert_eq!(
        String::from_utf8_lossy(&output.stderr),
        "definitely-not-a-command-42: command not found\n"
    );
    Ok(())
}

#[test]
fn interactive_lines_from_stdin() -> anyhow::Result<()> {
    let output = run_with_stdin(&[], "echo one\necho two | wc -l\nexit 3\necho never\n")?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(3));
    assert!(stdout.contains("one\n"), "got: {}", stdout);
    assert!(!stdout.contains("never\n"), "got: {}", stdout);
    Ok(())
}

#[test]
fn end_of_input_exits_cleanly() -> anyhow::Result<()> {
    let output = run_with_stdin(&[], "echo last\n")?;
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("last\n"));
    Ok(())
}

#[test]
fn history_file_is_loaded_and_appended() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let histfile = dir.path().join("history");
    std::fs::write(&histfile, "old entry\n")?;
    let histfile_arg = histfile.to_string_lossy().to_string();

    let output = run_with_stdin(
        &["--histfile", histfile_arg.as_str()],
        "history\necho hi\nexit\n",
    )?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("    1 old entry\n"), "got: {}", stdout);
    assert!(stdout.contains("    2 history\n"), "got: {}", stdout);

    assert_eq!(
        std::fs::read_to_string(&histfile)?,
        "old entry\nhistory\necho hi\nexit\n"
    );
    Ok(())
}

#[test]
fn input_after_a_line_reaches_the_child() -> anyhow::Result<()> {
    let output = run_with_stdin(
        &[],
        "sh -c 'read x; echo got $x'\nhello\necho after\n",
    )?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success());
    assert!(stdout.contains("got hello\n"), "got: {}", stdout);
    assert!(stdout.contains("after\n"), "got: {}", stdout);
    assert!(!stderr.contains("command not found"), "stderr: {}", stderr);
    Ok(())
}
