//! Tests for the local launcher against real host binaries

use command_executor::{Command, Error, Launcher, LocalLauncher, ScriptedLauncher, ExitResult};

#[smol_potat::test]
async fn test_captures_stdout_and_exit_code() {
    let launcher = LocalLauncher;
    let result = launcher
        .execute(&Command::builder("echo").arg("panelo").build())
        .await
        .unwrap();
    assert!(result.success());
    assert_eq!(result.trimmed(), "panelo");

    let result = launcher
        .execute(&Command::shell("echo oops >&2; exit 3"))
        .await
        .unwrap();
    assert_eq!(result.status.code, Some(3));
    assert_eq!(result.diagnostic(), "oops");
}

#[smol_potat::test]
async fn test_stdin_is_forwarded() {
    let launcher = LocalLauncher;
    let cmd = Command::builder("cat").stdin_bytes("CREATE TABLE users;").build();
    let result = launcher.execute(&cmd).await.unwrap();
    assert_eq!(result.output, "CREATE TABLE users;");
}

#[smol_potat::test]
async fn test_missing_binary_is_command_not_found() {
    let launcher = LocalLauncher;
    let err = launcher
        .execute(&Command::new("panelo-definitely-not-installed"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandNotFound { .. }));
    assert!(!launcher.probe(&Command::new("panelo-definitely-not-installed")).await);
}

#[smol_potat::test]
async fn test_working_directory_and_env() {
    let dir = tempfile::tempdir().unwrap();
    let cmd = Command::builder("sh")
        .arg("-c")
        .arg("pwd; echo $PANELO_TEST")
        .current_dir(dir.path())
        .env("PANELO_TEST", "yes")
        .build();
    let result = LocalLauncher.execute(&cmd).await.unwrap();
    let lines: Vec<&str> = result.output.lines().collect();
    assert!(lines[0].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    assert_eq!(lines[1], "yes");
}

#[smol_potat::test]
async fn test_scripted_launcher_matches_prefixes_in_order() {
    let launcher = ScriptedLauncher::new()
        .on("docker --version", ExitResult::ok("Docker version 24.0.7"))
        .on("docker", ExitResult::failed(1, "daemon not running"));

    let version = launcher
        .execute(&Command::builder("docker").arg("--version").build())
        .await
        .unwrap();
    assert!(version.success());

    let ps = launcher
        .execute(&Command::builder("docker").arg("ps").build())
        .await
        .unwrap();
    assert_eq!(ps.diagnostic(), "daemon not running");

    let err = launcher.execute(&Command::new("nginx")).await.unwrap_err();
    assert!(matches!(err, Error::Unscripted { .. }));
    assert_eq!(launcher.count("docker"), 2);
    assert_eq!(launcher.calls().len(), 3);
}
