use super::*;
use serde_json::json;

#[tokio::test]
async fn test_production_runner_success() {
    let runner = SubprocessManager::production().runner();
    let command = ProcessCommandBuilder::new("echo")
        .arg("hello world")
        .build();

    let output = runner.run(command).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.trim(), "hello world");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn test_production_runner_failure() {
    let runner = TokioProcessRunner;
    let command = ProcessCommandBuilder::new("false").build();

    let output = runner.run(command).await.unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_mock_worker_reply_layout() {
    let (manager, mut mock) = SubprocessManager::mock();

    mock.expect_command("python3")
        .with_args(|args| args.len() == 2)
        .emits_noise(&["loading", "epoch 1"])
        .replies_with_result(json!({"k": 1}))
        .returns_stderr("warning\n")
        .finish();

    let command = ProcessCommandBuilder::new("python3")
        .arg("runner.py")
        .arg("in.txt")
        .build();
    let output = manager.runner().run(command).await.unwrap();

    assert!(output.status.success());
    assert_eq!(output.stdout, "loading\nepoch 1\n{\"result\":{\"k\":1}}\n");
    assert_eq!(output.stderr, "warning\n");
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_mock_worker_error_reply() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("worker")
        .replies_with_error("matrix is singular")
        .returns_exit_code(1)
        .finish();

    let output = mock
        .run(ProcessCommandBuilder::new("worker").build())
        .await
        .unwrap();
    assert_eq!(output.status, ExitStatus::Error(1));
    assert_eq!(output.stdout, "{\"error\":\"matrix is singular\"}\n");
}

#[tokio::test]
async fn test_mock_runner_unmatched_args() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("python3")
        .with_args(|args| args.is_empty())
        .finish();

    let result = mock
        .run(ProcessCommandBuilder::new("python3").arg("x").build())
        .await;
    assert!(matches!(result, Err(ProcessError::MockExpectationNotMet(_))));
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_mock_spawn_failure() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("worker").fails_to_spawn().finish();

    let result = mock.run(ProcessCommandBuilder::new("worker").build()).await;
    assert!(matches!(result, Err(ProcessError::CommandNotFound(_))));
}
