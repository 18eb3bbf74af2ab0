//! Round trips between `ApiClient` and `ApiServer` on an ephemeral port

mod common;

use common::{quick_poll, real_dispatcher, TestContext};
use std::sync::Arc;
use tokio::net::TcpListener;

use reconflow::api::{ApiClient, ApiServer, ModuleState};
use reconflow::catalog::Catalog;
use reconflow::command::ResolvedCommand;
use reconflow::dispatch::{CommandDispatch, ExecuteRequest};
use reconflow::error::ErrorCode;
use reconflow::ledger::{ActivityLedger, ActivityRecord, ActivityStatus, MemoryLedger};
use reconflow::options::keys;
use reconflow::poller::{wait_for_module, ActivitySource, WaitOutcome};
use reconflow::workflow::{HookRegistry, RunSettings, WorkflowRunner};

async fn start_server() -> (ApiClient, Arc<MemoryLedger>) {
    let ledger = Arc::new(MemoryLedger::new());
    let server = ApiServer::new(real_dispatcher(ledger.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));

    let client = ApiClient::new(&format!("http://{}", addr)).unwrap();
    (client, ledger)
}

fn request(cmd: &str, module: &str) -> ExecuteRequest {
    ExecuteRequest::from_command(&ResolvedCommand::single(cmd, module), "example.com").quiet(true)
}

#[tokio::test]
async fn test_health() {
    let (client, _) = start_server().await;
    client.health().await.unwrap();
}

#[tokio::test]
async fn test_execute_and_wait() {
    let (client, ledger) = start_server().await;

    let report = client.execute(&request("echo hi", "probe"), true).await.unwrap();
    assert!(!report.duplicate);
    assert_eq!(report.status, Some(ActivityStatus::Done));

    let records = ledger.query_status("example.com", "probe").await.unwrap();
    assert_eq!(records[0].status, ActivityStatus::Done);
}

#[tokio::test]
async fn test_submit_then_poll_remote() {
    let (client, _) = start_server().await;

    let receipt = client.submit(request("sleep 0.2", "remote")).await.unwrap();
    assert!(!receipt.duplicate);

    let outcome = wait_for_module(&client, "example.com", "remote", &quick_poll()).await;
    assert!(matches!(outcome, WaitOutcome::Completed { .. }));

    let response = client.activities("example.com", "remote").await.unwrap();
    assert_eq!(response.status, ModuleState::Done);
    assert_eq!(response.activities.len(), 1);
}

#[tokio::test]
async fn test_duplicate_submit_over_http() {
    let (client, ledger) = start_server().await;

    client.submit(request("true", "dup")).await.unwrap();
    let again = client.submit(request("true", "dup")).await.unwrap();

    assert!(again.duplicate);
    assert_eq!(ledger.query_status("example.com", "dup").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_force_and_clear() {
    let (client, ledger) = start_server().await;
    let record =
        ActivityRecord::from_command(&ResolvedCommand::single("hung", "stuck"), "example.com");
    ledger.record_dispatch(record).await.unwrap();

    let before = client.activities("example.com", "stuck").await.unwrap();
    assert_eq!(before.status, ModuleState::Running);

    let forced = client.force("example.com", "stuck").await.unwrap();
    assert_eq!(forced.forced, Some(1));
    assert_eq!(forced.status, ModuleState::Done);
    assert_eq!(forced.activities[0].status, ActivityStatus::Done);

    assert_eq!(client.clear("example.com", "stuck").await.unwrap(), 1);
    assert!(client.snapshot("example.com", "stuck").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_command_rejected() {
    let (client, _) = start_server().await;

    let err = client.execute(&request("  ", "bad"), false).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VALIDATION_REQUIRED_FIELD);
}

#[tokio::test]
async fn test_invalid_workspace_rejected() {
    let (client, _) = start_server().await;

    let err = client.activities("../etc", "m").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::VALIDATION_INVALID_INPUT);
}

#[tokio::test]
async fn test_workflow_against_remote_executor() {
    let ctx = TestContext::new();
    let (client, _) = start_server().await;
    let client = Arc::new(client);

    let catalog = Catalog::from_yaml_str(
        r#"
workflows:
  remote: [first]
modules:
  first:
    quick:
      - cmd: "echo remote > $WORKSPACE/first.txt"
        output_path: "$WORKSPACE/first.txt"
"#,
    )
    .unwrap();
    let runner = WorkflowRunner::new(
        Arc::new(catalog),
        HookRegistry::builtin(),
        client.clone(),
        client.clone() as Arc<dyn ActivitySource>,
    );

    let options = ctx.options("example.com");
    let settings = RunSettings {
        nolog: true,
        poll: quick_poll(),
        ..RunSettings::new("quick")
    };
    let report = runner.run_workflow("remote", &options, &settings).await.unwrap();

    assert_eq!(report.modules[0].done, 1);
    let workspace = options.get(keys::WORKSPACE).unwrap();
    assert!(std::path::Path::new(workspace).join("first.txt").exists());
}
