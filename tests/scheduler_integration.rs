//! End-to-end scheduler scenarios with real processes

mod common;

use common::{quick_poll, real_dispatcher, TestContext};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reconflow::catalog::Catalog;
use reconflow::command::{CmdType, ResolvedCommand};
use reconflow::dispatch::{CommandDispatch, ExecuteRequest};
use reconflow::ledger::{ActivityLedger, ActivityRecord, ActivityStatus, MemoryLedger};
use reconflow::options::keys;
use reconflow::poller::{wait_for_module, ActivitySource, PollPolicy, WaitOutcome};
use reconflow::workflow::{HookRegistry, RunSettings, WorkflowRunner};

fn request(cmd: &str, module: &str) -> ExecuteRequest {
    ExecuteRequest::from_command(&ResolvedCommand::single(cmd, module), "example.com").quiet(true)
}

#[tokio::test]
async fn test_echo_transitions_to_done_and_captures_output() {
    let ctx = TestContext::new();
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = real_dispatcher(ledger.clone());

    let std_path = ctx.home().join("std/echo.std");
    let mut req = request("echo hi", "probe");
    req.std_path = std_path.display().to_string();

    let report = dispatcher.execute(req).await.unwrap();
    assert_eq!(report.status, Some(ActivityStatus::Done));

    let records = ledger.query_status("example.com", "probe").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ActivityStatus::Done);
    assert!(std::fs::read_to_string(std_path).unwrap().contains("hi"));
}

#[tokio::test]
async fn test_failing_command_is_error_and_workflow_continues() {
    let ctx = TestContext::new();
    let ledger = ctx.file_ledger();
    let dispatcher = Arc::new(real_dispatcher(ledger.clone()));

    let catalog = Catalog::from_yaml_str(
        r#"
workflows:
  recon: [broken, after]
modules:
  broken:
    quick:
      - cmd: "exit 1"
  after:
    quick:
      - cmd: "echo reached > $WORKSPACE/after.txt"
        output_path: "$WORKSPACE/after.txt"
"#,
    )
    .unwrap();
    let runner = WorkflowRunner::new(
        Arc::new(catalog),
        HookRegistry::builtin(),
        dispatcher,
        ledger.clone() as Arc<dyn ActivitySource>,
    );

    let options = ctx.options("example.com");
    let settings = RunSettings {
        nolog: true,
        poll: quick_poll(),
        ..RunSettings::new("quick")
    };
    let report = runner.run_workflow("recon", &options, &settings).await.unwrap();

    assert_eq!(report.modules[0].errors, 1);
    assert_eq!(report.modules[1].done, 1);
    let workspace = options.get(keys::WORKSPACE).unwrap();
    assert_eq!(
        std::fs::read_to_string(format!("{}/after.txt", workspace)).unwrap(),
        "reached\n"
    );
}

#[tokio::test]
async fn test_skip_if_done_never_spawns() {
    let ctx = TestContext::new();
    let output = ctx.write_file("ws/result.txt", "previous run\n");
    let marker = ctx.home().join("spawned");

    let dispatcher = real_dispatcher(Arc::new(MemoryLedger::new()));
    let mut req = request(&format!("touch {}", marker.display()), "scan");
    req.output_path = output.display().to_string();

    let report = dispatcher.execute(req).await.unwrap();
    assert_eq!(report.status, Some(ActivityStatus::Done));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_duplicate_dispatch_yields_one_record() {
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = real_dispatcher(ledger.clone());

    let first = dispatcher.submit(request("true", "dup")).await.unwrap();
    let second = dispatcher.submit(request("true", "dup")).await.unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(first.id, second.id);
    assert_eq!(ledger.query_status("example.com", "dup").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_list_command_runs_every_pair() {
    let ctx = TestContext::new();
    let hosts = ctx.write_file("lists/hosts.txt", "a.test\nb.test\n\nc.test\n");
    let out_dir = ctx.home().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();

    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = real_dispatcher(ledger.clone());

    let mut command = ResolvedCommand::single(
        format!("echo [[0]] > {}/[[0]].txt", out_dir.display()),
        "fuzz",
    );
    command.cmd_type = CmdType::List;
    command.resources = Some(format!("hosts|{}", hosts.display()));
    command.chunk = Some(2);

    let report = dispatcher
        .execute(ExecuteRequest::from_command(&command, "example.com").quiet(true))
        .await
        .unwrap();

    assert_eq!(report.status, Some(ActivityStatus::Done));
    for host in ["a.test", "b.test", "c.test"] {
        let content = std::fs::read_to_string(out_dir.join(format!("{host}.txt"))).unwrap();
        assert_eq!(content.trim(), host);
    }
}

#[tokio::test]
async fn test_waiting_leaves_no_running_records() {
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = real_dispatcher(ledger.clone());

    for i in 0..4 {
        dispatcher
            .submit(request(&format!("sleep 0.{i}"), "batch"))
            .await
            .unwrap();
    }

    let outcome = wait_for_module(ledger.as_ref(), "example.com", "batch", &quick_poll()).await;
    assert!(matches!(outcome, WaitOutcome::Completed { .. }));

    let records = ledger.query_status("example.com", "batch").await.unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn test_forced_continue_after_retry_budget() {
    let ledger = Arc::new(MemoryLedger::new());
    // Recorded but never executed, like an activity whose worker died
    let record =
        ActivityRecord::from_command(&ResolvedCommand::single("lost", "stuck"), "example.com");
    ledger.record_dispatch(record).await.unwrap();

    let policy = PollPolicy {
        delay: Duration::from_millis(10),
        max_retries: 3,
        log_every: 1,
    };
    let outcome = wait_for_module(ledger.as_ref(), "example.com", "stuck", &policy).await;

    assert!(outcome.was_forced());
    let records = ledger.query_status("example.com", "stuck").await.unwrap();
    assert!(records.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test]
async fn test_process_timeout_kills_and_errors() {
    let dispatcher = real_dispatcher(Arc::new(MemoryLedger::new()));
    let mut req = request("sleep 30", "slow");
    req.timeout = Some(Duration::from_millis(300));

    let started = Instant::now();
    let report = dispatcher.execute(req).await.unwrap();

    assert_eq!(report.status, Some(ActivityStatus::Error));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let ctx = TestContext::new();
    {
        let dispatcher = real_dispatcher(ctx.file_ledger());
        dispatcher.execute(request("true", "persist")).await.unwrap();
    }

    let reopened = ctx.file_ledger();
    let records = reopened.query_status("example.com", "persist").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ActivityStatus::Done);
}
