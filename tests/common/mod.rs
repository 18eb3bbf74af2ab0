//! Common test utilities and helpers

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use reconflow::dispatch::LocalDispatcher;
use reconflow::executor::{CommandExecutor, ExecutorSettings};
use reconflow::ledger::{ActivityLedger, FileLedger};
use reconflow::options::{keys, OptionSet, OptionSetBuilder};
use reconflow::poller::PollPolicy;
use reconflow::subprocess::SubprocessManager;

/// Temporary home directory with helpers for fixtures
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn home(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `content` under the home directory, creating parents
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.home().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write fixture");
        path
    }

    /// Option Set for `target` with its workspace directory created
    pub fn options(&self, target: &str) -> OptionSet {
        let options = OptionSetBuilder::new(target, &self.home().join("workspaces"))
            .data_path(&self.home().join("data"))
            .build();
        let workspace = options.get(keys::WORKSPACE).expect("workspace key");
        fs::create_dir_all(workspace).expect("create workspace dir");
        options
    }

    pub fn file_ledger(&self) -> Arc<FileLedger> {
        Arc::new(FileLedger::new(self.home().join("ledger")))
    }
}

/// Executor settings without pauses or echo
pub fn fast_settings() -> ExecutorSettings {
    ExecutorSettings {
        success_pause: Duration::ZERO,
        default_timeout: Some(Duration::from_secs(30)),
        default_chunk: 5,
        echo: false,
    }
}

/// Dispatcher running real processes against `ledger`
pub fn real_dispatcher(ledger: Arc<dyn ActivityLedger>) -> LocalDispatcher {
    let executor = CommandExecutor::new(SubprocessManager::production(), fast_settings());
    LocalDispatcher::new(executor, ledger)
}

pub fn quick_poll() -> PollPolicy {
    PollPolicy {
        delay: Duration::from_millis(20),
        max_retries: 0,
        log_every: 50,
    }
}
