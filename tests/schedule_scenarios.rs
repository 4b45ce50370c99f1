use async_trait::async_trait;
use mim_scheduler::{
    DatabaseExecutor, ExecutionEngine, ExecutorError, Executors, LoadError, ProcessExecutor,
    RunProfileExecutor, RunProfileOutcome, ScheduleError, ScheduleLoader, ScriptKind,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Records every dispatch and fails the keys it was told to fail.
///
/// Run profiles are keyed `agent/profile`, everything else by command or path.
#[derive(Default)]
struct RecordingExecutor {
    failing: HashSet<String>,
    deadlocked_once: Mutex<HashSet<String>>,
    pending_imports: HashSet<String>,
    pending_exports: HashSet<String>,
    slow: HashSet<String>,
    log: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    fn failing(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    fn deadlock_once(self, key: &str) -> Self {
        self.deadlocked_once.lock().unwrap().insert(key.to_string());
        self
    }

    fn pending_imports(mut self, agent: &str) -> Self {
        self.pending_imports.insert(agent.to_string());
        self
    }

    fn pending_exports(mut self, agent: &str) -> Self {
        self.pending_exports.insert(agent.to_string());
        self
    }

    fn slow(mut self, key: &str) -> Self {
        self.slow.insert(key.to_string());
        self
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn position(&self, key: &str) -> usize {
        self.log()
            .iter()
            .position(|k| k == key)
            .unwrap_or_else(|| panic!("{} was never dispatched", key))
    }

    async fn record(&self, key: String) -> bool {
        if self.slow.contains(&key) {
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        let completed = !self.failing.contains(&key);
        self.log.lock().unwrap().push(key);
        completed
    }
}

#[async_trait]
impl RunProfileExecutor for RecordingExecutor {
    async fn execute_run_profile(
        &self,
        agent: &str,
        run_profile: &str,
    ) -> Result<RunProfileOutcome, ExecutorError> {
        let key = format!("{}/{}", agent, run_profile);
        let deadlocked = self.deadlocked_once.lock().unwrap().remove(&key);
        if self.record(key).await {
            if deadlocked {
                return Ok(RunProfileOutcome::retry("sql-deadlock"));
            }
            Ok(RunProfileOutcome::completed("success"))
        } else {
            Ok(RunProfileOutcome::failed("stopped-extension-dll-exception"))
        }
    }

    async fn has_pending_exports(&self, agent: &str) -> Result<bool, ExecutorError> {
        Ok(self.pending_exports.contains(agent))
    }

    async fn has_pending_imports(&self, agent: &str) -> Result<bool, ExecutorError> {
        Ok(self.pending_imports.contains(agent))
    }
}

#[async_trait]
impl ProcessExecutor for RecordingExecutor {
    async fn run_script(&self, _kind: ScriptKind, path: &str) -> Result<bool, ExecutorError> {
        Ok(self.record(path.to_string()).await)
    }

    async fn run_executable(
        &self,
        path: &str,
        _arguments: Option<&str>,
        _show_window: bool,
    ) -> Result<bool, ExecutorError> {
        Ok(self.record(path.to_string()).await)
    }
}

#[async_trait]
impl DatabaseExecutor for RecordingExecutor {
    async fn execute(&self, command: &str, _server: &str) -> Result<bool, ExecutorError> {
        Ok(self.record(command.to_string()).await)
    }
}

fn engine_with(executor: RecordingExecutor) -> (ExecutionEngine, Arc<RecordingExecutor>) {
    let executor = Arc::new(executor);
    let executors = Executors::new(executor.clone(), executor.clone(), executor.clone());
    (ExecutionEngine::new(executors), executor)
}

const NIGHTLY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Schedule Name="Nightly" StopOnIncompletion="false">
  <Block Name="Imports" Enabled="true">
    <ManagementAgent Name="AD" RunProfile="DISO" Enabled="true" />
    <ManagementAgent Name="HR" RunProfile="FISO" Enabled="true" />
  </Block>
  <Block Name="Sync" Enabled="true">
    <ContinuationCondition Type="ManagementAgentsHadImports" Enabled="true">
      <ManagementAgent Name="AD" RunProfile="DS" Enabled="true" />
    </ContinuationCondition>
  </Block>
  <Block Name="Exports" Enabled="true">
    <ManagementAgent Name="AD" RunProfile="Export" OnlyIfPendingExportsExist="true" Enabled="true" />
    <ManagementAgent Name="LDAP" RunProfile="Export" OnlyIfPendingExportsExist="true" Enabled="true" />
    <SqlServer Name="Stats" Command="exec uspStats" Server="sql01" Enabled="true" />
    <PowerShell Name="Report" Path="C:\Scripts\report.ps1" Enabled="false" />
  </Block>
</Schedule>"#;

#[tokio::test]
async fn test_nightly_schedule_runs_blocks_in_order() {
    let mut schedule = ScheduleLoader::parse_str(NIGHTLY).expect("Nightly schedule should load");
    let (engine, executor) = engine_with(
        RecordingExecutor::default()
            .pending_imports("HR")
            .pending_exports("AD")
            .slow("HR/FISO"),
    );

    let report = engine
        .execute_schedule(&mut schedule)
        .await
        .expect("Nightly schedule should be valid");

    assert!(report.succeeded());
    assert!(report.imports_had_changes);

    // Both imports finish before the continuation condition is evaluated
    assert!(executor.position("HR/FISO") < executor.position("AD/DS"));
    assert!(executor.position("AD/DISO") < executor.position("AD/DS"));
    assert!(executor.position("AD/DS") < executor.position("AD/Export"));

    let log = executor.log();
    assert!(!log.contains(&"LDAP/Export".to_string()));
    assert!(!log.iter().any(|k| k.ends_with("report.ps1")));
    assert!(log.contains(&"exec uspStats".to_string()));

    // Three blocks, two imports, the condition, the sync, one export and the SQL command
    assert_eq!(report.statistics.dispatched, 9);
    assert_eq!(report.statistics.skipped, 1);
    assert_eq!(report.statistics.failed, 0);
}

#[tokio::test]
async fn test_nightly_schedule_without_imports_skips_sync() {
    let mut schedule = ScheduleLoader::parse_str(NIGHTLY).unwrap();
    let (engine, executor) = engine_with(RecordingExecutor::default());

    let report = engine.execute_schedule(&mut schedule).await.unwrap();

    assert!(report.succeeded());
    assert!(!report.imports_had_changes);
    assert!(!executor.log().contains(&"AD/DS".to_string()));
    assert_eq!(report.statistics.skipped, 4);
}

#[tokio::test]
async fn test_stop_on_incompletion_halts_after_join() {
    let xml = r#"
        <Schedule Name="Delta" StopOnIncompletion="true">
          <Block Name="First" Enabled="true">
            <ManagementAgent Name="AD" RunProfile="DISO" Enabled="true">
              <ManagementAgent Name="AD" RunProfile="DS" Enabled="true" />
            </ManagementAgent>
            <Executable Name="Slow" Command="slow.exe" Enabled="true" />
          </Block>
          <Block Name="Second" Enabled="true">
            <Executable Name="Never" Command="never.exe" Enabled="true" />
          </Block>
        </Schedule>"#;
    let mut schedule = ScheduleLoader::parse_str(xml).unwrap();
    let (engine, executor) = engine_with(
        RecordingExecutor::default()
            .failing("AD/DISO")
            .slow("slow.exe"),
    );

    let report = engine.execute_schedule(&mut schedule).await.unwrap();

    assert!(report.halted);
    assert!(!report.succeeded());

    // The sibling still in flight is awaited; nothing after the failure starts
    let log = executor.log();
    assert!(log.contains(&"slow.exe".to_string()));
    assert!(!log.contains(&"AD/DS".to_string()));
    assert!(!log.contains(&"never.exe".to_string()));
    assert_eq!(report.statistics.failed, 1);
}

#[tokio::test]
async fn test_deadlocked_run_profile_is_retried() {
    let xml = r#"
        <Schedule Name="Retry" StopOnIncompletion="true">
          <ManagementAgent Name="AD" RunProfile="DS" Enabled="true">
            <Executable Name="After" Command="after.exe" Enabled="true" />
          </ManagementAgent>
          <ManagementAgent Name="HR" RunProfile="DS" Enabled="true" />
        </Schedule>"#;
    let mut schedule = ScheduleLoader::parse_str(xml).unwrap();
    let (engine, executor) = engine_with(RecordingExecutor::default().deadlock_once("AD/DS"));

    let report = engine.execute_schedule(&mut schedule).await.unwrap();

    assert!(report.succeeded());
    let log = executor.log();
    assert_eq!(log.iter().filter(|k| *k == "AD/DS").count(), 2);
    assert!(executor.position("HR/DS") < executor.position("after.exe"));
    assert_eq!(report.statistics.retried, 1);
}

#[tokio::test]
async fn test_mixed_siblings_are_rejected_at_load() {
    let xml = r#"
        <Schedule Name="Mixed">
          <Block Name="B" Enabled="true" />
          <Executable Name="E" Command="e.exe" Enabled="true" />
        </Schedule>"#;

    let err = ScheduleLoader::parse_str(xml).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid(ScheduleError::MixedSiblings { .. })
    ));
}

#[tokio::test]
async fn test_disabled_task_does_not_count_towards_mixing() {
    let xml = r#"
        <Schedule Name="Mostly blocks">
          <Block Name="B" Enabled="true">
            <Executable Name="Inside" Command="inside.exe" Enabled="true" />
          </Block>
          <Executable Name="E" Command="e.exe" Enabled="false" />
        </Schedule>"#;
    let mut schedule = ScheduleLoader::parse_str(xml).expect("Disabled tasks are dropped first");
    let (engine, executor) = engine_with(RecordingExecutor::default());

    let report = engine.execute_schedule(&mut schedule).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(executor.log(), vec!["inside.exe".to_string()]);
}

#[tokio::test]
async fn test_schedule_file_with_what_if_executors() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nightly.xml");
    std::fs::write(&path, NIGHTLY).unwrap();

    let mut schedule = ScheduleLoader::load_file(&path).expect("Schedule file should load");
    let engine = ExecutionEngine::new(Executors::what_if()).with_what_if(true);

    let report = engine.execute_schedule(&mut schedule).await.unwrap();

    assert!(report.what_if);
    assert!(report.succeeded());
    // WHATIF probes never report pending work
    assert!(!report.imports_had_changes);
    assert!(report.statistics.skipped > 0);
}

#[tokio::test]
async fn test_missing_schedule_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = ScheduleLoader::load_file(temp_dir.path().join("absent.xml")).unwrap_err();
    assert!(matches!(err, LoadError::NotFound { .. }));
}
