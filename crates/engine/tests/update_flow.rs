use async_trait::async_trait;
use context_engine::{
    CancellationToken, CompletionStatus, ContextEngine, EngineConfig, EngineError, FileChange,
    FileLifecycle, SourceFs, UpdateOutcome,
};
use context_parser::ParseErrorKind;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

const ROOT: &str = "/workspace";

/// In-memory project with optional per-file read delays and one gated file
#[derive(Default)]
struct MemoryFs {
    files: Mutex<BTreeMap<String, String>>,
    delays: BTreeMap<String, Duration>,
    gate: Option<(String, Arc<Semaphore>)>,
}

impl MemoryFs {
    fn with_files(files: &[(&str, &str)]) -> Self {
        Self {
            files: Mutex::new(
                files
                    .iter()
                    .map(|(path, content)| (path.to_string(), content.to_string()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    fn gated(mut self, path: &str, gate: Arc<Semaphore>) -> Self {
        self.gate = Some((path.to_string(), gate));
        self
    }
}

#[async_trait]
impl SourceFs for MemoryFs {
    async fn list_source_files(&self, root: &Path) -> context_engine::Result<Vec<PathBuf>> {
        let files = self.files.lock().expect("files");
        Ok(files.keys().map(|key| root.join(key)).collect())
    }

    async fn read_to_string(&self, path: &Path) -> context_engine::Result<String> {
        let key = path
            .strip_prefix(ROOT)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some((gated, gate)) = &self.gate {
            if *gated == key {
                gate.acquire().await.expect("gate").forget();
            }
        }
        let files = self.files.lock().expect("files");
        files.get(&key).cloned().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, key))
        })
    }
}

fn engine_over(fs: MemoryFs, config: EngineConfig) -> Arc<ContextEngine> {
    Arc::new(ContextEngine::with_fs(config, Arc::new(fs)).expect("engine"))
}

#[tokio::test]
async fn structurally_identical_reparse_is_not_committed() {
    let fs = MemoryFs::with_files(&[("A.java", "class A {} // one\n")]);
    let engine = engine_over(fs, EngineConfig::default());
    engine.analyze_project(ROOT).await.expect("analyze");

    let report = engine
        .update_context(vec![FileChange::modified("A.java", "class A {} // two\n")])
        .await
        .expect("update");
    assert!(!report.committed);
    assert_eq!(report.version, 1);
    assert_eq!(report.outcome("A.java"), Some(&UpdateOutcome::Unchanged));
    assert_eq!(engine.get_current_context().version(), 1);
}

#[tokio::test]
async fn read_failure_does_not_block_the_rest_of_the_batch() {
    let fs = MemoryFs::with_files(&[("A.java", "class A {}\n")]);
    let engine = engine_over(fs, EngineConfig::default());
    engine.analyze_project(ROOT).await.expect("analyze");

    let report = engine
        .update_context(vec![
            FileChange::touched("Ghost.java"),
            FileChange::modified("B.java", "class B extends A {}\n"),
        ])
        .await
        .expect("update");
    assert!(report.committed);
    assert!(matches!(
        report.outcome("Ghost.java"),
        Some(UpdateOutcome::ReadFailed { .. })
    ));
    assert_eq!(engine.file_state("Ghost.java"), None);

    let context = engine.get_current_context();
    assert_eq!(context.version(), 2);
    assert!(context
        .graph()
        .dependencies("B.java::B")
        .contains("A.java::A"));
}

#[tokio::test]
async fn last_change_per_path_wins_within_a_batch() {
    let engine = engine_over(MemoryFs::default(), EngineConfig::default());
    let report = engine
        .update_context(vec![
            FileChange::modified("x.py", "class First:\n    pass\n"),
            FileChange::modified("x.py", "class Second:\n    pass\n"),
        ])
        .await
        .expect("update");
    assert_eq!(report.files.len(), 1);
    let context = engine.get_current_context();
    assert!(context.graph().contains("x.py::Second"));
    assert!(!context.graph().contains("x.py::First"));
}

#[tokio::test]
async fn empty_change_path_is_a_contract_violation() {
    let engine = engine_over(MemoryFs::default(), EngineConfig::default());
    let err = engine
        .update_context(vec![FileChange::modified(" ", "class A {}")])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
}

#[tokio::test]
async fn unsupported_files_are_tracked_with_errors() {
    let engine = engine_over(MemoryFs::default(), EngineConfig::default());
    let report = engine
        .update_context(vec![FileChange::modified("notes.txt", "some code")])
        .await
        .expect("update");
    assert_eq!(
        report.outcome("notes.txt"),
        Some(&UpdateOutcome::Parsed {
            lifecycle: FileLifecycle::ParsedWithErrors
        })
    );
    let context = engine.get_current_context();
    let result = context
        .file("notes.txt")
        .and_then(|state| state.result.clone())
        .expect("result");
    assert!(result.errors()[0].message.contains("Unsupported language"));
}

#[tokio::test]
async fn slow_file_times_out_without_blocking_siblings() {
    let fs = MemoryFs::with_files(&[("fast.py", "x = 1\n"), ("slow.py", "y = 2\n")])
        .delay("slow.py", Duration::from_millis(500));
    let config = EngineConfig {
        parse_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let engine = engine_over(fs, config);

    let context = engine.analyze_project(ROOT).await.expect("analyze");
    assert_eq!(context.completion().status, CompletionStatus::Complete);
    assert_eq!(engine.file_state("fast.py"), Some(FileLifecycle::ParsedOk));
    assert_eq!(
        engine.file_state("slow.py"),
        Some(FileLifecycle::ParsedWithErrors)
    );
    let slow = context
        .file("slow.py")
        .and_then(|state| state.result.clone())
        .expect("slow result");
    assert!(slow.has_error_kind(ParseErrorKind::Timeout));
    assert!(slow.errors()[0].message.contains("parse timeout"));
}

#[tokio::test]
async fn budget_exhaustion_returns_partial_context() {
    let names: Vec<String> = (0..6).map(|i| format!("m{i}.py")).collect();
    let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x = 1\n")).collect();
    let mut fs = MemoryFs::with_files(&files);
    for name in &names {
        fs = fs.delay(name, Duration::from_millis(60));
    }
    let config = EngineConfig {
        worker_count: 1,
        analysis_budget_ms: 100,
        ..EngineConfig::default()
    };
    let engine = engine_over(fs, config);

    let context = engine.analyze_project(ROOT).await.expect("analyze");
    let completion = context.completion();
    assert_eq!(completion.status, CompletionStatus::BudgetExceeded);
    assert_eq!(completion.total_files, 6);
    assert!(completion.parsed_files >= 1 && completion.parsed_files < 6);
    assert!(completion.ratio < 1.0);
    assert!(context.count_in(FileLifecycle::Unparsed) >= 1);
}

#[tokio::test]
async fn cancelled_analysis_publishes_unparsed_files() {
    let fs = MemoryFs::with_files(&[("a.py", "x = 1\n"), ("b.py", "y = 2\n")]);
    let engine = engine_over(fs, EngineConfig::default());
    let token = CancellationToken::new();
    token.cancel();

    let context = engine
        .analyze_project_with_cancel(ROOT, token)
        .await
        .expect("analyze");
    assert_eq!(context.completion().status, CompletionStatus::Cancelled);
    assert_eq!(context.completion().parsed_files, 0);
    assert_eq!(engine.file_state("a.py"), Some(FileLifecycle::Unparsed));
}

#[tokio::test]
async fn file_reports_parsing_while_in_flight() {
    let gate = Arc::new(Semaphore::new(0));
    let fs = MemoryFs::with_files(&[("a.py", "x = 1\n")]).gated("a.py", gate.clone());
    let engine = engine_over(fs, EngineConfig::default());

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.update_context(vec![FileChange::touched("a.py")]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.file_state("a.py"), Some(FileLifecycle::Parsing));

    gate.add_permits(1);
    task.await.expect("join").expect("update");
    assert_eq!(engine.file_state("a.py"), Some(FileLifecycle::ParsedOk));
}

#[tokio::test]
async fn queued_updates_for_one_path_coalesce() {
    let gate = Arc::new(Semaphore::new(0));
    let fs = MemoryFs::with_files(&[("slow.py", "x = 1\n")]).gated("slow.py", gate.clone());
    let engine = engine_over(fs, EngineConfig::default());

    let blocker = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.update_context(vec![FileChange::touched("slow.py")]).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let stale = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_context(vec![FileChange::modified("x.py", "class Old:\n    pass\n")])
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let fresh = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .update_context(vec![FileChange::modified("x.py", "class New:\n    pass\n")])
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    gate.add_permits(1);
    blocker.await.expect("join").expect("blocker");
    let stale = stale.await.expect("join").expect("stale");
    let fresh = fresh.await.expect("join").expect("fresh");

    assert_eq!(stale.outcome("x.py"), Some(&UpdateOutcome::Superseded));
    assert!(!stale.committed);
    assert!(fresh.committed);
    let graph = engine.get_current_context();
    assert!(graph.graph().contains("x.py::New"));
    assert!(!graph.graph().contains("x.py::Old"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_half_applied_batch() {
    const WIDGETS: usize = 8;
    const ROUNDS: u64 = 24;

    let mut files = vec![("hub.java".to_string(), "class Hub {}\n".to_string())];
    for i in 0..WIDGETS {
        files.push((format!("W{i}.java"), format!("class W{i} {{}}\n")));
    }
    let borrowed: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let engine = engine_over(MemoryFs::with_files(&borrowed), EngineConfig::default());
    engine.analyze_project(ROOT).await.expect("analyze");

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for round in 1..=ROUNDS {
                let body = if round % 2 == 1 { "Hub hub;" } else { "" };
                let batch = (0..WIDGETS)
                    .map(|i| FileChange::modified(format!("W{i}.java"), format!("class W{i} {{ {body} }}\n")))
                    .collect();
                let report = engine.update_context(batch).await.expect("update");
                assert!(report.committed);
            }
        })
    };

    let reader = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut observed = 0usize;
            loop {
                let snapshot = engine.get_current_context();
                let version = snapshot.version();
                let dependents = snapshot.graph().dependents("hub.java::Hub").len();
                let expected = if (version - 1) % 2 == 1 { WIDGETS } else { 0 };
                assert_eq!(dependents, expected, "torn snapshot at version {version}");
                observed += 1;
                if version == ROUNDS + 1 {
                    return observed;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.expect("writer");
    let observed = reader.await.expect("reader");
    assert!(observed >= 1);
}
