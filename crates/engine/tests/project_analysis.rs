use context_engine::{
    CompletionStatus, ContextEngine, EngineConfig, EngineError, FileChange, FileLifecycle,
    RelatedCodeQuery, UpdateOutcome,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dirs");
    }
    std::fs::write(path, content).expect("write file");
}

fn sample_project() -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    write(root, "src/Base.java", "public class Base {}\n");
    write(
        root,
        "src/Child.java",
        "public class Child extends Base {\n    Helper helper;\n}\n",
    );
    write(root, "src/Broken.java", "public class Broken { public void method( { } }\n");
    write(root, "README.md", "# not source\n");
    temp
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn analyze_project_parses_every_source_file() {
    let temp = sample_project();
    let engine = ContextEngine::new(EngineConfig::default()).expect("engine");

    let context = engine.analyze_project(temp.path()).await.expect("analyze");
    assert_eq!(context.version(), 1);
    let completion = context.completion();
    assert_eq!(completion.status, CompletionStatus::Complete);
    assert_eq!((completion.total_files, completion.parsed_files), (3, 3));
    assert_eq!(completion.ratio, 1.0);

    let files: Vec<_> = context.files().keys().cloned().collect();
    assert_eq!(files, vec!["src/Base.java", "src/Broken.java", "src/Child.java"]);
    assert_eq!(
        engine.file_state("src/Base.java"),
        Some(FileLifecycle::ParsedOk)
    );
    assert_eq!(
        engine.file_state("src/Broken.java"),
        Some(FileLifecycle::ParsedWithErrors)
    );
    assert_eq!(engine.file_state("README.md"), None);

    let graph = context.graph();
    assert_eq!(
        graph.dependencies("src/Child.java::Child"),
        set(&["src/Base.java::Base"])
    );
    assert_eq!(
        graph.dependencies("src/Child.java::Child.helper"),
        set(&["Helper"])
    );
    assert!(graph.detect_cycles().is_empty());
}

#[tokio::test]
async fn touched_and_removed_files_patch_the_graph() {
    let temp = sample_project();
    let engine = ContextEngine::new(EngineConfig::default()).expect("engine");
    engine.analyze_project(temp.path()).await.expect("analyze");

    write(
        temp.path(),
        "src/Child.java",
        "public class Child extends Base {\n    Widget widget;\n}\n",
    );
    let report = engine
        .update_context(vec![FileChange::touched("src/Child.java")])
        .await
        .expect("update");
    assert!(report.committed);
    assert_eq!(report.version, 2);
    assert_eq!(
        report.outcome("src/Child.java"),
        Some(&UpdateOutcome::Parsed {
            lifecycle: FileLifecycle::ParsedOk
        })
    );
    let context = engine.get_current_context();
    assert!(!context.graph().contains("src/Child.java::Child.helper"));
    assert!(!context.graph().contains("Helper"));
    assert_eq!(
        context.graph().dependencies("src/Child.java::Child.widget"),
        set(&["Widget"])
    );

    let report = engine
        .update_context(vec![FileChange::removed("src/Base.java")])
        .await
        .expect("remove");
    assert_eq!(report.outcome("src/Base.java"), Some(&UpdateOutcome::Removed));
    let context = engine.get_current_context();
    assert_eq!(context.version(), 3);
    assert_eq!(
        engine.file_state("src/Base.java"),
        Some(FileLifecycle::Removed)
    );
    assert!(!context.graph().contains("src/Base.java::Base"));
    // The superclass reference now points at an unresolved placeholder.
    assert_eq!(
        context.graph().dependencies("src/Child.java::Child"),
        set(&["Base"])
    );
    assert_eq!(context.completion().total_files, 2);
}

#[tokio::test]
async fn absolute_and_dotted_update_paths_reuse_the_analysed_key() {
    let temp = sample_project();
    let engine = ContextEngine::new(EngineConfig::default()).expect("engine");
    engine.analyze_project(temp.path()).await.expect("analyze");

    write(temp.path(), "src/Base.java", "public class Base { Gadget gadget; }\n");
    let absolute = temp.path().join("src/Base.java");
    let report = engine
        .update_context(vec![
            FileChange::touched(absolute.to_string_lossy()),
            FileChange::modified("./src/Child.java", "public class Child extends Base {}\n"),
        ])
        .await
        .expect("update");
    assert!(report.committed);
    assert!(report.outcome("src/Base.java").is_some());
    assert!(report.outcome("src/Child.java").is_some());

    let context = engine.get_current_context();
    let files: Vec<_> = context.files().keys().cloned().collect();
    assert_eq!(files, vec!["src/Base.java", "src/Broken.java", "src/Child.java"]);
    let base_nodes: Vec<_> = context
        .graph()
        .nodes_in_file("src/Base.java")
        .into_iter()
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(base_nodes, vec!["src/Base.java::Base", "src/Base.java::Base.gadget"]);
    assert!(context
        .graph()
        .nodes_in_file(&absolute.to_string_lossy())
        .is_empty());
    assert_eq!(
        context.graph().dependencies("src/Child.java::Child"),
        set(&["src/Base.java::Base"])
    );
    assert_eq!(
        context.graph().dependencies("src/Base.java::Base.gadget"),
        set(&["Gadget"])
    );
    assert_eq!(context.completion().total_files, 3);
}

#[tokio::test]
async fn related_code_search_uses_names_and_neighbors() {
    let temp = sample_project();
    let engine = ContextEngine::new(EngineConfig::default()).expect("engine");
    engine.analyze_project(temp.path()).await.expect("analyze");

    let hits = engine.find_related_code(&RelatedCodeQuery::new("base"));
    let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids[0], "src/Base.java::Base");
    assert!(ids.contains(&"src/Child.java::Child"));
}

#[tokio::test]
async fn missing_root_is_rejected() {
    let temp = TempDir::new().expect("tempdir");
    let engine = ContextEngine::new(EngineConfig::default()).expect("engine");
    let err = engine
        .analyze_project(temp.path().join("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidPath(_)));
    assert_eq!(engine.get_current_context().version(), 0);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = EngineConfig {
        worker_count: 0,
        ..EngineConfig::default()
    };
    assert!(matches!(
        ContextEngine::new(config),
        Err(EngineError::Config(_))
    ));
}
