use assert_cmd::Command;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

#[allow(deprecated)]
fn run_cli(args: &[&str]) -> (bool, Value) {
    let output = Command::cargo_bin("context-engine")
        .expect("binary")
        .arg("--quiet")
        .args(args)
        .output()
        .expect("command run");
    let body = if output.stdout.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&output.stdout).expect("valid json")
    };
    (output.status.success(), body)
}

fn setup_repo() -> tempfile::TempDir {
    let temp = tempdir().expect("tempdir");
    let src = temp.path().join("src");
    fs::create_dir_all(&src).expect("mkdir");
    fs::write(src.join("A.java"), "public class A extends B {}\n").expect("write");
    fs::write(src.join("B.java"), "public class B extends A {}\n").expect("write");
    fs::write(
        src.join("Hello.java"),
        "public class HelloWorld { public static void main(String[] args) { System.out.println(\"Hello, World!\"); } }\n",
    )
    .expect("write");
    temp
}

#[test]
fn analyze_reports_completion_and_statistics() {
    let temp = setup_repo();
    let root = temp.path().to_string_lossy().to_string();

    let (ok, body) = run_cli(&["analyze", &root]);
    assert!(ok, "body: {body}");
    assert_eq!(body["completion"]["status"], "complete");
    assert_eq!(body["completion"]["parsed_files"], 3);
    assert_eq!(body["statistics"]["circular_dependency_count"], 1);
    assert_eq!(body["files"]["src/Hello.java"], "parsed_ok");
}

#[test]
fn cycles_and_deps_use_qualified_ids() {
    let temp = setup_repo();
    let root = temp.path().to_string_lossy().to_string();

    let (ok, body) = run_cli(&["cycles", &root]);
    assert!(ok);
    assert_eq!(body["count"], 1);
    let mut members: Vec<String> = body["cycles"][0]
        .as_array()
        .expect("cycle")
        .iter()
        .map(|v| v.as_str().expect("id").to_string())
        .collect();
    members.sort();
    assert_eq!(members, vec!["src/A.java::A", "src/B.java::B"]);

    let (ok, body) = run_cli(&["deps", &root, "src/A.java::A"]);
    assert!(ok);
    assert_eq!(body["dependencies"], serde_json::json!(["src/B.java::B"]));
    assert_eq!(body["dependents"], serde_json::json!(["src/B.java::B"]));

    let (ok, _) = run_cli(&["deps", &root, "src/A.java::Missing"]);
    assert!(!ok);
}

#[test]
fn parse_prints_the_parse_result() {
    let temp = setup_repo();
    let file = temp.path().join("src/Hello.java");

    let (ok, body) = run_cli(&["parse", &file.to_string_lossy()]);
    assert!(ok);
    assert_eq!(body["successful"], true);
    assert_eq!(body["language"], "java");
    assert_eq!(body["errors"], serde_json::json!([]));
}

#[test]
fn related_ranks_exact_names_first() {
    let temp = setup_repo();
    let root = temp.path().to_string_lossy().to_string();

    let (ok, body) = run_cli(&["related", &root, "helloworld", "--limit", "3"]);
    assert!(ok);
    let results = body["results"].as_array().expect("results");
    assert!(!results.is_empty() && results.len() <= 3);
    assert_eq!(results[0]["id"], "src/Hello.java::HelloWorld");
    assert_eq!(results[0]["reason"]["type"], "exact_name");
}
