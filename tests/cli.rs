use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("course1_script.txt"),
        "Course Title: Building Towards Computer Use\n\
         Course Link: https://example.com/computer-use\n\
         Course Instructor: Colt Steele\n\
         \n\
         Lesson 0: Introduction\n\
         Lesson Link: https://example.com/computer-use/0\n\
         Welcome to the course on computer use with Claude.\n\
         \n\
         Lesson 1: Working with the API\n\
         Making requests to the Messages API with the Python SDK.\n",
    )
    .unwrap();
    fs::write(
        docs.join("course2_script.txt"),
        "Course Title: MCP: Build Rich-Context AI Apps\n\
         Course Link: https://example.com/mcp\n\
         Course Instructor: Elie Schoppik\n\
         \n\
         Lesson 0: Why MCP\n\
         The Model Context Protocol standardizes how applications provide context.\n",
    )
    .unwrap();
    fs::write(docs.join("notes.pdf"), "not a course").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[chunking]
chunk_size = 200
chunk_overlap = 20

[retrieval]
max_results = 3

[embedding]
provider = "hash"
dims = 64

[store]
backend = "sqlite"
path = "{}/data/course-rag.sqlite"
"#,
        root.display()
    );
    let config_path = config_dir.join("course-rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_cli(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_course-rag"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("ANTHROPIC_API_KEY")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run course-rag binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn docs_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("docs")
}

#[test]
fn test_courses_on_empty_store() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_cli(&config, &["courses"]);
    assert!(ok, "courses failed: {}", stderr);
    assert!(stdout.contains("courses: 0"));
}

#[test]
fn test_ingest_then_courses() {
    let (_tmp, config) = setup_test_env();
    let docs = docs_dir(&config);

    let (stdout, stderr, ok) = run_cli(&config, &["ingest", docs.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("courses added: 2"), "got: {}", stdout);

    let (stdout, _, ok) = run_cli(&config, &["courses"]);
    assert!(ok);
    assert!(stdout.contains("courses: 2"));
    assert!(stdout.contains("Building Towards Computer Use"));
    assert!(stdout.contains("MCP: Build Rich-Context AI Apps"));
}

#[test]
fn test_second_ingest_skips_known_courses() {
    let (_tmp, config) = setup_test_env();
    let docs = docs_dir(&config);

    let (_, _, ok) = run_cli(&config, &["ingest", docs.to_str().unwrap()]);
    assert!(ok);
    let (stdout, _, ok) = run_cli(&config, &["ingest", docs.to_str().unwrap()]);
    assert!(ok);
    assert!(stdout.contains("courses added: 0"));
    assert!(stdout.contains("chunks added:  0"));

    let (stdout, _, ok) = run_cli(&config, &["ingest", docs.to_str().unwrap(), "--clear"]);
    assert!(ok);
    assert!(stdout.contains("courses added: 2"));

    let (stdout, _, _) = run_cli(&config, &["courses"]);
    assert!(stdout.contains("courses: 2"));
}

#[test]
fn test_ingest_missing_folder_adds_nothing() {
    let (tmp, config) = setup_test_env();
    let missing = tmp.path().join("nope");
    let (stdout, stderr, ok) = run_cli(&config, &["ingest", missing.to_str().unwrap()]);
    assert!(ok, "ingest failed: {}", stderr);
    assert!(stdout.contains("courses added: 0"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup_test_env();
    fs::write(&config, "[embedding]\nprovider = \"telepathy\"\n").unwrap();
    let (_, stderr, ok) = run_cli(&config, &["courses"]);
    assert!(!ok);
    assert!(stderr.contains("Unknown embedding provider"));
}

#[test]
fn test_query_without_api_key_fails_cleanly() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_cli(&config, &["query", "What is MCP?"]);
    assert!(!ok);
    assert!(stderr.contains("ANTHROPIC_API_KEY"), "got: {}", stderr);
}
