use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn kbchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kbchat");
    path
}

fn setup_test_env(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("alpha.pdf"), b"%PDF-1.4\nalpha handbook\n%%EOF").unwrap();
    fs::write(files_dir.join("notes.txt"), "plain text notes").unwrap();

    let config_content = format!(
        r#"[service]
base_url = "{}"
timeout_secs = 10

[knowledge_base]
id = "kb-test"

[agent]
id = "agent-test"

[chat]
suggested_queries = ["What is the refund policy?"]
"#,
        base_url
    );

    let config_path = config_dir.join("kbchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kbchat(config_path: &Path, args: &[&str], stdin: Option<&str>) -> (String, String, bool) {
    let binary = kbchat_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run kbchat binary at {:?}: {}", binary, e));

    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_kbchat_async(
    config_path: &Path,
    args: &[&str],
    stdin: Option<&str>,
) -> (String, String, bool) {
    let config_path = config_path.to_path_buf();
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let stdin = stdin.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_kbchat(&config_path, &args, stdin.as_deref())
    })
    .await
    .unwrap()
}

async fn mount_upload_and_ingest(server: &MockServer, ingest_body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "asset_ids": ["asset-alpha"]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/knowledge-bases/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ingest_body))
        .mount(server)
        .await;
}

async fn mount_answer(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/agents/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "response": {
                "status": "success",
                "result": {
                    "answer": "Refunds are issued within 30 days [1].",
                    "sources": [{
                        "citation_number": 1,
                        "document_name": "alpha.pdf",
                        "page_number": 4,
                        "excerpt": "within 30 days"
                    }],
                    "confidence": 0.85,
                    "related_questions": ["How do I request one?"]
                }
            }
        })))
        .mount(server)
        .await;
}

#[test]
fn test_init_writes_config_once() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("config").join("kbchat.toml");

    let (_, stderr, success) = run_kbchat(&config_path, &["init"], None);
    assert!(success, "init failed: {}", stderr);
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[knowledge_base]"));

    let (_, stderr, success) = run_kbchat(&config_path, &["init"], None);
    assert!(!success);
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_kbchat(&config_path, &["ask", "hello"], None);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, config_path) = setup_test_env("ftp://kb.example.com");
    let (_, stderr, success) = run_kbchat(&config_path, &["ask", "hello"], None);
    assert!(!success);
    assert!(stderr.contains("base_url"), "stderr: {}", stderr);
    drop(tmp);
}

#[test]
fn test_upload_skips_non_pdf() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let notes = tmp.path().join("files").join("notes.txt");

    let (stdout, stderr, success) =
        run_kbchat(&config_path, &["upload", notes.to_str().unwrap()], None);
    assert!(success, "upload failed: {}", stderr);
    assert!(stdout.contains("No PDF files to upload."), "stdout: {}", stdout);
}

#[test]
fn test_upload_missing_file_fails() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let missing = tmp.path().join("files").join("missing.pdf");

    let (_, _, success) = run_kbchat(&config_path, &["upload", missing.to_str().unwrap()], None);
    assert!(!success);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_reports_ready_document() {
    let server = MockServer::start().await;
    mount_upload_and_ingest(&server, json!({ "success": true })).await;
    let (tmp, config_path) = setup_test_env(&server.uri());
    let alpha = tmp.path().join("files").join("alpha.pdf");
    let notes = tmp.path().join("files").join("notes.txt");

    let (stdout, stderr, success) = run_kbchat_async(
        &config_path,
        &["upload", alpha.to_str().unwrap(), notes.to_str().unwrap()],
        None,
    )
    .await;

    assert!(success, "upload failed: {}", stderr);
    assert!(stdout.contains("alpha.pdf"), "stdout: {}", stdout);
    assert!(!stdout.contains("notes.txt"), "stdout: {}", stdout);
    assert!(
        stdout.contains("1 document(s): 1 ready, 0 uploading, 0 failed"),
        "stdout: {}",
        stdout
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_reports_ingest_failure() {
    let server = MockServer::start().await;
    mount_upload_and_ingest(&server, json!({ "success": false, "error": "quota exceeded" })).await;
    let (tmp, config_path) = setup_test_env(&server.uri());
    let alpha = tmp.path().join("files").join("alpha.pdf");

    let (stdout, stderr, success) =
        run_kbchat_async(&config_path, &["upload", alpha.to_str().unwrap()], None).await;

    assert!(!success);
    assert!(stdout.contains("error: quota exceeded"), "stdout: {}", stdout);
    assert!(stderr.contains("1 of 1 document(s) failed"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_prints_cited_answer() {
    let server = MockServer::start().await;
    mount_answer(&server).await;
    let (_tmp, config_path) = setup_test_env(&server.uri());

    let (stdout, stderr, success) =
        run_kbchat_async(&config_path, &["ask", "What is the refund policy?"], None).await;

    assert!(success, "ask failed: {}", stderr);
    assert!(
        stdout.contains("Refunds are issued within 30 days [1: alpha.pdf, p. 4]."),
        "stdout: {}",
        stdout
    );
    assert!(stdout.contains("85% confidence (high)"), "stdout: {}", stdout);
    assert!(stdout.contains("1. How do I request one?"), "stdout: {}", stdout);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_with_service_down_prints_fallback() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    drop(server);
    let (_tmp, config_path) = setup_test_env(&base_url);

    let (stdout, stderr, success) = run_kbchat_async(&config_path, &["ask", "hello"], None).await;

    assert!(success, "ask failed: {}", stderr);
    assert!(
        stdout.contains("An error occurred while searching. Please try again."),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_ask_rejects_blank_query() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let (_, stderr, success) = run_kbchat(&config_path, &["ask", "   "], None);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"), "stderr: {}", stderr);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_session_with_suggestion_and_related() {
    let server = MockServer::start().await;
    mount_answer(&server).await;
    let (_tmp, config_path) = setup_test_env(&server.uri());

    let script = "/suggest\n/suggest 1\n/related 1\n/quit\n";
    let (stdout, stderr, success) = run_kbchat_async(&config_path, &["chat"], Some(script)).await;

    assert!(success, "chat failed: {}", stderr);
    assert!(stdout.contains("session session-"), "stdout: {}", stdout);
    assert!(stdout.contains("1. What is the refund policy?"), "stdout: {}", stdout);

    let queries = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/v1/agents/query")
        .map(|r| r.body_json::<serde_json::Value>().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["query"], "What is the refund policy?");
    assert_eq!(queries[1]["query"], "How do I request one?");
    assert_eq!(queries[0]["session_id"], queries[1]["session_id"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_waits_for_background_uploads() {
    let server = MockServer::start().await;
    mount_upload_and_ingest(&server, json!({ "success": true })).await;
    let (tmp, config_path) = setup_test_env(&server.uri());
    let alpha = tmp.path().join("files").join("alpha.pdf");

    let script = format!("/upload {}\n/quit\n", alpha.display());
    let (stdout, stderr, success) = run_kbchat_async(&config_path, &["chat"], Some(&script)).await;

    assert!(success, "chat failed: {}", stderr);
    assert!(stdout.contains("uploading 1 file(s)"), "stdout: {}", stdout);
    // Either the upload settled during the session or the exit wait caught it.
    let ingested = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .any(|r| r.url.path() == "/v1/knowledge-bases/ingest");
    assert!(ingested);
}
