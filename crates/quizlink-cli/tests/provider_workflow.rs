//! End-to-end audit and generation runs against a mocked Anthropic endpoint.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHAPTER: &str = r#"{
  "id": "ch01",
  "name": "Sociology Basics",
  "order": 1,
  "concepts": [
    {"id": "ch01_t01", "term": "Socialization", "definition": "Learning the norms and values of a society."},
    {"id": "ch01_t02", "term": "Resocialization", "definition": "Replacing old norms and values with new ones."},
    {"id": "ch01_t03", "term": "Looking-Glass Self", "definition": "A self-image formed from how we imagine others see us."}
  ],
  "questions": [
    {
      "id": 1,
      "question_text": "A recruit at boot camp gives up civilian habits. This is:",
      "choices": ["Anticipatory socialization", "Resocialization", "Role strain", "Status set"],
      "correct_choice_index": 1
    },
    {
      "id": 2,
      "question_text": "Learning the values of one's society is called:",
      "choices": ["Socialization", "Deviance", "Anomie", "Stigma"],
      "correct_choice_index": 0
    }
  ]
}"#;

const GENERATED: &str = "1. A teenager changes her style after imagining how classmates judge her. Which idea does this illustrate?
a) Resocialization
*b) Looking-Glass Self
c) Anomie
d) Role strain
**Explanation:** Her self-image is shaped by how she believes others see her.

2. This question is missing a choice.
*a) One
b) Two
c) Three
";

fn quizlink() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("quizlink").unwrap();
    cmd.env_remove("QUIZLINK_ANTHROPIC_KEY")
        .env_remove("QUIZLINK_OPENAI_KEY")
        .env("RUST_LOG", "warn");
    cmd
}

fn anthropic_reply(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "content": [{"type": "text", "text": text}],
        "model": "claude-sonnet-4-20250514",
        "usage": {"input_tokens": 100, "output_tokens": 20}
    }))
}

fn workspace(server: &MockServer) -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = format!(
        r#"
data_dir = "data"
max_retries = 0
retry_delay_ms = 0
request_delay_ms = 0

[providers.anthropic]
type = "anthropic"
api_key = "test-key"
base_url = "{}"
"#,
        server.uri()
    );
    std::fs::write(dir.path().join("quizlink.toml"), config).unwrap();
    std::fs::create_dir_all(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data/ch01.json"), CHAPTER).unwrap();

    quizlink()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .success();
    dir
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn audit_then_apply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Questions to audit"))
        .respond_with(anthropic_reply("Q1: ch01_t02\nQ2: ch01_t03\nQ77: ch01_t01"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = workspace(&server);

    quizlink()
        .current_dir(dir.path())
        .arg("audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Audited 2 questions: 1 mismatches"));

    let report = read_json(&dir.path().join("data/audit_report.json"));
    assert_eq!(report["total_audited"], 2);
    assert_eq!(report["mismatches"][0]["question_id"], 2);
    assert_eq!(report["mismatches"][0]["current_link"], "ch01_t01");
    assert_eq!(report["mismatches"][0]["suggested_link"], "ch01_t03");
    assert_eq!(report["mismatches"][0]["suggested_term"], "Looking-Glass Self");

    let md = std::fs::read_to_string(dir.path().join("data/audit_report.md")).unwrap();
    assert!(md.contains("| Q2 | ch01_t01 (Socialization) | ch01_t03 (Looking-Glass Self) |"));

    quizlink()
        .current_dir(dir.path())
        .arg("apply-audit")
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 1 correction(s)"));

    let chapter = read_json(&dir.path().join("data/ch01.json"));
    assert_eq!(chapter["questions"][1]["primary_concept_id"], "ch01_t03");
}

#[tokio::test(flavor = "multi_thread")]
async fn audit_stops_on_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let dir = workspace(&server);

    quizlink()
        .current_dir(dir.path())
        .arg("audit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("authentication failed"));

    assert!(!dir.path().join("data/audit_report.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_and_merge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_string_contains("Concepts needing questions"))
        .and(body_string_contains("Looking-Glass Self"))
        .respond_with(anthropic_reply(GENERATED))
        .expect(1)
        .mount(&server)
        .await;

    let dir = workspace(&server);

    quizlink()
        .current_dir(dir.path())
        .args(["generate", "--output", "gen", "--merge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ch01_generated.md"))
        .stderr(predicate::str::contains("1 of 3 questions parsed"));

    let md = std::fs::read_to_string(dir.path().join("gen/ch01_generated.md")).unwrap();
    assert!(md.starts_with("Quiz title: Sociology Basics\nshuffle answers: true"));
    assert!(md.contains("*b) Looking-Glass Self"));

    let chapter = read_json(&dir.path().join("data/ch01.json"));
    let questions = chapter["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);
    assert_eq!(questions[2]["id"], 3);
    assert_eq!(questions[2]["primary_concept_id"], "ch01_t03");
    assert_eq!(
        chapter["concepts"][2]["associated_question_ids"],
        serde_json::json!([3])
    );

    // The gap is closed, so a second run does not call the model.
    quizlink()
        .current_dir(dir.path())
        .args(["generate", "--output", "gen"])
        .assert()
        .success()
        .stderr(predicate::str::contains("no gaps"));
}
