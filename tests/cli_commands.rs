// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

const LAW: &str = "THE CONTRACT ACT\n\n\
Section 5 defines contract formation requirements. An offer and an acceptance are both required.\n\n\
Section 12 sets the penalties for breach of a lease agreement.\x0c\
Section 30 describes how a tenant may terminate a tenancy with one month of notice.\n";

/// Completion stub that answers with the context block of the prompt.
const ECHO_CONTEXT: &str = "sed -n '/^Context:/,/^Question:/p'";

/// Completion stub that always refuses.
const REFUSE: &str = "cat > /dev/null; echo 'Information not available in the provided context.'";

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn write_config(root: &Path, completion: &str) {
    write_file(
        &root.join(".lexbotrc.toml"),
        &format!(
            r#"
[corpus]
document = "law.txt"

[index]
path = "idx"

[embeddings]
provider = "hashing"
dimension = 128
chunk_size = 120
chunk_overlap = 20

[completion]
{completion}
"#
        ),
    );
}

fn setup(completion: &str) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("law.txt"), LAW);
    write_config(dir.path(), completion);
    dir
}

fn command_completion(command: &str) -> String {
    let escaped = command.replace('\\', "\\\\").replace('"', "\\\"");
    format!("provider = \"command\"\ncommand = \"{}\"", escaped)
}

fn lexbot(root: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("lexbot");
    cmd.current_dir(root)
        .env("NO_COLOR", "1")
        .env_remove("LEXBOT_LOG")
        .env_remove("GROQ_API_KEY");
    cmd
}

fn json_stdout(cmd: &mut assert_cmd::Command) -> Value {
    let assert = cmd.assert().success();
    serde_json::from_slice(&assert.get_output().stdout).expect("json output")
}

#[test]
fn index_builds_then_loads() {
    let dir = setup("provider = \"unavailable\"");

    lexbot(dir.path())
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed"));
    assert!(dir.path().join("idx").join("index.sqlite").exists());

    let report = json_stdout(lexbot(dir.path()).args(["--format", "json", "index"]));
    assert_eq!(report["origin"], "loaded");
    assert_eq!(report["dimension"], 128);
    assert_eq!(report["model"], "hashing-v1");
    assert!(report["entries"].as_u64().unwrap() >= 3);

    let report = json_stdout(lexbot(dir.path()).args(["--format", "json", "index", "--force"]));
    assert_eq!(report["origin"], "built");
}

#[test]
fn index_without_document_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "provider = \"unavailable\"");

    lexbot(dir.path())
        .arg("index")
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not build an index"));
    assert!(!dir.path().join("idx").exists());
}

#[test]
fn ask_answers_from_context() {
    let dir = setup(&command_completion(ECHO_CONTEXT));

    lexbot(dir.path())
        .args(["ask", "What", "does", "Section", "5", "define?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("contract formation"));
}

#[test]
fn ask_reports_missing_information() {
    let dir = setup(&command_completion(REFUSE));

    lexbot(dir.path())
        .args(["ask", "What is the capital of France?"])
        .assert()
        .success()
        .stdout("Information not available in the provided context.\n");
}

#[test]
fn ask_without_api_key_apologizes() {
    let dir = setup("provider = \"chat\"");

    let result = json_stdout(lexbot(dir.path()).args([
        "--format",
        "json",
        "ask",
        "What does Section 12 cover?",
    ]));
    assert_eq!(result["kind"], "service_unavailable");
    assert!(result["answer"].as_str().unwrap().starts_with("Sorry"));
    assert!(result["state"]
        .as_str()
        .unwrap()
        .contains("completion-service-unavailable"));
    let sources = result["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["source"], "law.txt");
}

#[test]
fn ask_with_sources_shows_pages() {
    let dir = setup(&command_completion(ECHO_CONTEXT));

    lexbot(dir.path())
        .args(["ask", "--sources", "How may a tenant terminate a tenancy?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("law.txt p.2"));
}

#[test]
fn cli_paths_override_config() {
    let dir = setup("provider = \"unavailable\"");
    write_file(&dir.path().join("other").join("act.txt"), "Section 9 governs wills.");

    let report = json_stdout(lexbot(dir.path()).args([
        "--format",
        "json",
        "--document",
        "other/act.txt",
        "--index",
        "other/idx",
        "index",
    ]));
    assert_eq!(report["entries"], 1);
    assert!(dir.path().join("other/idx/index.sqlite").exists());
    assert!(!dir.path().join("idx").exists());
}

#[test]
fn status_reports_empty_knowledge_base() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "provider = \"unavailable\"");

    lexbot(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("degraded"))
        .stdout(predicate::str::contains("knowledge-base-empty"))
        .stdout(predicate::str::contains("origin:     fallback"));

    let status = json_stdout(lexbot(dir.path()).args(["--format", "json", "status"]));
    assert_eq!(status["state"], "degraded");
    assert_eq!(status["entries"], 1);
    assert_eq!(status["completion_service"], "unavailable");
    let reasons: Vec<&str> = status["degradations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(
        reasons,
        vec!["completion-service-unavailable", "knowledge-base-empty"]
    );
}

#[test]
fn status_ready_with_working_backends() {
    let dir = setup(&command_completion(REFUSE));

    let status = json_stdout(lexbot(dir.path()).args(["--format", "json", "status"]));
    assert_eq!(status["state"], "ready");
    assert_eq!(status["index_origin"], "built");
    assert_eq!(status["completion_service"], "command");
}

#[test]
fn chat_records_transcript() {
    let dir = setup(&command_completion(REFUSE));

    lexbot(dir.path())
        .args(["chat", "--transcript"])
        .write_stdin("What is a tort?\n\nWho signs a lease?\nexit\nnever asked\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("transcript (2 turns)"))
        .stdout(predicate::str::contains("Q: What is a tort?"))
        .stdout(predicate::str::contains("Q: Who signs a lease?"))
        .stdout(predicate::str::contains("never asked").not());
}

#[test]
fn chat_json_emits_one_line_per_turn() {
    let dir = setup(&command_completion(REFUSE));

    let assert = lexbot(dir.path())
        .args(["--format", "json", "chat"])
        .write_stdin("first question\nsecond question\n")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let turns: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[1]["question"], "second question");
    assert_eq!(turns[1]["kind"], "not_found");
}

#[test]
fn completions_generate_script() {
    let dir = TempDir::new().expect("tempdir");
    lexbot(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lexbot"));
}
