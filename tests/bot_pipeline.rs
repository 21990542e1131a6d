// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fs;
use tempfile::TempDir;

use lexbot::answer::NOT_FOUND_ANSWER;
use lexbot::bot::{BotState, Degradation, LegalAdvisorBot};
use lexbot::completion::CompletionBackend;
use lexbot::config::BotConfig;
use lexbot::embedding::{ChunkConfig, EmbeddingBackend};
use lexbot::index::{IndexOrigin, VectorIndex};

const LAW: &str = "Section 5 defines contract formation requirements.\n\n\
Section 12 sets the penalties for breach of a lease agreement.\n\n\
Section 30 describes how a tenant may terminate a tenancy.";

const REFUSE: &str = "cat > /dev/null; echo 'Information not available in the provided context.'";

fn config(dir: &TempDir, completion: &str) -> BotConfig {
    let mut config = BotConfig::offline(dir.path().join("law.txt"), dir.path().join("index"));
    config.chunking = ChunkConfig::new(80, 10).unwrap();
    config.embeddings = EmbeddingBackend::Hashing { dimension: 96 };
    config.completion = CompletionBackend::Command {
        command: completion.to_string(),
    };
    config
}

#[test]
fn builds_persists_and_reloads() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("law.txt"), LAW).unwrap();
    let config = config(&dir, "sed -n '/^Context:/,/^Question:/p'");

    let bot = LegalAdvisorBot::new(config.clone());
    assert_eq!(bot.state(), &BotState::Ready);
    assert_eq!(bot.index_origin(), Some(&IndexOrigin::Built));
    let built = bot.index().unwrap().clone();
    let answer = bot.ask("What does Section 5 define?").unwrap();
    assert!(answer.contains("contract formation"), "{answer}");

    let reloaded = VectorIndex::load(&config.index_path, 96).unwrap();
    assert_eq!(reloaded.entries(), built.entries());
    let probe = built.entries()[1].vector.clone();
    let a = built.search(&probe, 2);
    let b = reloaded.search(&probe, 2);
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.chunk, y.chunk);
        assert!((x.score - y.score).abs() < 1e-6);
    }

    let again = LegalAdvisorBot::new(config);
    assert_eq!(again.index_origin(), Some(&IndexOrigin::Loaded));
}

#[test]
fn changed_document_is_reindexed() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("law.txt"), LAW).unwrap();
    let config = config(&dir, REFUSE);

    let first = LegalAdvisorBot::new(config.clone());
    let before = first.index().unwrap().len();
    drop(first);

    fs::write(
        dir.path().join("law.txt"),
        format!("{LAW}\n\nSection 44 explains how wills are witnessed."),
    )
    .unwrap();
    let second = LegalAdvisorBot::new(config);
    assert_eq!(second.index_origin(), Some(&IndexOrigin::Built));
    assert!(second.index().unwrap().len() > before);
    assert_eq!(second.ask("What is the capital of France?").unwrap(), NOT_FOUND_ANSWER);
}

#[test]
fn missing_document_keeps_persisted_index() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("law.txt"), LAW).unwrap();
    let config = config(&dir, "cat");

    let len = LegalAdvisorBot::new(config.clone()).index().unwrap().len();
    fs::remove_file(dir.path().join("law.txt")).unwrap();

    let bot = LegalAdvisorBot::new(config);
    assert_eq!(bot.index_origin(), Some(&IndexOrigin::Loaded));
    assert_eq!(bot.index().unwrap().len(), len);
    assert_eq!(bot.state(), &BotState::Ready);
}

/// Embedding command that answers the startup check and fails on real batches.
const FLAKY_EMBEDDER: &str = concat!(
    r#"input=$(cat); case "$input" in "#,
    r#"*'"embedding backend '*) echo '[[0.1,0.2,0.3]]' ;; *) exit 1 ;; esac"#,
);

#[test]
fn embedder_failing_during_build_degrades_to_placeholder() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("law.txt"), LAW).unwrap();
    let mut config = config(&dir, REFUSE);
    config.embeddings = EmbeddingBackend::Command {
        command: FLAKY_EMBEDDER.to_string(),
        model: "flaky".to_string(),
        dimension: 3,
        batch_size: 8,
    };

    let bot = LegalAdvisorBot::new(config.clone());
    assert_eq!(
        bot.state(),
        &BotState::Degraded(vec![Degradation::EmbeddingBackendUnavailable])
    );
    assert_eq!(bot.index_origin(), Some(&IndexOrigin::Built));
    assert_eq!(bot.index().unwrap().dimension(), 3);
    assert!(!config.index_path.join("index.sqlite").exists());

    assert_eq!(bot.ask("What does Section 5 define?").unwrap(), NOT_FOUND_ANSWER);
    assert_eq!(bot.memory().len(), 1);
}
