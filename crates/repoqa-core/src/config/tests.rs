use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 12] = [
    "REPOQA_LLM_BASE_URL",
    "REPOQA_LLM_MODEL",
    "REPOQA_LLM_EMBEDDING_MODEL",
    "REPOQA_LLM_TEMPERATURE",
    "REPOQA_LLM_MAX_TOKENS",
    "REPOQA_CHUNK_SIZE",
    "REPOQA_CHUNK_OVERLAP",
    "REPOQA_RETRIEVAL_K",
    "REPOQA_RETRIEVAL_MODE",
    "REPOQA_MMR_LAMBDA",
    "REPOQA_INDEX_SNAPSHOT",
    "REPOQA_OPENAI_API_KEY",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("repoqa.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    assert_eq!(config.llm.model, "gpt-4-1106-preview");
    assert_eq!(config.llm.embedding_model, "text-embedding-3-small");
    assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
    assert_eq!(config.llm.max_tokens, 1024);
    assert_eq!(config.timeouts.llm_seconds, 120);
    assert_eq!(config.timeouts.embedding_seconds, 30);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.chunking.chunk_size, 2000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.retrieval.k, 8);
    assert_eq!(config.retrieval.mode, RetrievalMode::Diverse);
    assert!((config.retrieval.mmr_lambda - 0.5).abs() < f32::EPSILON);
    assert_eq!(config.retrieval.fetch_k, 20);
    assert!(!config.retrieval.condense_question);
    assert_eq!(config.memory.fallback_turns, 4);
    assert_eq!(config.embedding.max_parallel, 4);
    assert_eq!(config.corpus.extensions, vec!["py".to_string()]);
    assert!(config.index.snapshot_path.is_none());
    assert!(config.secrets.openai_api_key.is_none());
    config.validate().unwrap();
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.retrieval.k, 8);
}

#[test]
#[serial]
fn parse_valid_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[llm]
base_url = "http://localhost:8080/v1"
model = "local-chat"
temperature = 0.2

[chunking]
chunk_size = 500
overlap = 50

[retrieval]
k = 4
mode = "similarity"
condense_question = true

[corpus]
extensions = ["py", "rs"]

[index]
snapshot_path = "/tmp/repoqa-index.json"
"#,
    );

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.base_url, "http://localhost:8080/v1");
    assert_eq!(config.llm.model, "local-chat");
    assert_eq!(config.llm.embedding_model, "text-embedding-3-small");
    assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.overlap, 50);
    assert_eq!(config.retrieval.k, 4);
    assert_eq!(config.retrieval.mode, RetrievalMode::Similarity);
    assert!(config.retrieval.condense_question);
    assert_eq!(config.corpus.extensions, vec!["py".to_string(), "rs".to_string()]);
    assert_eq!(
        config.index.snapshot_path,
        Some(PathBuf::from("/tmp/repoqa-index.json"))
    );
    config.validate().unwrap();
}

#[test]
#[serial]
fn empty_snapshot_path_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[index]\nsnapshot_path = \"\"\n");
    clear_env();
    let config = Config::load(&path).unwrap();
    assert!(config.index.snapshot_path.is_none());
}

#[test]
#[serial]
fn invalid_toml_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[retrieval]\nk = \"many\"\n");
    clear_env();
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("REPOQA_LLM_MODEL", "gpt-4o-mini");
        std::env::set_var("REPOQA_LLM_TEMPERATURE", "0.0");
        std::env::set_var("REPOQA_CHUNK_SIZE", "300");
        std::env::set_var("REPOQA_CHUNK_OVERLAP", "30");
        std::env::set_var("REPOQA_RETRIEVAL_K", "3");
        std::env::set_var("REPOQA_RETRIEVAL_MODE", "similarity");
        std::env::set_var("REPOQA_MMR_LAMBDA", "0.8");
        std::env::set_var("REPOQA_INDEX_SNAPSHOT", "index.json");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert!(config.llm.temperature.abs() < f32::EPSILON);
    assert_eq!(config.chunking.chunk_size, 300);
    assert_eq!(config.chunking.overlap, 30);
    assert_eq!(config.retrieval.k, 3);
    assert_eq!(config.retrieval.mode, RetrievalMode::Similarity);
    assert!((config.retrieval.mmr_lambda - 0.8).abs() < f32::EPSILON);
    assert_eq!(config.index.snapshot_path, Some(PathBuf::from("index.json")));
}

#[test]
#[serial]
fn env_override_invalid_values_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("REPOQA_RETRIEVAL_K", "lots");
        std::env::set_var("REPOQA_RETRIEVAL_MODE", "random");
        std::env::set_var("REPOQA_MMR_LAMBDA", "high");
    }

    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.retrieval.k, 8);
    assert_eq!(config.retrieval.mode, RetrievalMode::Diverse);
    assert!((config.retrieval.mmr_lambda - 0.5).abs() < f32::EPSILON);
}

#[test]
#[serial]
fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[retrieval]\nk = 4\n");
    clear_env();
    unsafe { std::env::set_var("REPOQA_RETRIEVAL_K", "6") };
    let config = Config::load(&path).unwrap();
    clear_env();
    assert_eq!(config.retrieval.k, 6);
}

#[test]
#[serial]
fn api_key_only_from_env() {
    clear_env();
    let mut config = Config::default();
    config.resolve_secrets();
    assert!(config.secrets.openai_api_key.is_none());

    unsafe { std::env::set_var("REPOQA_OPENAI_API_KEY", "sk-test") };
    config.resolve_secrets();
    clear_env();

    let key = config.secrets.openai_api_key.as_ref().unwrap();
    assert_eq!(key.expose(), "sk-test");
    assert_eq!(format!("{key:?}"), "[REDACTED]");
    assert!(!format!("{config:?}").contains("sk-test"));
}

#[test]
fn retrieval_mode_from_str() {
    assert_eq!("similarity".parse::<RetrievalMode>(), Ok(RetrievalMode::Similarity));
    assert_eq!("Diverse".parse::<RetrievalMode>(), Ok(RetrievalMode::Diverse));
    assert_eq!("mmr".parse::<RetrievalMode>(), Ok(RetrievalMode::Diverse));
    assert!("nearest".parse::<RetrievalMode>().is_err());
}

#[test]
fn search_mode_follows_retrieval_config() {
    let mut retrieval = RetrievalConfig::default();
    assert_eq!(
        retrieval.search_mode(),
        repoqa_memory::SearchMode::Diverse {
            lambda: 0.5,
            fetch_k: 20
        }
    );
    retrieval.mode = RetrievalMode::Similarity;
    assert_eq!(retrieval.search_mode(), repoqa_memory::SearchMode::Similarity);
}

#[test]
fn retry_policy_from_config() {
    let policy = RetryConfig::default().policy(30);
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay, std::time::Duration::from_millis(500));
    assert_eq!(policy.timeout, Some(std::time::Duration::from_secs(30)));
}

fn assert_invalid(config: &Config, needle: &str) {
    match config.validate() {
        Err(QaError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig mentioning {needle}, got {other:?}"),
    }
}

#[test]
fn validate_rejects_zero_chunk_size() {
    let mut config = Config::default();
    config.chunking.chunk_size = 0;
    assert_invalid(&config, "chunk_size");
}

#[test]
fn validate_rejects_overlap_not_below_size() {
    let mut config = Config::default();
    config.chunking.chunk_size = 100;
    config.chunking.overlap = 100;
    assert_invalid(&config, "chunk_overlap");
}

#[test]
fn validate_accepts_zero_overlap() {
    let mut config = Config::default();
    config.chunking.overlap = 0;
    config.validate().unwrap();
}

#[test]
fn validate_rejects_zero_k() {
    let mut config = Config::default();
    config.retrieval.k = 0;
    assert_invalid(&config, "retrieval.k");
}

#[test]
fn validate_rejects_zero_timeout() {
    let mut config = Config::default();
    config.timeouts.llm_seconds = 0;
    assert_invalid(&config, "timeouts.llm_seconds");

    let mut config = Config::default();
    config.timeouts.embedding_seconds = 0;
    assert_invalid(&config, "timeouts.embedding_seconds");
}

#[test]
fn validate_rejects_lambda_out_of_range() {
    let mut config = Config::default();
    config.retrieval.mmr_lambda = 1.5;
    assert_invalid(&config, "mmr_lambda");
    config.retrieval.mmr_lambda = f32::NAN;
    assert_invalid(&config, "mmr_lambda");
}

#[test]
fn validate_rejects_fetch_k_below_k() {
    let mut config = Config::default();
    config.retrieval.k = 10;
    config.retrieval.fetch_k = 5;
    assert_invalid(&config, "fetch_k");
}

#[test]
fn validate_rejects_bad_temperature() {
    let mut config = Config::default();
    config.llm.temperature = 2.5;
    assert_invalid(&config, "temperature");
}

#[test]
fn validate_rejects_empty_model() {
    let mut config = Config::default();
    config.llm.model = "  ".into();
    assert_invalid(&config, "llm.model");
}

#[test]
fn validate_rejects_zero_parallelism() {
    let mut config = Config::default();
    config.embedding.max_parallel = 0;
    assert_invalid(&config, "max_parallel");
}
