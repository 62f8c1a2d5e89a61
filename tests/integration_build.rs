#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests for the build pipeline against a mock Ollama server
// Run with: cargo test --test integration_build

use anyhow::Result;
use lexrag::LexragError;
use lexrag::builder::{BuildSummary, IndexBuilder};
use lexrag::config::{Config, CorpusConfig, OllamaConfig};
use lexrag::index::FlatIndex;
use lexrag::metadata::MetadataStore;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TEST_MODEL: &str = "all-minilm:latest";
const TEST_DIMENSION: u32 = 64;

/// Deterministic stand-in for a real embedding model: hash the text, then
/// expand the hash into a fixed-dimension vector. Equal texts always map to
/// equal vectors, and the vectors are deliberately not unit length so the
/// client's normalization is exercised.
fn fake_embedding(text: &str) -> Vec<f32> {
    let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    });

    std::iter::repeat_with(|| {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
    })
    .take(TEST_DIMENSION as usize)
    .collect()
}

/// Responds to `/api/embed` the way Ollama does: one embedding per input
/// text, in request order.
struct EmbeddingResponder;

impl Respond for EmbeddingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
            return ResponseTemplate::new(400);
        };
        let Some(input) = body.get("input").and_then(Value::as_array) else {
            return ResponseTemplate::new(400);
        };

        let embeddings: Vec<Vec<f32>> = input
            .iter()
            .map(|text| fake_embedding(text.as_str().unwrap_or_default()))
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

async fn start_mock_ollama() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "models": [{ "name": TEST_MODEL }] })),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(EmbeddingResponder)
        .mount(&server)
        .await;

    server
}

fn test_config(base: &Path, server: &MockServer) -> Config {
    Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: server.address().ip().to_string(),
            port: server.address().port(),
            model: TEST_MODEL.to_string(),
            batch_size: 4,
            embedding_dimension: TEST_DIMENSION,
        },
        corpus: CorpusConfig {
            laws_dir: base.join("laws"),
            qa_dir: base.join("qa"),
        },
        base_dir: base.to_path_buf(),
        ..Config::default()
    }
}

/// Config for tests that must fail before any request is made.
fn offline_config(base: &Path) -> Config {
    Config {
        corpus: CorpusConfig {
            laws_dir: base.join("laws"),
            qa_dir: base.join("qa"),
        },
        base_dir: base.to_path_buf(),
        ..Config::default()
    }
}

fn write_collection(dir: &Path, file_name: &str, records: &Value) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(dir.join(file_name), serde_json::to_string(records)?)?;
    Ok(())
}

fn section_record(section: &str, title: &str, description: &str) -> Value {
    json!({ "section": section, "title": title, "description": description })
}

fn sample_sections() -> Value {
    json!([
        section_record(
            "9",
            "Courts to try all civil suits unless barred",
            "The Courts shall have jurisdiction to try all suits of a civil nature \
             excepting suits of which their cognizance is either expressly or impliedly barred."
        ),
        section_record(
            "10",
            "Stay of suit",
            "No Court shall proceed with the trial of any suit in which the matter in issue \
             is also directly and substantially in issue in a previously instituted suit \
             between the same parties."
        ),
        section_record(
            "11",
            "Res judicata",
            "No Court shall try any suit or issue in which the matter directly and \
             substantially in issue has been heard and finally decided in a former suit \
             between the same parties."
        ),
    ])
}

/// The embedding calls block, so they run off the async test runtime to keep
/// the mock server responsive.
async fn build_index(config: Config) -> lexrag::Result<BuildSummary> {
    tokio::task::spawn_blocking(move || IndexBuilder::new(config)?.build())
        .await
        .expect("build task panicked")
}

#[tokio::test]
async fn build_persists_aligned_pair() -> Result<()> {
    let temp = TempDir::new()?;
    let server = start_mock_ollama().await;
    let config = test_config(temp.path(), &server);

    let mut records = sample_sections();
    let list = records.as_array_mut().expect("fixture is a list");
    // No description: dropped during normalization.
    list.push(json!({ "section": "12", "title": "Bar to further suit" }));
    // Renders to exactly 20 characters, at the short-text threshold.
    list.push(section_record("1", "x", "y"));
    write_collection(&config.corpus.laws_dir, "cpc.json", &records)?;

    let summary = build_index(config.clone()).await?;

    assert_eq!(summary.documents, 3, "Should index the three full sections");
    assert_eq!(summary.collections, 1);
    assert_eq!(summary.skipped_records, 2);
    assert_eq!(summary.skipped_files, 0);

    let index = FlatIndex::load(&config.vectors_path())?;
    assert_eq!(index.len(), 3);
    assert_eq!(index.model(), TEST_MODEL);
    assert_eq!(index.dimension(), TEST_DIMENSION as usize);

    let metadata = MetadataStore::load(&config.metadata_path())?;
    assert_eq!(metadata.len(), 3, "One metadata entry per indexed vector");

    let ids: Vec<u32> = metadata.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, [0, 1, 2], "Ids are assigned in scan order");
    for (_, meta) in metadata.iter() {
        assert_eq!(meta.file, "cpc.json");
        assert!(meta.text.starts_with("[cpc] Section "));
    }

    // The file on disk keys entries by decimal id strings.
    let raw: Value = serde_json::from_str(&fs::read_to_string(config.metadata_path())?)?;
    let entries = raw.as_object().expect("metadata file holds a JSON object");
    assert_eq!(entries.len(), 3);
    assert!(entries.contains_key("0") && entries.contains_key("1") && entries.contains_key("2"));

    Ok(())
}

#[tokio::test]
async fn build_merges_directories_in_order() -> Result<()> {
    let temp = TempDir::new()?;
    let server = start_mock_ollama().await;
    let config = test_config(temp.path(), &server);

    write_collection(
        &config.corpus.laws_dir,
        "cpc.json",
        &json!([section_record(
            "11",
            "Res judicata",
            "No Court shall try any suit or issue in which the matter directly and \
             substantially in issue has been heard and finally decided in a former suit \
             between the same parties."
        )]),
    )?;
    write_collection(
        &config.corpus.laws_dir,
        "crpc.json",
        &json!([{
            "chapter": "5",
            "section": "41",
            "section_title": "When police may arrest without warrant",
            "section_desc": "Any police officer may without an order from a Magistrate and \
                             without a warrant, arrest any person who has been concerned in \
                             any cognizable offence."
        }]),
    )?;
    write_collection(
        &config.corpus.laws_dir,
        "ipc.json",
        &json!([{
            "chapter": "16",
            "chapter_title": "Of Offences Affecting the Human Body",
            "section_title": "Punishment for murder",
            "section_desc": "Whoever commits murder shall be punished with death, or \
                             imprisonment for life, and shall also be liable to fine."
        }]),
    )?;
    write_collection(
        &config.corpus.qa_dir,
        "constitution_qa.json",
        &json!([{
            "question": "What does Article 21 of the Constitution guarantee?",
            "answer": "No person shall be deprived of his life or personal liberty except \
                       according to procedure established by law."
        }]),
    )?;

    let summary = build_index(config.clone()).await?;

    assert_eq!(summary.documents, 4);
    assert_eq!(summary.collections, 4);
    assert_eq!(summary.skipped_records, 0);

    // Statute files in lexicographic order, then the Q&A directory.
    let metadata = MetadataStore::load(&config.metadata_path())?;
    let files: Vec<&str> = metadata.iter().map(|(_, meta)| meta.file.as_str()).collect();
    assert_eq!(
        files,
        ["cpc.json", "crpc.json", "ipc.json", "constitution_qa.json"]
    );

    let texts: Vec<&str> = metadata.iter().map(|(_, meta)| meta.text.as_str()).collect();
    assert!(texts[0].starts_with("[cpc] Section 11: Res judicata"));
    assert!(texts[1].starts_with("[crpc] Chapter 5, Section 41:"));
    assert!(texts[2].starts_with("[ipc] Chapter 16: Of Offences Affecting the Human Body"));
    assert!(texts[3].starts_with("[constitution_qa] Q: What does Article 21"));

    Ok(())
}

#[test]
fn build_fails_on_empty_corpus() -> Result<()> {
    let temp = TempDir::new()?;
    let config = offline_config(temp.path());
    fs::create_dir_all(&config.corpus.laws_dir)?;
    fs::create_dir_all(&config.corpus.qa_dir)?;

    let builder = IndexBuilder::new(config.clone())?;
    let err = builder
        .build()
        .expect_err("build must fail when nothing survives normalization");

    assert!(
        matches!(err, LexragError::EmptyCorpus(_)),
        "unexpected error: {err:?}"
    );
    assert!(
        !config.index_dir().exists(),
        "an empty corpus must not publish anything"
    );

    Ok(())
}

#[tokio::test]
async fn build_tolerates_unparseable_and_unknown_files() -> Result<()> {
    let temp = TempDir::new()?;
    let server = start_mock_ollama().await;
    let config = test_config(temp.path(), &server);

    write_collection(&config.corpus.laws_dir, "cpc.json", &sample_sections())?;
    // Unknown collection: parsed, but every record is skipped.
    write_collection(
        &config.corpus.laws_dir,
        "bns.json",
        &json!([
            section_record("101", "Culpable homicide", "Whoever causes death by doing an act \
                            with the intention of causing death commits culpable homicide."),
            section_record("103", "Punishment for murder", "Whoever commits murder shall be \
                            punished with death or imprisonment for life."),
        ]),
    )?;
    fs::write(config.corpus.laws_dir.join("broken.json"), "{ \"section\":")?;
    fs::write(
        config.corpus.laws_dir.join("object.json"),
        r#"{"sections": []}"#,
    )?;
    fs::write(
        config.corpus.laws_dir.join("notes.md"),
        "scratch notes, not part of the corpus",
    )?;

    let summary = build_index(config.clone()).await?;

    assert_eq!(summary.documents, 3, "Only the cpc sections are indexed");
    assert_eq!(summary.collections, 2, "cpc and the unknown bns both parse");
    assert_eq!(summary.skipped_records, 2, "Both bns records are skipped");
    assert_eq!(
        summary.skipped_files, 2,
        "The unparseable and non-list files are counted, the .md file is not"
    );

    let metadata = MetadataStore::load(&config.metadata_path())?;
    for (_, meta) in metadata.iter() {
        assert_eq!(meta.file, "cpc.json");
    }

    Ok(())
}

#[tokio::test]
async fn rebuild_replaces_previous_pair() -> Result<()> {
    let temp = TempDir::new()?;
    let server = start_mock_ollama().await;
    let config = test_config(temp.path(), &server);

    let mut records = sample_sections();
    let list = records.as_array_mut().expect("fixture is a list");
    let third = list.pop().expect("fixture has three records");
    write_collection(&config.corpus.laws_dir, "cpc.json", &records)?;

    let first = build_index(config.clone()).await?;
    assert_eq!(first.documents, 2);

    // Grow the corpus and rebuild over the published pair.
    records
        .as_array_mut()
        .expect("fixture is a list")
        .push(third);
    write_collection(&config.corpus.laws_dir, "cpc.json", &records)?;

    let second = build_index(config.clone()).await?;
    assert_eq!(second.documents, 3);

    let index = FlatIndex::load(&config.vectors_path())?;
    assert_eq!(index.len(), 3, "The old pair is fully replaced");
    let metadata = MetadataStore::load(&config.metadata_path())?;
    assert_eq!(metadata.len(), 3);

    let index_dir = config.index_dir();
    assert!(
        !index_dir.with_file_name("index.staging").exists(),
        "No staging directory is left behind"
    );
    assert!(
        !index_dir.with_file_name("index.old").exists(),
        "No retired directory is left behind"
    );

    Ok(())
}

#[tokio::test]
async fn qa_records_require_question_and_answer() -> Result<()> {
    let temp = TempDir::new()?;
    let server = start_mock_ollama().await;
    let config = test_config(temp.path(), &server);

    write_collection(
        &config.corpus.qa_dir,
        "constitution_qa.json",
        &json!([
            {
                "question": "Which Article abolishes untouchability?",
                "answer": "Article 17 abolishes untouchability and forbids its practice \
                           in any form."
            },
            { "question": "Which Article defines the State?" },
            { "question": "", "answer": "Article 14 guarantees equality before the law." },
        ]),
    )?;

    let summary = build_index(config.clone()).await?;

    assert_eq!(summary.documents, 1);
    assert_eq!(summary.skipped_records, 2, "Both incomplete pairs are skipped");

    let metadata = MetadataStore::load(&config.metadata_path())?;
    let entry = metadata.get(0)?;
    assert!(entry.text.starts_with("[constitution_qa] Q: Which Article abolishes"));

    Ok(())
}
