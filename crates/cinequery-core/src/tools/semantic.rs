//! Similarity search tool.
//!
//! Embeds the query through an OpenAI-compatible `/embeddings` endpoint and
//! scores it by cosine similarity against a prebuilt SQLite index of
//! description vectors (f32 little-endian blobs). Building the index is a
//! separate pipeline; this adapter only reads it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::SetupError;

const EMBED_TIMEOUT: Duration = Duration::from_secs(15);
/// Snippet clip for returned descriptions.
const SNIPPET_CHARS: usize = 280;

pub struct SemanticSearch {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    index_path: PathBuf,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// One ranked hit returned to the planner loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
    pub id: String,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub score: f32,
}

impl SemanticSearch {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        index_path: &Path,
    ) -> Result<Self, SetupError> {
        let http = reqwest::Client::builder().timeout(EMBED_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            index_path: index_path.to_path_buf(),
        })
    }

    pub async fn run(
        &self,
        query: &str,
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Value, String> {
        if !self.index_path.is_file() {
            return Err(format!(
                "similarity index not found at {}",
                self.index_path.display()
            ));
        }

        let query_vector = self.embed(query).await?;
        debug!(query, limit, "scoring similarity index");

        let index_path = self.index_path.clone();
        let filter = source_filter.map(str::to_string);
        let hits = tokio::task::spawn_blocking(move || {
            score_index(&index_path, &query_vector, limit, filter.as_deref())
        })
        .await
        .map_err(|e| format!("similarity task failed: {e}"))??;

        serde_json::to_value(hits).map_err(|e| format!("failed to serialize hits: {e}"))
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>, String> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [query],
        };

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("embedding request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("embedding endpoint returned HTTP {status}: {body}"));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| format!("embedding response malformed: {e}"))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| "embedding response is empty".to_string())
    }
}

fn score_index(
    index_path: &Path,
    query_vector: &[f32],
    limit: usize,
    source_filter: Option<&str>,
) -> Result<Vec<SemanticHit>, String> {
    let conn = Connection::open_with_flags(index_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format!("failed to open similarity index: {e}"))?;

    let (sql, params): (&str, Vec<&dyn rusqlite::ToSql>) = match &source_filter {
        Some(source) => (
            "SELECT id, title, description, source, vector FROM embeddings WHERE source = ?1",
            vec![source as &dyn rusqlite::ToSql],
        ),
        None => (
            "SELECT id, title, description, source, vector FROM embeddings",
            vec![],
        ),
    };

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| format!("similarity index schema error: {e}"))?;
    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })
        .map_err(|e| format!("similarity index read error: {e}"))?;

    let mut scored: Vec<SemanticHit> = Vec::new();
    for row in rows {
        let (id, title, description, source, blob) =
            row.map_err(|e| format!("similarity index read error: {e}"))?;
        let vector = decode_vector(&blob);
        if vector.len() != query_vector.len() {
            // Index built with a different embedding model; skip the row.
            continue;
        }
        scored.push(SemanticHit {
            id,
            title,
            snippet: clip(&description, SNIPPET_CHARS),
            source,
            score: cosine_similarity(query_vector, &vector),
        });
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    Ok(scored)
}

/// Decode an f32 little-endian blob; trailing partial chunks are dropped.
pub(crate) fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
    }
}
