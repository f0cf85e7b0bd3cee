//! # Knowledge Base (Tantivy + hashed embeddings)
//!
//! An in-memory agronomy corpus searched two ways: Tantivy full-text (BM25)
//! and cosine similarity over a hashed bag-of-words embedding. Scores are
//! blended with configurable weights, the same hybrid the retrieval pipeline
//! feeds into text generation.
//!
//! Documents are `.txt`/`.md` files chunked by paragraph with a maximum
//! chunk size and a small character overlap between neighbours.

use agrimind_core::config::ToolsConfig;
use agrimind_core::error::ToolError;
use agrimind_core::registry::{Tool, require_text_input};
use agrimind_core::types::ToolOutput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, STORED, Schema, TEXT, Value as _};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, doc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Minimum cosine similarity for a passage with no full-text hit to count.
const MIN_VECTOR_SCORE: f32 = 0.2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Settings for chunking and hybrid scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters repeated at the start of the next chunk.
    pub chunk_overlap: usize,
    /// Dimensionality of the hashed embedding.
    pub vector_dimensions: usize,
    pub full_text_weight: f32,
    pub vector_weight: f32,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
            vector_dimensions: 256,
            full_text_weight: 0.5,
            vector_weight: 0.5,
        }
    }
}

impl From<&ToolsConfig> for KnowledgeConfig {
    fn from(tools: &ToolsConfig) -> Self {
        Self {
            chunk_size: tools.chunk_size,
            chunk_overlap: tools.chunk_overlap,
            ..Self::default()
        }
    }
}

/// A retrieved passage with its component scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub source: String,
    pub content: String,
    pub full_text_score: f32,
    pub vector_score: f32,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Index error: {0}")]
    Index(String),
}

// ---------------------------------------------------------------------------
// Hashed embedder
// ---------------------------------------------------------------------------

/// A minimal bag-of-words embedder using term frequency.
#[derive(Debug, Clone)]
pub struct SimpleEmbedder {
    dimensions: usize,
}

impl SimpleEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Hash each lowercase word into a dimension, accumulate its term
    /// frequency, and L2-normalise the result.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            vector[djb2(term) % self.dimensions] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn djb2(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

/// Cosine similarity between two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Split text into paragraph-aligned chunks of at most `chunk_size` chars.
///
/// Paragraphs longer than `chunk_size` are cut into windows. Each new chunk
/// starts with the last `overlap` chars of the previous one when they fit.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let overlap = overlap.min(size / 2);

    let mut pieces = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let chars: Vec<char> = paragraph.chars().collect();
        if chars.len() <= size {
            pieces.push(paragraph.to_string());
            continue;
        }
        let step = size - overlap;
        let mut start = 0;
        while start < chars.len() {
            let end = (start + size).min(chars.len());
            pieces.push(chars[start..end].iter().collect::<String>());
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        let current_len = current.chars().count();
        let piece_len = piece.chars().count();
        if current.is_empty() {
            current = piece;
        } else if current_len + 2 + piece_len <= size {
            current.push_str("\n\n");
            current.push_str(&piece);
        } else {
            let tail = char_tail(&current, overlap).to_string();
            chunks.push(std::mem::take(&mut current));
            current = if !tail.is_empty() && tail.chars().count() + 1 + piece_len <= size {
                format!("{tail} {piece}")
            } else {
                piece
            };
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn char_tail(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

struct Chunk {
    source: String,
    content: String,
    embedding: Vec<f32>,
}

/// Hybrid full-text and vector index over chunked documents.
pub struct KnowledgeBase {
    config: KnowledgeConfig,
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    chunk_field: Field,
    content_field: Field,
    embedder: SimpleEmbedder,
    chunks: Vec<Chunk>,
    documents: usize,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("config", &self.config)
            .field("documents", &self.documents)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl KnowledgeBase {
    /// Create an empty knowledge base with an in-RAM index.
    pub fn new(config: KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let mut schema_builder = Schema::builder();
        let chunk_field = schema_builder.add_u64_field("chunk", STORED);
        let content_field = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KnowledgeError::Index(format!("Failed to create reader: {e}")))?;
        let writer = index
            .writer(50_000_000)
            .map_err(|e| KnowledgeError::Index(format!("Failed to create writer: {e}")))?;

        let embedder = SimpleEmbedder::new(config.vector_dimensions);
        Ok(Self {
            config,
            index,
            reader,
            writer,
            chunk_field,
            content_field,
            embedder,
            chunks: Vec::new(),
            documents: 0,
        })
    }

    /// Build a knowledge base from every `.txt`/`.md` file under `dir`.
    pub fn from_dir(dir: &Path, config: KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let mut kb = Self::new(config)?;
        kb.load_dir(dir)?;
        Ok(kb)
    }

    /// Chunk and index one document. Returns the number of chunks added.
    pub fn add_document(&mut self, source: &str, text: &str) -> Result<usize, KnowledgeError> {
        let pieces = chunk_text(text, self.config.chunk_size, self.config.chunk_overlap);
        if pieces.is_empty() {
            return Ok(0);
        }
        let added = pieces.len();
        for content in pieces {
            let position = self.chunks.len() as u64;
            self.writer
                .add_document(doc!(
                    self.chunk_field => position,
                    self.content_field => content.as_str(),
                ))
                .map_err(|e| KnowledgeError::Index(format!("Failed to add document: {e}")))?;
            let embedding = self.embedder.embed(&content);
            self.chunks.push(Chunk {
                source: source.to_string(),
                content,
                embedding,
            });
        }
        self.writer
            .commit()
            .map_err(|e| KnowledgeError::Index(format!("Failed to commit: {e}")))?;
        self.reader
            .reload()
            .map_err(|e| KnowledgeError::Index(format!("Failed to reload reader: {e}")))?;
        self.documents += 1;
        debug!(source, chunks = added, "Indexed document");
        Ok(added)
    }

    /// Index every `.txt`/`.md` file under `dir`. Files that cannot be read as
    /// UTF-8 are skipped. Returns the number of files indexed.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, KnowledgeError> {
        let mut loaded = 0;
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "txt" | "md"))
                .unwrap_or(false);
            if !is_text {
                continue;
            }
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    continue;
                }
            };
            let source = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .display()
                .to_string();
            self.add_document(&source, &text)?;
            loaded += 1;
        }
        info!(dir = %dir.display(), documents = loaded, chunks = self.chunks.len(), "Loaded knowledge base");
        Ok(loaded)
    }

    /// Hybrid search: BM25 scores normalised by the best hit, blended with cosine similarity.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<Passage>, KnowledgeError> {
        if self.chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let text_scores = self.search_text(query)?;
        let best_text = text_scores.values().copied().fold(0.0f32, f32::max);
        let query_embedding = self.embedder.embed(query);

        let mut passages: Vec<Passage> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(position, chunk)| {
                let full_text_score = match text_scores.get(&position) {
                    Some(s) if best_text > 0.0 => s / best_text,
                    _ => 0.0,
                };
                let vector_score = cosine_similarity(&query_embedding, &chunk.embedding);
                if full_text_score <= 0.0 && vector_score < MIN_VECTOR_SCORE {
                    return None;
                }
                Some(Passage {
                    source: chunk.source.clone(),
                    content: chunk.content.clone(),
                    full_text_score,
                    vector_score,
                    score: full_text_score * self.config.full_text_weight
                        + vector_score * self.config.vector_weight,
                })
            })
            .collect();

        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passages.truncate(top_k);
        Ok(passages)
    }

    fn search_text(&self, query: &str) -> Result<HashMap<usize, f32>, KnowledgeError> {
        let terms: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        if terms.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.content_field]);
        let (parsed, errors) = parser.parse_query_lenient(&terms);
        if !errors.is_empty() {
            debug!(?errors, "Lenient query parse dropped terms");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(self.chunks.len()))
            .map_err(|e| KnowledgeError::Index(format!("Search failed: {e}")))?;

        let mut scores = HashMap::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| KnowledgeError::Index(format!("Failed to retrieve doc: {e}")))?;
            if let Some(position) = doc.get_first(self.chunk_field).and_then(|v| v.as_u64()) {
                scores.insert(position as usize, score);
            }
        }
        Ok(scores)
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn config(&self) -> &KnowledgeConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// KnowledgeSearchTool
// ---------------------------------------------------------------------------

/// Retrieves the most relevant passages from the knowledge base.
pub struct KnowledgeSearchTool {
    kb: Arc<KnowledgeBase>,
    top_k: usize,
}

impl KnowledgeSearchTool {
    pub fn new(kb: Arc<KnowledgeBase>, top_k: usize) -> Self {
        Self {
            kb,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the agronomy knowledge base (crop guides, pest and disease manuals, \
         government schemes). Input is a question or keywords; returns the most relevant passages."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Question or keywords to search for" },
                "top_k": { "type": "integer", "description": "Number of passages to return", "default": self.top_k }
            },
            "required": ["input"]
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = require_text_input(self.name(), &args)?;
        let top_k = args
            .get("top_k")
            .and_then(|v| v.as_u64())
            .map(|k| k.clamp(1, 20) as usize)
            .unwrap_or(self.top_k);

        if self.kb.is_empty() {
            warn!("Knowledge search on an empty knowledge base");
        }
        let passages = self
            .kb
            .search(&query, top_k)
            .map_err(|e| ToolError::ExecutionFailed {
                name: self.name().to_string(),
                message: e.to_string(),
            })?;

        if passages.is_empty() {
            return Ok(ToolOutput::text("No relevant passages found.")
                .with_metadata("passages", serde_json::json!(0)));
        }

        let body = passages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "[{}] ({}, score {:.2})\n{}",
                    i + 1,
                    p.source,
                    p.score,
                    p.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources: Vec<&str> = passages.iter().map(|p| p.source.as_str()).collect();

        Ok(ToolOutput::text(body)
            .with_metadata("passages", serde_json::json!(passages.len()))
            .with_metadata("sources", serde_json::json!(sources)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new(KnowledgeConfig::default()).unwrap();
        kb.add_document(
            "wheat.md",
            "Wheat is sown between 1 and 15 November in north India.\n\n\
             Yellow rust appears as stripes of yellow pustules on wheat leaves. \
             Spray propiconazole at first sign of rust.",
        )
        .unwrap();
        kb.add_document(
            "rice.md",
            "Transplant rice seedlings when they are 25 days old.\n\n\
             Brown planthopper is controlled by draining the field and avoiding excess nitrogen.",
        )
        .unwrap();
        kb
    }

    #[test]
    fn test_embedder_normalised() {
        let embedder = SimpleEmbedder::new(64);
        let v = embedder.embed("wheat wheat rust");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embedder_empty_text() {
        let v = SimpleEmbedder::new(16).embed("  ...  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_chunk_text_paragraphs_merge_until_full() {
        let chunks = chunk_text("one\n\ntwo\n\nthree", 100, 0);
        assert_eq!(chunks, vec!["one\n\ntwo\n\nthree".to_string()]);

        let chunks = chunk_text("aaaa\n\nbbbb\n\ncccc", 10, 0);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn test_chunk_text_long_paragraph_windows() {
        let text = "x".repeat(25);
        let chunks = chunk_text(&text, 10, 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= 25);
    }

    #[test]
    fn test_chunk_text_overlap_carries_tail() {
        let chunks = chunk_text("alpha beta\n\ngamma delta", 20, 4);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with("beta"));
    }

    #[test]
    fn test_chunk_text_empty() {
        assert!(chunk_text("\n\n  \n\n", 100, 10).is_empty());
    }

    #[test]
    fn test_search_ranks_relevant_chunk_first() {
        let kb = sample_kb();
        let results = kb.search("how to control yellow rust in wheat", 3).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].source, "wheat.md");
        assert!(results[0].content.contains("rust"));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_search_respects_top_k() {
        let kb = sample_kb();
        assert!(kb.search("wheat rice", 1).unwrap().len() <= 1);
        assert!(kb.search("wheat", 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_unrelated_query_is_empty() {
        let kb = sample_kb();
        assert!(kb.search("zzzz qqqq", 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_tolerates_query_syntax() {
        let kb = sample_kb();
        assert!(kb.search("wheat: \"rust\" (AND) -", 3).is_ok());
    }

    #[test]
    fn test_load_dir_filters_extensions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("maize.txt"), "Maize needs 500 mm of rain.").unwrap();
        std::fs::create_dir(dir.path().join("pests")).unwrap();
        std::fs::write(dir.path().join("pests/aphids.md"), "Aphids suck sap.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let kb = KnowledgeBase::from_dir(dir.path(), KnowledgeConfig::default()).unwrap();
        assert_eq!(kb.document_count(), 2);
        assert_eq!(kb.chunk_count(), 2);
        let hits = kb.search("aphids", 3).unwrap();
        assert!(hits[0].source.ends_with("aphids.md"));
    }

    #[test]
    fn test_load_dir_skips_unreadable_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a_maize.txt"), "Maize needs 500 mm of rain.").unwrap();
        // "caf\xe9" in Latin-1 is not valid UTF-8.
        std::fs::write(dir.path().join("b_latin1.txt"), b"Sorgho du caf\xe9 au champ").unwrap();
        std::fs::write(dir.path().join("c_millet.md"), "Pearl millet tolerates drought.").unwrap();

        let kb = KnowledgeBase::from_dir(dir.path(), KnowledgeConfig::default()).unwrap();
        assert_eq!(kb.document_count(), 2);
        assert_eq!(kb.chunk_count(), 2);
        let hits = kb.search("millet drought", 3).unwrap();
        assert!(hits[0].source.ends_with("c_millet.md"));
    }

    #[tokio::test]
    async fn test_tool_formats_numbered_passages() {
        let tool = KnowledgeSearchTool::new(Arc::new(sample_kb()), 2);
        let output = tool
            .execute(serde_json::json!({"input": "when is wheat sown"}))
            .await
            .unwrap();
        assert!(output.content.starts_with("[1] (wheat.md, score "));
        assert!(output.content.contains("November"));
        assert!(output.metadata["passages"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_tool_no_results() {
        let kb = KnowledgeBase::new(KnowledgeConfig::default()).unwrap();
        let tool = KnowledgeSearchTool::new(Arc::new(kb), 3);
        let output = tool
            .execute(serde_json::json!({"input": "wheat"}))
            .await
            .unwrap();
        assert_eq!(output.content, "No relevant passages found.");
    }

    #[tokio::test]
    async fn test_tool_requires_input() {
        let tool = KnowledgeSearchTool::new(Arc::new(sample_kb()), 3);
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
