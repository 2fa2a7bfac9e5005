//! SQLite implementation of the article store.
//!
//! Embeddings are stored as little-endian `f64` BLOBs next to their chunk
//! rows; similarity search is cosine over the stored vectors and keyword
//! search is FTS5 BM25. All writes for one article happen in a single
//! transaction.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use super::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use super::{ArticleInfo, ArticleStore, ArticleUpsert, StoredArticle};
use crate::core::{ChunkMetadata, DocMatch, Feedback, SourceType};
use crate::embedding::{EMBEDDING_DIMENSIONS, EMBEDDING_MODEL, cosine_similarity};
use crate::error::StoreError;
use crate::telemetry::QaLog;

/// SQLite-backed article store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Opens an in-memory store (tests and ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Returns `true` if the schema has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    pub fn is_initialized(&self) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))?;
        Ok(count > 0)
    }

    /// Returns the stored schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not initialized.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let version: String = self.conn.query_row(GET_VERSION_SQL, [], |row| row.get(0))?;
        version
            .parse()
            .map_err(|_| StoreError::Migration(format!("bad schema version: {version}")))
    }

    /// Reads all chunk rows joined with their document and embedding.
    fn all_embedded_chunks(&self) -> Result<Vec<(DocMatch, Vec<f64>)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.content, c.ordinal, c.section_heading, c.index_run_id,
                    c.retrieval_program_version, c.created_at,
                    d.repo_slug, d.path, d.title, d.commit_sha,
                    e.embedding
             FROM chunk_embeddings e
             JOIN chunks c ON c.id = e.chunk_id
             JOIN documents d ON d.id = c.document_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(11)?;
            Ok((row_to_match(row, 0.0)?, blob))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (doc, blob) = row?;
            out.push((doc, decode_embedding(&blob)));
        }
        Ok(out)
    }
}

/// Maps a joined chunk row (columns as in [`SqliteStore::all_embedded_chunks`])
/// into a [`DocMatch`] with the given similarity.
fn row_to_match(row: &rusqlite::Row<'_>, similarity: f64) -> rusqlite::Result<DocMatch> {
    let created_at: i64 = row.get(6)?;
    Ok(DocMatch {
        id: row.get(0)?,
        content: row.get(1)?,
        metadata: ChunkMetadata {
            source_type: SourceType::Article,
            repo_slug: row.get(7)?,
            path: row.get(8)?,
            title: row.get(9)?,
            section_heading: row.get(3)?,
            commit_sha: row.get(10)?,
            indexed_at: DateTime::<Utc>::from_timestamp(created_at, 0).unwrap_or_default(),
            index_run_id: row.get(4)?,
            retrieval_program_version: row.get(5)?,
        },
        similarity,
    })
}

/// Serializes an embedding as a little-endian `f64` byte array.
fn encode_embedding(embedding: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 8);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Deserializes a little-endian `f64` byte array.
fn decode_embedding(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|window| {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(window);
            f64::from_le_bytes(buf)
        })
        .collect()
}

/// Serializes a unit enum variant to its serde string form.
fn enum_str<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

/// Builds an FTS5 MATCH expression from a free-text query: alphanumeric
/// tokens OR-ed together. Returns `None` when the query has no usable
/// tokens.
fn fts_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if tokens.is_empty() {
        return None;
    }
    Some(tokens.join(" OR "))
}

impl ArticleStore for SqliteStore {
    fn init(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        self.conn
            .execute(SET_VERSION_SQL, params![CURRENT_SCHEMA_VERSION.to_string()])?;
        Ok(())
    }

    fn upsert_chunks(&mut self, upsert: &ArticleUpsert<'_>) -> Result<usize, StoreError> {
        if upsert.chunks.len() != upsert.embeddings.len() {
            return Err(StoreError::EmbeddingCountMismatch {
                chunks: upsert.chunks.len(),
                embeddings: upsert.embeddings.len(),
            });
        }
        for embedding in upsert.embeddings {
            if embedding.len() != EMBEDDING_DIMENSIONS {
                return Err(StoreError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSIONS,
                    actual: embedding.len(),
                });
            }
        }

        let tx = self.conn.transaction()?;

        // Explicit chunk delete (rather than relying on the document
        // cascade) so the FTS delete trigger always fires.
        tx.execute(
            "DELETE FROM chunks WHERE document_id IN
               (SELECT id FROM documents WHERE repo_slug = ?1 AND path = ?2)",
            params![upsert.repo_slug, upsert.path],
        )?;
        tx.execute(
            "DELETE FROM documents WHERE repo_slug = ?1 AND path = ?2",
            params![upsert.repo_slug, upsert.path],
        )?;

        let now = Utc::now().timestamp();
        tx.execute(
            "INSERT INTO documents (repo_slug, path, title, commit_sha, content, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                upsert.repo_slug,
                upsert.path,
                upsert.title,
                upsert.commit_sha,
                upsert.content,
                now
            ],
        )?;
        let document_id = tx.last_insert_rowid();

        let mut written = 0_usize;
        {
            let mut chunk_stmt = tx.prepare(
                "INSERT INTO chunks (document_id, content, ordinal, section_heading,
                                     source_type, index_run_id, retrieval_program_version,
                                     created_at)
                 VALUES (?1, ?2, ?3, ?4, 'article', ?5, ?6, ?7)",
            )?;
            let mut embedding_stmt = tx.prepare(
                "INSERT INTO chunk_embeddings (chunk_id, embedding, dimensions, model_name)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (chunk, embedding) in upsert.chunks.iter().zip(upsert.embeddings.iter()) {
                chunk_stmt.execute(params![
                    document_id,
                    chunk.content,
                    chunk.ordinal as i64,
                    chunk.section_heading,
                    upsert.index_run_id,
                    upsert.retrieval_program_version,
                    now
                ])?;
                let chunk_id = tx.last_insert_rowid();
                embedding_stmt.execute(params![
                    chunk_id,
                    encode_embedding(embedding),
                    EMBEDDING_DIMENSIONS as i64,
                    EMBEDDING_MODEL
                ])?;
                written += 1;
            }
        }

        tx.commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        debug!(
            repo = upsert.repo_slug,
            path = upsert.path,
            chunks = written,
            "article upserted"
        );
        Ok(written)
    }

    fn delete_article(&mut self, repo_slug: &str, path: &str) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM chunks WHERE document_id IN
               (SELECT id FROM documents WHERE repo_slug = ?1 AND path = ?2)",
            params![repo_slug, path],
        )?;
        tx.execute(
            "DELETE FROM documents WHERE repo_slug = ?1 AND path = ?2",
            params![repo_slug, path],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    fn delete_by_run(&mut self, index_run_id: &str) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM chunks WHERE index_run_id = ?1",
            params![index_run_id],
        )?;
        Ok(removed)
    }

    fn match_docs(&self, query_embedding: &[f64], k: usize) -> Result<Vec<DocMatch>, StoreError> {
        if query_embedding.len() != EMBEDDING_DIMENSIONS {
            return Err(StoreError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                actual: query_embedding.len(),
            });
        }

        let mut scored: Vec<DocMatch> = self
            .all_embedded_chunks()?
            .into_iter()
            .map(|(mut doc, embedding)| {
                doc.similarity = cosine_similarity(query_embedding, &embedding);
                doc
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<DocMatch>, StoreError> {
        let Some(expression) = fts_expression(query) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.content, c.ordinal, c.section_heading, c.index_run_id,
                    c.retrieval_program_version, c.created_at,
                    d.repo_slug, d.path, d.title, d.commit_sha,
                    bm25(chunks_fts) AS score
             FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.rowid
             JOIN documents d ON d.id = c.document_id
             WHERE chunks_fts MATCH ?1
             ORDER BY score
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![expression, k as i64], |row| {
            let bm25: f64 = row.get(11)?;
            // bm25() is more negative for better matches; map into (0, 1]
            // monotonically.
            let normalized = bm25.abs() / (1.0 + bm25.abs());
            row_to_match(row, normalized)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn has_revision(
        &self,
        repo_slug: &str,
        path: &str,
        commit_sha: &str,
    ) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents
             WHERE repo_slug = ?1 AND path = ?2 AND commit_sha = ?3",
            params![repo_slug, path, commit_sha],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn article_content(
        &self,
        repo_slug: &str,
        path: &str,
    ) -> Result<Option<StoredArticle>, StoreError> {
        let article = self
            .conn
            .query_row(
                "SELECT repo_slug, path, title, commit_sha, content FROM documents
                 WHERE repo_slug = ?1 AND path = ?2",
                params![repo_slug, path],
                |row| {
                    Ok(StoredArticle {
                        repo_slug: row.get(0)?,
                        path: row.get(1)?,
                        title: row.get(2)?,
                        commit_sha: row.get(3)?,
                        content: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(article)
    }

    fn find_article_by_path(&self, path: &str) -> Result<Option<StoredArticle>, StoreError> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Ok(None);
        }
        let article = self
            .conn
            .query_row(
                "SELECT repo_slug, path, title, commit_sha, content FROM documents
                 WHERE path = ?1 OR path LIKE '%' || ?1
                 ORDER BY length(path)
                 LIMIT 1",
                params![trimmed],
                |row| {
                    Ok(StoredArticle {
                        repo_slug: row.get(0)?,
                        path: row.get(1)?,
                        title: row.get(2)?,
                        commit_sha: row.get(3)?,
                        content: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(article)
    }

    fn list_articles(&self) -> Result<Vec<ArticleInfo>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT repo_slug, path, title FROM documents ORDER BY repo_slug, path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ArticleInfo {
                repo_slug: row.get(0)?,
                path: row.get(1)?,
                title: row.get(2)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn chunk_count(&self, repo_slug: &str, path: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks c
             JOIN documents d ON d.id = c.document_id
             WHERE d.repo_slug = ?1 AND d.path = ?2",
            params![repo_slug, path],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn record_feedback(&mut self, feedback: &Feedback) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO feedback (request_id, label, user_id, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.request_id,
                enum_str(&feedback.label),
                feedback.user_id,
                enum_str(&feedback.source),
                feedback.created_at.timestamp()
            ],
        )?;
        Ok(())
    }

    fn log_request(&mut self, log: &QaLog) -> Result<(), StoreError> {
        let payload = serde_json::to_string(log)?;
        let citations = serde_json::to_string(&log.fetched_urls)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO qa_logs
               (request_id, team_id, channel_id, thread_ts, question, answer,
                citations, confidence, latency_ms, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                log.request_id,
                log.team_id,
                log.channel_id,
                log.thread_ts,
                log.question,
                log.final_text,
                citations,
                enum_str(&log.confidence),
                log.latency_ms as i64,
                payload,
                log.created_at.timestamp()
            ],
        )?;
        Ok(())
    }

    fn get_log(&self, request_id: &str) -> Result<Option<QaLog>, StoreError> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM qa_logs WHERE request_id = ?1",
                params![request_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
