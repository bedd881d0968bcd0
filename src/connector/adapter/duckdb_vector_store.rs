use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection, Row};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::VectorStore;
use crate::domain::{
    Chunk, ChunkKind, DomainError, Embedding, Language, SearchQuery, SearchResult,
};

pub struct DuckdbVectorStore {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
}

impl DuckdbVectorStore {
    pub fn new(path: &Path, dimensions: usize) -> Result<Self, DomainError> {
        let conn = Connection::open(path)
            .map_err(|e| DomainError::store(format!("Failed to open DuckDB database: {}", e)))?;
        Self::initialize(&conn, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        })
    }

    pub fn in_memory(dimensions: usize) -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::store(format!("Failed to open DuckDB in-memory DB: {}", e))
        })?;
        Self::initialize(&conn, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
        })
    }

    /// Returns a clone of the shared connection Arc so the LLM cache table can
    /// live in the same database file. DuckDB allows only one write connection
    /// per file.
    pub fn shared_connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn initialize(conn: &Connection, dimensions: usize) -> Result<(), DomainError> {
        debug!("Initializing DuckDB chunk table ({} dims)", dimensions);

        // VSS must be loaded before the vector column type is usable.
        conn.execute_batch(
            "INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;",
        )
        .map_err(|e| DomainError::store(format!("Failed to initialize VSS extension: {}", e)))?;

        let schema_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                language TEXT NOT NULL,
                chunk_type TEXT NOT NULL,
                name TEXT,
                content TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                docstring TEXT,
                parent_name TEXT,
                metadata TEXT NOT NULL,
                vector FLOAT[{dim}] NOT NULL
            );

            CREATE INDEX IF NOT EXISTS chunk_id_idx ON chunks (id);
            CREATE INDEX IF NOT EXISTS chunk_file_path_idx ON chunks (file_path);
            CREATE INDEX IF NOT EXISTS chunk_vector_hnsw_idx ON chunks USING HNSW (vector) WITH (metric = 'cosine');
            "#,
            dim = dimensions
        );

        conn.execute_batch(&schema_sql)
            .map_err(|e| DomainError::store(format!("Failed to initialize DuckDB schema: {}", e)))?;

        Ok(())
    }

    fn vector_to_array_literal(&self, vector: &[f32]) -> Result<String, DomainError> {
        if vector.len() != self.dimensions {
            return Err(DomainError::invalid_input(format!(
                "Expected embedding dimension {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", self.dimensions));
        Ok(s)
    }

    fn row_to_chunk(row: &Row) -> Result<Chunk, duckdb::Error> {
        let metadata_raw: String = row.get(10)?;
        let metadata: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&metadata_raw).unwrap_or_default();

        Ok(Chunk::reconstitute(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            Language::parse(&row.get::<_, String>(2)?),
            ChunkKind::parse(&row.get::<_, String>(3)?),
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, Option<String>>(9)?,
            row.get::<_, String>(5)?,
            u32::try_from(row.get::<_, i64>(6)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(7)?).unwrap_or(0),
            metadata,
        ))
    }

    const SELECT_COLUMNS: &'static str = "id, file_path, language, chunk_type, name, content, \
         start_line, end_line, docstring, parent_name, metadata";
}

/// Opens the per-repository DuckDB store under `<repo>/.deepwiki/`.
pub struct DuckdbStoreProvider {
    dimensions: usize,
}

impl DuckdbStoreProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl crate::application::StoreProvider for DuckdbStoreProvider {
    async fn open(
        &self,
        repo_path: &Path,
    ) -> Result<std::sync::Arc<dyn VectorStore>, DomainError> {
        let db_dir = repo_path.join(crate::application::use_cases::DEEPWIKI_DIR);
        tokio::fs::create_dir_all(&db_dir).await?;
        let db_path = db_dir.join(&crate::config::current().output.vector_db_name);
        let dimensions = self.dimensions;

        let store = tokio::task::spawn_blocking(move || DuckdbVectorStore::new(&db_path, dimensions))
            .await
            .map_err(|e| DomainError::internal(format!("Store open task failed: {}", e)))??;
        Ok(std::sync::Arc::new(store))
    }
}

#[async_trait]
impl VectorStore for DuckdbVectorStore {
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if chunks.len() != embeddings.len() {
            return Err(DomainError::invalid_input(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::store(format!("Failed to begin transaction: {}", e)))?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let metadata = serde_json::to_string(chunk.metadata())
                .map_err(|e| DomainError::store(format!("Failed to serialize metadata: {}", e)))?;
            let array_lit = self.vector_to_array_literal(embedding.vector())?;
            // The array literal is inlined because DuckDB's fixed-size FLOAT[n]
            // type does not accept a bound parameter. Values come from the
            // embedder, never from user input.
            let sql = format!(
                "INSERT OR REPLACE INTO chunks \
                 (id, file_path, language, chunk_type, name, content, start_line, end_line, \
                  docstring, parent_name, metadata, vector) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, {})",
                array_lit
            );
            tx.execute(
                &sql,
                params![
                    chunk.id(),
                    chunk.file_path(),
                    chunk.language().as_str(),
                    chunk.kind().as_str(),
                    chunk.name(),
                    chunk.content(),
                    chunk.start_line() as i64,
                    chunk.end_line() as i64,
                    chunk.docstring(),
                    chunk.parent_name(),
                    metadata,
                ],
            )
            .map_err(|e| {
                DomainError::store(format!("Failed to upsert chunk {}: {}", chunk.id(), e))
            })?;
        }

        tx.commit()
            .map_err(|e| DomainError::store(format!("Failed to commit: {}", e)))?;

        debug!("Upserted {} chunks", chunks.len());
        Ok(())
    }

    async fn delete_by_files(&self, paths: &[String]) -> Result<u64, DomainError> {
        if paths.is_empty() {
            return Ok(0);
        }

        let quoted = paths
            .iter()
            .map(|p| format!("'{}'", p.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.conn.lock().await;
        let deleted = conn
            .execute(
                &format!("DELETE FROM chunks WHERE file_path IN ({})", quoted),
                [],
            )
            .map_err(|e| DomainError::store(format!("Failed to delete chunks by file: {}", e)))?;

        debug!("Deleted {} chunks across {} files", deleted, paths.len());
        Ok(deleted as u64)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let array_lit = self.vector_to_array_literal(query_vector)?;

        let mut sql = format!(
            "SELECT {cols}, 1.0 - array_cosine_distance(vector, {arr}) AS score FROM chunks",
            cols = Self::SELECT_COLUMNS,
            arr = array_lit,
        );

        // Filters are enum-derived strings, validated long before this point.
        let mut where_clauses: Vec<String> = Vec::new();
        if let Some(language) = query.language() {
            where_clauses.push(format!("language = '{}'", language.as_str()));
        }
        if let Some(kind) = query.kind() {
            where_clauses.push(format!("chunk_type = '{}'", kind.as_str()));
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(vector, {arr}) LIMIT ?",
            arr = array_lit
        ));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::store(format!("Failed to prepare search: {}", e)))?;
        let mut rows = stmt
            .query(params![query.limit() as i64])
            .map_err(|e| DomainError::store(format!("Failed to run search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read search row: {}", e)))?
        {
            let score: f32 = row
                .get(11)
                .map_err(|e| DomainError::store(format!("Failed to read score: {}", e)))?;
            if let Some(min) = query.min_score() {
                if score < min {
                    continue;
                }
            }
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::store(format!("Failed to parse chunk row: {}", e)))?;
            results.push(SearchResult::new(chunk, score));
        }
        Ok(results)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Chunk>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM chunks WHERE id = ? LIMIT 1",
                Self::SELECT_COLUMNS
            ))
            .map_err(|e| DomainError::store(format!("Failed to prepare lookup: {}", e)))?;
        let mut rows = stmt
            .query(params![id])
            .map_err(|e| DomainError::store(format!("Failed to run lookup: {}", e)))?;

        match rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read lookup row: {}", e)))?
        {
            Some(row) => Ok(Some(Self::row_to_chunk(row).map_err(|e| {
                DomainError::store(format!("Failed to parse chunk row: {}", e))
            })?)),
            None => Ok(None),
        }
    }

    async fn get_by_file(&self, path: &str) -> Result<Vec<Chunk>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM chunks WHERE file_path = ? ORDER BY start_line, id",
                Self::SELECT_COLUMNS
            ))
            .map_err(|e| DomainError::store(format!("Failed to prepare file lookup: {}", e)))?;
        let mut rows = stmt
            .query(params![path])
            .map_err(|e| DomainError::store(format!("Failed to run file lookup: {}", e)))?;

        let mut chunks = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read file row: {}", e)))?
        {
            chunks.push(Self::row_to_chunk(row).map_err(|e| {
                DomainError::store(format!("Failed to parse chunk row: {}", e))
            })?);
        }
        Ok(chunks)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| DomainError::store(format!("Failed to count chunks: {}", e)))?;
        Ok(count as u64)
    }

    async fn list_files(&self) -> Result<Vec<String>, DomainError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT DISTINCT file_path FROM chunks ORDER BY file_path")
            .map_err(|e| DomainError::store(format!("Failed to prepare file listing: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DomainError::store(format!("Failed to list files: {}", e)))?;

        let mut files = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::store(format!("Failed to read file row: {}", e)))?
        {
            files.push(
                row.get::<_, String>(0)
                    .map_err(|e| DomainError::store(format!("Failed to read file path: {}", e)))?,
            );
        }
        Ok(files)
    }
}
