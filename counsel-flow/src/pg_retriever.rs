//! pgvector-backed retriever over a drug monograph table.

use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    error::{CounselError, Result},
    retrieval::{Passage, RetrievalResult, Retriever},
};

/// Retriever backed by a Postgres table with a pgvector embedding column.
///
/// Expected schema: `drug_monographs(drug_name text, section text,
/// source text, content text, embedding vector)`.
pub struct PgVectorRetriever {
    pool: sqlx::PgPool,
    table: String,
}

impl PgVectorRetriever {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self {
            pool,
            table: "drug_monographs".to_string(),
        })
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// Generate an embedding for the query text using fastembed.
async fn embed_query(text: &str) -> anyhow::Result<Vec<f32>> {
    let input = text.to_owned();

    // Off-load the ONNX inference to a blocking thread so we don't obstruct
    // Tokio's async scheduler.
    let embedding = tokio::task::spawn_blocking(move || {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )?;
        let embeddings = model.embed(vec![input], None)?;
        Ok::<Vec<f32>, anyhow::Error>(embeddings.into_iter().next().unwrap())
    })
    .await??;

    Ok(embedding)
}

#[async_trait]
impl Retriever for PgVectorRetriever {
    async fn search(&self, query: &str, top_k: usize) -> Result<RetrievalResult> {
        info!(top_k, "searching knowledge base");

        let embedding = embed_query(query)
            .await
            .map_err(|e| CounselError::RetrievalFailed(format!("embedding failed: {e}")))?;

        // Build a literal vector representation suitable for pgvector.
        let vector_literal = embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT drug_name, section, source, content,                    \
                    embedding <-> ARRAY[{vector_literal}]::vector AS distance \
             FROM {}                                                          \
             ORDER BY distance                                                \
             LIMIT {top_k}",
            self.table
        );

        let rows = sqlx::query_as::<_, (String, String, String, String, f64)>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CounselError::RetrievalFailed(format!("database query failed: {e}")))?;

        info!("retrieved {} passages", rows.len());

        let passages = rows
            .into_iter()
            .map(|(drug_name, section, source, content, distance)| Passage {
                text: content,
                metadata: json!({
                    "drug_name": drug_name,
                    "section": section,
                    "source": source,
                }),
                score: distance as f32,
            })
            .collect();

        Ok(RetrievalResult::from_passages(passages))
    }
}
