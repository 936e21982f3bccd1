use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use ccba_core::config::PostgresConfig;
use ccba_core::{Chunk, ChunkLevel, RetrievalResult, SparseVector};

use crate::{DocumentSummary, FilterExpr, StoreError, VectorStore};

const SELECT_COLUMNS: &str = "id, document_id, document_name, chapter, article, clause, text, \
     page_number, parent_id, level, full_context, bbox, document_code, document_type, \
     amendment_number, amends_document";

/// Insert order; `$1..$18` bind in this order.
const INSERT_COLUMNS: [&str; 18] = [
    "id",
    "dense_vector",
    "sparse_vector",
    "document_id",
    "document_name",
    "chapter",
    "article",
    "clause",
    "text",
    "page_number",
    "parent_id",
    "level",
    "full_context",
    "bbox",
    "document_code",
    "document_type",
    "amendment_number",
    "amends_document",
];

/// `col = EXCLUDED.col` for every column except the key.
fn upsert_assignments() -> String {
    INSERT_COLUMNS
        .iter()
        .filter(|c| **c != "id")
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Postgres + pgvector chunk store.
///
/// Dense vectors use `vector(dim)` with cosine distance (`<=>`); sparse
/// vectors use `sparsevec(dim)` with negative inner product (`<#>`).
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    dimensions: usize,
    sparse_dimensions: usize,
}

impl PgVectorStore {
    pub async fn connect(
        config: &PostgresConfig,
        dimensions: usize,
        sparse_dimensions: usize,
    ) -> Result<Self, StoreError> {
        validate_identifier(&config.table)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!(host = %config.host, db = %config.database, table = %config.table, "connected to pgvector store");
        Ok(Self::with_pool(pool, config.table.clone(), dimensions, sparse_dimensions))
    }

    pub fn with_pool(pool: PgPool, table: String, dimensions: usize, sparse_dimensions: usize) -> Self {
        Self { pool, table, dimensions, sparse_dimensions }
    }

    fn schema_sql(&self) -> Vec<String> {
        let t = &self.table;
        vec![
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {t} (\
                 id varchar(100) PRIMARY KEY, \
                 dense_vector vector({dim}) NOT NULL, \
                 sparse_vector sparsevec({sdim}) NOT NULL, \
                 document_id varchar(500) NOT NULL, \
                 document_name varchar(500) NOT NULL, \
                 chapter varchar(500), \
                 article varchar(500), \
                 clause varchar(500), \
                 text text NOT NULL, \
                 page_number bigint NOT NULL, \
                 parent_id varchar(100), \
                 level varchar(50) NOT NULL, \
                 full_context text, \
                 bbox text, \
                 document_code varchar(500), \
                 document_type varchar(50), \
                 amendment_number varchar(50), \
                 amends_document varchar(500))",
                dim = self.dimensions,
                sdim = self.sparse_dimensions,
            ),
            format!("CREATE INDEX IF NOT EXISTS {t}_document_id_idx ON {t} (document_id)"),
            format!(
                "CREATE INDEX IF NOT EXISTS {t}_dense_idx ON {t} USING hnsw (dense_vector vector_cosine_ops)"
            ),
        ]
    }

    async fn search(
        &self,
        score_expr: &str,
        order_expr: &str,
        vector_param: VectorParam,
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        let mut params = Vec::new();
        let where_clause = match filter {
            Some(f) => format!("WHERE {}", f.to_sql(3, &mut params)),
            None => String::new(),
        };
        let sql = format!(
            "SELECT {SELECT_COLUMNS}, {score_expr} AS score FROM {table} {where_clause} \
             ORDER BY {order_expr} LIMIT $2",
            table = self.table,
        );
        debug!(sql = %sql, "pgvector search");

        let mut query = match vector_param {
            VectorParam::Dense(v) => sqlx::query(&sql).bind(v),
            VectorParam::Sparse(s) => sqlx::query(&sql).bind(s),
        };
        query = query.bind(top_k as i64);
        for p in params {
            query = query.bind(p);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .enumerate()
            .map(|(i, row)| -> Result<RetrievalResult, StoreError> {
                let score: f64 = row.try_get("score")?;
                Ok(RetrievalResult::new(Arc::new(row_to_chunk(row)?), score, i + 1))
            })
            .collect()
    }
}

enum VectorParam {
    Dense(Vector),
    Sparse(pgvector::SparseVector),
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_identifier(name: &str) -> Result<(), StoreError> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidConfig(format!("bad table name: {name:?}")))
    }
}

/// Index/weight map as a `sparsevec` parameter. Every index must fall
/// inside `dimensions`.
pub fn to_sparsevec(vector: &SparseVector, dimensions: usize) -> Result<pgvector::SparseVector, StoreError> {
    let dim = i32::try_from(dimensions)
        .map_err(|_| StoreError::InvalidConfig(format!("sparse dimensions {dimensions} exceed i32")))?;
    let entries = vector
        .iter()
        .map(|(&idx, &weight)| match i32::try_from(idx) {
            Ok(i) if i < dim => Ok((i, weight)),
            _ => Err(StoreError::DimensionMismatch { expected: dimensions, actual: idx as usize + 1 }),
        })
        .collect::<Result<Vec<(i32, f32)>, _>>()?;
    Ok(pgvector::SparseVector::from_map(entries.iter().map(|(i, w)| (i, w)), dim))
}

fn row_to_chunk(row: &PgRow) -> Result<Chunk, sqlx::Error> {
    let bbox: Option<String> = row.try_get("bbox")?;
    let level: String = row.try_get("level")?;
    let page: i64 = row.try_get("page_number")?;
    let text: String = row.try_get("text")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        document_name: row.try_get("document_name")?,
        token_count: ccba_core::count_tokens(&text),
        text,
        page_number: u32::try_from(page).unwrap_or(1).max(1),
        chapter: row.try_get("chapter")?,
        article: row.try_get("article")?,
        clause: row.try_get("clause")?,
        level: ChunkLevel::from_label(&level),
        parent_id: row.try_get("parent_id")?,
        full_context: row.try_get("full_context")?,
        document_code: row.try_get("document_code")?,
        document_type: row.try_get("document_type")?,
        amendment_number: row.try_get("amendment_number")?,
        amends_document: row.try_get("amends_document")?,
        bbox: bbox.and_then(|b| serde_json::from_str(&b).ok()),
        dense_vector: None,
        sparse_vector: None,
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &str {
        "pgvector"
    }

    async fn ensure_schema(&self, drop_existing: bool) -> Result<(), StoreError> {
        if drop_existing {
            info!(table = %self.table, "dropping existing chunk table");
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
                .execute(&self.pool)
                .await?;
        }
        for stmt in self.schema_sql() {
            sqlx::query(&stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert(&self, chunks: &[Chunk]) -> Result<usize, StoreError> {
        let sql = format!(
            "INSERT INTO {t} ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             ON CONFLICT (id) DO UPDATE SET {updates}",
            t = self.table,
            cols = INSERT_COLUMNS.join(", "),
            updates = upsert_assignments(),
        );

        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let c = chunk.truncated_for_storage();
            let dense = c.dense_vector.clone().ok_or_else(|| StoreError::MissingVector {
                id: c.id.clone(),
                kind: "dense",
            })?;
            if dense.len() != self.dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: dense.len(),
                });
            }
            let sparse = c.sparse_vector.as_ref().ok_or_else(|| StoreError::MissingVector {
                id: c.id.clone(),
                kind: "sparse",
            })?;
            let bbox = c.bbox.map(|b| serde_json::json!(b).to_string());

            sqlx::query(&sql)
                .bind(&c.id)
                .bind(Vector::from(dense))
                .bind(to_sparsevec(sparse, self.sparse_dimensions)?)
                .bind(&c.document_id)
                .bind(&c.document_name)
                .bind(&c.chapter)
                .bind(&c.article)
                .bind(&c.clause)
                .bind(&c.text)
                .bind(c.page_number as i64)
                .bind(&c.parent_id)
                .bind(c.level.as_str())
                .bind(&c.full_context)
                .bind(bbox)
                .bind(&c.document_code)
                .bind(&c.document_type)
                .bind(&c.amendment_number)
                .bind(&c.amends_document)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(inserted = chunks.len(), table = %self.table, "pgvector insert");
        Ok(chunks.len())
    }

    async fn search_dense(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.search(
            "1.0 - (dense_vector <=> $1::vector)",
            "dense_vector <=> $1::vector",
            VectorParam::Dense(Vector::from(vector.to_vec())),
            top_k,
            filter,
        )
        .await
    }

    async fn search_sparse(
        &self,
        vector: &SparseVector,
        top_k: usize,
        filter: Option<&FilterExpr>,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        self.search(
            "(sparse_vector <#> $1) * -1",
            "sparse_vector <#> $1",
            VectorParam::Sparse(to_sparsevec(vector, self.sparse_dimensions)?),
            top_k,
            filter,
        )
        .await
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE document_id = $1", self.table))
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT document_id, MAX(document_name) AS document_name, COUNT(*) AS chunk_count \
             FROM {} GROUP BY document_id ORDER BY document_id",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DocumentSummary, StoreError> {
                let n: i64 = row.try_get("chunk_count")?;
                Ok(DocumentSummary {
                    document_id: row.try_get("document_id")?,
                    document_name: row.try_get("document_name")?,
                    chunk_count: n.max(0) as u64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_weights_become_sparsevec() {
        let v: SparseVector = [(7, 0.25), (0, 0.5), (3, 0.0)].into_iter().collect();
        let sv = to_sparsevec(&v, 100).unwrap();
        assert_eq!(sv.dimensions(), 100);
        assert_eq!(sv.indices(), &[0, 7]);
        assert_eq!(sv.values(), &[0.5, 0.25]);

        let empty = to_sparsevec(&SparseVector::new(), 10).unwrap();
        assert!(empty.indices().is_empty());
    }

    #[test]
    fn sparse_index_outside_dimensions_is_rejected() {
        let v: SparseVector = [(10, 1.0)].into_iter().collect();
        assert!(matches!(
            to_sparsevec(&v, 10),
            Err(StoreError::DimensionMismatch { expected: 10, actual: 11 })
        ));
    }

    #[test]
    fn upsert_refreshes_every_column() {
        let updates = upsert_assignments();
        for column in INSERT_COLUMNS.iter().filter(|c| **c != "id") {
            assert!(updates.contains(&format!("{column} = EXCLUDED.{column}")), "{column} not updated");
        }
        assert!(!updates.contains("id = EXCLUDED.id"));
    }

    #[test]
    fn table_names_are_validated() {
        assert!(validate_identifier("chunks").is_ok());
        assert!(validate_identifier("chunks_v2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2chunks").is_err());
        assert!(validate_identifier("chunks; DROP TABLE x").is_err());
    }
}
