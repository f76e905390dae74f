use anyhow::Context;
use async_trait::async_trait;
use cdr_core::DocumentRecord;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use crate::{check_record, check_text, to_column, DocumentStore, StoreConfig, StoreError};

/// `documents` table backend. Each contract operation is a single statement.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(config: &StoreConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(config.connect_options().context("parsing database_url")?)
            .await
            .context("connecting to document store")?;
        info!(max_connections = config.max_connections, "document store connected");
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("document store migrate failed")?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("select exists (select 1 from documents where url = $1)")
                .bind(url)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        check_record(record)?;
        let result = sqlx::query(
            r#"
            insert into documents (url, pub_date, fetch_time, text_val, first_fetch_time)
            values ($1, $2, $3, $4, $5)
            on conflict (url) do nothing
            "#,
        )
        .bind(&record.url)
        .bind(to_column("pub_date", record.pub_date)?)
        .bind(to_column("fetch_time", record.fetch_time)?)
        .bind(&record.text)
        .bind(to_column("first_fetch_time", record.first_fetch_time)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::duplicate_key(&record.url));
        }
        debug!(url = %record.url, "document inserted");
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<DocumentRecord, StoreError> {
        let row = sqlx::query(
            r#"
            select url, pub_date, fetch_time, text_val, first_fetch_time
            from documents
            where url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(record_from_row(&row)?),
            None => Err(StoreError::not_found(url)),
        }
    }

    async fn update_first_seen(
        &self,
        url: &str,
        first_fetch_time: u64,
        pub_date: u64,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("update documents set first_fetch_time = $1, pub_date = $2 where url = $3")
                .bind(to_column("first_fetch_time", first_fetch_time)?)
                .bind(to_column("pub_date", pub_date)?)
                .bind(url)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(url));
        }
        Ok(())
    }

    async fn update_latest(&self, url: &str, fetch_time: u64, text: &str) -> Result<(), StoreError> {
        check_text("text", text)?;
        let result = sqlx::query("update documents set fetch_time = $1, text_val = $2 where url = $3")
            .bind(to_column("fetch_time", fetch_time)?)
            .bind(text)
            .bind(url)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(url));
        }
        Ok(())
    }
}

fn from_column(row: &PgRow, column: &str) -> Result<u64, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u64::try_from(raw).map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

fn record_from_row(row: &PgRow) -> Result<DocumentRecord, sqlx::Error> {
    Ok(DocumentRecord {
        url: row.try_get("url")?,
        pub_date: from_column(row, "pub_date")?,
        fetch_time: from_column(row, "fetch_time")?,
        text: row.try_get("text_val")?,
        first_fetch_time: from_column(row, "first_fetch_time")?,
    })
}
