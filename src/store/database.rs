//! Customer Record Store
//!
//! SQLite-backed storage for the `customers` table.
//!
//! # Transactions
//! `create_table` and `insert_batch` each run in their own transaction, so two
//! sub-batches inserted concurrently commit or roll back independently. SQLite
//! never shows one connection the uncommitted rows of another; writers queue on
//! the database write lock (bounded by the busy timeout) instead of failing.
//! Lookups run outside any transaction unless the caller supplies one.

use crate::{
    Customer, NameFragment, UpdateCounts,
    config::DatabaseConfig,
    error::StoreError,
    store::decode_customer,
};
use futures::TryStreamExt;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions,
};
use sqlx::{Executor, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TABLE: &str = "customers";

const DROP_TABLE_SQL: &str = "DROP TABLE customers";

const INSERT_SQL: &str = "INSERT INTO customers (first_name, last_name) VALUES (?, ?)";

const SELECT_BY_FIRST_NAME_SQL: &str =
    "SELECT id, first_name, last_name FROM customers WHERE first_name = ? ORDER BY id";

const SELECT_ALL_SQL: &str = "SELECT id, first_name, last_name FROM customers ORDER BY id";

const SEED_SEQUENCE_SQL: &str = "INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)";

/// How long a writer waits for the database lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Transactional store for `Customer` records
///
/// Cheap to share: strategies and insert tasks hold it behind an `Arc`.
pub struct RecordStore {
    pool: SqlitePool,
    /// Maximum length of the name columns
    column_width: usize,
    /// First id assigned after a table reset
    id_start: i64,
    /// Rows per transport-level insert chunk
    chunk_size: usize,
}

impl RecordStore {
    /// Open the database described by `config`
    ///
    /// File databases use WAL journaling so readers never block the writer.
    /// In-memory databases live as long as their connection, so the pool is
    /// pinned to one connection that is never reaped.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let connect_err = |source: sqlx::Error| StoreError::Connect {
            url: config.url.clone(),
            source,
        };

        let in_memory = is_in_memory(&config.url);

        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(connect_err)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(connect_err)?;

        debug!(url = %config.url, in_memory, "Record store connected");

        Ok(Self {
            pool,
            column_width: config.column_width,
            id_start: config.id_start,
            chunk_size: config.chunk_size.max(1),
        })
    }

    /// Drop and recreate the `customers` table
    ///
    /// A failed drop (usually "no such table") is logged and ignored, so the
    /// reset can be repeated any number of times. A failed create is returned
    /// as `StoreError::Schema`.
    pub async fn create_table(&self) -> Result<(), StoreError> {
        info!("create_table() start");

        let mut tx = self.begin().await?;

        if let Err(e) = sqlx::query(DROP_TABLE_SQL).execute(&mut *tx).await {
            warn!("Failed to drop table. Continue processing. ({})", e);
        }

        let create_sql = self.create_table_sql();
        if let Err(e) = sqlx::query(&create_sql).execute(&mut *tx).await {
            error!("create_table(): {}", e);
            return Err(StoreError::Schema(e));
        }

        // sqlite_sequence holds the last id handed out; AUTOINCREMENT continues from seq + 1
        if self.id_start > 1 {
            sqlx::query(SEED_SEQUENCE_SQL)
                .bind(TABLE)
                .bind(self.id_start - 1)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("create_table(): failed to seed id sequence: {}", e);
                    StoreError::Schema(e)
                })?;
        }

        tx.commit().await.map_err(StoreError::Transaction)?;

        info!("create_table() end");
        Ok(())
    }

    /// Insert `rows` in one transaction, `chunk_size` statements at a time
    ///
    /// Every statement of a chunk is attempted. If any of them fails, each
    /// cause is logged in order, the transaction is rolled back and
    /// `StoreError::BatchInsert` carries all the causes of that chunk.
    ///
    /// # Returns
    /// One affected-row count per statement, grouped by chunk
    pub async fn insert_batch(&self, rows: &[NameFragment]) -> Result<UpdateCounts, StoreError> {
        info!("insert_batch() start");

        let mut tx = self.begin().await?;
        let mut counts: UpdateCounts = Vec::with_capacity(rows.len().div_ceil(self.chunk_size));

        for (chunk_index, chunk) in rows.chunks(self.chunk_size).enumerate() {
            let mut chunk_counts = Vec::with_capacity(chunk.len());
            let mut causes = Vec::new();

            for row in chunk {
                let result = sqlx::query(INSERT_SQL)
                    .bind(row.first_name.as_str())
                    .bind(row.last_name.as_str())
                    .execute(&mut *tx)
                    .await;

                match result {
                    Ok(done) => chunk_counts.push(done.rows_affected()),
                    Err(e) => causes.push(e),
                }
            }

            if !causes.is_empty() {
                for (position, cause) in causes.iter().enumerate() {
                    error!(chunk = chunk_index, position, "insert_batch(): {}", cause);
                }
                // Dropping `tx` rolls back every chunk written so far
                return Err(StoreError::BatchInsert {
                    chunk: chunk_index,
                    causes,
                });
            }

            counts.push(chunk_counts);
        }

        tx.commit().await.map_err(StoreError::Transaction)?;

        info!("Update counts: {:?}", counts);
        info!("insert_batch() end");
        Ok(counts)
    }

    /// All customers with the given first name, in id order
    pub async fn find_by_first_name(&self, first_name: &str) -> Result<Vec<Customer>, StoreError> {
        let mut found = Vec::new();
        self.for_each_by_first_name(first_name, |customer| found.push(customer))
            .await?;
        Ok(found)
    }

    /// Stream every matching customer to `f` as it is decoded
    ///
    /// # Returns
    /// The number of customers passed to `f`
    pub async fn for_each_by_first_name<F>(&self, first_name: &str, f: F) -> Result<usize, StoreError>
    where
        F: FnMut(Customer) + Send,
    {
        info!("find_by_first_name() start");

        let result = stream_customers(&self.pool, SELECT_BY_FIRST_NAME_SQL, Some(first_name), f).await;
        if let Err(e) = &result {
            error!("find_by_first_name(): {}", e);
        }
        let count = result?;

        info!("find_by_first_name() end");
        Ok(count)
    }

    /// Same lookup as `find_by_first_name`, but inside the caller's connection or transaction
    pub async fn find_by_first_name_in(
        conn: &mut SqliteConnection,
        first_name: &str,
    ) -> Result<Vec<Customer>, StoreError> {
        let mut found = Vec::new();
        stream_customers(conn, SELECT_BY_FIRST_NAME_SQL, Some(first_name), |customer| {
            found.push(customer)
        })
        .await?;
        Ok(found)
    }

    /// Every stored customer, in id order
    pub async fn find_all(&self) -> Result<Vec<Customer>, StoreError> {
        let mut found = Vec::new();
        stream_customers(&self.pool, SELECT_ALL_SQL, None, |customer| found.push(customer)).await?;
        Ok(found)
    }

    /// Number of stored customers
    pub async fn count(&self) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Query)
    }

    /// Start a transaction on a pooled connection
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool.begin().await.map_err(StoreError::Transaction)
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn create_table_sql(&self) -> String {
        let width = self.column_width;
        format!(
            "CREATE TABLE {TABLE} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             first_name VARCHAR({width}) CHECK (length(first_name) <= {width}), \
             last_name VARCHAR({width}) CHECK (length(last_name) <= {width})\
             )"
        )
    }
}

/// Run `sql` (optionally binding one text parameter) and feed each decoded row to `f`
async fn stream_customers<'c, E, F>(
    executor: E,
    sql: &'static str,
    param: Option<&str>,
    mut f: F,
) -> Result<usize, StoreError>
where
    E: Executor<'c, Database = Sqlite>,
    F: FnMut(Customer) + Send,
{
    let mut query = sqlx::query(sql);
    if let Some(param) = param {
        query = query.bind(param.to_owned());
    }

    let mut rows = query.fetch(executor);
    let mut count = 0;
    while let Some(row) = rows.try_next().await.map_err(StoreError::Query)? {
        f(decode_customer(&row)?);
        count += 1;
    }
    Ok(count)
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TempDatabase;
    use std::sync::Arc;

    async fn memory_store() -> RecordStore {
        RecordStore::connect(&DatabaseConfig::in_memory()).await.unwrap()
    }

    fn fragments(names: &[(&str, &str)]) -> Vec<NameFragment> {
        names
            .iter()
            .map(|(first, last)| NameFragment::new(*first, *last))
            .collect()
    }

    #[tokio::test]
    async fn test_create_table_is_repeatable() {
        let store = memory_store().await;

        store.create_table().await.unwrap();
        // Second reset must absorb the drop of an existing table
        store.create_table().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_then_find_by_first_name() {
        let store = memory_store().await;
        store.create_table().await.unwrap();

        let rows = fragments(&[
            ("John", "Woo"),
            ("Jeff", "Dean"),
            ("Josh", "Bloch"),
            ("Josh", "Long"),
        ]);
        let counts = store.insert_batch(&rows).await.unwrap();

        // Chunks of 3: one full chunk and one with the remaining row
        assert_eq!(counts, vec![vec![1, 1, 1], vec![1]]);

        let found = store.find_by_first_name("Josh").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0],
            Customer { id: 1003, first_name: "Josh".into(), last_name: "Bloch".into() }
        );
        assert_eq!(
            found[1],
            Customer { id: 1004, first_name: "Josh".into(), last_name: "Long".into() }
        );
    }

    #[tokio::test]
    async fn test_reset_restarts_ids() {
        let store = memory_store().await;
        store.create_table().await.unwrap();
        store.insert_batch(&fragments(&[("John", "Woo")])).await.unwrap();

        store.create_table().await.unwrap();
        store.insert_batch(&fragments(&[("Jeff", "Dean")])).await.unwrap();

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 1001);
    }

    #[tokio::test]
    async fn test_insert_failure_rolls_back_whole_batch() {
        let config = DatabaseConfig {
            column_width: 4,
            ..DatabaseConfig::in_memory()
        };
        let store = RecordStore::connect(&config).await.unwrap();
        store.create_table().await.unwrap();

        // "Bloch" and "Stroustrup" exceed the 4-character columns; both land in chunk 1
        let rows = fragments(&[
            ("John", "Woo"),
            ("Jeff", "Dean"),
            ("Josh", "Long"),
            ("Josh", "Bloch"),
            ("Bjar", "Stroustrup"),
        ]);
        let err = store.insert_batch(&rows).await.unwrap_err();

        match err {
            StoreError::BatchInsert { chunk, causes } => {
                assert_eq!(chunk, 1);
                assert_eq!(causes.len(), 2);
            }
            other => panic!("expected BatchInsert, got {other:?}"),
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_for_each_streams_matches() {
        let store = memory_store().await;
        store.create_table().await.unwrap();
        store
            .insert_batch(&fragments(&[("Josh", "Bloch"), ("Jeff", "Dean"), ("Josh", "Long")]))
            .await
            .unwrap();

        let mut last_names = Vec::new();
        let seen = store
            .for_each_by_first_name("Josh", |customer| last_names.push(customer.last_name))
            .await
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(last_names, vec!["Bloch".to_string(), "Long".to_string()]);
    }

    #[tokio::test]
    async fn test_find_inside_ambient_transaction_sees_own_writes() {
        let store = memory_store().await;
        store.create_table().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        sqlx::query(INSERT_SQL)
            .bind("Josh")
            .bind("Long")
            .execute(&mut *tx)
            .await
            .unwrap();

        let found = RecordStore::find_by_first_name_in(&mut tx, "Josh").await.unwrap();
        assert_eq!(found.len(), 1);

        tx.rollback().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_query_without_table_fails() {
        let store = memory_store().await;

        let err = store.find_by_first_name("Josh").await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_uncommitted_rows_are_invisible_to_other_connections() {
        let temp = TempDatabase::new("isolation");
        let store = RecordStore::connect(&temp.config).await.unwrap();
        store.create_table().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        sqlx::query(INSERT_SQL)
            .bind("Josh")
            .bind("Long")
            .execute(&mut *tx)
            .await
            .unwrap();
        assert_eq!(RecordStore::find_by_first_name_in(&mut tx, "Josh").await.unwrap().len(), 1);

        // Another pooled connection only sees committed data
        assert!(store.find_by_first_name("Josh").await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);

        tx.commit().await.unwrap();

        let found = store.find_by_first_name("Josh").await.unwrap();
        assert_eq!(
            found,
            vec![Customer { id: 1001, first_name: "Josh".into(), last_name: "Long".into() }]
        );
        store.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_wait_for_the_lock() {
        let temp = TempDatabase::new("writers");
        let store = Arc::new(RecordStore::connect(&temp.config).await.unwrap());
        store.create_table().await.unwrap();

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let store = store.clone();
                tokio::spawn(async move {
                    let rows: Vec<_> = (0..25)
                        .map(|i| NameFragment::new(format!("W{writer}"), format!("Row{i}")))
                        .collect();
                    store.insert_batch(&rows).await
                })
            })
            .collect();

        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let all = store.find_all().await.unwrap();
        assert_eq!(all.len(), 100);
        let ids: Vec<i64> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, (1001..=1100).collect::<Vec<_>>());
        store.close().await;
    }

    #[tokio::test]
    async fn test_file_database_reset_reseeds_ids() {
        let temp = TempDatabase::new("reseed");
        let store = RecordStore::connect(&temp.config).await.unwrap();

        for _ in 0..2 {
            store.create_table().await.unwrap();
            store
                .insert_batch(&fragments(&[("John", "Woo"), ("Jeff", "Dean")]))
                .await
                .unwrap();
        }

        let ids: Vec<i64> = store.find_all().await.unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1001, 1002]);
        store.close().await;
    }

    #[tokio::test]
    async fn test_id_start_of_one_needs_no_seed() {
        let config = DatabaseConfig {
            id_start: 1,
            ..DatabaseConfig::in_memory()
        };
        let store = RecordStore::connect(&config).await.unwrap();
        store.create_table().await.unwrap();
        store.insert_batch(&fragments(&[("John", "Woo")])).await.unwrap();

        assert_eq!(store.find_all().await.unwrap()[0].id, 1);
    }

    #[tokio::test]
    async fn test_decode_reports_missing_column() {
        let store = memory_store().await;

        let row = sqlx::query("SELECT 1 AS id, 'Josh' AS first_name")
            .fetch_one(&store.pool)
            .await
            .unwrap();

        let err = decode_customer(&row).unwrap_err();
        assert_eq!(err.column, "last_name");
    }
}
