//! PostgreSQL table source.
//!
//! Rows are read through a server-side cursor inside a read-only
//! transaction, one `FETCH FORWARD` page at a time. Queries go over the
//! simple-query protocol, so every value arrives as text and is decoded by
//! its column type name.

use super::{RecordStream, Source};
use crate::config::DatabaseConfig;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use futures::{StreamExt, TryStreamExt};
use ingest2parquet_core::{ExecutionDate, IngestError, Record, Result, Timestamp, Value};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::fmt;
use tracing::{debug, info};

const CURSOR_NAME: &str = "ingest_cursor";

/// Reject anything that is not a plain SQL identifier.
///
/// Identifiers are interpolated into the query text unquoted, so only
/// `[A-Za-z_][A-Za-z0-9_$]*` is allowed.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(IngestError::config(format!(
            "Invalid {} name '{}': only letters, digits, '_' and '$' are allowed",
            kind, name
        )))
    }
}

/// `SELECT` for one execution date.
pub fn select_sql(schema: &str, table: &str, date_column: &str, date: &ExecutionDate) -> String {
    format!(
        "SELECT * FROM {}.{} WHERE DATE({}) = DATE '{}'",
        schema,
        table,
        date_column,
        date.as_str()
    )
}

/// Reads one table for one execution date.
pub struct PostgresSource {
    db: DatabaseConfig,
    schema: String,
    table: String,
    date_column: String,
    page_size: usize,
    conn: Option<PgConnection>,
}

impl fmt::Debug for PostgresSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSource")
            .field("db", &self.db)
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("date_column", &self.date_column)
            .field("page_size", &self.page_size)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl PostgresSource {
    pub fn new(
        db: DatabaseConfig,
        schema: &str,
        table: &str,
        date_column: &str,
        page_size: usize,
    ) -> Result<Self> {
        validate_identifier("schema", schema)?;
        validate_identifier("table", table)?;
        validate_identifier("column", date_column)?;

        if page_size == 0 {
            return Err(IngestError::config(
                "pipeline.source.page_size must be greater than 0",
            ));
        }

        Ok(Self {
            db,
            schema: schema.to_string(),
            table: table.to_string(),
            date_column: date_column.to_string(),
            page_size,
            conn: None,
        })
    }

    /// Connection target for error messages; never includes the password.
    fn target(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.db.user, self.db.host, self.db.port, self.db.database
        )
    }

    fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.db.host)
            .port(self.db.port)
            .database(&self.db.database)
            .username(&self.db.user)
            .application_name("ingest2parquet");

        if self.db.password.is_empty() {
            options
        } else {
            options.password(&self.db.password)
        }
    }

    /// The open connection, connecting first if needed.
    async fn connection(&mut self) -> Result<&mut PgConnection> {
        if self.conn.is_none() {
            debug!("Connecting to {}", self.target());
            let mut conn = PgConnection::connect_with(&self.connect_options())
                .await
                .map_err(|e| IngestError::connection(self.target(), e))?;

            // Text decoding below expects ISO dates.
            (&mut conn)
                .execute(sqlx::raw_sql("SET DateStyle TO ISO"))
                .await
                .map_err(|e| IngestError::connection(self.target(), e))?;

            info!("Connected to {}", self.target());
            self.conn = Some(conn);
        }

        let target = self.target();
        self.conn
            .as_mut()
            .ok_or_else(|| IngestError::connection(target, "connection unavailable"))
    }
}

#[async_trait]
impl Source for PostgresSource {
    fn describe(&self) -> String {
        format!("postgres table {}.{}", self.schema, self.table)
    }

    async fn open(&mut self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| IngestError::connection(self.target(), e))?;
            debug!("Closed connection to {}", self.target());
        }
        Ok(())
    }

    async fn extract<'a>(&'a mut self, date: &ExecutionDate) -> Result<RecordStream<'a>> {
        let select = select_sql(&self.schema, &self.table, &self.date_column, date);
        let page_size = self.page_size;
        info!(
            "Extracting {}.{} where DATE({}) = {}",
            self.schema, self.table, self.date_column, date
        );

        let conn = self.connection().await?;

        (&mut *conn)
            .execute(sqlx::raw_sql("BEGIN READ ONLY"))
            .await
            .map_err(IngestError::query)?;

        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", CURSOR_NAME, select);
        (&mut *conn)
            .execute(sqlx::raw_sql(&declare))
            .await
            .map_err(IngestError::query)?;

        let fetch = format!("FETCH FORWARD {} FROM {}", page_size, CURSOR_NAME);
        let pages = futures::stream::try_unfold(Some(conn), move |state| {
            let fetch = fetch.clone();
            async move {
                match state {
                    None => Ok(None),
                    Some(conn) => fetch_page(&mut *conn, &fetch, page_size)
                        .await
                        .map(|(records, exhausted)| {
                            let next = if exhausted { None } else { Some(conn) };
                            Some((records, next))
                        }),
                }
            }
        });

        let records = pages
            .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok::<Record, IngestError>)))
            .try_flatten();

        Ok(records.boxed())
    }
}

impl Drop for PostgresSource {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            debug!("Dropping connection to {} without close", self.target());
        }
    }
}

/// Fetch one cursor page. Returns the records and whether the cursor is done;
/// the transaction is committed once it is.
async fn fetch_page(
    conn: &mut PgConnection,
    fetch: &str,
    page_size: usize,
) -> Result<(Vec<Record>, bool)> {
    let rows = (&mut *conn)
        .fetch_all(sqlx::raw_sql(fetch))
        .await
        .map_err(IngestError::query)?;
    debug!(rows = rows.len(), "Fetched cursor page");

    let records = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;
    let exhausted = rows.len() < page_size;

    if exhausted {
        (&mut *conn)
            .execute(sqlx::raw_sql("COMMIT"))
            .await
            .map_err(IngestError::query)?;
    }

    Ok((records, exhausted))
}

fn decode_row(row: &PgRow) -> Result<Record> {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let text: Option<String> = row.try_get_unchecked(idx).map_err(IngestError::query)?;
        let value = match text {
            None => Value::Null,
            Some(text) => decode_text(column.type_info().name(), text),
        };
        record.insert(column.name(), value);
    }
    Ok(record)
}

/// Decode a text-format value by its PostgreSQL type name.
///
/// Anything unrecognized, or unparseable for its type (`infinity`, BC dates),
/// stays text.
pub fn decode_text(type_name: &str, text: String) -> Value {
    let parsed = match type_name {
        "BOOL" => match text.as_str() {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        "INT2" | "INT4" | "INT8" | "OID" => text.parse::<i64>().ok().map(Value::Int),
        "FLOAT4" | "FLOAT8" => text.parse::<f64>().ok().map(Value::Float),
        "TIMESTAMP" => NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|ts| Value::Timestamp(Timestamp::Naive(ts))),
        "TIMESTAMPTZ" => DateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(|ts| Value::Timestamp(Timestamp::Zoned(ts))),
        "DATE" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        _ => None,
    };

    parsed.unwrap_or(Value::Text(text))
}
