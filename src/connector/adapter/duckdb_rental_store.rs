use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::types::Type;
use duckdb::{params, Connection, Row};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::{RentalStore, StoreSession, TransactionOptions};
use crate::domain::{
    Car, CarDetails, CarStatus, Change, DomainError, EntityKind, HistoryAction, Record, Rental,
    RentalHistory, RentalStatus, Role, User,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_COLUMNS: &str = "id, username, email, password_hash, full_name, phone_number, address, \
     role, created_at, updated_at, is_active";
const CAR_COLUMNS: &str = "id, license_plate, brand, model, year, CAST(daily_rate AS VARCHAR), color, \
     transmission, fuel_type, capacity, description, status, created_at, updated_at, is_active, version";
const RENTAL_COLUMNS: &str = "id, user_id, car_id, CAST(rental_date AS VARCHAR), CAST(return_date AS VARCHAR), \
     actual_return_date, total_days, CAST(total_price AS VARCHAR), status, notes, created_at, updated_at";
const HISTORY_COLUMNS: &str = "id, rental_id, action, action_date, action_by, notes";

/// DuckDB-backed store. Every session runs on its own connection to the same
/// database, so sessions are isolated from each other (snapshot isolation).
pub struct DuckdbRentalStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckdbRentalStore {
    pub fn new(db_path: &Path) -> Result<Self, DomainError> {
        let conn = Connection::open(db_path)
            .map_err(|e| DomainError::persistence("Failed to open DuckDB database", &e))?;
        Self::initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DomainError::persistence("Failed to open DuckDB in-memory DB", &e))?;
        Self::initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), DomainError> {
        conn.execute_batch(
            r#"
            CREATE SEQUENCE IF NOT EXISTS users_id_seq START 1;
            CREATE SEQUENCE IF NOT EXISTS cars_id_seq START 1;
            CREATE SEQUENCE IF NOT EXISTS rentals_id_seq START 1;
            CREATE SEQUENCE IF NOT EXISTS rental_histories_id_seq START 1;

            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                full_name VARCHAR(100) NOT NULL,
                phone_number VARCHAR(20),
                address VARCHAR(255),
                role VARCHAR(10) NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            );

            CREATE TABLE IF NOT EXISTS cars (
                id BIGINT PRIMARY KEY,
                license_plate VARCHAR(20) NOT NULL UNIQUE,
                brand VARCHAR(50) NOT NULL,
                model VARCHAR(50) NOT NULL,
                year INTEGER NOT NULL CHECK (year BETWEEN 1900 AND 2100),
                daily_rate DECIMAL(18,2) NOT NULL CHECK (daily_rate > 0),
                color VARCHAR(30),
                transmission VARCHAR(20),
                fuel_type VARCHAR(20),
                capacity INTEGER,
                description VARCHAR(500),
                status VARCHAR(20) NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                version BIGINT NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS rentals (
                id BIGINT PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id),
                car_id BIGINT NOT NULL REFERENCES cars(id),
                rental_date DATE NOT NULL,
                return_date DATE NOT NULL,
                actual_return_date BIGINT,
                total_days INTEGER NOT NULL CHECK (total_days >= 1),
                total_price DECIMAL(18,2) NOT NULL,
                status VARCHAR(20) NOT NULL,
                notes VARCHAR(500),
                created_at BIGINT NOT NULL,
                updated_at BIGINT
            );

            CREATE TABLE IF NOT EXISTS rental_histories (
                id BIGINT PRIMARY KEY,
                rental_id BIGINT NOT NULL REFERENCES rentals(id),
                action VARCHAR(50) NOT NULL,
                action_date BIGINT NOT NULL,
                action_by BIGINT REFERENCES users(id),
                notes VARCHAR(500)
            );
            "#,
        )
        .map_err(|e| DomainError::persistence("Failed to initialize schema", &e))?;

        debug!("DuckDB rental schema initialized");
        Ok(())
    }
}

#[async_trait]
impl RentalStore for DuckdbRentalStore {
    async fn open_session(&self) -> Result<Box<dyn StoreSession>, DomainError> {
        let root = self.conn.lock().await;
        let conn = root
            .try_clone()
            .map_err(|e| DomainError::persistence("Failed to open DuckDB session", &e))?;

        Ok(Box::new(DuckdbSession {
            conn: Some(conn),
            tx: None,
        }))
    }
}

struct OpenTransaction {
    started: Instant,
    options: TransactionOptions,
}

struct DuckdbSession {
    conn: Option<Connection>,
    tx: Option<OpenTransaction>,
}

impl DuckdbSession {
    fn conn(&self) -> Result<&Connection, DomainError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DomainError::internal("session is closed"))
    }

    fn abort(&mut self) {
        if self.tx.take().is_some() {
            if let Some(conn) = self.conn.as_ref() {
                if let Err(e) = conn.execute_batch("ROLLBACK") {
                    debug!("DuckDB rollback after abort reported: {}", e);
                }
            }
        }
    }

    fn apply(conn: &Connection, change: &Change) -> Result<(), DomainError> {
        change.check_permitted()?;
        match change {
            Change::Insert(record) => {
                record.check_columns()?;
                insert(conn, record)
            }
            Change::Update(record) => {
                record.check_columns()?;
                let updated = update(conn, record)?;
                if updated == 0 {
                    return Err(stale_row(record.kind(), record.id()));
                }
                Ok(())
            }
            Change::Delete(kind, id) => {
                let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
                let deleted = conn
                    .execute(&sql, params![id])
                    .map_err(|e| storage_error("Failed to delete row", e))?;
                if deleted == 0 {
                    return Err(stale_row(*kind, *id));
                }
                Ok(())
            }
        }
    }
}

impl Drop for DuckdbSession {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("DuckDB session dropped with an open transaction; rolling back");
            self.abort();
        }
    }
}

#[async_trait]
impl StoreSession for DuckdbSession {
    async fn begin(&mut self, options: TransactionOptions) -> Result<(), DomainError> {
        if self.tx.is_some() {
            return Err(DomainError::internal("a transaction is already open on this session"));
        }
        self.conn()?
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|e| storage_error("Failed to begin transaction", e))?;
        self.tx = Some(OpenTransaction {
            started: Instant::now(),
            options,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DomainError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| DomainError::internal("no transaction is open"))?;

        let elapsed = tx.started.elapsed();
        if elapsed > tx.options.timeout {
            let limit = tx.options.timeout;
            self.abort();
            return Err(DomainError::Persistence {
                message: "transaction timed out".to_string(),
                root_cause: format!("open for {:?}, limit is {:?}", elapsed, limit),
            });
        }

        let committed = self.conn()?.execute_batch("COMMIT");
        match committed {
            Ok(()) => {
                self.tx = None;
                debug!("DuckDB transaction committed");
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(storage_error("Failed to commit transaction", e))
            }
        }
    }

    async fn rollback(&mut self) -> Result<(), DomainError> {
        if self.tx.take().is_none() {
            return Ok(());
        }
        self.conn()?
            .execute_batch("ROLLBACK")
            .map_err(|e| storage_error("Failed to roll back transaction", e))?;
        debug!("DuckDB transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn next_id(&mut self, kind: EntityKind) -> Result<i64, DomainError> {
        let sql = format!("SELECT nextval('{}_id_seq')", kind.table());
        self.conn()?
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| storage_error("Failed to reserve id", e))
    }

    async fn load(&mut self, kind: EntityKind, id: i64) -> Result<Option<Record>, DomainError> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", columns(kind), kind.table());
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let mut rows = stmt
            .query_map(params![id], |row| read_record(kind, row))
            .map_err(|e| storage_error("Failed to query row", e))?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(|e| storage_error("Failed to read row", e))?)),
            None => Ok(None),
        }
    }

    async fn load_all(&mut self, kind: EntityKind) -> Result<Vec<Record>, DomainError> {
        let sql = format!("SELECT {} FROM {} ORDER BY id", columns(kind), kind.table());
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| storage_error("Failed to prepare statement", e))?;
        let rows = stmt
            .query_map([], |row| read_record(kind, row))
            .map_err(|e| storage_error("Failed to query rows", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| storage_error("Failed to read row", e))?);
        }
        Ok(records)
    }

    async fn write(&mut self, changes: &[Change]) -> Result<usize, DomainError> {
        if changes.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        if self.tx.is_some() {
            for change in changes {
                Self::apply(conn, change)?;
            }
        } else {
            conn.execute_batch("BEGIN TRANSACTION")
                .map_err(|e| storage_error("Failed to begin transaction", e))?;
            let applied: Result<(), DomainError> =
                changes.iter().try_for_each(|change| Self::apply(conn, change));
            match applied {
                Ok(()) => conn
                    .execute_batch("COMMIT")
                    .map_err(|e| storage_error("Failed to commit", e))?,
                Err(e) => {
                    if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                        debug!("DuckDB rollback after failed write reported: {}", rollback_err);
                    }
                    return Err(e);
                }
            }
        }

        debug!("Wrote {} changes to DuckDB", changes.len());
        Ok(changes.len())
    }

    async fn close(&mut self) -> Result<(), DomainError> {
        self.abort();
        self.conn = None;
        Ok(())
    }
}

/// Write-write conflicts between sessions surface as concurrency errors.
fn storage_error(context: &str, e: duckdb::Error) -> DomainError {
    let text = e.to_string();
    if text.contains("Conflict") || text.contains("conflict") {
        DomainError::concurrency(format!("{}: {}", context, text))
    } else {
        DomainError::persistence(context, &e)
    }
}

fn stale_row(kind: EntityKind, id: i64) -> DomainError {
    DomainError::concurrency(format!(
        "{} {} was modified or removed concurrently",
        kind.table(),
        id
    ))
}

fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => USER_COLUMNS,
        EntityKind::Car => CAR_COLUMNS,
        EntityKind::Rental => RENTAL_COLUMNS,
        EntityKind::RentalHistory => HISTORY_COLUMNS,
    }
}

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn insert(conn: &Connection, record: &Record) -> Result<(), DomainError> {
    let result = match record {
        Record::User(u) => conn.execute(
            "INSERT INTO users (id, username, email, password_hash, full_name, phone_number, address, \
             role, created_at, updated_at, is_active) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                u.id,
                u.username,
                u.email,
                u.password_hash,
                u.full_name,
                u.phone_number,
                u.address,
                u.role.as_str(),
                micros(u.created_at),
                u.updated_at.map(micros),
                u.is_active,
            ],
        ),
        Record::Car(c) => conn.execute(
            "INSERT INTO cars (id, license_plate, brand, model, year, daily_rate, color, transmission, \
             fuel_type, capacity, description, status, created_at, updated_at, is_active, version) \
             VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                c.id,
                c.license_plate,
                c.details.brand,
                c.details.model,
                c.details.year,
                c.details.daily_rate.to_string(),
                c.details.color,
                c.details.transmission,
                c.details.fuel_type,
                c.details.capacity,
                c.details.description,
                c.status.as_str(),
                micros(c.created_at),
                c.updated_at.map(micros),
                c.is_active,
                c.version,
            ],
        ),
        Record::Rental(r) => conn.execute(
            "INSERT INTO rentals (id, user_id, car_id, rental_date, return_date, actual_return_date, \
             total_days, total_price, status, notes, created_at, updated_at) \
             VALUES (?, ?, ?, CAST(? AS DATE), CAST(? AS DATE), ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?, ?)",
            params![
                r.id,
                r.user_id,
                r.car_id,
                r.rental_date.format(DATE_FORMAT).to_string(),
                r.return_date.format(DATE_FORMAT).to_string(),
                r.actual_return_date.map(micros),
                r.total_days,
                r.total_price.to_string(),
                r.status.as_str(),
                r.notes,
                micros(r.created_at),
                r.updated_at.map(micros),
            ],
        ),
        Record::RentalHistory(h) => conn.execute(
            "INSERT INTO rental_histories (id, rental_id, action, action_date, action_by, notes) \
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                h.id,
                h.rental_id,
                h.action.label(),
                micros(h.action_date),
                h.action_by,
                h.notes,
            ],
        ),
    };

    result
        .map(|_| ())
        .map_err(|e| storage_error(&format!("Failed to insert into {}", record.kind().table()), e))
}

/// Only non-key columns are rewritten; usernames, emails, plates and
/// rental references are fixed once inserted.
fn update(conn: &Connection, record: &Record) -> Result<usize, DomainError> {
    let result = match record {
        Record::User(u) => conn.execute(
            "UPDATE users SET password_hash = ?, full_name = ?, phone_number = ?, address = ?, \
             role = ?, updated_at = ?, is_active = ? WHERE id = ?",
            params![
                u.password_hash,
                u.full_name,
                u.phone_number,
                u.address,
                u.role.as_str(),
                u.updated_at.map(micros),
                u.is_active,
                u.id,
            ],
        ),
        Record::Car(c) => conn.execute(
            "UPDATE cars SET brand = ?, model = ?, year = ?, daily_rate = CAST(? AS DECIMAL(18,2)), \
             color = ?, transmission = ?, fuel_type = ?, capacity = ?, description = ?, status = ?, \
             updated_at = ?, is_active = ?, version = version + 1 WHERE id = ? AND version = ?",
            params![
                c.details.brand,
                c.details.model,
                c.details.year,
                c.details.daily_rate.to_string(),
                c.details.color,
                c.details.transmission,
                c.details.fuel_type,
                c.details.capacity,
                c.details.description,
                c.status.as_str(),
                c.updated_at.map(micros),
                c.is_active,
                c.id,
                c.version,
            ],
        ),
        Record::Rental(r) => conn.execute(
            "UPDATE rentals SET actual_return_date = ?, status = ?, notes = ?, updated_at = ? WHERE id = ?",
            params![
                r.actual_return_date.map(micros),
                r.status.as_str(),
                r.notes,
                r.updated_at.map(micros),
                r.id,
            ],
        ),
        Record::RentalHistory(_) => {
            return Err(DomainError::constraint("rental_histories rows cannot be updated"))
        }
    };

    result.map_err(|e| storage_error(&format!("Failed to update {}", record.kind().table()), e))
}

fn read_record(kind: EntityKind, row: &Row<'_>) -> duckdb::Result<Record> {
    Ok(match kind {
        EntityKind::User => Record::User(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            full_name: row.get(4)?,
            phone_number: row.get(5)?,
            address: row.get(6)?,
            role: label(7, row.get(7)?, Role::parse)?,
            created_at: timestamp(8, row.get(8)?)?,
            updated_at: optional_timestamp(9, row.get(9)?)?,
            is_active: row.get(10)?,
        }),
        EntityKind::Car => Record::Car(Car {
            id: row.get(0)?,
            license_plate: row.get(1)?,
            details: CarDetails {
                brand: row.get(2)?,
                model: row.get(3)?,
                year: row.get(4)?,
                daily_rate: decimal(5, row.get(5)?)?,
                color: row.get(6)?,
                transmission: row.get(7)?,
                fuel_type: row.get(8)?,
                capacity: row.get(9)?,
                description: row.get(10)?,
            },
            status: label(11, row.get(11)?, CarStatus::parse)?,
            created_at: timestamp(12, row.get(12)?)?,
            updated_at: optional_timestamp(13, row.get(13)?)?,
            is_active: row.get(14)?,
            version: row.get(15)?,
        }),
        EntityKind::Rental => Record::Rental(Rental {
            id: row.get(0)?,
            user_id: row.get(1)?,
            car_id: row.get(2)?,
            rental_date: date(3, row.get(3)?)?,
            return_date: date(4, row.get(4)?)?,
            actual_return_date: optional_timestamp(5, row.get(5)?)?,
            total_days: row.get(6)?,
            total_price: decimal(7, row.get(7)?)?,
            status: label(8, row.get(8)?, RentalStatus::parse)?,
            notes: row.get(9)?,
            created_at: timestamp(10, row.get(10)?)?,
            updated_at: optional_timestamp(11, row.get(11)?)?,
        }),
        EntityKind::RentalHistory => Record::RentalHistory(RentalHistory {
            id: row.get(0)?,
            rental_id: row.get(1)?,
            action: label(2, row.get(2)?, HistoryAction::from_label)?,
            action_date: timestamp(3, row.get(3)?)?,
            action_by: row.get(4)?,
            notes: row.get(5)?,
        }),
    })
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(idx, ty, err.into())
}

fn label<T>(idx: usize, value: String, parse: fn(&str) -> Option<T>) -> duckdb::Result<T> {
    parse(&value).ok_or_else(|| conversion_error(idx, Type::Text, format!("unknown label '{}'", value)))
}

fn timestamp(idx: usize, value: i64) -> duckdb::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(value)
        .ok_or_else(|| conversion_error(idx, Type::BigInt, format!("timestamp {} out of range", value)))
}

fn optional_timestamp(idx: usize, value: Option<i64>) -> duckdb::Result<Option<DateTime<Utc>>> {
    value.map(|v| timestamp(idx, v)).transpose()
}

fn decimal(idx: usize, value: String) -> duckdb::Result<Decimal> {
    value
        .parse::<Decimal>()
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn date(idx: usize, value: String) -> duckdb::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|e| conversion_error(idx, Type::Text, e))
}
