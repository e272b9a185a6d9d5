//! # SQL
//!
//! Relational store for users and ticket batches.
//!
//! ## Requirements
//!
//! - Single-row atomic updates, no cross-request locking
//! - Lookup of batches by id, by owner, and a global listing joined to owner names
//! - Emails unique across users
//!
//! ## Implementation
//!
//! - SQLite through a `sqlx` pool, opened once at startup and closed on shutdown
//! - Handle is owned by [`crate::state::AppState`] and handed to every handler, no globals
//! - `numbers` kept as a JSON array string, `total_amount` as a two-decimal string
//! - `status` kept as the literal variant name so stored rows stay readable by older readers
use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

pub const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT    NOT NULL,
        phone         TEXT    NOT NULL,
        email         TEXT    NOT NULL UNIQUE,
        password_hash TEXT    NOT NULL,
        role          TEXT    NOT NULL CHECK (role IN ('player', 'admin'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ticket_batches (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id          INTEGER NOT NULL REFERENCES users (id),
        numbers           TEXT    NOT NULL,
        total_amount      TEXT    NOT NULL,
        status            TEXT    NOT NULL DEFAULT 'Owed' CHECK (status IN ('Owed', 'Cancelled')),
        payment_proof_ref TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ticket_batches_owner ON ticket_batches (owner_id)",
];

pub async fn init_database(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    info!("Database ready at {database_url}");

    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Single-connection in-memory pool. Every connection to `:memory:` is its own database,
/// so the pool must never open a second one or drop the first.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();

    migrate(&pool).await.unwrap();
    pool
}

#[cfg(test)]
pub async fn seed_user(pool: &SqlitePool, id: i64, name: &str, role: &str) -> i64 {
    sqlx::query(
        "INSERT INTO users (id, name, phone, email, password_hash, role) VALUES (?, ?, '555-0100', ?, 'unused', ?)",
    )
    .bind(id)
    .bind(name)
    .bind(format!("{}@example.com", name.to_lowercase()))
    .bind(role)
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}
