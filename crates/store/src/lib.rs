//! # Meridian Store Crate
//!
//! The append-only durable log behind the engine: bars, signals, trades,
//! engine snapshots, and daily summaries, in one embedded SQLite file.
//!
//! ## Architectural Principles
//!
//! - **Single writer, many readers:** exactly one engine appends; dashboards
//!   and the CLI only run the read-side queries. WAL journaling keeps
//!   readers from blocking the writer.
//! - **Durable before acknowledged:** `synchronous=FULL` on file-backed
//!   stores, so a commit that returns has reached disk. The engine does not
//!   acknowledge a bar whose appends have not committed.
//! - **Schema as implementation detail:** callers see typed records; SQL
//!   stays in this crate.
//!
//! ## Public API
//!
//! - `Store`: the repository handle over a connection pool.
//! - `SnapshotRecord`: a persisted engine snapshot row.
//! - `StoreError`: the specific error types that can be returned from this crate.

pub mod connection;
pub mod error;
pub mod repository;

pub use connection::{connect, connect_in_memory};
pub use error::StoreError;
pub use repository::{SnapshotRecord, Store, WalkForwardFoldRow};
