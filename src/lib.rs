//! # Health Harness
//!
//! A local-first importer that turns a personal health export (an XML
//! document of quantity samples, workouts and sleep intervals spanning
//! years) into a query-ready SQLite store with timezone-correct daily
//! summaries.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//! │ export.xml │──▶│ ExportReader │──▶│  classify   │──▶│  writer  │
//! │ (streamed) │   │  (pull, O(1))│   │ ts/workout/ │   │ (batched)│
//! └────────────┘   └──────────────┘   │   sleep     │   └────┬─────┘
//!                                     └─────────────┘        │
//!                                                            ▼
//!                  ┌──────────────┐   ┌─────────────┐   ┌──────────┐
//!                  │ HealthQueries│◀──│  SQLite     │◀──│aggregate │
//!                  └──────────────┘   └─────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hx import export.xml --utc-offset UTC-7   # full-refresh import
//! hx stats                                  # what landed in the store
//! hx query steps --days 14                  # read an accessor as JSON
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`timezone`] | Run-wide local timezone resolution |
//! | [`timestamp`] | Source-offset to local-time normalization |
//! | [`export`] | Streaming XML element reader |
//! | [`classify`] | Record routing and metric allowlist |
//! | [`workout`] | Workout and statistics extraction |
//! | [`sleep`] | Legacy/staged sleep reconciliation |
//! | [`models`] | Core data types |
//! | [`db`] | Database connection |
//! | [`schema`] | Drop/recreate of the destination schema |
//! | [`writer`] | Multi-row batched inserts |
//! | [`aggregate`] | Daily and sleep summaries |
//! | [`pipeline`] | Import orchestration and report |
//! | [`progress`] | Progress reporting on stderr |
//! | [`query`] | Typed read accessors |
//! | [`stats`] | Store overview |

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod db;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod query;
pub mod schema;
pub mod sleep;
pub mod stats;
pub mod timestamp;
pub mod timezone;
pub mod workout;
pub mod writer;
