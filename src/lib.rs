//! # Drive Harness
//!
//! Pulls documents out of a user's connected cloud storage (Google Drive,
//! OneDrive, Notion), recovers a bounded plain-text excerpt from each and
//! hands the result to a question-answering step.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ TokenStore │◀──│   Adapters   │──▶│  Extractor  │
//! │  (SQLite)  │   │ Drive/OD/Not │   │ PDF/OOXML/  │
//! └────────────┘   └──────┬───────┘   │    text     │
//!                         │           └─────────────┘
//!          DownloadThrottle (4 permits, shared)
//!                         │
//!                  ┌──────▼───────┐
//!                  │   Ingestor   │──▶ ask() ──▶ Answerer
//!                  └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dh init
//! dh connect --user alice --provider google --access-token ... --refresh-token ...
//! dh ingest --user alice --provider auto
//! dh ask --user alice "what is the Q3 budget?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and env overrides |
//! | [`models`] | Providers, token records, documents, tagged content |
//! | [`error`] | Failure taxonomy |
//! | [`store`] | Token store trait, SQLite and in-memory backends |
//! | [`oauth`] | Access-token lifecycle and refresh-once-on-401 |
//! | [`throttle`] | Process-wide download admission gate |
//! | [`http`] | Shared client, timeouts, capped downloads |
//! | [`extract`] | PDF, DOCX/PPTX/XLSX and plain-text extraction |
//! | [`traits`] | Provider adapter seam and registry |
//! | [`connector_gdrive`] | Google Drive adapter |
//! | [`connector_onedrive`] | OneDrive adapter |
//! | [`connector_notion`] | Notion adapter |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`ask`] | Question answering and summaries over ingested documents |
//! | [`connections`] | Connection management commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ask;
pub mod config;
pub mod connections;
pub mod connector_gdrive;
pub mod connector_notion;
pub mod connector_onedrive;
pub mod db;
pub mod error;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod store;
pub mod throttle;
pub mod traits;
