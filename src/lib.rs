//! # CampusChat
//!
//! A student-support chatbot backend: admins upload PDF handbooks and
//! policies, students ask questions through an embeddable widget, and a
//! live direct-chat relay hands the conversation to a human when the bot is
//! not enough.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌──────────┐
//! │  Upload  │──▶│ Ingest Pipeline    │──▶│  SQLite   │
//! │  (PDF)   │   │ extract+chunk     │   │ documents │
//! └──────────┘   └───────────────────┘   └────┬─────┘
//!                                             │
//!      question ──▶ intent ──▶ retrieve ──────┤
//!                      │            │         ▼
//!                      │            └──▶ answer (LLM)
//!                      ▼                      │
//!                 canned reply ◀──────────────┘
//!
//!      visitor ◀──── poll ────▶ relay ◀──── admin
//! ```
//!
//! Questions pass a small-talk gate, then lexical retrieval over the stored
//! chunks, then a single language-model call grounded in the hits; every
//! failure on that path degrades to a canned reply. The relay is pull-based:
//! both sides poll with a last-seen message id.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF → per-page text |
//! | [`chunk`] | Page-marker text chunking |
//! | [`intent`] | Small-talk gate |
//! | [`retrieve`] | Lexical chunk retrieval |
//! | [`llm`] | Language-model provider abstraction |
//! | [`answer`] | Grounded generation + reference cleanup |
//! | [`query`] | Question-answering orchestration |
//! | [`relay`] | Direct-chat relay state machine |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`service`] | Responder capability (real + degraded) |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod extract;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod query;
pub mod relay;
pub mod retrieve;
pub mod server;
pub mod service;
