//! # Overview Study
//!
//! A small research-study web application. Participants enter a Prolific ID,
//! search a local corpus of static pages, read an AI overview generated only
//! from the best-matching pages, and submit a written conclusion. Events and
//! submissions land in flat CSV files that a password-gated admin view can
//! browse, download, and clear.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────┐   ┌───────────┐
//! │   Corpus   │──▶│  Score   │──▶│  Overview  │──▶│  Gemini   │
//! │ html/txt/md│   │ keywords │   │ top-K + [n]│   │ (backend) │
//! └────────────┘   └──────────┘   └─────┬──────┘   └───────────┘
//!                                       ▼
//!                 ┌──────────┐    ┌──────────┐    ┌───────────┐
//!                 │   CLI    │    │   HTTP   │───▶│ CSV logs  │
//!                 └──────────┘    └──────────┘    └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`extract`] | HTML title and visible-text extraction |
//! | [`corpus`] | Corpus directory loader |
//! | [`score`] | Keyword relevance scoring |
//! | [`generation`] | Text-generation backend abstraction |
//! | [`overview`] | Ranking, prompt construction, and post-processing |
//! | [`study_log`] | CSV event and submission logs |
//! | [`pages`] | HTML rendering |
//! | [`server`] | Study HTTP server |

pub mod config;
pub mod corpus;
pub mod extract;
pub mod generation;
pub mod models;
pub mod overview;
pub mod pages;
pub mod score;
pub mod server;
pub mod study_log;
