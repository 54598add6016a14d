//! # acdb AtCoder
//!
//! Parsers and the default dataset registry for AtCoder data.
//!
//! This crate provides:
//! - [`Parser`](acdb_sync_engine::Parser) implementations for submission
//!   logs, the contest archive and its JSON supplement, contest results and
//!   problem difficulty models
//! - The rating conversions applied while parsing ([`adjust_perf`],
//!   [`adjust_diff`])
//! - [`default_registry`], the four datasets wired with their dependencies
//!
//! ## Usage
//!
//! ```rust,no_run
//! use acdb_atcoder::{default_registry, parsers, RESULTS};
//! use acdb_sync_engine::{Engine, EngineConfig, ReqwestClient};
//!
//! let config = EngineConfig::new("data");
//! let client = ReqwestClient::new(&config).unwrap();
//! let mut engine = Engine::new(config, default_registry(), parsers(), client).unwrap();
//! let results = engine.table(RESULTS).unwrap();
//! println!("{} result rows", results.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod contests;
mod html;
mod problem_models;
mod rating;
mod registry;
mod results;
mod submissions;

pub use contests::{parse_archive, parse_contests_json};
pub use problem_models::parse_problem_models;
pub use rating::{adjust_diff, adjust_perf};
pub use registry::{
    default_registry, parsers, with_submissions_base, CONTESTS, CONTESTS_ARCHIVE_URL,
    CONTESTS_JSON_URL, FETCH_EPOCH_SECOND, PROBLEM_MODELS, PROBLEM_MODELS_URL,
    RECENTLY_CONTEST_IDS, RECENTLY_RATED_ALGO_CONTEST_IDS, RECENTLY_RATED_CONTEST_IDS, RESULTS,
    RESULTS_URL, SUBMISSIONS, SUBMISSIONS_URL,
};
pub use results::parse_results;
pub use submissions::parse_submissions;
