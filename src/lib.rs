//! Search traffic generation for load tests.
//!
//! [`SearchTrafficGenerator`] picks one of a fixed set of search terms per
//! invocation and issues `GET /search?q=<term>` labelled `/search` through a
//! [`SearchClient`]. The [`swarm`] module registers it with goose, which owns
//! scheduling, concurrency and metrics.

pub mod cli;
pub mod client;
pub mod config;
pub mod generator;
pub mod swarm;
pub mod telemetry;
pub mod terms;

pub use client::{HttpSearchClient, SearchOutcome, SmokeSummary};
pub use config::{SearchLoadSettings, SwarmSettings, TelemetrySettings, TraceSettings};
pub use generator::{SEARCH_LABEL, SEARCH_PATH, SearchClient, SearchRequest, SearchTrafficGenerator};
pub use swarm::{SwarmSummary, run_swarm, search_scenario};
pub use terms::{RngTermSource, SEARCH_TERMS, TermSource};
