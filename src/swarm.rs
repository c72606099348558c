//! Goose integration: one scenario whose only task is the search generator.
//!
//! Goose owns concurrency, hatching, request timing and metrics. Users run the
//! search transaction back to back with no wait time between invocations.
//! The telnet and websocket controllers are disabled; runs are headless.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use goose::config::GooseConfiguration;
use goose::goose::GooseResponse;
use goose::metrics::GooseMetrics;
use goose::prelude::*;
use goose::scenario;
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::SwarmSettings;
use crate::generator::{SearchClient, SearchTrafficGenerator};
use crate::terms::RngTermSource;

/// Name of the registered goose scenario.
pub const SCENARIO_NAME: &str = "SearchUser";

/// Per-user term source kept in goose session data. The handle is shared so
/// each search advances the stored generator in place.
pub type UserTermSource = Arc<Mutex<RngTermSource<StdRng>>>;

static GENERATOR: SearchTrafficGenerator = SearchTrafficGenerator::new();

#[async_trait]
impl SearchClient for GooseUser {
    type Outcome = Result<GooseResponse, Box<TransactionError>>;

    async fn send_get(&mut self, path: &str, label: &str) -> Self::Outcome {
        self.get_named(path, label).await
    }
}

/// Seed for the user launched at `index`, derived from the run's base seed.
pub fn user_seed(base: u64, index: usize) -> u64 {
    base.wrapping_add(index as u64)
}

/// Term source for the user launched at `index`.
pub fn user_term_source(seed: Option<u64>, index: usize) -> UserTermSource {
    let source = match seed {
        Some(base) => RngTermSource::seeded(user_seed(base, index)),
        None => RngTermSource::from_entropy(),
    };
    Arc::new(Mutex::new(source))
}

/// Build the scenario: an on-start transaction that seeds the user's term
/// source, then the search transaction.
pub fn search_scenario(seed: Option<u64>) -> Scenario {
    let launched = Arc::new(AtomicUsize::new(0));
    let seed_terms: TransactionFunction = Arc::new(move |user| {
        let index = launched.fetch_add(1, Ordering::Relaxed);
        Box::pin(async move {
            user.set_session_data(user_term_source(seed, index));
            Ok(())
        })
    });

    let search: TransactionFunction = Arc::new(move |user| {
        Box::pin(async move {
            let source = match user.get_session_data::<UserTermSource>().cloned() {
                Some(source) => source,
                None => {
                    let source = user_term_source(None, 0);
                    user.set_session_data(Arc::clone(&source));
                    source
                }
            };
            let mut source = source.lock().await;
            GENERATOR
                .generate_request(&mut *user, &mut *source)
                .await
                .map(|_| ())
        })
    });

    scenario!(SCENARIO_NAME)
        .register_transaction(
            Transaction::new(seed_terms)
                .set_name("seed_terms")
                .set_on_start(),
        )
        .register_transaction(Transaction::new(search).set_name("search"))
}

/// Request counts for one goose label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub label: String,
    pub success_count: usize,
    pub fail_count: usize,
}

/// Outcome of a swarm run, reduced from goose metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmSummary {
    pub requests: Vec<LabelSummary>,
    pub elapsed_secs: f64,
}

impl SwarmSummary {
    fn from_metrics(metrics: &GooseMetrics, elapsed_secs: f64) -> Self {
        let mut requests: Vec<LabelSummary> = metrics
            .requests
            .iter()
            .map(|(key, aggregate)| LabelSummary {
                label: key.clone(),
                success_count: aggregate.success_count,
                fail_count: aggregate.fail_count,
            })
            .collect();
        requests.sort_by(|a, b| a.label.cmp(&b.label));
        Self {
            requests,
            elapsed_secs,
        }
    }

    pub fn total_success(&self) -> usize {
        self.requests.iter().map(|entry| entry.success_count).sum()
    }

    pub fn total_fail(&self) -> usize {
        self.requests.iter().map(|entry| entry.fail_count).sum()
    }

    pub fn requests_per_second(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        (self.total_success() + self.total_fail()) as f64 / self.elapsed_secs
    }
}

/// Run the search scenario against `settings.host` until the configured run
/// time elapses or the run is interrupted.
pub async fn run_swarm(settings: &SwarmSettings) -> Result<SwarmSummary> {
    settings.validate()?;

    let mut attack = GooseAttack::initialize_with_config(GooseConfiguration::default())
        .context("Failed to initialise goose")?
        .register_scenario(search_scenario(settings.seed))
        .set_default(GooseDefault::Host, settings.host.as_str())?
        .set_default(GooseDefault::Users, settings.users)?
        .set_default(GooseDefault::HatchRate, settings.hatch_rate.as_str())?
        .set_default(GooseDefault::NoTelnet, true)?
        .set_default(GooseDefault::NoWebSocket, true)?;
    if settings.run_time_secs > 0 {
        attack = attack.set_default(GooseDefault::RunTime, settings.run_time_secs as usize)?;
    }

    info!(
        host = %settings.host,
        users = settings.users,
        hatch_rate = %settings.hatch_rate,
        run_time_secs = settings.run_time_secs,
        seeded = settings.seed.is_some(),
        "starting search swarm"
    );
    let started = Instant::now();
    let metrics = attack.execute().await.context("Search swarm failed")?;
    let summary = SwarmSummary::from_metrics(&metrics, started.elapsed().as_secs_f64());
    info!(
        success = summary.total_success(),
        fail = summary.total_fail(),
        elapsed_secs = summary.elapsed_secs,
        "search swarm finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::TermSource;

    #[test]
    fn user_seeds_differ_per_user_and_wrap() {
        assert_eq!(user_seed(100, 0), 100);
        assert_eq!(user_seed(100, 3), 103);
        assert_eq!(user_seed(u64::MAX, 2), 1);
    }

    #[tokio::test]
    async fn user_source_advances_in_place() {
        let source = user_term_source(Some(10), 2);
        let handle = Arc::clone(&source);
        let mut expected = RngTermSource::seeded(12);

        for _ in 0..16 {
            let picked = source.lock().await.pick(7);
            assert_eq!(picked, expected.pick(7));
        }
        // Another handle to the same user continues the sequence.
        assert_eq!(handle.lock().await.pick(7), expected.pick(7));
    }

    #[test]
    fn scenario_has_seed_step_then_search_without_wait() {
        let scenario = search_scenario(Some(5));
        assert_eq!(scenario.name, SCENARIO_NAME);
        assert!(scenario.transaction_wait.is_none());
        assert_eq!(scenario.transactions.len(), 2);

        let seed_terms = &scenario.transactions[0];
        assert_eq!(seed_terms.name, "seed_terms");
        assert!(seed_terms.on_start);

        let search = &scenario.transactions[1];
        assert_eq!(search.name, "search");
        assert!(!search.on_start);
        assert!(!search.on_stop);
    }

    #[test]
    fn summary_rate_handles_zero_elapsed() {
        let summary = SwarmSummary {
            requests: vec![LabelSummary {
                label: "GET /search".into(),
                success_count: 30,
                fail_count: 10,
            }],
            elapsed_secs: 0.0,
        };
        assert_eq!(summary.total_success(), 30);
        assert_eq!(summary.total_fail(), 10);
        assert_eq!(summary.requests_per_second(), 0.0);

        let summary = SwarmSummary {
            elapsed_secs: 2.0,
            ..summary
        };
        assert_eq!(summary.requests_per_second(), 20.0);
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected_before_goose_starts() {
        let settings = SwarmSettings {
            users: 0,
            ..SwarmSettings::default()
        };
        assert!(run_swarm(&settings).await.is_err());
    }
}
