use crate::config::limits::LimitConfiguration;
use crate::config::settings::SuiteConfig;
use crate::core::document::{DocumentHandle, FixtureStore};
use crate::core::worker_count::{ProcessInventory, WorkerCountProbe};
use crate::error::{ProbeError, Result};
use crate::metrics::report::{ScenarioOutcome, ScenarioReport, SuiteReport};
use crate::network::handshake::{ClosureOutcome, HandshakeDriver, POLICY_VIOLATION};
use crate::network::session::{Session, SessionOpener};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Worker count assumed before the first scenario has measured one.
pub const INITIAL_WORKER_HINT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    MaxDocuments,
    MaxConnections,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 2] = [ScenarioKind::MaxDocuments, ScenarioKind::MaxConnections];

    pub fn limit_in(&self, limits: &LimitConfiguration) -> usize {
        match self {
            ScenarioKind::MaxDocuments => limits.max_documents,
            ScenarioKind::MaxConnections => limits.max_connections,
        }
    }

    pub fn limit_name(&self) -> &'static str {
        match self {
            ScenarioKind::MaxDocuments => "open document",
            ScenarioKind::MaxConnections => "per-document connection",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioKind::MaxDocuments => "max-documents",
            ScenarioKind::MaxConnections => "max-connections",
        };
        f.pad(name)
    }
}

/// Saturates each configured limit, probes one attempt beyond it and checks
/// that no worker process leaked.
pub struct LimitProbeSuite<I> {
    config: SuiteConfig,
    opener: SessionOpener,
    driver: HandshakeDriver,
    fixtures: FixtureStore,
    probe: WorkerCountProbe<I>,
}

impl<I: ProcessInventory> LimitProbeSuite<I> {
    pub fn new(config: SuiteConfig, inventory: I) -> Result<Self> {
        config.validate()?;

        let opener = SessionOpener::new(
            &config.server_uri,
            &config.path_template,
            config.connect_timeout(),
            &config.tls,
        )?;
        let driver = HandshakeDriver::new(config.client_version.clone(), config.receive_timeout());
        let fixtures = FixtureStore::new(config.fixture_path(), config.work_dir());
        let probe = WorkerCountProbe::new(inventory, config.settle);

        Ok(Self {
            config,
            opener,
            driver,
            fixtures,
            probe,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub async fn run(&self) -> SuiteReport {
        self.run_only(&ScenarioKind::ALL).await
    }

    /// Run the given scenarios in order, threading the measured baseline
    /// from one into the next.
    pub async fn run_only(&self, kinds: &[ScenarioKind]) -> SuiteReport {
        let started_at = Utc::now();
        let mut baseline_hint = INITIAL_WORKER_HINT;
        let mut scenarios = Vec::with_capacity(kinds.len());

        for &kind in kinds {
            let (report, baseline) = self.run_scenario(kind, baseline_hint).await;
            baseline_hint = baseline;
            scenarios.push(report);
        }

        SuiteReport {
            server_uri: self.config.server_uri.clone(),
            started_at,
            finished_at: Utc::now(),
            scenarios,
        }
    }

    /// Run one scenario. Returns its report and the baseline worker count it
    /// measured, to be passed as `previous_baseline` to the next scenario.
    pub async fn run_scenario(
        &self,
        kind: ScenarioKind,
        previous_baseline: usize,
    ) -> (ScenarioReport, usize) {
        let limit = kind.limit_in(&self.config.limits);
        if limit == 0 {
            info!(scenario = %kind, "limit disabled, skipping");
            return (ScenarioReport::skipped(kind), previous_baseline);
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let mut failures = Vec::new();

        let baseline = self.probe.count(previous_baseline).await;
        info!(scenario = %kind, limit, workers = baseline, "scenario started");

        if baseline == 0 {
            failures.push(
                ProbeError::assertion("idle worker processes before the scenario", "at least 1", 0)
                    .to_string(),
            );
            let report = ScenarioReport {
                kind,
                limit,
                started_at,
                duration_ms: start.elapsed().as_millis() as u64,
                outcome: ScenarioOutcome::Failed { failures },
                closure: None,
                workers_before: Some(0),
                workers_after: None,
            };
            return (report, previous_baseline);
        }

        let mut held = Vec::new();
        let mut copies = Vec::new();
        let result = match kind {
            ScenarioKind::MaxDocuments => {
                self.exceed_documents(limit, &mut held, &mut copies).await
            }
            ScenarioKind::MaxConnections => {
                self.exceed_connections(limit, &mut held, &mut copies).await
            }
        };

        let closure = match result {
            Ok(outcome) => {
                if !outcome.is_policy_violation() {
                    failures.push(
                        ProbeError::assertion(
                            format!("closing status of attempt {} on the {} limit", limit + 1, kind),
                            POLICY_VIOLATION,
                            &outcome,
                        )
                        .to_string(),
                    );
                }
                Some(outcome)
            }
            Err(e) => {
                warn!(scenario = %kind, "scenario aborted: {}", e);
                failures.push(e.to_string());
                None
            }
        };

        self.release(held, copies).await;

        let after = self.probe.count(baseline).await;
        if after != baseline {
            failures.push(
                ProbeError::assertion("worker processes after the scenario", baseline, after)
                    .to_string(),
            );
        }

        let outcome = if failures.is_empty() {
            ScenarioOutcome::Passed
        } else {
            ScenarioOutcome::Failed { failures }
        };
        info!(scenario = %kind, result = outcome.label(), "scenario finished");

        let report = ScenarioReport {
            kind,
            limit,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            outcome,
            closure,
            workers_before: Some(baseline),
            workers_after: Some(after),
        };
        (report, baseline)
    }

    /// Hold `limit` distinct documents open, then probe one more.
    async fn exceed_documents(
        &self,
        limit: usize,
        held: &mut Vec<Session>,
        copies: &mut Vec<DocumentHandle>,
    ) -> Result<ClosureOutcome> {
        for n in 1..=limit {
            let handle = self.fresh_handle(copies)?;
            let what = format!("admission of document {n} of {limit}");
            let session = self
                .admit(&handle, self.config.preload_documents, &what)
                .await?;
            debug!(document = n, "holding {}", handle.doc_url());
            held.push(session);
        }

        let handle = self.fresh_handle(copies)?;
        self.probe_beyond_limit(&handle, held).await
    }

    /// Hold `limit` connections to one document, then probe one more.
    async fn exceed_connections(
        &self,
        limit: usize,
        held: &mut Vec<Session>,
        copies: &mut Vec<DocumentHandle>,
    ) -> Result<ClosureOutcome> {
        let handle = self.fresh_handle(copies)?;

        let what = format!("admission of connection 1 of {limit}");
        let first = self
            .admit(&handle, self.config.preload_documents, &what)
            .await?;
        held.push(first);

        for n in 2..=limit {
            let what = format!("admission of connection {n} of {limit}");
            let session = self.admit(&handle, false, &what).await?;
            debug!(connection = n, "holding {}", handle.doc_url());
            held.push(session);
        }

        self.probe_beyond_limit(&handle, held).await
    }

    fn fresh_handle(&self, copies: &mut Vec<DocumentHandle>) -> Result<DocumentHandle> {
        let handle = self.fixtures.fresh_handle()?;
        copies.push(handle.clone());
        Ok(handle)
    }

    /// Open a session that must fit within the limit and confirm the server
    /// kept it, optionally loading its document.
    async fn admit(&self, handle: &DocumentHandle, load: bool, what: &str) -> Result<Session> {
        let mut session = self.opener.open(handle).await?;
        self.driver.confirm_admission(&mut session, what).await?;
        if load {
            self.driver
                .load_document(&mut session, self.config.load_timeout())
                .await?;
        }
        Ok(session)
    }

    async fn probe_beyond_limit(
        &self,
        handle: &DocumentHandle,
        held: &mut Vec<Session>,
    ) -> Result<ClosureOutcome> {
        let mut session = self.opener.open(handle).await?;
        let outcome = self.driver.probe(&mut session).await;
        held.push(session);

        let outcome = outcome?;
        debug!("over-limit attempt: {}", outcome);
        Ok(outcome)
    }

    async fn release(&self, held: Vec<Session>, copies: Vec<DocumentHandle>) {
        for session in held {
            session.close(self.config.receive_timeout()).await;
        }
        for copy in &copies {
            self.fixtures.remove(copy);
        }
    }
}
