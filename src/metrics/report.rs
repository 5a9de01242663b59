use crate::core::suite::ScenarioKind;
use crate::network::handshake::ClosureOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Passed,
    /// The limit is disabled; no assertion was evaluated.
    Skipped { reason: String },
    Failed { failures: Vec<String> },
}

impl ScenarioOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ScenarioOutcome::Passed => "passed",
            ScenarioOutcome::Skipped { .. } => "skipped",
            ScenarioOutcome::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub kind: ScenarioKind,
    pub limit: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: ScenarioOutcome,
    /// How the server answered the over-limit attempt, when it got that far
    pub closure: Option<ClosureOutcome>,
    pub workers_before: Option<usize>,
    pub workers_after: Option<usize>,
}

impl ScenarioReport {
    pub fn skipped(kind: ScenarioKind) -> Self {
        Self {
            kind,
            limit: 0,
            started_at: Utc::now(),
            duration_ms: 0,
            outcome: ScenarioOutcome::Skipped {
                reason: format!("{} limit is disabled", kind.limit_name()),
            },
            closure: None,
            workers_before: None,
            workers_after: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == ScenarioOutcome::Passed
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, ScenarioOutcome::Failed { .. })
    }

    pub fn failures(&self) -> &[String] {
        match &self.outcome {
            ScenarioOutcome::Failed { failures } => failures,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub server_uri: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn passed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.scenarios
            .iter()
            .filter(|s| matches!(s.outcome, ScenarioOutcome::Skipped { .. }))
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn scenario(&self, kind: ScenarioKind) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.kind == kind)
    }

    pub fn print_summary(&self) {
        println!("\n=== LIMIT PROBE SUMMARY ===");
        println!("Server: {}", self.server_uri);
        println!(
            "Duration: {:.2}s",
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        );

        for scenario in &self.scenarios {
            let icon = match scenario.outcome {
                ScenarioOutcome::Passed => "✅",
                ScenarioOutcome::Skipped { .. } => "⏭️ ",
                ScenarioOutcome::Failed { .. } => "❌",
            };
            println!(
                "\n{} {} (limit {}): {}",
                icon,
                scenario.kind,
                scenario.limit,
                scenario.outcome.label()
            );

            if let ScenarioOutcome::Skipped { reason } = &scenario.outcome {
                println!("   {reason}");
                continue;
            }

            if let Some(closure) = &scenario.closure {
                println!("   Over-limit attempt: {closure}");
            }
            if let (Some(before), Some(after)) = (scenario.workers_before, scenario.workers_after)
            {
                println!("   Workers: {before} before, {after} after");
            }
            println!("   Took: {}ms", scenario.duration_ms);
            for failure in scenario.failures() {
                println!("   ⚠️  {failure}");
            }
        }

        println!(
            "\n{} passed, {} failed, {} skipped",
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        );
    }

    pub fn print_compact_summary(&self) {
        for scenario in &self.scenarios {
            let detail = match (&scenario.outcome, &scenario.closure) {
                (ScenarioOutcome::Failed { failures }, _) => failures.join("; "),
                (ScenarioOutcome::Skipped { reason }, _) => reason.clone(),
                (ScenarioOutcome::Passed, Some(closure)) => closure.to_string(),
                (ScenarioOutcome::Passed, None) => String::new(),
            };
            println!(
                "{:<16} {:>5}  {:<8} {}",
                scenario.kind.to_string(),
                scenario.limit,
                scenario.outcome.label(),
                detail
            );
        }
    }

    pub fn print_minimal_summary(&self) {
        println!(
            "{} scenarios against {}: {} passed, {} failed, {} skipped",
            self.scenarios.len(),
            self.server_uri,
            self.passed_count(),
            self.failed_count(),
            self.skipped_count()
        );
    }
}
