use crate::metrics::report::{ScenarioOutcome, SuiteReport};
use anyhow::{Context, Result};
use csv::Writer;
use std::path::Path;

pub struct ReportExporter<'a> {
    report: &'a SuiteReport,
}

impl<'a> ReportExporter<'a> {
    pub fn new(report: &'a SuiteReport) -> Self {
        Self { report }
    }

    /// Write the report as JSON for `.json` paths, CSV otherwise.
    pub fn export<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let result = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => self.export_json(path),
            _ => self.export_csv(path),
        };
        result.with_context(|| format!("Failed to export report to {}", path.display()))
    }

    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = Writer::from_path(path)?;

        writer.write_record([
            "scenario",
            "limit",
            "status",
            "started_at",
            "duration_ms",
            "closing_code",
            "closing_message",
            "workers_before",
            "workers_after",
            "details",
        ])?;

        for scenario in &self.report.scenarios {
            let (code, message) = match &scenario.closure {
                Some(closure) => (
                    closure.code().map_or(String::new(), |c| c.to_string()),
                    closure.to_string(),
                ),
                None => (String::new(), String::new()),
            };
            let details = match &scenario.outcome {
                ScenarioOutcome::Passed => String::new(),
                ScenarioOutcome::Skipped { reason } => reason.clone(),
                ScenarioOutcome::Failed { failures } => failures.join("; "),
            };

            writer.write_record(&[
                scenario.kind.to_string(),
                scenario.limit.to_string(),
                scenario.outcome.label().to_string(),
                scenario.started_at.to_rfc3339(),
                scenario.duration_ms.to_string(),
                code,
                message,
                scenario.workers_before.map_or(String::new(), |w| w.to_string()),
                scenario.workers_after.map_or(String::new(), |w| w.to_string()),
                details,
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self.report)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn print_json(&self) {
        println!(
            "{}",
            serde_json::to_string_pretty(self.report).unwrap_or_else(|_| "{}".to_string())
        );
    }
}
