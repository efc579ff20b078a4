//! Export Sink
//!
//! Writes chart results as `{"value": ..., "chart_name": ...}` JSON documents
//! named `<scenario>_<KIND>_<n>.json`. Each write is independent; a failed
//! write is reported and the rest carry on.

use crate::aggregation::AggregationResult;
use crate::charts::{ChartKind, ChartOutput};
use crate::config::DashboardConfig;
use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Serialize)]
struct ExportDocument<'a> {
    value: &'a AggregationResult,
    chart_name: &'a str,
}

/// Render the export document with 4-space indentation
pub fn render_document(result: &AggregationResult, chart_name: &str) -> Result<String> {
    let document = ExportDocument {
        value: result,
        chart_name,
    };
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut serializer)?;
    // serde_json only ever emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFailure {
    pub chart_id: &'static str,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExportSink {
    output_dir: PathBuf,
    scenario: String,
}

impl ExportSink {
    pub fn new(output_dir: impl Into<PathBuf>, scenario: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            scenario: scenario.into(),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(config.output_dir.clone(), config.scenario.clone())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn file_name(&self, kind: ChartKind, number: u32) -> String {
        format!("{}_{}_{}.json", self.scenario, kind.tag(), number)
    }

    pub fn path_for(&self, kind: ChartKind, number: u32) -> PathBuf {
        self.output_dir.join(self.file_name(kind, number))
    }

    pub fn export(
        &self,
        result: &AggregationResult,
        chart_label: &str,
        kind: ChartKind,
        number: u32,
    ) -> Result<PathBuf> {
        let document = render_document(result, chart_label)?;
        fs::create_dir_all(&self.output_dir)?;
        let path = self.path_for(kind, number);
        fs::write(&path, document)?;
        info!("Chart data exported to {}", path.display());
        Ok(path)
    }

    /// Export every successful output; failed queries and failed writes are
    /// collected in the report without stopping the remaining exports.
    pub fn export_all(&self, outputs: &[ChartOutput]) -> ExportReport {
        let mut report = ExportReport::default();
        for output in outputs {
            let spec = &output.spec;
            let outcome = match &output.result {
                Ok(result) => self
                    .export(result, &output.label, spec.kind, spec.number)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(path) => report.written.push(path),
                Err(message) => {
                    warn!("Export of {} skipped: {}", spec.id, message);
                    report.failed.push(ExportFailure {
                        chart_id: spec.id,
                        message,
                    });
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{Cell, ResultTable, Scalar};
    use crate::charts::{ChartQuery, ChartSpec};
    use crate::dataset::Measure;
    use crate::error::DashboardError;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn series() -> AggregationResult {
        let mut table = ResultTable::new(["date", "total_quant_of_product"]);
        table.push_row(vec![
            Cell::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
            Cell::Number(15.0),
        ]);
        table.push_row(vec![
            Cell::Date(NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()),
            Cell::Number(20.5),
        ]);
        AggregationResult::Table(table)
    }

    #[test]
    fn test_file_naming() {
        let sink = ExportSink::new("/tmp/out", "FISHERY");
        assert_eq!(sink.file_name(ChartKind::BarChart, 3), "FISHERY_BARCHART_3.json");
        assert_eq!(
            sink.path_for(ChartKind::BigNumber, 1),
            PathBuf::from("/tmp/out/FISHERY_BIGNUMBER_1.json")
        );
    }

    #[test]
    fn test_round_trip_keeps_pairs_and_iso_dates() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExportSink::new(dir.path(), "FISHERY");
        let path = sink
            .export(&series(), "Production Over Time", ChartKind::LineChart, 1)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            json!({
                "value": [
                    {"date": "2023-01-01", "total_quant_of_product": 15.0},
                    {"date": "2023-02-01", "total_quant_of_product": 20.5}
                ],
                "chart_name": "Production Over Time"
            })
        );
    }

    #[test]
    fn test_document_layout() {
        let text = render_document(&series(), "Production Over Time").unwrap();
        assert!(text.starts_with("{\n    \"value\": [\n        {\n            \"date\": \"2023-01-01\""));
        let value_pos = text.find("\"value\"").unwrap();
        let name_pos = text.find("\"chart_name\"").unwrap();
        assert!(value_pos < name_pos);
    }

    #[test]
    fn test_scalar_documents() {
        let text = render_document(&AggregationResult::Scalar(Scalar::Value(1305.0)), "Total Production").unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["value"], json!(1305.0));

        let text = render_document(&AggregationResult::Scalar(Scalar::NoData), "Total Production").unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert!(parsed["value"].is_null());
    }

    #[test]
    fn test_export_all_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ExportSink::new(dir.path(), "FISHERY");
        let spec = |id: &'static str, number: u32| ChartSpec {
            id,
            title: "Total",
            kind: ChartKind::BigNumber,
            number,
            query: ChartQuery::ScalarSum(Measure::Quantity),
        };
        let outputs = vec![
            ChartOutput {
                spec: spec("ok_one", 1),
                label: "Total".to_string(),
                result: Ok(AggregationResult::Scalar(Scalar::Value(1.0))),
            },
            ChartOutput {
                spec: spec("broken", 2),
                label: "Total".to_string(),
                result: Err(DashboardError::Polars("boom".to_string())),
            },
            ChartOutput {
                spec: spec("ok_two", 3),
                label: "Total".to_string(),
                result: Ok(AggregationResult::Scalar(Scalar::NoData)),
            },
        ];

        let report = sink.export_all(&outputs);
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].chart_id, "broken");
        assert!(!report.is_complete());
        assert!(dir.path().join("FISHERY_BIGNUMBER_3.json").exists());
        assert!(!dir.path().join("FISHERY_BIGNUMBER_2.json").exists());
    }

    #[test]
    fn test_unwritable_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "x").unwrap();
        let sink = ExportSink::new(blocker.join("nested"), "FISHERY");
        let result = sink.export(&series(), "Production Over Time", ChartKind::LineChart, 1);
        assert!(matches!(result, Err(DashboardError::Io(_))));
    }
}
