//! Chart Catalog
//!
//! The fixed set of dashboard charts and headline numbers. Each entry names
//! its export kind and sequence number and declares the aggregation that
//! feeds it; `evaluate` runs the whole catalog against one filtered view.

use crate::aggregation::{self, AggregationResult, Cell, ResultTable, Scalar};
use crate::config::{DashboardConfig, CURRENCY_LABEL};
use crate::dataset::{Dataset, Dimension, Measure, TimeGrain};
use crate::error::Result;
use crate::filter::{self, FilterCriteria};
use crate::format;
use std::fmt;
use tracing::{debug, warn};

/// Export kind, used as the middle part of exported file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    PieChart,
    LineChart,
    BarChart,
    BigNumber,
    GeoMap,
}

impl ChartKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ChartKind::PieChart => "PIECHART",
            ChartKind::LineChart => "LINECHART",
            ChartKind::BarChart => "BARCHART",
            ChartKind::BigNumber => "BIGNUMBER",
            ChartKind::GeoMap => "GEOMAP",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which configured top-N cutoff a ranking chart uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    TopN,
    TopNMonthly,
}

impl Cutoff {
    fn resolve(&self, config: &DashboardConfig) -> usize {
        match self {
            Cutoff::TopN => config.top_n,
            Cutoff::TopNMonthly => config.top_n_monthly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartQuery {
    SumByKey {
        dimension: Dimension,
        measure: Measure,
    },
    TimeSeriesSum {
        grain: TimeGrain,
        measures: &'static [Measure],
    },
    /// Mean of `measure` over time, restricted to the configured focus species
    FocusSpeciesMean {
        grain: TimeGrain,
        measure: Measure,
    },
    TopN {
        dimension: Dimension,
        measure: Measure,
        cutoff: Cutoff,
    },
    TopNOverTime {
        dimension: Dimension,
        measure: Measure,
        cutoff: Cutoff,
        grain: TimeGrain,
    },
    ScalarSum(Measure),
    ScalarMean(Measure),
    /// Per-key sums rendered as `1,234.56` strings for the map widget
    FormattedTotals {
        dimension: Dimension,
        measure: Measure,
    },
}

impl ChartQuery {
    pub fn evaluate(&self, dataset: &Dataset, config: &DashboardConfig) -> Result<AggregationResult> {
        let result = match *self {
            ChartQuery::SumByKey { dimension, measure } => {
                AggregationResult::Table(aggregation::sum_by_key(dataset, dimension, measure)?)
            }
            ChartQuery::TimeSeriesSum { grain, measures } => {
                AggregationResult::Table(aggregation::time_series_sum(dataset, grain, measures)?)
            }
            ChartQuery::FocusSpeciesMean { grain, measure } => {
                let criteria = FilterCriteria::unconstrained().with_pieaces(config.focus_species.clone());
                let focus = filter::apply(dataset, &criteria)?;
                AggregationResult::Table(aggregation::time_series_mean(&focus, grain, measure)?)
            }
            ChartQuery::TopN {
                dimension,
                measure,
                cutoff,
            } => AggregationResult::Table(aggregation::top_n_by_sum(
                dataset,
                dimension,
                measure,
                cutoff.resolve(config),
            )?),
            ChartQuery::TopNOverTime {
                dimension,
                measure,
                cutoff,
                grain,
            } => AggregationResult::Table(aggregation::top_n_over_time(
                dataset,
                dimension,
                measure,
                cutoff.resolve(config),
                grain,
            )?),
            ChartQuery::ScalarSum(measure) => {
                AggregationResult::Scalar(aggregation::scalar_sum(dataset, measure)?)
            }
            ChartQuery::ScalarMean(measure) => {
                AggregationResult::Scalar(aggregation::scalar_mean(dataset, measure)?)
            }
            ChartQuery::FormattedTotals { dimension, measure } => {
                let totals = aggregation::sum_by_key(dataset, dimension, measure)?;
                AggregationResult::Table(formatted(&totals))
            }
        };
        Ok(result)
    }
}

fn formatted(table: &ResultTable) -> ResultTable {
    let mut out = ResultTable::new(table.columns().iter().cloned());
    for row in table.rows() {
        out.push_row(
            row.iter()
                .map(|cell| match cell {
                    Cell::Number(n) => Cell::Text(format::thousands(*n, 2)),
                    other => other.clone(),
                })
                .collect(),
        );
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartSpec {
    pub id: &'static str,
    /// Title template; `{species}` and `{monthly}` are filled from config
    pub title: &'static str,
    pub kind: ChartKind,
    pub number: u32,
    pub query: ChartQuery,
}

impl ChartSpec {
    /// Display title for the given configuration
    pub fn label(&self, config: &DashboardConfig) -> String {
        self.title
            .replace("{species}", &config.focus_species)
            .replace("{monthly}", &config.top_n_monthly.to_string())
    }
}

pub const CATALOG: &[ChartSpec] = &[
    ChartSpec {
        id: "production_by_type",
        title: "Production by Type",
        kind: ChartKind::PieChart,
        number: 1,
        query: ChartQuery::SumByKey { dimension: Dimension::Type, measure: Measure::Quantity },
    },
    ChartSpec {
        id: "value_by_type",
        title: "Value by Type",
        kind: ChartKind::PieChart,
        number: 2,
        query: ChartQuery::SumByKey { dimension: Dimension::Type, measure: Measure::Value },
    },
    ChartSpec {
        id: "production_over_time",
        title: "Production Over Time",
        kind: ChartKind::LineChart,
        number: 1,
        query: ChartQuery::TimeSeriesSum { grain: TimeGrain::Day, measures: &[Measure::Quantity] },
    },
    ChartSpec {
        id: "value_over_time",
        title: "Value Over Time",
        kind: ChartKind::LineChart,
        number: 2,
        query: ChartQuery::TimeSeriesSum { grain: TimeGrain::Day, measures: &[Measure::Value] },
    },
    ChartSpec {
        id: "average_unit_value_over_time",
        title: "Average Unit Value Over Time of {species}",
        kind: ChartKind::LineChart,
        number: 3,
        query: ChartQuery::FocusSpeciesMean { grain: TimeGrain::Day, measure: Measure::UnitValue },
    },
    ChartSpec {
        id: "top_production_provinces",
        title: "Top Provinces by Production",
        kind: ChartKind::BarChart,
        number: 1,
        query: ChartQuery::TopN { dimension: Dimension::Province, measure: Measure::Quantity, cutoff: Cutoff::TopN },
    },
    ChartSpec {
        id: "top_value_provinces",
        title: "Top Provinces by Value",
        kind: ChartKind::BarChart,
        number: 2,
        query: ChartQuery::TopN { dimension: Dimension::Province, measure: Measure::Value, cutoff: Cutoff::TopN },
    },
    ChartSpec {
        id: "monthly_pieaces",
        title: "Monthly Comparison of Top {monthly} Pieaces",
        kind: ChartKind::LineChart,
        number: 4,
        query: ChartQuery::TopNOverTime {
            dimension: Dimension::Pieaces,
            measure: Measure::Quantity,
            cutoff: Cutoff::TopNMonthly,
            grain: TimeGrain::Month,
        },
    },
    ChartSpec {
        id: "monthly_provinces",
        title: "Monthly Comparison of Top {monthly} Provinces",
        kind: ChartKind::LineChart,
        number: 5,
        query: ChartQuery::TopNOverTime {
            dimension: Dimension::Province,
            measure: Measure::Quantity,
            cutoff: Cutoff::TopNMonthly,
            grain: TimeGrain::Month,
        },
    },
    ChartSpec {
        id: "export_import_over_time",
        title: "Export and Import Value Over Time",
        kind: ChartKind::LineChart,
        number: 6,
        query: ChartQuery::TimeSeriesSum {
            grain: TimeGrain::Day,
            measures: &[Measure::ExportValue, Measure::ImportValue],
        },
    },
    ChartSpec {
        id: "net_trade_over_time",
        title: "Net Trade Value Over Time",
        kind: ChartKind::LineChart,
        number: 7,
        query: ChartQuery::TimeSeriesSum { grain: TimeGrain::Day, measures: &[Measure::NetTradeValue] },
    },
    ChartSpec {
        id: "top_net_trade_provinces",
        title: "Top Provinces by Net Trade Value",
        kind: ChartKind::BarChart,
        number: 3,
        query: ChartQuery::TopN { dimension: Dimension::Province, measure: Measure::NetTradeValue, cutoff: Cutoff::TopN },
    },
    ChartSpec {
        id: "total_production",
        title: "Total Production",
        kind: ChartKind::BigNumber,
        number: 1,
        query: ChartQuery::ScalarSum(Measure::Quantity),
    },
    ChartSpec {
        id: "total_value",
        title: "Total Value",
        kind: ChartKind::BigNumber,
        number: 2,
        query: ChartQuery::ScalarSum(Measure::Value),
    },
    ChartSpec {
        id: "average_unit_value",
        title: "Average Unit Value",
        kind: ChartKind::BigNumber,
        number: 3,
        query: ChartQuery::ScalarMean(Measure::UnitValue),
    },
    ChartSpec {
        id: "total_employment",
        title: "Total Employment",
        kind: ChartKind::BigNumber,
        number: 4,
        query: ChartQuery::ScalarSum(Measure::Employment),
    },
    ChartSpec {
        id: "production_by_province",
        title: "Total Production by Province",
        kind: ChartKind::GeoMap,
        number: 1,
        query: ChartQuery::FormattedTotals { dimension: Dimension::Province, measure: Measure::Quantity },
    },
];

pub fn find(id: &str) -> Option<&'static ChartSpec> {
    CATALOG.iter().find(|spec| spec.id == id)
}

/// One evaluated catalog entry; a failed query keeps its error here
#[derive(Debug)]
pub struct ChartOutput {
    pub spec: ChartSpec,
    pub label: String,
    pub result: Result<AggregationResult>,
}

/// Run every catalog entry against `dataset`
pub fn evaluate(dataset: &Dataset, config: &DashboardConfig) -> Vec<ChartOutput> {
    CATALOG
        .iter()
        .map(|spec| {
            let result = spec.query.evaluate(dataset, config);
            match &result {
                Ok(r) if r.is_empty() => debug!("Chart {} has no data", spec.id),
                Ok(_) => debug!("Chart {} evaluated", spec.id),
                Err(e) => warn!("Chart {} failed: {}", spec.id, e),
            }
            ChartOutput {
                spec: *spec,
                label: spec.label(config),
                result,
            }
        })
        .collect()
}

/// The four metric tiles shown above the charts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlineMetrics {
    pub total_production: Scalar,
    pub total_value: Scalar,
    pub average_unit_value: Scalar,
    pub total_employment: Scalar,
}

impl HeadlineMetrics {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        Ok(Self {
            total_production: aggregation::scalar_sum(dataset, Measure::Quantity)?,
            total_value: aggregation::scalar_sum(dataset, Measure::Value)?,
            average_unit_value: aggregation::scalar_mean(dataset, Measure::UnitValue)?,
            total_employment: aggregation::scalar_sum(dataset, Measure::Employment)?,
        })
    }

    /// `(label, text)` for each tile; headcount is shown without decimals
    pub fn tiles(&self) -> Vec<(&'static str, String)> {
        let show = |scalar: Scalar, decimals: usize, unit: &str| match scalar.value() {
            Some(v) if unit.is_empty() => format::thousands(v, decimals),
            Some(v) => format!("{} {}", format::thousands(v, decimals), unit),
            None => "No data".to_string(),
        };
        vec![
            ("Total Production", show(self.total_production, 2, "tonnes")),
            ("Total Value", show(self.total_value, 2, CURRENCY_LABEL)),
            ("Average Unit Value", show(self.average_unit_value, 2, CURRENCY_LABEL)),
            ("Total Employment", show(self.total_employment, 0, "")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn record(month: u32, province: &str, pieaces: &str, qty: f64) -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2023, month, 1).unwrap(),
            province: province.to_string(),
            fishery_type: "Marine".to_string(),
            pieaces: pieaces.to_string(),
            total_quant_of_product: qty,
            total_value_product: qty * 1000.0,
            unit_value: qty * 2.0,
            total_emp: 3.0,
            export_value: qty,
            import_value: 1.0,
            net_trade_value: qty - 1.0,
        }
    }

    fn sample() -> Dataset {
        Dataset::from_records(&[
            record(1, "Bangkok", "Catfishes", 1200.0),
            record(1, "Phuket", "Shrimps", 40.0),
            record(2, "Bangkok", "Catfishes", 60.0),
            record(2, "Songkhla", "Tilapia", 5.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_catalog_entries_are_unique() {
        let ids: HashSet<&str> = CATALOG.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), CATALOG.len());
        let files: HashSet<(ChartKind, u32)> = CATALOG.iter().map(|s| (s.kind, s.number)).collect();
        assert_eq!(files.len(), CATALOG.len());
        assert_eq!(CATALOG.len(), 17);
    }

    #[test]
    fn test_evaluate_runs_every_entry() {
        let outputs = evaluate(&sample(), &DashboardConfig::default());
        assert_eq!(outputs.len(), CATALOG.len());
        assert!(outputs.iter().all(|o| o.result.is_ok()));
    }

    #[test]
    fn test_focus_species_chart() {
        let config = DashboardConfig::default();
        let spec = find("average_unit_value_over_time").unwrap();
        let result = spec.query.evaluate(&sample(), &config).unwrap();
        let table = result.as_table().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][1], Cell::Number(2400.0));

        let mut other = config.clone();
        other.focus_species = "Eels".to_string();
        let result = spec.query.evaluate(&sample(), &other).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_cutoffs_follow_config() {
        let mut config = DashboardConfig::default();
        config.top_n = 1;
        let spec = find("top_production_provinces").unwrap();
        let table = spec.query.evaluate(&sample(), &config).unwrap();
        assert_eq!(
            table.as_table().unwrap().pairs("province", "total_quant_of_product"),
            vec![("Bangkok".to_string(), 1260.0)]
        );
    }

    #[test]
    fn test_geomap_values_are_formatted() {
        let spec = find("production_by_province").unwrap();
        let result = spec.query.evaluate(&sample(), &DashboardConfig::default()).unwrap();
        let table = result.as_table().unwrap();
        assert_eq!(
            table.rows()[0],
            vec![Cell::Text("Bangkok".to_string()), Cell::Text("1,260.00".to_string())]
        );
    }

    #[test]
    fn test_headline_metrics() {
        let metrics = HeadlineMetrics::from_dataset(&sample()).unwrap();
        assert_eq!(metrics.total_production, Scalar::Value(1305.0));
        assert_eq!(metrics.total_employment, Scalar::Value(12.0));

        let empty = HeadlineMetrics::from_dataset(&Dataset::empty().unwrap()).unwrap();
        assert!(empty.total_production.is_no_data());
        assert!(empty.average_unit_value.is_no_data());
    }

    #[test]
    fn test_labels_follow_config() {
        let mut config = DashboardConfig::default();
        assert_eq!(
            find("average_unit_value_over_time").unwrap().label(&config),
            "Average Unit Value Over Time of Catfishes"
        );
        assert_eq!(
            find("monthly_provinces").unwrap().label(&config),
            "Monthly Comparison of Top 3 Provinces"
        );

        config.focus_species = "Eels".to_string();
        config.top_n_monthly = 2;
        let outputs = evaluate(&sample(), &config);
        let label = |id: &str| {
            outputs
                .iter()
                .find(|o| o.spec.id == id)
                .map(|o| o.label.clone())
                .unwrap()
        };
        assert_eq!(label("average_unit_value_over_time"), "Average Unit Value Over Time of Eels");
        assert_eq!(label("monthly_pieaces"), "Monthly Comparison of Top 2 Pieaces");
        assert_eq!(label("monthly_provinces"), "Monthly Comparison of Top 2 Provinces");
        assert_eq!(label("total_production"), "Total Production");
    }

    #[test]
    fn test_metric_tiles() {
        let tiles = HeadlineMetrics::from_dataset(&sample()).unwrap().tiles();
        assert_eq!(tiles[0], ("Total Production", "1,305.00 tonnes".to_string()));
        assert_eq!(tiles[1], ("Total Value", "1,305,000.00 THB".to_string()));
        assert_eq!(tiles[3], ("Total Employment", "12".to_string()));

        let empty = HeadlineMetrics::from_dataset(&Dataset::empty().unwrap()).unwrap().tiles();
        assert!(empty.iter().all(|(_, text)| text == "No data"));
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ChartKind::PieChart.tag(), "PIECHART");
        assert_eq!(ChartKind::GeoMap.to_string(), "GEOMAP");
    }
}
