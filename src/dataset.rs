//! Dataset Loader
//!
//! Reads the fishery CSV into typed `Record`s, applies the currency conversion
//! once, and holds the result as an immutable polars `DataFrame` with a fixed
//! schema. Everything downstream addresses columns through `Dimension`,
//! `Measure` and `TimeGrain` rather than raw strings.

use crate::config::{DashboardConfig, SOURCE_UNIT_SCALE};
use crate::error::{DashboardError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

pub const DATE: &str = "date";
pub const MONTH: &str = "month";

/// Columns every input file must carry
pub const REQUIRED_COLUMNS: [&str; 11] = [
    "date",
    "province",
    "type",
    "pieaces",
    "total_quant_of_product",
    "total_value_product",
    "unit_value",
    "total_emp",
    "export_value",
    "import_value",
    "net_trade_value",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Categorical columns a dataset can be grouped or filtered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Province,
    Type,
    Pieaces,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Province, Dimension::Type, Dimension::Pieaces];

    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Province => "province",
            Dimension::Type => "type",
            Dimension::Pieaces => "pieaces",
        }
    }
}

/// Numeric columns that can be summed or averaged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Quantity,
    Value,
    UnitValue,
    Employment,
    ExportValue,
    ImportValue,
    NetTradeValue,
}

impl Measure {
    pub const ALL: [Measure; 7] = [
        Measure::Quantity,
        Measure::Value,
        Measure::UnitValue,
        Measure::Employment,
        Measure::ExportValue,
        Measure::ImportValue,
        Measure::NetTradeValue,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Measure::Quantity => "total_quant_of_product",
            Measure::Value => "total_value_product",
            Measure::UnitValue => "unit_value",
            Measure::Employment => "total_emp",
            Measure::ExportValue => "export_value",
            Measure::ImportValue => "import_value",
            Measure::NetTradeValue => "net_trade_value",
        }
    }

    /// Whether the loader rescales this column into the target currency
    pub fn is_converted(&self) -> bool {
        matches!(self, Measure::Value | Measure::UnitValue)
    }
}

/// Temporal bucketing for time-series queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGrain {
    Day,
    Month,
}

impl TimeGrain {
    pub fn column(&self) -> &'static str {
        match self {
            TimeGrain::Day => DATE,
            TimeGrain::Month => MONTH,
        }
    }

    pub fn bucket(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeGrain::Day => date,
            TimeGrain::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

/// One fishery observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub date: NaiveDate,
    pub province: String,
    #[serde(rename = "type")]
    pub fishery_type: String,
    pub pieaces: String,
    pub total_quant_of_product: f64,
    pub total_value_product: f64,
    pub unit_value: f64,
    pub total_emp: f64,
    pub export_value: f64,
    pub import_value: f64,
    pub net_trade_value: f64,
}

impl Record {
    pub fn category(&self, dimension: Dimension) -> &str {
        match dimension {
            Dimension::Province => &self.province,
            Dimension::Type => &self.fishery_type,
            Dimension::Pieaces => &self.pieaces,
        }
    }

    pub fn measure(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Quantity => self.total_quant_of_product,
            Measure::Value => self.total_value_product,
            Measure::UnitValue => self.unit_value,
            Measure::Employment => self.total_emp,
            Measure::ExportValue => self.export_value,
            Measure::ImportValue => self.import_value,
            Measure::NetTradeValue => self.net_trade_value,
        }
    }

    fn measure_mut(&mut self, measure: Measure) -> &mut f64 {
        match measure {
            Measure::Quantity => &mut self.total_quant_of_product,
            Measure::Value => &mut self.total_value_product,
            Measure::UnitValue => &mut self.unit_value,
            Measure::Employment => &mut self.total_emp,
            Measure::ExportValue => &mut self.export_value,
            Measure::ImportValue => &mut self.import_value,
            Measure::NetTradeValue => &mut self.net_trade_value,
        }
    }

    /// Rescale the currency columns by `factor`
    pub fn converted(mut self, factor: f64) -> Self {
        for measure in Measure::ALL.into_iter().filter(Measure::is_converted) {
            *self.measure_mut(measure) *= factor;
        }
        self
    }
}

/// Row shape as it appears in the file, before date parsing
#[derive(Debug, Deserialize)]
struct RawRow {
    date: String,
    province: String,
    #[serde(rename = "type")]
    fishery_type: String,
    pieaces: String,
    total_quant_of_product: f64,
    total_value_product: f64,
    unit_value: f64,
    total_emp: f64,
    export_value: f64,
    import_value: f64,
    net_trade_value: f64,
}

impl RawRow {
    fn into_record(self, row_number: usize) -> Result<Record> {
        let date = parse_date(&self.date).ok_or_else(|| {
            DashboardError::Parse(format!(
                "row {}: unparsable date '{}'",
                row_number, self.date
            ))
        })?;

        for (column, value) in [
            ("province", &self.province),
            ("type", &self.fishery_type),
            ("pieaces", &self.pieaces),
        ] {
            if value.is_empty() {
                return Err(DashboardError::Parse(format!(
                    "row {}: empty value in column '{}'",
                    row_number, column
                )));
            }
        }

        Ok(Record {
            date,
            province: self.province,
            fishery_type: self.fishery_type,
            pieaces: self.pieaces,
            total_quant_of_product: self.total_quant_of_product,
            total_value_product: self.total_value_product,
            unit_value: self.unit_value,
            total_emp: self.total_emp,
            export_value: self.export_value,
            import_value: self.import_value,
            net_trade_value: self.net_trade_value,
        })
    }
}

/// Parse a calendar date, accepting a date-time and dropping its time part
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

pub(crate) fn to_epoch_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(NaiveDate::default()).num_days() as i32
}

pub(crate) fn from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::default().checked_add_signed(chrono::Duration::days(days as i64))
}

pub(crate) fn string_values(frame: &DataFrame, name: &str) -> Result<Vec<String>> {
    let ca = frame.column(name)?.str()?;
    Ok(ca
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

pub(crate) fn float_values(frame: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = frame.column(name)?.cast(&DataType::Float64)?;
    let ca = series.f64()?;
    Ok(ca.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

pub(crate) fn date_values(frame: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
    let series = frame.column(name)?.cast(&DataType::Int32)?;
    let ca = series.i32()?;
    ca.into_iter()
        .map(|days| {
            days.and_then(from_epoch_days).ok_or_else(|| {
                DashboardError::Polars(format!("null or out-of-range date in column '{}'", name))
            })
        })
        .collect()
}

/// Immutable, schema-checked table of records
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    pub fn from_records(records: &[Record]) -> Result<Self> {
        let dates: Vec<i32> = records.iter().map(|r| to_epoch_days(r.date)).collect();
        let months: Vec<i32> = records
            .iter()
            .map(|r| to_epoch_days(TimeGrain::Month.bucket(r.date)))
            .collect();

        let mut columns = vec![
            Series::new(DATE, dates).cast(&DataType::Date)?,
            Series::new(MONTH, months).cast(&DataType::Date)?,
        ];
        for dimension in Dimension::ALL {
            let values: Vec<&str> = records.iter().map(|r| r.category(dimension)).collect();
            columns.push(Series::new(dimension.column(), values));
        }
        for measure in Measure::ALL {
            let values: Vec<f64> = records.iter().map(|r| r.measure(measure)).collect();
            columns.push(Series::new(measure.column(), values));
        }

        Ok(Self {
            frame: DataFrame::new(columns)?,
        })
    }

    pub fn empty() -> Result<Self> {
        Self::from_records(&[])
    }

    /// Wrap a frame produced by filtering an existing dataset
    pub(crate) fn from_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        date_values(&self.frame, DATE)
    }

    pub fn categories(&self, dimension: Dimension) -> Result<Vec<String>> {
        string_values(&self.frame, dimension.column())
    }

    pub fn measures(&self, measure: Measure) -> Result<Vec<f64>> {
        float_values(&self.frame, measure.column())
    }

    /// Earliest and latest record dates, `None` when empty
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let dates = self.dates()?;
        let min = dates.iter().min().copied();
        let max = dates.iter().max().copied();
        Ok(min.zip(max))
    }

    /// Materialize the rows back into typed records
    pub fn records(&self) -> Result<Vec<Record>> {
        let dates = self.dates()?;
        let provinces = self.categories(Dimension::Province)?;
        let types = self.categories(Dimension::Type)?;
        let pieaces = self.categories(Dimension::Pieaces)?;
        let quantity = self.measures(Measure::Quantity)?;
        let value = self.measures(Measure::Value)?;
        let unit_value = self.measures(Measure::UnitValue)?;
        let employment = self.measures(Measure::Employment)?;
        let export_value = self.measures(Measure::ExportValue)?;
        let import_value = self.measures(Measure::ImportValue)?;
        let net_trade = self.measures(Measure::NetTradeValue)?;

        Ok((0..self.len())
            .map(|i| Record {
                date: dates[i],
                province: provinces[i].clone(),
                fishery_type: types[i].clone(),
                pieaces: pieaces[i].clone(),
                total_quant_of_product: quantity[i],
                total_value_product: value[i],
                unit_value: unit_value[i],
                total_emp: employment[i],
                export_value: export_value[i],
                import_value: import_value[i],
                net_trade_value: net_trade[i],
            })
            .collect())
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.frame.equals(&other.frame)
    }
}

/// Reads fishery CSV files into a `Dataset`
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    exchange_rate: f64,
}

impl DatasetLoader {
    pub fn new(exchange_rate: f64) -> Self {
        Self { exchange_rate }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(config.exchange_rate)
    }

    /// Multiplier applied to currency columns at load time
    pub fn conversion_factor(&self) -> f64 {
        SOURCE_UNIT_SCALE * self.exchange_rate
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Dataset> {
        let path = path.as_ref();
        info!("Loading fishery data from {}", path.display());
        let file = File::open(path)?;
        let dataset = self.load_from_reader(file)?;
        info!(
            "Loaded {} records from {} (currency factor {})",
            dataset.len(),
            path.display(),
            self.conversion_factor()
        );
        Ok(dataset)
    }

    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<Dataset> {
        let factor = self.conversion_factor();
        let records: Vec<Record> = read_records(reader)?
            .into_iter()
            .map(|r| r.converted(factor))
            .collect();
        Dataset::from_records(&records)
    }
}

/// Parse and validate rows without currency conversion
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|required| !headers.iter().any(|h| h == required))
        .collect();
    if !missing.is_empty() {
        return Err(DashboardError::Schema(format!(
            "missing required columns: {}",
            missing.join(", ")
        )));
    }
    debug!("CSV header validated: {:?}", headers);

    let mut records = Vec::new();
    for (idx, row) in rdr.deserialize::<RawRow>().enumerate() {
        let row_number = idx + 1;
        let raw = row.map_err(|e| match DashboardError::from(e) {
            DashboardError::Parse(msg) => {
                DashboardError::Parse(format!("row {}: {}", row_number, msg))
            }
            other => other,
        })?;
        records.push(raw.into_record(row_number)?);
    }

    Ok(records)
}
