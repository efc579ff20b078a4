//! Filter Engine
//!
//! Conjunctive row filtering: an inclusive date window plus optional
//! equality constraints on province, type and pieaces.

use crate::dataset::{to_epoch_days, Dataset, Dimension, Record, DATE};
use crate::error::Result;
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

/// Choice label meaning "no constraint" in dashboard selectors
pub const ALL_CHOICE: &str = "All";

/// Map a selector choice to a constraint, treating `All` and blanks as none
pub fn parse_choice(choice: Option<&str>) -> Option<String> {
    choice
        .map(str::trim)
        .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case(ALL_CHOICE))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub province: Option<String>,
    pub fishery_type: Option<String>,
    pub pieaces: Option<String>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl FilterCriteria {
    /// Criteria that every record satisfies
    pub fn unconstrained() -> Self {
        Self::between(NaiveDate::MIN, NaiveDate::MAX)
    }

    pub fn between(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            province: None,
            fishery_type: None,
            pieaces: None,
        }
    }

    /// Window spanning the dataset's first and last dates
    pub fn covering(dataset: &Dataset) -> Result<Self> {
        Ok(match dataset.date_range()? {
            Some((start, end)) => Self::between(start, end),
            None => Self::unconstrained(),
        })
    }

    pub fn with_category(mut self, dimension: Dimension, value: Option<String>) -> Self {
        match dimension {
            Dimension::Province => self.province = value,
            Dimension::Type => self.fishery_type = value,
            Dimension::Pieaces => self.pieaces = value,
        }
        self
    }

    pub fn with_province(self, value: impl Into<String>) -> Self {
        self.with_category(Dimension::Province, Some(value.into()))
    }

    pub fn with_type(self, value: impl Into<String>) -> Self {
        self.with_category(Dimension::Type, Some(value.into()))
    }

    pub fn with_pieaces(self, value: impl Into<String>) -> Self {
        self.with_category(Dimension::Pieaces, Some(value.into()))
    }

    pub fn category(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::Province => self.province.as_deref(),
            Dimension::Type => self.fishery_type.as_deref(),
            Dimension::Pieaces => self.pieaces.as_deref(),
        }
    }

    /// Row-level form of the predicate
    pub fn matches(&self, record: &Record) -> bool {
        self.start_date <= record.date
            && record.date <= self.end_date
            && Dimension::ALL.iter().all(|dim| {
                self.category(*dim)
                    .map_or(true, |wanted| record.category(*dim) == wanted)
            })
    }

    /// Combine two criteria into one equivalent to applying both.
    ///
    /// Returns `None` when the two pin the same dimension to different values,
    /// since no record can satisfy both.
    pub fn intersect(&self, other: &FilterCriteria) -> Option<FilterCriteria> {
        let mut combined = FilterCriteria::between(
            self.start_date.max(other.start_date),
            self.end_date.min(other.end_date),
        );
        for dim in Dimension::ALL {
            let value = match (self.category(dim), other.category(dim)) {
                (Some(a), Some(b)) if a != b => return None,
                (a, b) => a.or(b).map(str::to_string),
            };
            combined = combined.with_category(dim, value);
        }
        Some(combined)
    }

    pub fn to_expr(&self) -> Expr {
        let day = col(DATE).cast(DataType::Int32);
        let mut predicate = day
            .clone()
            .gt_eq(lit(to_epoch_days(self.start_date)))
            .and(day.lt_eq(lit(to_epoch_days(self.end_date))));

        for dim in Dimension::ALL {
            if let Some(value) = self.category(dim) {
                predicate = predicate.and(col(dim.column()).eq(lit(value.to_string())));
            }
        }
        predicate
    }
}

/// Apply `criteria` to `dataset`, returning the matching rows as a new dataset
pub fn apply(dataset: &Dataset, criteria: &FilterCriteria) -> Result<Dataset> {
    let frame = dataset
        .frame()
        .clone()
        .lazy()
        .filter(criteria.to_expr())
        .collect()?;

    debug!(
        "Filter {:?} kept {} of {} rows",
        criteria,
        frame.height(),
        dataset.len()
    );
    Ok(Dataset::from_frame(frame))
}
