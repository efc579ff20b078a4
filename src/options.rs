//! Filter Options
//!
//! Values offered by the province / type / pieaces selectors. Narrower
//! selectors only offer values that still exist under the wider selections.

use crate::dataset::{Dataset, Dimension};
use crate::error::{DashboardError, Result};
use crate::filter::{self, FilterCriteria, ALL_CHOICE};
use chrono::NaiveDate;
use itertools::Itertools;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionOrder {
    /// Order of first appearance in the data
    FirstSeen,
    /// Lexicographic
    #[default]
    Sorted,
}

impl FromStr for OptionOrder {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "firstseen" => Ok(OptionOrder::FirstSeen),
            "sorted" => Ok(OptionOrder::Sorted),
            other => Err(DashboardError::Config(format!(
                "Unknown option order '{}' (expected 'first-seen' or 'sorted')",
                other
            ))),
        }
    }
}

pub fn distinct_values(dataset: &Dataset, dimension: Dimension, order: OptionOrder) -> Result<Vec<String>> {
    let unique = dataset.categories(dimension)?.into_iter().unique();
    Ok(match order {
        OptionOrder::FirstSeen => unique.collect(),
        OptionOrder::Sorted => unique.sorted().collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub provinces: Vec<String>,
    pub types: Vec<String>,
    pub pieaces: Vec<String>,
}

impl FilterOptions {
    /// Options for every selector given the current `selection`.
    ///
    /// Types are drawn from rows matching the selected province, pieaces from
    /// rows matching province and type. Dates never narrow the options.
    pub fn cascading(dataset: &Dataset, selection: &FilterCriteria, order: OptionOrder) -> Result<Self> {
        let mut narrowed = FilterCriteria::unconstrained();

        let provinces = distinct_values(dataset, Dimension::Province, order)?;

        narrowed = narrowed.with_category(Dimension::Province, selection.province.clone());
        let by_province = filter::apply(dataset, &narrowed)?;
        let types = distinct_values(&by_province, Dimension::Type, order)?;

        narrowed = narrowed.with_category(Dimension::Type, selection.fishery_type.clone());
        let by_type = filter::apply(dataset, &narrowed)?;
        let pieaces = distinct_values(&by_type, Dimension::Pieaces, order)?;

        Ok(Self {
            date_range: dataset.date_range()?,
            provinces,
            types,
            pieaces,
        })
    }
}

/// Prefix a selector's values with the unconstrained choice
pub fn with_all_choice(values: &[String]) -> Vec<String> {
    std::iter::once(ALL_CHOICE.to_string())
        .chain(values.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Record;

    fn record(province: &str, fishery_type: &str, pieaces: &str) -> Record {
        Record {
            date: NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(),
            province: province.to_string(),
            fishery_type: fishery_type.to_string(),
            pieaces: pieaces.to_string(),
            total_quant_of_product: 1.0,
            total_value_product: 1.0,
            unit_value: 1.0,
            total_emp: 1.0,
            export_value: 0.0,
            import_value: 0.0,
            net_trade_value: 0.0,
        }
    }

    fn sample() -> Dataset {
        Dataset::from_records(&[
            record("Songkhla", "Marine", "Shrimps"),
            record("Bangkok", "Freshwater", "Tilapia"),
            record("Songkhla", "Freshwater", "Catfishes"),
            record("Bangkok", "Freshwater", "Catfishes"),
            record("Phuket", "Marine", "Squids"),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_seen_and_sorted() {
        let dataset = sample();
        assert_eq!(
            distinct_values(&dataset, Dimension::Province, OptionOrder::FirstSeen).unwrap(),
            vec!["Songkhla", "Bangkok", "Phuket"]
        );
        assert_eq!(
            distinct_values(&dataset, Dimension::Province, OptionOrder::Sorted).unwrap(),
            vec!["Bangkok", "Phuket", "Songkhla"]
        );
    }

    #[test]
    fn test_cascading_options() {
        let selection = FilterCriteria::unconstrained()
            .with_province("Songkhla")
            .with_type("Freshwater");
        let options = FilterOptions::cascading(&sample(), &selection, OptionOrder::Sorted).unwrap();
        assert_eq!(options.provinces, vec!["Bangkok", "Phuket", "Songkhla"]);
        assert_eq!(options.types, vec!["Freshwater", "Marine"]);
        assert_eq!(options.pieaces, vec!["Catfishes"]);
    }

    #[test]
    fn test_unconstrained_selection_offers_everything() {
        let options =
            FilterOptions::cascading(&sample(), &FilterCriteria::unconstrained(), OptionOrder::FirstSeen).unwrap();
        assert_eq!(options.types, vec!["Marine", "Freshwater"]);
        assert_eq!(options.pieaces, vec!["Shrimps", "Tilapia", "Catfishes", "Squids"]);
    }

    #[test]
    fn test_with_all_choice() {
        let values = vec!["Bangkok".to_string()];
        assert_eq!(with_all_choice(&values), vec!["All", "Bangkok"]);
    }

    #[test]
    fn test_parse_order() {
        assert_eq!("first-seen".parse::<OptionOrder>().unwrap(), OptionOrder::FirstSeen);
        assert_eq!("Sorted".parse::<OptionOrder>().unwrap(), OptionOrder::Sorted);
        assert!("random".parse::<OptionOrder>().is_err());
    }
}
