//! Summary Generator
//!
//! Turns the headline scalars of a filtered view into a fixed prompt and asks
//! a `TextGenerator` for prose. Failures are isolated: callers that only want
//! something to display use `summarize_or_message`.

use crate::aggregation::{self, Scalar};
use crate::config::CURRENCY_LABEL;
use crate::dataset::{Dataset, Measure};
use crate::error::Result;
use crate::format;
use crate::llm::TextGenerator;
use tracing::{info, warn};

pub const NO_DATA_MESSAGE: &str = "No data available for the selected filters.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryScalars {
    pub row_count: usize,
    pub total_production: Scalar,
    pub total_value: Scalar,
    pub average_unit_value: Scalar,
}

impl SummaryScalars {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        Ok(Self {
            row_count: aggregation::row_count(dataset),
            total_production: aggregation::scalar_sum(dataset, Measure::Quantity)?,
            total_value: aggregation::scalar_sum(dataset, Measure::Value)?,
            average_unit_value: aggregation::scalar_mean(dataset, Measure::UnitValue)?,
        })
    }
}

fn amount(scalar: Scalar) -> String {
    scalar
        .value()
        .map(|v| format::thousands(v, 2))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn build_prompt(scalars: &SummaryScalars) -> String {
    let summary = format!(
        "The dataset contains {} records after applying filters.\n\
         The total production is {} tonnes,\n\
         with a total value of {} {}.\n\
         The average unit value is {} {}.",
        scalars.row_count,
        amount(scalars.total_production),
        amount(scalars.total_value),
        CURRENCY_LABEL,
        amount(scalars.average_unit_value),
        CURRENCY_LABEL,
    );
    format!(
        "Based on the following summary, generate insights and key takeaways:\n\n{}",
        summary
    )
}

pub struct InsightGenerator<G> {
    generator: G,
}

impl<G: TextGenerator> InsightGenerator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub async fn summarize_scalars(&self, scalars: &SummaryScalars) -> Result<String> {
        let prompt = build_prompt(scalars);
        let text = self.generator.generate(&prompt).await?;
        Ok(text.trim().to_string())
    }

    pub async fn summarize(&self, dataset: &Dataset) -> Result<String> {
        let scalars = SummaryScalars::from_dataset(dataset)?;
        info!("Generating insights for {} records", scalars.row_count);
        self.summarize_scalars(&scalars).await
    }

    /// Summary text, or a displayable message when there is nothing to
    /// summarize or the service failed
    pub async fn summarize_or_message(&self, dataset: &Dataset) -> String {
        if dataset.is_empty() {
            return NO_DATA_MESSAGE.to_string();
        }
        match self.summarize(dataset).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Insight generation failed: {}", e);
                format!("Error generating insights: {}", e)
            }
        }
    }
}
