use fishery_dashboard::charts::{self, HeadlineMetrics};
use fishery_dashboard::config::DashboardConfig;
use fishery_dashboard::dataset::{self, Dataset, DatasetLoader};
use fishery_dashboard::export::ExportSink;
use fishery_dashboard::filter::{self, parse_choice, FilterCriteria};
use fishery_dashboard::insights::InsightGenerator;
use fishery_dashboard::llm::LlmClient;
use fishery_dashboard::options::{with_all_choice, FilterOptions, OptionOrder};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fishery-dashboard")]
#[command(about = "Fishery production and trade dashboard pipeline")]
#[command(version)]
struct Cli {
    /// Path to the fishery CSV file
    #[arg(short, long, global = true, default_value = "fishery_data.csv")]
    csv: PathBuf,

    /// USD to THB exchange rate (or set FISHERY_EXCHANGE_RATE)
    #[arg(long, global = true)]
    exchange_rate: Option<f64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every chart and write its JSON document
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output directory (or set FISHERY_OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// File name prefix (or set FISHERY_SCENARIO)
        #[arg(long)]
        scenario: Option<String>,
    },
    /// Print one chart's result as JSON
    Chart {
        /// Catalog id, e.g. top_production_provinces
        id: String,

        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Print the headline metric tiles
    Metrics {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Print the values offered by each selector
    Options {
        #[command(flatten)]
        filters: FilterArgs,

        /// first-seen or sorted
        #[arg(long, default_value = "sorted")]
        order: OptionOrder,
    },
    /// Ask the configured LLM for a narrative summary
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// First date of the window (YYYY-MM-DD)
    #[arg(long)]
    start: Option<String>,

    /// Last date of the window (YYYY-MM-DD)
    #[arg(long)]
    end: Option<String>,

    /// Province, or All
    #[arg(long)]
    province: Option<String>,

    /// Fishery type, or All
    #[arg(long = "type")]
    fishery_type: Option<String>,

    /// Species group, or All
    #[arg(long)]
    pieaces: Option<String>,
}

impl FilterArgs {
    fn to_criteria(&self) -> Result<FilterCriteria> {
        let mut criteria = FilterCriteria::unconstrained();
        if let Some(start) = &self.start {
            criteria.start_date = date_arg("--start", start)?;
        }
        if let Some(end) = &self.end {
            criteria.end_date = date_arg("--end", end)?;
        }
        criteria.province = parse_choice(self.province.as_deref());
        criteria.fishery_type = parse_choice(self.fishery_type.as_deref());
        criteria.pieaces = parse_choice(self.pieaces.as_deref());
        Ok(criteria)
    }
}

fn date_arg(flag: &str, value: &str) -> Result<NaiveDate> {
    match dataset::parse_date(value) {
        Some(date) => Ok(date),
        None => bail!("Invalid date for {}: '{}'", flag, value),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = DashboardConfig::from_env()?;
    if let Some(rate) = cli.exchange_rate {
        config.exchange_rate = rate;
    }

    match cli.command {
        Commands::Export {
            filters,
            output_dir,
            scenario,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(scenario) = scenario {
                config.scenario = scenario;
            }
            config.validate()?;
            let view = load_view(&cli.csv, &config, &filters)?;
            run_export(&view, &config)
        }
        Commands::Chart { id, filters } => {
            config.validate()?;
            let spec = match charts::find(&id) {
                Some(spec) => spec,
                None => bail!("Unknown chart '{}'", id),
            };
            let view = load_view(&cli.csv, &config, &filters)?;
            let result = spec.query.evaluate(&view, &config)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Metrics { filters } => {
            config.validate()?;
            let view = load_view(&cli.csv, &config, &filters)?;
            print_metrics(&view)
        }
        Commands::Options { filters, order } => {
            config.validate()?;
            let dataset = DatasetLoader::from_config(&config).load(&cli.csv)?;
            let options = FilterOptions::cascading(&dataset, &filters.to_criteria()?, order)?;
            let rendered = serde_json::json!({
                "date_range": options.date_range,
                "provinces": with_all_choice(&options.provinces),
                "types": with_all_choice(&options.types),
                "pieaces": with_all_choice(&options.pieaces),
            });
            println!("{}", serde_json::to_string_pretty(&rendered)?);
            Ok(())
        }
        Commands::Summary { filters } => {
            config.validate()?;
            let view = load_view(&cli.csv, &config, &filters)?;
            let client = LlmClient::new(&config.llm)?;
            info!("Using {:?} model {}", client.provider(), client.model());
            let text = InsightGenerator::new(client).summarize_or_message(&view).await;
            println!("{}", text);
            Ok(())
        }
    }
}

fn load_view(csv: &Path, config: &DashboardConfig, filters: &FilterArgs) -> Result<Dataset> {
    let dataset = DatasetLoader::from_config(config)
        .load(csv)
        .with_context(|| format!("Failed to load {}", csv.display()))?;
    let criteria = filters.to_criteria()?;
    let view = filter::apply(&dataset, &criteria)?;
    info!("{} of {} records match the filters", view.len(), dataset.len());
    Ok(view)
}

fn run_export(view: &Dataset, config: &DashboardConfig) -> Result<()> {
    let outputs = charts::evaluate(view, config);
    let sink = ExportSink::from_config(config);
    let report = sink.export_all(&outputs);

    println!(
        "Exported {} of {} charts to {}",
        report.written.len(),
        outputs.len(),
        sink.output_dir().display()
    );
    for failure in &report.failed {
        warn!("{}: {}", failure.chart_id, failure.message);
    }
    if !report.is_complete() {
        bail!("{} chart(s) failed to export", report.failed.len());
    }
    Ok(())
}

fn print_metrics(view: &Dataset) -> Result<()> {
    let metrics = HeadlineMetrics::from_dataset(view)?;
    println!("{:<20}{}", "Records:", view.len());
    for (label, text) in metrics.tiles() {
        println!("{:<20}{}", format!("{}:", label), text);
    }
    Ok(())
}
