use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use property_scraper::app::ports::HttpClientPort;
use property_scraper::app::wiring::{build_components, build_orchestrator};
use property_scraper::config::{Config, DEFAULT_CONFIG_PATH};
use property_scraper::infra::http_client::ReqwestHttp;
use property_scraper::logging;
use property_scraper::metrics;
use property_scraper::pipeline::processing::export::{export_to_file, ExportFormat};
use property_scraper::pipeline::processing::normalize::{matches_street_grammar, standardize_address};
use property_scraper::pipeline::IntegrationOptions;
use property_scraper::storage::SearchFilters;
use property_scraper::types::{DataSource, Jurisdiction, SourceMethod, SourceStatus};

#[derive(Parser)]
#[command(name = "property_scraper")]
#[command(about = "County property records discovery, scraping and normalization")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for rotated JSON logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery, scraping and processing end to end
    Run {
        /// Restrict to these states (comma-separated postal codes)
        #[arg(long, value_delimiter = ',')]
        states: Option<Vec<String>>,
        /// Maximum number of sources to scrape
        #[arg(long)]
        max_sources: Option<usize>,
        /// Write valid properties to this file
        #[arg(long)]
        export: Option<PathBuf>,
        /// Export format: csv, json or geojson
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Discover data sources without scraping them
    Discover {
        #[arg(long, value_delimiter = ',')]
        states: Option<Vec<String>>,
    },
    /// Scrape a single URL and print the normalized properties
    Scrape {
        #[arg(long)]
        url: String,
        /// scraper, api or csv
        #[arg(long, default_value = "scraper")]
        method: String,
        /// State postal code to attach to scraped records
        #[arg(long)]
        state: Option<String>,
        /// County name to attach to scraped records
        #[arg(long)]
        county: Option<String>,
    },
    /// Standardize an address and check it against the street grammar
    Standardize { address: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);
    metrics::init_metrics();

    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Commands::Run {
            states,
            max_sources,
            export,
            format,
        } => {
            let format: ExportFormat = format.parse()?;
            println!("🚀 Running full integration...");
            let orchestrator = build_orchestrator(&config)?;
            let result = orchestrator
                .start_integration(IntegrationOptions { states, max_sources })
                .await?;

            println!("\n📊 Integration Results:");
            println!("   Counties discovered: {}", result.counties_discovered);
            println!("   Sources found: {}", result.sources_found);
            println!("   Properties scraped: {}", result.properties_scraped);
            println!("   Properties processed: {}", result.properties_processed);
            println!("   Valid properties: {}", result.valid_properties);
            println!("   Quality score: {:.1}", result.quality.quality_score);
            println!("   Duration: {} ms", result.duration_ms);
            if !result.errors.is_empty() {
                println!("\n⚠️  {} errors encountered", result.errors.len());
                for e in result.errors.iter().take(20) {
                    println!("   - {}", e);
                }
            }

            if let Some(path) = export {
                let records = orchestrator
                    .search_properties(&SearchFilters {
                        limit: Some(usize::MAX),
                        ..SearchFilters::default()
                    })
                    .await
                    .properties;
                let written = export_to_file(&records, format, &path)?;
                println!("💾 Exported {} records to {}", written, path.display());
            }

            if result.success {
                println!("✅ Integration completed successfully");
            } else {
                error!("Integration did not complete");
                println!("❌ Integration did not complete");
            }
        }
        Commands::Discover { states } => {
            println!("🔎 Discovering county data sources...");
            let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new());
            let components = build_components(&config, http)?;
            let result = components
                .discovery
                .discover_all_counties(states.as_deref())
                .await?;

            println!("\n📊 Discovery Results:");
            println!("   Jurisdictions: {}", result.total_jurisdictions);
            println!("   Processed: {}", result.processed);
            println!("   Sources found: {}", result.sources_found);
            println!("   Failed checks: {}", result.failed_checks);
            for county in result.counties.iter().filter(|c| !c.sources.is_empty()) {
                println!(
                    "   {} {} [{:?}]",
                    county.jurisdiction.name, county.jurisdiction.state_code, county.priority
                );
                for source in &county.sources {
                    println!("      - {} ({})", source.url, source.method);
                }
            }
        }
        Commands::Scrape {
            url,
            method,
            state,
            county,
        } => {
            let method: SourceMethod = method.parse().map_err(anyhow::Error::msg)?;
            let http: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new());
            let components = build_components(&config, http)?;

            let mut source = DataSource {
                id: url.clone(),
                name: url.clone(),
                url: url.clone(),
                method,
                data_type: "property_records".to_string(),
                status: SourceStatus::Active,
                last_checked: chrono::Utc::now(),
                success_rate: 0.0,
                selectors: None,
                jurisdiction: state.zip(county).map(|(state_code, name)| Jurisdiction {
                    name,
                    state_code: state_code.to_uppercase(),
                    state_fips: String::new(),
                    county_fips: String::new(),
                }),
            };
            info!(url = %url, %method, "Scraping single source");
            let result = components.scraper.scrape_county_data(&mut source).await;

            if !result.success {
                println!("❌ Scrape failed after {} attempts: {}", result.attempts, result.error.unwrap_or_default());
                return Ok(());
            }
            println!(
                "✅ {} candidates, {} normalized (success rate {:.0}%)",
                result.raw_count,
                result.data.len(),
                result.success_rate * 100.0
            );
            println!("{}", serde_json::to_string_pretty(&result.data)?);
        }
        Commands::Standardize { address } => {
            let standardized = standardize_address(&address);
            println!("{}", standardized);
            if !matches_street_grammar(&standardized) {
                println!("⚠️  Does not match the street grammar");
            }
        }
    }
    Ok(())
}
