// Property pipeline: discovery, scraping, processing, and the orchestrator that drives them

pub mod discovery;
pub mod orchestrator;
pub mod policy;
pub mod processing;
pub mod scraper;

pub use discovery::{CountyDiscovery, CountyDiscoveryEngine, DiscoveryResult, Priority};
pub use orchestrator::{IntegrationOptions, IntegrationOrchestrator, IntegrationStatus};
pub use processing::{DataProcessingPipeline, ProcessingResult};
pub use scraper::{IntelligentScraper, ScrapeResult};
