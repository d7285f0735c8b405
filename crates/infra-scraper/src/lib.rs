// Leadharvest Infrastructure - Scraper Collaborator Bridge
// Implements: SiteProcessor, PostcodeSource via an external scraper executable

mod bridge;

pub use bridge::{ScraperBridge, ScraperBridgeConfig};
