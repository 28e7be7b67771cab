// src/config/mod.rs
pub mod ai;
pub mod scrape;

pub use ai::RefinerConfig;
pub use scrape::{ScrapeConfig, TierBudget};
