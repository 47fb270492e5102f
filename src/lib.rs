pub mod advisor;
pub mod cache;
pub mod config;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod scanner;
pub mod search;
pub mod utils;

// Re-export commonly used types
pub use cache::ListingCache;
pub use config::{AppConfig, ScanConfig};
pub use extractor::ListingExtractor;
pub use fetcher::{Fetcher, PageFetcher};
pub use models::{Annotation, ListingRecord, UserStatus};
pub use scanner::{ScanReport, Scanner};
pub use search::ListingSearch;
pub use utils::error::{AppError, Result};
