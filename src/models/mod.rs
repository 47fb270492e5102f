pub mod finance;
pub mod listing;

// Re-exports for convenience
pub use finance::*;
pub use listing::*;
