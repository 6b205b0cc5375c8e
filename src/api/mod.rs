// Atomic API modules
pub mod client;
pub mod error;
pub mod locations;
pub mod providers;

// Re-export commonly used functions
pub use client::{api_call, envelope_data, set_silent};
pub use error::ApiError;
pub use locations::{create_location, load_locations};
pub use providers::load_providers;
