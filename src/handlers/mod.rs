pub mod helpers;
pub mod install;
pub mod locations;

pub use install::{install_page, install_ws, validate_post};
pub use locations::{locations_get, locations_post, providers_get};
