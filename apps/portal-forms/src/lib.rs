//! Customer form lifecycle and submission-history core for the construction back-office portal.

pub mod config;
pub mod db;
pub mod errors;
pub mod forms;
pub mod state;

pub use errors::FormError;
pub use state::AppState;
