pub mod events;
pub mod history;
pub mod lifecycle;
pub mod models;
pub mod query;
pub mod store;
pub mod transition;
