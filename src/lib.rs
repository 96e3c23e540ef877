pub mod commands;
pub mod error;
pub mod migrate;
pub mod model;
pub mod output;
pub mod report;
pub mod store;
pub mod templates;
