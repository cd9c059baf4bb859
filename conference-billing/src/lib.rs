pub mod config;
pub mod handlers;
pub mod models;
pub mod pricing;
pub mod services;
pub mod startup;
pub mod utils;

pub use startup::{AppState, Application};
