pub mod error;
pub mod features;
pub mod models;
pub mod backtest;
pub mod ensemble;
pub mod optimizer;
pub mod pricing;
pub mod snapshot;
pub mod filters;
pub mod config;
pub mod display;
