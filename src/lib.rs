//! IolBot Library
//!
//! Multi-strategy scoring and paper/live trading for the InvertirOnline broker

pub mod backtesting;
pub mod bot;
pub mod config;
pub mod error;
pub mod execution;
pub mod features;
pub mod filters;
pub mod iol;
pub mod learning;
pub mod market_data;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod scoring;
pub mod strategies;
pub mod types;
pub mod yahoo;
