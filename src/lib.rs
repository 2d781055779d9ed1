//! Gaswatch Backend Library
//!
//! Real-time gas and ETH/USD dashboard backend: bounded in-memory series,
//! periodic sample generators, WebSocket fan-out and an HTTP query façade.

pub mod api;
pub mod candles;
pub mod client;
pub mod config;
pub mod fanout;
pub mod feeds;
pub mod middleware;
pub mod models;
pub mod simulator;
pub mod storage;
