//! Liveness and latency checks for proxy config links.
//!
//! A link such as `trojan://...` or `vmess://...` is decoded into the endpoint
//! it names, then a single timed TCP connect tells whether anything is
//! listening there.

pub mod config;
pub mod decoder;
pub mod metrics;
pub mod prober;
pub mod server;
pub mod service;
pub mod util;
