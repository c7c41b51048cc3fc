//! HTTP surface over [`VoucherOrchestrator`](crate::orchestrator::VoucherOrchestrator).

pub mod config;
pub mod routes;
pub mod server;
