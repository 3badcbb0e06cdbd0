//! admediate - Insight-Driven Ad Load Orchestrator
//!
//! Bridges an external insight/analytics service with an ad-network SDK:
//! per-format controllers race an asynchronous insight query against a
//! cancellable fallback timer, pick an ad unit and floor price, issue the
//! real load, and correlate impression/click callbacks back to the insight
//! that informed them. The native SDK boundaries are trait objects with
//! simulated implementations for the demo binary and tests.

pub mod adnetwork;
pub mod api;
pub mod config;
pub mod events;
pub mod insight;
pub mod orchestrator;
pub mod telemetry;
