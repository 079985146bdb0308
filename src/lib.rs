//! Treeline - backcountry risk assessment synthesis.
//!
//! # Overview
//!
//! Treeline answers one question: how safe is a backcountry objective at a
//! given point and start time? It fans out to seven upstream data categories
//! (weather, solar, avalanche, snowpack, rainfall, alerts, air quality),
//! normalizes what comes back, and synthesizes a single 0-100 safety score
//! with a separate data-completeness confidence score.
//!
//! # Degradation Contract
//!
//! Upstream failure is normal operating condition, not an error. Every
//! provider runs a fallback chain (secondary source, cache, local
//! approximation, explicit zeroed terminal), so a valid request always gets
//! `200` with the best available synthesis. Degraded inputs are reported in
//! the body via `partialData` / `apiWarning`, and missing numbers stay
//! `null`, never a fabricated `0`.
//!
//! # Modules
//!
//! - [`model`]: request/response types, hazard categories, score types
//! - [`cache`]: in-process TTL cache shared by the fetch chains
//! - [`providers`]: one fallback-chain client per upstream category
//! - [`orchestrator`]: concurrent fan-out under a shared deadline
//! - [`relevance`]: which hazard categories apply to this objective
//! - [`terrain`]: surface / freeze-thaw classification by time band
//! - [`scoring`]: hazard impacts, safety score, confidence score
//! - [`assemble`]: deterministic response assembly
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod assemble;
pub mod cache;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod providers;
pub mod relevance;
pub mod scoring;
pub mod terrain;
