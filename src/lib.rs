//! ShieldOps - SRE and security operations automation.
//!
//! In-memory analytics engines served over a REST API, agent workflows
//! (SOC analyst, security scan, incident investigation) run in parallel by a
//! supervisor, and a typed client for the API.

pub mod agents;
pub mod api;
pub mod cli;
pub mod client;
pub mod config;
pub mod engines;
pub mod models;
pub mod orchestration;
pub mod report;
pub mod scanner;

pub use client::{ClientError, ShieldOpsClient};
pub use config::Config;
pub use models::{AgentEvent, EventType, Finding, Severity};
pub use orchestration::{Supervisor, SupervisorSession};
