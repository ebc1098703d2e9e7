//! Zombie Host Detector
//!
//! Classifies hosts from five performance criteria and tracks detected
//! zombies across runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     ZOMBIE DETECTOR                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────────┐   ┌─────────────────┐  │
//! │  │  HTTP API │   │ Detection Service│   │ Event Publisher │  │
//! │  │  / CLI    │──▶│ batch -> tracker │──▶│ (webhook)       │  │
//! │  └───────────┘   └────────┬─────────┘   └─────────────────┘  │
//! │                           ▼                                  │
//! │          ┌──────────────────────────────────┐                │
//! │          │ current / history / killed JSON  │                │
//! │          └──────────────────────────────────┘                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod config;
pub mod detection;
pub mod error;
pub mod handlers;
pub mod models;
pub mod publisher;
pub mod service;
pub mod tracking;

pub use app::{create_router, AppState};
pub use error::{AppError, AppResult};
