//! StateSet stock ledger
//!
//! Per-location stock balances, an append-only quantity ledger, FIFO/LIFO/moving-average
//! valuation, document posting and physical-count reconciliation. Every operation takes the tenant
//! explicitly; nothing is read from ambient request state.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod locks;
pub mod migrator;
pub mod models;
pub mod services;
pub mod valuation;

pub use config::{load_config, AppConfig};
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use models::{
    Adjustment, BalanceSnapshot, MovementDocument, NewMovement, NewMovementLine, Observation,
    PostingOutcome, StockKey,
};
pub use services::factory::{ServiceFactory, StockServices};
