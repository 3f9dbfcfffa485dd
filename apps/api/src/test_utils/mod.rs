//! Test utilities for integration testing.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - A builder for `AppState` backed by those in-memory implementations

mod app_state_builder;
mod credential_mocks;
mod factories;
mod ledger_mocks;

pub use app_state_builder::*;
pub use credential_mocks::*;
pub use factories::*;
pub use ledger_mocks::*;
