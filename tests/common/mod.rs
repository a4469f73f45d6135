//! Common utilities for integration tests

#![allow(dead_code)]

pub mod mock_engine;
pub mod test_helpers;

// Re-export commonly used items
pub use mock_engine::{ball_and_sticks, straight_section, CurrentProfile, MockEngine};
pub use test_helpers::{
    density_for,
    max_relative_difference,
    point_source_potential,
    relative_error,
};
