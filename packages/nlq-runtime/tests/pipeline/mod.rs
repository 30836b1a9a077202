//! End-to-end pipeline tests over a local DataFusion warehouse.
//!
//! The language model is scripted, everything else is the real stack:
//! discovery, translation guard, execution and answer composition.

pub mod end_to_end_tests;
pub mod helpers;
