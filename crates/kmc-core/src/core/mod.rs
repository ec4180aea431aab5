//! # Core Module
//!
//! Data structures that describe the simulated film, independent of how
//! events are selected or executed.
//!
//! ## Overview
//!
//! A film is stored as a stack of planes. Every cell of every plane carries a
//! fixed number of integer and floating point values whose meaning is chosen
//! by the model. The two in-plane directions are periodic; the vertical one
//! grows as the model appends planes.
//!
//! ## Architecture
//!
//! - **Coordinates** ([`cell`]) - Absolute cell indices and relative offsets
//! - **Storage** ([`lattice`]) - Plane storage, periodic wrapping and change tracking
//! - **Neighborhoods** ([`neighbors`]) - Offset lists and read-only probes used by propensity functions
//! - **Declared Changes** ([`cells_to_change`]) - Cells a semi-manually tracked event promises to modify
//! - **Index Enums** ([`enums`]) - Macros for named value and offset indices
//! - **Randomness** ([`rng`]) - Shared, seedable uniform generators
//! - **Output** ([`io`]) - Snapshot formats written by periodic actions

pub mod cell;
pub mod cells_to_change;
pub mod enums;
pub mod io;
pub mod lattice;
pub mod neighbors;
pub mod rng;
