//! # KMCThinFilm Core Library
//!
//! A lattice-based kinetic Monte Carlo (KMC) engine for simulating thin-film
//! growth: atoms arrive from above, diffuse, react and stack up into a film
//! whose lattice grows plane by plane.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that model authors only
//! touch the layers they need.
//!
//! - **[`core`]: The Foundation.** Cell indices, the growable periodic lattice,
//!   neighbor probes, random number generators and snapshot writers. Nothing
//!   here knows about events or time.
//!
//! - **[`engine`]: The Logic Core.** The stateful [`engine::simulation::Simulation`]
//!   driver and the event-selection solvers it relies on. Models register
//!   groups of cell-centered events (with a propensity function evaluated at
//!   every cell) and over-lattice events (deposition anywhere on the surface),
//!   plus periodic actions for output and analysis.
//!
//! - **[`workflows`]: The Public API.** Complete, configurable growth models
//!   built on the engine, ready to run from the command line or from other
//!   programs.

pub mod core;
pub mod engine;
pub mod workflows;
