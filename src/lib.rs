//! `wdlf-sfh` library crate.
//!
//! Recovers a star-formation history from an observed white-dwarf luminosity
//! function by iteratively inverting a Monte Carlo forward model.
//!
//! The binary (`sfh`) is a thin wrapper around this library so that the core stays
//! testable without spawning processes.

pub mod app;
pub mod cli;
pub mod debug;
pub mod domain;
pub mod error;
pub mod invert;
pub mod io;
pub mod lf;
pub mod math;
pub mod physics;
pub mod report;
pub mod sfh;
pub mod sim;
