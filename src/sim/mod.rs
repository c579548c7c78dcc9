//! Forward simulation of a white-dwarf population.

pub mod forward;

pub use forward::*;
