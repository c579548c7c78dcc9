//! Star-formation history model.

pub mod model;

pub use model::*;
