//! Input/output helpers.
//!
//! - CSV ingest + validation (`ingest`)
//! - CSV exports of SFH results and synthetic luminosity functions (`export`)
//! - result JSON read/write (`result`)

pub mod export;
pub mod ingest;
pub mod result;

pub use export::*;
pub use ingest::*;
pub use result::*;
