//! Domain types shared by the job engine, the family pipelines and the request layer.
//!
//! Everything here is passive data: no locking, no I/O.

mod domain;
pub use domain::*;
