//! Request layer over [`vane_core::JobSupervisor`].
//!
//! [`ApiHandler`] is the seam a host implements or takes ready-made as
//! [`SupervisorApiAdapter`]; the optional axum router lives behind `http`.

mod error;
pub use error::ApiError;

mod handler;
pub use handler::ApiHandler;

mod adapter;
pub use adapter::SupervisorApiAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;
