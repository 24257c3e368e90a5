//! HTML served by the web UI.
//!
//! The page shell is kept as a `&'static str` bundled inside the binary; only
//! the live values are filled in per request.

pub mod dashboard;
