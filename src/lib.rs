#![forbid(unsafe_code)]

//! Shared pieces of the vidgrab proxy and lookup client.

pub mod config;
pub mod controller;
pub mod logging;
pub mod record;
pub mod upstream;
