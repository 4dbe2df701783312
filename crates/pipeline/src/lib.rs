//! Priority pipeline service: configuration, payload processors and the
//! HTTP status API

pub mod api;
pub mod config;
pub mod processor;
