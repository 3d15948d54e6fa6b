//! HTTP middleware applied by [`crate::app`].

pub mod delay;
pub mod tracing_layer;
