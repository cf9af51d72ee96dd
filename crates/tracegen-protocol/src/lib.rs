//! Protocol definitions for tracegen.
//!
//! This crate defines the W3C Trace Context types, the text-map carrier used for
//! propagation, and the span representation handed to reporters.

pub mod span;
pub mod tags;
pub mod trace_context;

pub use span::*;
pub use trace_context::*;
