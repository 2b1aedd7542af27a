//! Ready-to-go hooks for consumers.
pub mod pre_start;
