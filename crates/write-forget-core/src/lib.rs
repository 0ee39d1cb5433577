//! Core types and configuration for the write-forget coordinator
//!
//! This crate provides:
//! - Configuration management (`WriterConfig`, environment parsing)
//! - The write mode shared by requests, jobs and sinks
//! - The I/O fault taxonomy reported through the fault channel

#![forbid(unsafe_code)]

pub mod config;
pub mod error;

pub use config::{DEFAULT_DEBOUNCE_MS, FaultMode, WriterConfig};
pub use error::{Result, WriteError, WriteMode};
