//! Surfacemap - Attack Surface Consolidation Engine
//!
//! Reads the stored output of independent reconnaissance tools (ASN intelligence,
//! network range discovery, IP/port and HTTP probing, crawling, cloud enumeration)
//! and rebuilds one deduplicated, relationship-aware attack surface graph per
//! scope target.

pub mod assets;
pub mod cli;
pub mod config;
pub mod consolidation;
pub mod error;
pub mod relationships;
pub mod resolve;
pub mod sources;
pub mod storage;

pub use error::{Result, SurfaceError};
