//! Background Tasks Module
//!
//! # Tasks
//! - Cache cleanup: expiry, eviction and orphan reclamation at a fixed interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
