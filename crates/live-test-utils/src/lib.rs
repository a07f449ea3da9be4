//! # Live Test Utilities
//!
//! Shared test utilities for the live runtime.
//!
//! ## Modules
//!
//! - `fixtures` - A counter snapshot with a ready-made handler registry
//! - `renderer` - A renderer that records every snapshot it is asked to render
//! - `frames` - Helpers for reading rendered frames off an output sink
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let mounts = MountCounter::new();
//!     let renderer = RecordingRenderer::new();
//!     let runtime = test_runtime(counter_registry(&mounts), renderer.clone());
//!
//!     let (sink, mut frames) = frame_channel();
//!     // spawn a session, submit events, then inspect renderer.snapshots()
//! }
//! ```

pub mod fixtures;
pub mod frames;
pub mod renderer;

pub use fixtures::*;
pub use frames::*;
pub use renderer::*;
