//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{CaptureServer, FakeDumper, TestEngine};
//!
//! #[tokio::test]
//! async fn test_run() {
//!     let server = CaptureServer::spawn(vec![]).await;
//!     let env = TestEngine::start(FakeDumper::new(1024)).await;
//!     let job = env.create_job("nightly").await;
//!     env.engine().trigger_now(job.id).await.unwrap();
//! }
//! ```

#![allow(dead_code)]

mod capture;
mod engine;
mod fakes;

pub use capture::{CaptureServer, CapturedRequest};
pub use engine::{fast_settings, TestEngine, WAIT_TIMEOUT};
pub use fakes::{FakeDumper, MemoryDestination};
