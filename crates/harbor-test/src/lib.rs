//! Harbor Test - shared test utilities for the Harbor module runtime.
//!
//! Use as a dev-dependency:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use harbor_runtime::Runtime;
//! use harbor_test::{Call, MockGateway, mock_factory, test_config, test_dir};
//!
//! #[tokio::test]
//! async fn test_add_module() {
//!     let dir = test_dir();
//!     let gateway = Arc::new(MockGateway::new().with_unit("a.jar", "org.example.a"));
//!     let runtime = Runtime::build(test_config(&dir), mock_factory(Arc::clone(&gateway)));
//!     runtime.init().await.unwrap();
//!
//!     let record = runtime.add_module("a.jar").await.unwrap();
//!     assert_eq!(record.name(), "org.example.a");
//!     assert_eq!(gateway.calls(Call::Resolve, "a.jar"), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod harness;
pub mod mocks;

pub use harness::*;
pub use mocks::*;
