//! # Query Gateway Test Suite
//!
//! End-to-end flows through [`query_gateway::DefaultQueryGateway`] and the
//! in-process [`query_gateway::SimpleQueryBus`].
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── gateway_benchmarks.rs   # Dispatch overhead per mode
//! └── src/
//!     └── integration/
//!         ├── fixtures.rs         # Shared query/result types and handlers
//!         ├── point_to_point.rs
//!         ├── scatter_gather.rs
//!         ├── subscriptions.rs
//!         └── interceptors.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qg-tests
//!
//! # By mode
//! cargo test -p qg-tests integration::scatter_gather
//! cargo test -p qg-tests integration::subscriptions
//!
//! # Benchmarks
//! cargo bench -p qg-tests
//! ```

#![allow(dead_code)]
