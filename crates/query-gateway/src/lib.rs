//! # Query Gateway
//!
//! Caller-facing entry point for dispatching queries. A query is built into a
//! message, passed through the dispatch interceptors, handed to a
//! [`QueryBus`] and its results are checked, intercepted and converted to the
//! caller's expected type.
//!
//! ## Dispatch Modes
//!
//! | Mode | Entry point | Result |
//! |------|-------------|--------|
//! | Point-to-point | [`DefaultQueryGateway::query`] | one value |
//! | Scatter-gather | [`DefaultQueryGateway::scatter_gather`] | stream, ends at the deadline |
//! | Subscription | [`DefaultQueryGateway::subscription_query`] | initial value plus live updates |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DefaultQueryGateway                      │
//! │                                                              │
//! │  ┌───────────────────┐            ┌────────────────────────┐ │
//! │  │ Dispatch chain    │            │ Result chain           │ │
//! │  │ (copy-on-write)   │            │ (copy-on-write)        │ │
//! │  └─────────┬─────────┘            └───────────▲────────────┘ │
//! └────────────┼──────────────────────────────────┼──────────────┘
//!              ▼                                  │
//!       ┌─────────────────────────────────────────┴──┐
//!       │          QueryBus (trait, pluggable)       │
//!       │    SimpleQueryBus: in-process reference    │
//!       └────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use query_gateway::{DefaultQueryGateway, SimpleQueryBus};
//! use shared_messaging::ResponseTypes;
//!
//! let bus = Arc::new(SimpleQueryBus::new());
//! let gateway = DefaultQueryGateway::builder().query_bus(bus).build()?;
//! let widget: Widget = gateway
//!     .query(&FindWidget { id: 7 }, ResponseTypes::instance_of::<Widget>())
//!     .await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use std::time::Duration;

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod simple_bus;
pub mod subscription;

pub use bus::{BusSubscription, QueryBus};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use gateway::{DefaultQueryGateway, GatewayBuilder, QueryFuture, QueryStream};
pub use simple_bus::{handler_fn, FnQueryHandler, QueryHandler, QueryUpdateEmitter, SimpleQueryBus};
pub use subscription::{SubscriptionHandle, SubscriptionQueryResult, SubscriptionState, Updates};

/// Update buffer size used when a subscription query does not request one.
pub const DEFAULT_UPDATE_BUFFER_SIZE: usize = 32;

/// Scatter-gather deadline used when a query does not specify one.
pub const DEFAULT_SCATTER_GATHER_TIMEOUT: Duration = Duration::from_millis(5000);

/// Upper bound for a requested update buffer size.
pub const MAX_UPDATE_BUFFER_SIZE: usize = 16384;

/// Largest value `max_update_buffer_size` may be configured to; tokio's
/// bounded channels reject larger capacities.
pub const UPDATE_BUFFER_SIZE_LIMIT: usize = usize::MAX >> 3;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
