//! lintegral - distributed integration of 1/ln(x)
//!
//! A coordinator process partitions the integration range across a fleet of
//! worker nodes in proportion to their CPU capacity; each worker computes
//! its share in parallel across its local cores and reports back; the
//! coordinator sums the partial integrals into the final value.
//!
//! # Architecture
//!
//! - **Wire protocol**: length-prefixed frames with a deterministic binary
//!   payload encoding shared by both sides
//! - **Quadrature**: trapezoidal and Simpson's rules behind one method trait
//! - **Worker**: connect-once protocol driver over a shared-queue thread pool
//! - **Coordinator**: accept loop, gated start, capacity-weighted partition,
//!   bounded-wait aggregation, best-effort stop broadcast

pub mod config;
pub mod coordinator;
pub mod protocol;
pub mod quadrature;
pub mod util;
pub mod worker;

/// Result type used throughout lintegral
pub type Result<T> = anyhow::Result<T>;
