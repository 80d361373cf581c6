//! Integration test crate for the duskwire protocol stack.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end flows across multiple workspace crates, grounded
//! in the end-to-end scenarios and testable properties that drove this
//! workspace's design: DHT bootstrap, onion announce anti-amplification,
//! net-crypto reliability under loss, and the friend connection arena's
//! lock/kill lifecycle.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p duskwire-integration-tests
//! ```
