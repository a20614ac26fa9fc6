//! GoMarketplace Core - Shared cart domain types.
//!
//! This crate provides the types shared by every GoMarketplace component:
//! - `cart` - Cart session store with device-local persistence
//! - `cli` - Operator tool for inspecting and editing a persisted cart
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O,
//! no storage access, no async runtime. Persistence lives in the `cart` crate.
//!
//! # Modules
//!
//! - [`types`] - Product identifiers, prices, cart line items and the cart itself

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
