//! GoMarketplace cart session store.
//!
//! A [`CartSession`] holds the shopper's cart in memory for the lifetime of an
//! app session and writes it through to a device-local [`KeyValueStore`] after
//! every change.
//!
//! # Example
//!
//! ```rust,ignore
//! use go_marketplace_cart::{CartConfig, CartSession, FileStore};
//!
//! let config = CartConfig::from_env()?;
//! let store = FileStore::new(&config.storage_dir);
//! let cart = CartSession::open(store, config.storage_key()).await?;
//!
//! cart.add(item).await?;
//! for line in cart.products()? {
//!     println!("{} x{}", line.title, line.quantity);
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Cart and storage error types
//! - [`session`] - The cart session and its snapshots
//! - [`storage`] - Persistence trait and the memory/file adapters

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod session;
pub mod storage;

pub use config::{CartConfig, ConfigError, LogFormat};
pub use error::{CartError, Result};
pub use session::{CartSession, CartSnapshot};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
