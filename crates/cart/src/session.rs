//! The cart session.
//!
//! A [`CartSession`] is the single owner of the shopper's cart between app
//! start and shutdown. Consumers receive a clone of the session (it is cheap,
//! all state sits behind an `Arc`) instead of reaching for a global.
//!
//! # Write ordering
//!
//! Mutations are serialized by one writer lock that is held from the
//! read-modify-write of the cart until the storage write returns. Two
//! overlapping `add` calls therefore always see each other's result, and the
//! stored payload always matches the latest in-memory cart once the last
//! write completes.
//!
//! # Change notification
//!
//! Each applied mutation bumps a monotonic version and publishes a
//! [`CartSnapshot`] on a watch channel *before* the storage write starts.
//! Readers (`products`, `snapshot`, `subscribe`) never wait on storage.
//!
//! # Persistence failures
//!
//! The in-memory cart is authoritative. A failed write is not rolled back; the
//! operation returns [`CartError::Persistence`] and the next successful write
//! stores the full cart again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use go_marketplace_core::{Cart, CartItem, LineChange, NewCartItem, ProductId};
use tokio::sync::{Mutex, watch};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{CartError, Result};
use crate::storage::KeyValueStore;

/// The cart as of one applied mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSnapshot {
    /// Number of mutations applied since the session opened.
    pub version: u64,
    /// Cart contents.
    pub cart: Cart,
}

/// A shopper's cart for the lifetime of one app session.
///
/// Cloning yields another handle to the same session.
pub struct CartSession<S> {
    inner: Arc<CartSessionInner<S>>,
}

impl<S> Clone for CartSession<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CartSessionInner<S> {
    id: Uuid,
    key: String,
    store: S,
    /// Writer lock; guards the authoritative cart and its version.
    writer: Mutex<WriterState>,
    snapshots: watch::Sender<CartSnapshot>,
    ended: AtomicBool,
}

struct WriterState {
    cart: Cart,
    version: u64,
}

impl<S: KeyValueStore> CartSession<S> {
    /// Open a session, hydrating the cart stored under `key`.
    ///
    /// An absent payload starts an empty cart. A stored list that breaks the
    /// cart invariants is repaired (zero-quantity lines dropped, duplicate
    /// ids merged) and the repair is logged.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the store cannot be read, or
    /// `CartError::CorruptPayload` if the payload is not a list of cart items.
    /// Use [`open_or_reset`](Self::open_or_reset) or [`reset`](Self::reset) to
    /// recover from the latter.
    #[instrument(skip(store, key), fields(key = tracing::field::Empty, session = tracing::field::Empty))]
    pub async fn open(store: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let cart = load(&store, &key).await?;
        Ok(Self::start(store, key, cart))
    }

    /// Open a session, replacing a corrupt stored cart with an empty one.
    ///
    /// Behaves like [`open`](Self::open) except that an unparseable payload is
    /// logged, overwritten with an empty list, and the session starts empty.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Storage` if the store cannot be read, or
    /// `CartError::Persistence` if the empty cart cannot be written back.
    #[instrument(skip(store, key), fields(key = tracing::field::Empty, session = tracing::field::Empty))]
    pub async fn open_or_reset(store: S, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let cart = match load(&store, &key).await {
            Err(CartError::CorruptPayload(e)) => {
                tracing::warn!(error = %e, key = %key, "Stored cart is corrupt, starting empty");
                Self::reset(&store, &key).await?;
                Cart::new()
            }
            other => other?,
        };
        Ok(Self::start(store, key, cart))
    }

    /// Overwrite the cart stored under `key` with an empty list.
    ///
    /// Does not read the current payload, so it works on a corrupt store.
    /// Sessions already open on `key` keep their in-memory cart and will write
    /// it back on their next change.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Persistence` if the store cannot be written.
    #[instrument(skip(store))]
    pub async fn reset(store: &S, key: &str) -> Result<()> {
        store
            .set(key, EMPTY_PAYLOAD.to_owned())
            .await
            .map_err(CartError::Persistence)?;
        tracing::info!("Stored cart reset");
        Ok(())
    }

    fn start(store: S, key: String, cart: Cart) -> Self {
        let id = Uuid::new_v4();
        let span = tracing::Span::current();
        span.record("key", key.as_str());
        span.record("session", tracing::field::display(id));

        tracing::info!(lines = cart.len(), units = cart.item_count(), "Cart session opened");

        let (snapshots, _) = watch::channel(CartSnapshot {
            version: 0,
            cart: cart.clone(),
        });

        Self {
            inner: Arc::new(CartSessionInner {
                id,
                key,
                store,
                writer: Mutex::new(WriterState { cart, version: 0 }),
                snapshots,
                ended: AtomicBool::new(false),
            }),
        }
    }

    /// Add one unit of `item`.
    ///
    /// A product not yet in the cart is appended at quantity 1; a product
    /// already present has its quantity raised by 1.
    ///
    /// # Errors
    ///
    /// Returns `CartError::QuantityLimit` if the line cannot grow any further
    /// (nothing is changed or saved), `CartError::SessionEnded` after
    /// [`end`](Self::end), or `CartError::Persistence` if the change could not
    /// be saved (the in-memory cart still includes it).
    #[instrument(skip(self, item), fields(session = %self.inner.id, product_id = %item.id))]
    pub async fn add(&self, item: NewCartItem) -> Result<CartSnapshot> {
        let id = item.id.clone();
        self.mutate(|cart| within_limit(cart.add(item), &id)).await
    }

    /// Add one unit of the product with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if no line has this id or
    /// `CartError::QuantityLimit` if it cannot grow any further (the cart is
    /// left unchanged in both cases), `CartError::SessionEnded` after
    /// [`end`](Self::end), or `CartError::Persistence` if the change could not
    /// be saved.
    #[instrument(skip(self, id), fields(session = %self.inner.id, product_id = %id))]
    pub async fn increment(&self, id: &ProductId) -> Result<CartSnapshot> {
        self.mutate(|cart| {
            cart.increment(id)
                .ok_or_else(|| CartError::NotInCart(id.clone()))
                .and_then(|change| within_limit(change, id))
        })
        .await
    }

    /// Remove one unit of the product with identifier `id`.
    ///
    /// A line at quantity 1 is removed from the cart. The result is saved in
    /// both cases.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotInCart` if no line has this id (the cart is left
    /// unchanged), `CartError::SessionEnded` after [`end`](Self::end), or
    /// `CartError::Persistence` if the change could not be saved.
    #[instrument(skip(self, id), fields(session = %self.inner.id, product_id = %id))]
    pub async fn decrement(&self, id: &ProductId) -> Result<CartSnapshot> {
        self.mutate(|cart| {
            cart.decrement(id)
                .ok_or_else(|| CartError::NotInCart(id.clone()))
        })
        .await
    }

    async fn mutate<F>(&self, apply: F) -> Result<CartSnapshot>
    where
        F: FnOnce(&mut Cart) -> Result<LineChange>,
    {
        self.ensure_active()?;
        let mut writer = self.inner.writer.lock().await;
        // end() may have run while we waited for the lock
        self.ensure_active()?;

        let change = apply(&mut writer.cart).inspect_err(|e| {
            tracing::debug!(error = %e, "Cart operation rejected");
        })?;
        writer.version += 1;

        let snapshot = CartSnapshot {
            version: writer.version,
            cart: writer.cart.clone(),
        };
        self.inner.snapshots.send_replace(snapshot.clone());
        tracing::debug!(?change, version = snapshot.version, "Cart updated");

        self.persist(&snapshot.cart).await?;
        drop(writer);

        Ok(snapshot)
    }

    async fn persist(&self, cart: &Cart) -> Result<()> {
        let payload = serde_json::to_string(cart).map_err(|e| {
            tracing::error!(error = %e, "Failed to encode cart");
            CartError::Encode(e)
        })?;

        self.inner
            .store
            .set(&self.inner.key, payload)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, key = %self.inner.key, "Failed to save cart");
                CartError::Persistence(e)
            })
    }

    /// End the session.
    ///
    /// Waits for an in-flight mutation to finish writing, then rejects every
    /// further call on this session and its clones. The stored cart is kept.
    #[instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn end(&self) {
        let writer = self.inner.writer.lock().await;
        if !self.inner.ended.swap(true, Ordering::AcqRel) {
            tracing::info!(version = writer.version, "Cart session ended");
        }
    }
}

const EMPTY_PAYLOAD: &str = "[]";

async fn load<S: KeyValueStore>(store: &S, key: &str) -> Result<Cart> {
    let Some(payload) = store.get(key).await.map_err(CartError::Storage)? else {
        return Ok(Cart::new());
    };

    let items: Vec<CartItem> = serde_json::from_str(&payload).map_err(CartError::CorruptPayload)?;
    let (cart, repairs) = Cart::from_items(items);
    if !repairs.is_clean() {
        tracing::warn!(
            dropped_empty = ?repairs.dropped_empty,
            merged_duplicates = ?repairs.merged_duplicates,
            "Stored cart repaired on load"
        );
    }
    Ok(cart)
}

fn within_limit(change: LineChange, id: &ProductId) -> Result<LineChange> {
    if change.is_change() {
        Ok(change)
    } else {
        Err(CartError::QuantityLimit(id.clone()))
    }
}

impl<S> CartSession<S> {
    fn ensure_active(&self) -> Result<()> {
        if self.inner.ended.load(Ordering::Acquire) {
            return Err(CartError::SessionEnded);
        }
        Ok(())
    }

    /// Current cart lines in display order.
    ///
    /// # Errors
    ///
    /// Returns `CartError::SessionEnded` after the session has ended.
    pub fn products(&self) -> Result<Vec<CartItem>> {
        Ok(self.snapshot()?.cart.into_items())
    }

    /// Current cart and its version.
    ///
    /// # Errors
    ///
    /// Returns `CartError::SessionEnded` after the session has ended.
    pub fn snapshot(&self) -> Result<CartSnapshot> {
        self.ensure_active()?;
        Ok(self.inner.snapshots.borrow().clone())
    }

    /// Watch the cart for changes.
    ///
    /// The receiver sees every applied mutation as soon as the in-memory cart
    /// changes, before the storage write completes.
    ///
    /// # Errors
    ///
    /// Returns `CartError::SessionEnded` after the session has ended.
    pub fn subscribe(&self) -> Result<watch::Receiver<CartSnapshot>> {
        self.ensure_active()?;
        Ok(self.inner.snapshots.subscribe())
    }

    /// Storage key this session writes to.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.inner.key
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// True once [`end`](Self::end) has been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use go_marketplace_core::Price;

    use super::*;
    use crate::storage::{MemoryStore, StorageError};

    const KEY: &str = "@GoMarketplace:products";

    /// Memory store whose writes can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> std::result::Result<Option<String>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable(key, std::io::Error::other("read failed")));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, payload: String) -> std::result::Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::unavailable(key, std::io::Error::other("disk full")));
            }
            self.inner.set(key, payload).await
        }
    }

    fn id(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn shirt() -> NewCartItem {
        NewCartItem::new(
            id("a"),
            "Shirt",
            "https://cdn.example.com/shirt.png",
            Price::from_cents(1000),
        )
    }

    fn quantities(session: &CartSession<impl KeyValueStore>) -> Vec<(String, u32)> {
        session
            .products()
            .unwrap()
            .into_iter()
            .map(|item| (item.id.into_inner(), item.quantity))
            .collect()
    }

    #[tokio::test]
    async fn test_open_empty_store() {
        let session = CartSession::open(MemoryStore::new(), KEY).await.unwrap();
        assert!(session.products().unwrap().is_empty());
        assert_eq!(session.snapshot().unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_add_increment_decrement_scenario() {
        let session = CartSession::open(MemoryStore::new(), KEY).await.unwrap();

        session.add(shirt()).await.unwrap();
        assert_eq!(quantities(&session), [("a".to_owned(), 1)]);

        session.add(shirt()).await.unwrap();
        assert_eq!(quantities(&session), [("a".to_owned(), 2)]);

        session.decrement(&id("a")).await.unwrap();
        assert_eq!(quantities(&session), [("a".to_owned(), 1)]);

        let snapshot = session.decrement(&id("a")).await.unwrap();
        assert!(snapshot.cart.is_empty());
        assert_eq!(snapshot.version, 4);
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let store = MemoryStore::new();
        let session = CartSession::open(store.clone(), KEY).await.unwrap();

        session.add(shirt()).await.unwrap();
        session.increment(&id("a")).await.unwrap();
        let stored: Vec<CartItem> =
            serde_json::from_str(&store.payload(KEY).await.unwrap()).unwrap();
        assert_eq!(stored[0].quantity, 2);

        session.decrement(&id("a")).await.unwrap();
        session.decrement(&id("a")).await.unwrap();
        assert_eq!(store.payload(KEY).await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_missing_id_is_reported_and_cart_unchanged() {
        let store = MemoryStore::new();
        let session = CartSession::open(store.clone(), KEY).await.unwrap();
        session.add(shirt()).await.unwrap();
        let before = session.snapshot().unwrap();

        let err = session.increment(&id("nope")).await.unwrap_err();
        assert!(matches!(err, CartError::NotInCart(ref missing) if missing.as_str() == "nope"));

        let err = session.decrement(&id("nope")).await.unwrap_err();
        assert!(matches!(err, CartError::NotInCart(_)));

        assert_eq!(session.snapshot().unwrap(), before);
    }

    #[tokio::test]
    async fn test_reopen_restores_cart() {
        let store = MemoryStore::new();
        let session = CartSession::open(store.clone(), KEY).await.unwrap();
        session.add(shirt()).await.unwrap();
        session.add(shirt()).await.unwrap();
        session
            .add(NewCartItem::new(id("b"), "Hat", "", Price::from_cents(550)))
            .await
            .unwrap();
        let saved = session.products().unwrap();
        session.end().await;

        let reopened = CartSession::open(store, KEY).await.unwrap();
        assert_eq!(reopened.products().unwrap(), saved);
    }

    #[tokio::test]
    async fn test_open_repairs_invalid_stored_list() {
        let payload = r#"[
            {"id":"a","title":"Shirt","image_url":"","price":10,"quantity":0},
            {"id":"b","title":"Hat","image_url":"","price":5.5,"quantity":1},
            {"id":"b","title":"Hat","image_url":"","price":5.5,"quantity":2}
        ]"#;
        let session = CartSession::open(MemoryStore::with_entry(KEY, payload), KEY)
            .await
            .unwrap();

        assert_eq!(quantities(&session), [("b".to_owned(), 3)]);
    }

    #[tokio::test]
    async fn test_open_corrupt_payload() {
        let store = MemoryStore::with_entry(KEY, "{not json");
        let result = CartSession::open(store, KEY).await;
        assert!(matches!(result, Err(CartError::CorruptPayload(_))));
    }

    #[tokio::test]
    async fn test_open_read_failure() {
        let store = FlakyStore::default();
        store.fail_reads.store(true, Ordering::SeqCst);

        let result = CartSession::open(store, KEY).await;
        assert!(matches!(result, Err(CartError::Storage(_))));
    }

    #[tokio::test]
    async fn test_write_failure_keeps_in_memory_change() {
        let session = CartSession::open(FlakyStore::default(), KEY).await.unwrap();
        session.store().fail_writes.store(true, Ordering::SeqCst);

        let err = session.add(shirt()).await.unwrap_err();
        assert!(matches!(err, CartError::Persistence(_)));
        assert!(err.is_unsaved_change());
        assert_eq!(quantities(&session), [("a".to_owned(), 1)]);

        // Once storage recovers the next write carries the full cart.
        session.store().fail_writes.store(false, Ordering::SeqCst);
        session.increment(&id("a")).await.unwrap();
        let stored: Vec<CartItem> =
            serde_json::from_str(&session.store().inner.payload(KEY).await.unwrap()).unwrap();
        assert_eq!(stored[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let session = CartSession::open(MemoryStore::new(), KEY).await.unwrap();
        let mut rx = session.subscribe().unwrap();

        session.add(shirt()).await.unwrap();
        rx.changed().await.unwrap();
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.version, 1);
        assert_eq!(seen.cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_notified_even_when_write_fails() {
        let session = CartSession::open(FlakyStore::default(), KEY).await.unwrap();
        session.store().fail_writes.store(true, Ordering::SeqCst);
        let mut rx = session.subscribe().unwrap();

        let _ = session.add(shirt()).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().cart.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_do_not_lose_updates() {
        let store = MemoryStore::new();
        let session = CartSession::open(store.clone(), KEY).await.unwrap();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.add(shirt()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.version, 50);
        assert_eq!(snapshot.cart.get(&id("a")).unwrap().quantity, 50);

        let stored: Vec<CartItem> =
            serde_json::from_str(&store.payload(KEY).await.unwrap()).unwrap();
        assert_eq!(stored[0].quantity, 50);
    }

    #[tokio::test]
    async fn test_ended_session_rejects_calls() {
        let session = CartSession::open(MemoryStore::new(), KEY).await.unwrap();
        let handle = session.clone();
        session.end().await;

        assert!(handle.is_ended());
        assert!(matches!(handle.add(shirt()).await, Err(CartError::SessionEnded)));
        assert!(matches!(handle.increment(&id("a")).await, Err(CartError::SessionEnded)));
        assert!(matches!(handle.decrement(&id("a")).await, Err(CartError::SessionEnded)));
        assert!(matches!(handle.products(), Err(CartError::SessionEnded)));
        assert!(matches!(handle.subscribe(), Err(CartError::SessionEnded)));
    }

    #[tokio::test]
    async fn test_quantity_limit_is_rejected_without_a_write() {
        let payload = format!(
            r#"[{{"id":"a","title":"Shirt","image_url":"","price":10,"quantity":{}}}]"#,
            u32::MAX
        );
        let store = MemoryStore::with_entry(KEY, payload.clone());
        let session = CartSession::open(store.clone(), KEY).await.unwrap();

        let err = session.add(shirt()).await.unwrap_err();
        assert!(matches!(err, CartError::QuantityLimit(ref at) if at.as_str() == "a"));
        let err = session.increment(&id("a")).await.unwrap_err();
        assert!(matches!(err, CartError::QuantityLimit(_)));

        assert_eq!(session.snapshot().unwrap().version, 0);
        assert_eq!(store.payload(KEY).await, Some(payload));

        let snapshot = session.decrement(&id("a")).await.unwrap();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.cart.items()[0].quantity, u32::MAX - 1);
    }

    #[tokio::test]
    async fn test_open_or_reset_recovers_corrupt_payload() {
        let store = MemoryStore::with_entry(KEY, "{not json");

        let session = CartSession::open_or_reset(store.clone(), KEY).await.unwrap();
        assert!(session.products().unwrap().is_empty());
        assert_eq!(store.payload(KEY).await.as_deref(), Some("[]"));

        session.add(shirt()).await.unwrap();
        assert_eq!(quantities(&session), [("a".to_owned(), 1)]);
    }

    #[tokio::test]
    async fn test_open_or_reset_keeps_valid_cart() {
        let store = MemoryStore::new();
        let session = CartSession::open(store.clone(), KEY).await.unwrap();
        session.add(shirt()).await.unwrap();
        session.end().await;

        let reopened = CartSession::open_or_reset(store, KEY).await.unwrap();
        assert_eq!(quantities(&reopened), [("a".to_owned(), 1)]);
    }

    #[tokio::test]
    async fn test_reset_write_failure_is_reported() {
        let store = FlakyStore::default();
        store.fail_writes.store(true, Ordering::SeqCst);

        let err = CartSession::reset(&store, KEY).await.unwrap_err();
        assert!(matches!(err, CartError::Persistence(_)));
    }
}
