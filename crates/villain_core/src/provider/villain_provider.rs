//! Villain access layer: locator routing, CRUD dispatch and change signals.
//!
//! # Responsibility
//! - Route `collection` and `item` locators to repository operations.
//! - Enforce which verbs are legal on which locator kind.
//! - Publish an invalidation signal after every attempted mutation.
//!
//! # Invariants
//! - `insert` is legal only on the collection locator; `update` and `delete`
//!   only on item locators.
//! - `update`/`delete` publish even when no row was affected.
//! - Publishing happens after the repository call returns, outside any store lock.
//! - Only locators carrying the configured scheme and authority are served;
//!   anything else is `Unmatched` for routing and rejected for observers.
//! - Public operations are synchronous: each one runs its store call to
//!   completion on the calling thread. This blocks the caller on local
//!   SQLite I/O, which is acceptable only because the store is local.

use super::error::{ProviderError, ProviderResult};
use super::notifier::{ChangeNotifier, SubscriptionHandle};
use super::uri::{Locator, UriMatcher, NUMBER_WILDCARD};
use crate::model::villain::{Villain, VillainId, VillainValues, TABLE_NAME};
use crate::repo::villain_repo::{VillainQuery, VillainRepository};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default locator scheme.
pub const DEFAULT_SCHEME: &str = "content";
/// Default locator authority.
pub const DEFAULT_AUTHORITY: &str = "com.developers.villains";
/// Type tag prefix for multi-row resources.
pub const CURSOR_DIR_BASE_TYPE: &str = "vnd.cursor.dir";
/// Type tag prefix for single-row resources.
pub const CURSOR_ITEM_BASE_TYPE: &str = "vnd.cursor.item";

/// Locator namespace served by a provider instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub scheme: String,
    pub authority: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scheme: DEFAULT_SCHEME.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
        }
    }
}

/// Classification of a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VillainRoute {
    Collection,
    Item(VillainId),
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteCode {
    Villains,
    VillainItem,
}

/// Snapshot query result bound to a change subscription.
///
/// The cursor turns stale once a change related to its notification locator
/// is published; re-query to observe the new state. Dropping the cursor
/// releases its subscription.
pub struct VillainCursor {
    rows: Vec<Villain>,
    notification_locator: Locator,
    stale: Arc<AtomicBool>,
    notifier: Arc<ChangeNotifier>,
    subscription: SubscriptionHandle,
}

impl VillainCursor {
    fn open(
        rows: Vec<Villain>,
        notification_locator: Locator,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        let stale = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stale);
        let subscription = notifier.subscribe(notification_locator.clone(), move |_| {
            flag.store(true, Ordering::SeqCst);
        });

        Self {
            rows,
            notification_locator,
            stale,
            notifier,
            subscription,
        }
    }

    pub fn rows(&self) -> &[Villain] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Villain> {
        self.rows.iter()
    }

    /// Takes the rows and releases the subscription.
    pub fn into_rows(mut self) -> Vec<Villain> {
        std::mem::take(&mut self.rows)
    }

    pub fn notification_locator(&self) -> &Locator {
        &self.notification_locator
    }

    /// Whether a related change was published since this cursor was opened.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }
}

impl Drop for VillainCursor {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.subscription);
    }
}

impl std::fmt::Debug for VillainCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VillainCursor")
            .field("rows", &self.rows)
            .field("notification_locator", &self.notification_locator)
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Access layer over an injected villain repository.
pub struct VillainProvider<R: VillainRepository> {
    repo: R,
    notifier: Arc<ChangeNotifier>,
    matcher: UriMatcher<RouteCode>,
    collection: Locator,
}

impl<R: VillainRepository> VillainProvider<R> {
    /// Builds a provider serving `config`'s namespace.
    ///
    /// # Errors
    /// - `InvalidLocator` when scheme/authority cannot form a locator.
    pub fn new(
        config: ProviderConfig,
        repo: R,
        notifier: Arc<ChangeNotifier>,
    ) -> ProviderResult<Self> {
        let collection = Locator::from_parts(&config.scheme, &config.authority, TABLE_NAME)
            .map_err(|err| ProviderError::InvalidLocator(err.to_string()))?;
        if collection.authority() != config.authority.trim() {
            return Err(ProviderError::InvalidLocator(format!(
                "authority `{}` is not a single locator component",
                config.authority
            )));
        }

        let mut matcher = UriMatcher::new();
        let item_path = format!("{TABLE_NAME}/{NUMBER_WILDCARD}");
        matcher
            .add_uri(collection.authority(), TABLE_NAME, RouteCode::Villains)
            .map_err(|err| ProviderError::InvalidLocator(err.to_string()))?;
        matcher
            .add_uri(collection.authority(), &item_path, RouteCode::VillainItem)
            .map_err(|err| ProviderError::InvalidLocator(err.to_string()))?;

        info!("event=provider_init module=provider status=ok collection={collection}");
        Ok(Self {
            repo,
            notifier,
            matcher,
            collection,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn collection_locator(&self) -> &Locator {
        &self.collection
    }

    pub fn item_locator(&self, id: VillainId) -> Locator {
        self.collection.with_appended_id(id)
    }

    /// Classifies a raw locator. Malformed input is `Unmatched`.
    pub fn classify(&self, locator: &str) -> VillainRoute {
        match Locator::parse(locator) {
            Ok(parsed) => self.route(&parsed),
            Err(_) => VillainRoute::Unmatched,
        }
    }

    /// Reads the collection or one item as a snapshot cursor.
    ///
    /// `query` options apply to the collection only; an item locator always
    /// yields zero or one row.
    pub fn query(&self, locator: &str, query: &VillainQuery) -> ProviderResult<VillainCursor> {
        let (rows, notification_locator) = match self.resolve(locator)? {
            VillainRoute::Collection => (self.repo.select(query)?, self.collection.clone()),
            VillainRoute::Item(id) => (
                self.repo.select_by_id(id)?.into_iter().collect(),
                self.item_locator(id),
            ),
            VillainRoute::Unmatched => return Err(unknown(locator)),
        };

        Ok(VillainCursor::open(
            rows,
            notification_locator,
            Arc::clone(&self.notifier),
        ))
    }

    /// Returns the resource type tag for a locator.
    pub fn resource_type(&self, locator: &str) -> ProviderResult<String> {
        let base = match self.resolve(locator)? {
            VillainRoute::Collection => CURSOR_DIR_BASE_TYPE,
            VillainRoute::Item(_) => CURSOR_ITEM_BASE_TYPE,
            VillainRoute::Unmatched => return Err(unknown(locator)),
        };
        Ok(format!("{base}/{}.{TABLE_NAME}", self.collection.authority()))
    }

    /// Inserts (or upserts by explicit id) and returns the new item locator.
    pub fn insert(
        &self,
        locator: &str,
        values: Option<&VillainValues>,
    ) -> ProviderResult<Locator> {
        match self.resolve(locator)? {
            VillainRoute::Collection => {}
            VillainRoute::Item(_) => {
                return Err(illegal("insert", locator, "cannot insert at an item locator"))
            }
            VillainRoute::Unmatched => return Err(unknown(locator)),
        }

        let villain = require_values(values)?
            .to_villain()
            .map_err(|err| ProviderError::InvalidArgument(err.to_string()))?;
        let id = self.repo.insert_or_replace(&villain)?;

        self.notifier.publish(&self.collection);
        info!("event=villain_insert module=provider status=ok id={id}");
        Ok(self.item_locator(id))
    }

    /// Replaces the row addressed by an item locator; returns rows affected.
    ///
    /// Any id carried by `values` is ignored in favor of the locator's id.
    pub fn update(
        &self,
        locator: &str,
        values: Option<&VillainValues>,
    ) -> ProviderResult<usize> {
        let id = match self.resolve(locator)? {
            VillainRoute::Item(id) => id,
            VillainRoute::Collection => {
                return Err(illegal("update", locator, "cannot update without an id"))
            }
            VillainRoute::Unmatched => return Err(unknown(locator)),
        };

        let values = require_values(values)?;
        let villain = VillainValues {
            id: Some(id),
            ..values.clone()
        }
        .to_villain()
        .map_err(|err| ProviderError::InvalidArgument(err.to_string()))?;
        let count = self.repo.update(&villain)?;

        self.notifier.publish(&self.item_locator(id));
        info!("event=villain_update module=provider status=ok id={id} rows={count}");
        Ok(count)
    }

    /// Deletes the row addressed by an item locator; returns rows affected.
    pub fn delete(&self, locator: &str) -> ProviderResult<usize> {
        let id = match self.resolve(locator)? {
            VillainRoute::Item(id) => id,
            VillainRoute::Collection => {
                return Err(illegal("delete", locator, "cannot delete without an id"))
            }
            VillainRoute::Unmatched => return Err(unknown(locator)),
        };

        let count = self.repo.delete_by_id(id)?;

        self.notifier.publish(&self.item_locator(id));
        info!("event=villain_delete module=provider status=ok id={id} rows={count}");
        Ok(count)
    }

    /// Replaces the store contents with the sample villains.
    pub fn seed_samples(&self) -> ProviderResult<Vec<VillainId>> {
        let ids = self.repo.seed_samples()?;

        self.notifier.publish(&self.collection);
        info!("event=villain_seed module=provider status=ok rows={}", ids.len());
        Ok(ids)
    }

    /// Subscribes `callback` to changes related to `locator`.
    ///
    /// # Errors
    /// - `InvalidLocator` when `locator` is malformed or outside this
    ///   provider's scheme/authority, since nothing would ever reach it.
    pub fn register_observer<F>(
        &self,
        locator: &str,
        callback: F,
    ) -> ProviderResult<SubscriptionHandle>
    where
        F: Fn(&Locator) + Send + Sync + 'static,
    {
        let parsed = Locator::parse(locator)
            .map_err(|err| ProviderError::InvalidLocator(err.to_string()))?;
        if !self.serves(&parsed) {
            warn!("event=observer_reject module=provider status=error reason=foreign_namespace");
            return Err(unknown(locator));
        }
        Ok(self.notifier.subscribe(parsed, callback))
    }

    pub fn unregister_observer(&self, handle: SubscriptionHandle) -> bool {
        self.notifier.unsubscribe(handle)
    }

    fn serves(&self, locator: &Locator) -> bool {
        locator.scheme() == self.collection.scheme()
            && locator.authority() == self.collection.authority()
    }

    fn route(&self, locator: &Locator) -> VillainRoute {
        if !self.serves(locator) {
            return VillainRoute::Unmatched;
        }
        match self.matcher.match_locator(locator) {
            Some(found) => match (found.code, found.ids.as_slice()) {
                (RouteCode::Villains, _) => VillainRoute::Collection,
                (RouteCode::VillainItem, [id]) => VillainRoute::Item(*id),
                (RouteCode::VillainItem, _) => VillainRoute::Unmatched,
            },
            None => VillainRoute::Unmatched,
        }
    }

    fn resolve(&self, locator: &str) -> ProviderResult<VillainRoute> {
        let parsed = Locator::parse(locator).map_err(|err| {
            warn!("event=locator_reject module=provider status=error reason=malformed");
            ProviderError::InvalidLocator(err.0)
        })?;
        let route = self.route(&parsed);
        if route == VillainRoute::Unmatched {
            warn!("event=locator_reject module=provider status=error reason=unmatched");
        }
        Ok(route)
    }
}

fn require_values(values: Option<&VillainValues>) -> ProviderResult<&VillainValues> {
    values.ok_or_else(|| ProviderError::InvalidArgument("values cannot be absent".to_string()))
}

fn unknown(locator: &str) -> ProviderError {
    ProviderError::InvalidLocator(locator.to_string())
}

fn illegal(operation: &'static str, locator: &str, reason: &'static str) -> ProviderError {
    warn!("event=operation_reject module=provider status=error operation={operation}");
    ProviderError::IllegalOperation {
        operation,
        locator: locator.to_string(),
        reason,
    }
}
