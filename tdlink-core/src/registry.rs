// ABOUTME: Subscription registry: per-kind unconditional lists, keyed routers, and a global list.
// ABOUTME: Handles detach their subscriber from the single list that owns it.

use crate::error::{RegistryMisuse, Route};
use crate::event::{Event, EventKind};
use crate::value::FieldValue;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Callback invoked for every matching event
pub type Callback = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// Field-name to value filter for keyed subscriptions, kept sorted by name
pub type KeyFilter = BTreeMap<String, FieldValue>;

/// One registered callback, owned by exactly one [`SubscriberList`].
pub struct Subscriber {
    id: u64,
    route: Route,
    callback: Callback,
    owner: Weak<SubscriberList>,
    removed: AtomicBool,
}

impl Subscriber {
    /// The list this subscriber was registered into
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether the subscriber has been detached
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn invoke(&self, event: &Event) -> Result<()> {
        (self.callback)(event)
    }

    fn detach(&self) {
        if self.removed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(list) = self.owner.upgrade() {
            list.remove(self.id);
            list.prune_if_empty();
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("removed", &self.is_removed())
            .finish()
    }
}

type KindMap = HashMap<EventKind, KindEntry>;

/// Where a keyed list lives, so its last removal can drop it from the router
struct KeyedSlot {
    kinds: Weak<Mutex<KindMap>>,
    kind: EventKind,
    fields: Vec<String>,
    values: Vec<FieldValue>,
}

/// Ordered subscribers; insertion order is invocation order.
///
/// Every append and removal happens under the list's own lock, so a reader
/// snapshotting the list sees it either before or after any single change.
/// Lock order is registry map first, then list.
#[derive(Default)]
pub struct SubscriberList {
    entries: Mutex<Vec<Arc<Subscriber>>>,
    slot: Option<KeyedSlot>,
}

impl SubscriberList {
    fn push(self: &Arc<Self>, id: u64, route: Route, callback: Callback) -> SubscriptionHandle {
        let subscriber = Arc::new(Subscriber {
            id,
            route,
            callback,
            owner: Arc::downgrade(self),
            removed: AtomicBool::new(false),
        });
        self.lock().push(Arc::clone(&subscriber));
        SubscriptionHandle { subscriber }
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|s| s.id != id);
    }

    /// Drop an emptied keyed list from its router. Pushes happen under the
    /// registry map lock, so emptiness checked under it cannot go stale.
    fn prune_if_empty(self: &Arc<Self>) {
        let Some(slot) = &self.slot else {
            return;
        };
        let Some(kinds) = slot.kinds.upgrade() else {
            return;
        };
        let mut kinds = kinds.lock().unwrap_or_else(|e| e.into_inner());
        if !self.is_empty() {
            return;
        }
        let Some(router) = kinds
            .get_mut(&slot.kind)
            .and_then(|entry| entry.routers.iter_mut().find(|r| r.fields == slot.fields))
        else {
            return;
        };
        let owned = router
            .lists
            .get(&slot.values)
            .is_some_and(|list| Arc::ptr_eq(list, self));
        if owned {
            router.lists.remove(&slot.values);
            tracing::trace!(kind = %slot.kind, "Empty keyed list dropped");
        }
    }

    fn snapshot_into(&self, out: &mut Vec<Arc<Subscriber>>) {
        out.extend(self.lock().iter().cloned());
    }

    fn clear(&self) {
        for subscriber in self.lock().drain(..) {
            subscriber.removed.store(true, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Subscriber>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Capability returned by every subscribe call.
///
/// Its only operation is [`remove`](Self::remove), which is idempotent and
/// safe after the registry has been cleared or dropped.
#[derive(Clone)]
pub struct SubscriptionHandle {
    subscriber: Arc<Subscriber>,
}

impl SubscriptionHandle {
    /// Detach the subscriber from its list. Repeated calls do nothing.
    pub fn remove(&self) {
        self.subscriber.detach();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubscriptionHandle")
            .field(&self.subscriber)
            .finish()
    }
}

/// Index from a tuple of field values to the subscribers wanting exactly it.
///
/// Identified by its event kind and its sorted field names.
pub struct KeyedRouter {
    kind: EventKind,
    fields: Vec<String>,
    lists: HashMap<Vec<FieldValue>, Arc<SubscriberList>>,
}

impl KeyedRouter {
    fn new(kind: EventKind, fields: Vec<String>) -> Self {
        Self {
            kind,
            fields,
            lists: HashMap::new(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Sorted field names this router reads off each event
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    fn list_for(&mut self, values: Vec<FieldValue>, kinds: &Arc<Mutex<KindMap>>) -> Arc<SubscriberList> {
        let slot = KeyedSlot {
            kinds: Arc::downgrade(kinds),
            kind: self.kind,
            fields: self.fields.clone(),
            values: values.clone(),
        };
        let list = self.lists.entry(values).or_insert_with(|| {
            Arc::new(SubscriberList {
                entries: Mutex::new(Vec::new()),
                slot: Some(slot),
            })
        });
        Arc::clone(list)
    }

    /// Number of value tuples that currently have subscribers
    pub fn value_count(&self) -> usize {
        self.lists.len()
    }

    /// Values for this router's fields, or `None` if the event lacks any of them
    fn key_of(&self, event: &Event) -> Option<Vec<FieldValue>> {
        self.fields.iter().map(|name| event.field(name)).collect()
    }

    fn describe(&self, values: &[FieldValue]) -> String {
        let pairs: Vec<String> = self
            .fields
            .iter()
            .zip(values)
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        format!("{{{}}}", pairs.join(", "))
    }

    fn snapshot_into(&self, event: &Event, out: &mut Vec<Arc<Subscriber>>) {
        if let Some(key) = self.key_of(event) {
            if let Some(list) = self.lists.get(&key) {
                list.snapshot_into(out);
            }
        }
    }

    fn clear(&self) {
        for list in self.lists.values() {
            list.clear();
        }
    }
}

#[derive(Default)]
struct KindEntry {
    unconditional: Arc<SubscriberList>,
    /// Routers in creation order
    routers: Vec<KeyedRouter>,
}

/// Holds every subscription, keyed by event kind.
///
/// Safe to share between the consumer loop and other tasks; lookups copy
/// the matching subscribers out so callbacks run without any lock held.
#[derive(Default)]
pub struct SubscriptionRegistry {
    kinds: Arc<Mutex<KindMap>>,
    global: Arc<SubscriberList>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every event of `kind`
    pub fn subscribe_all<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        let mut kinds = self.kinds();
        let list = &kinds.entry(kind).or_default().unconditional;
        let handle = list.push(self.next_id(), Route::Unconditional(kind), Arc::new(callback));
        drop(kinds);
        tracing::debug!(kind = %kind, "Unconditional subscriber added");
        handle
    }

    /// Subscribe to events of `kind` whose fields equal every value in `filter`.
    ///
    /// Field names may be dotted to reach into nested objects. The order of
    /// the filter entries does not matter: the same set of names always
    /// resolves to the same router.
    pub fn subscribe_keyed<F, I, K, V>(
        &self,
        kind: EventKind,
        callback: F,
        filter: I,
    ) -> Result<SubscriptionHandle, RegistryMisuse>
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        let filter: KeyFilter = filter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if filter.is_empty() {
            return Err(RegistryMisuse::EmptyKeyFilter { kind });
        }
        if let Some(bad) = filter.keys().find(|name| !is_valid_field_name(name)) {
            return Err(RegistryMisuse::InvalidFieldName {
                kind,
                field: bad.clone(),
            });
        }

        // BTreeMap iteration is already the canonical sorted order
        let (fields, values): (Vec<String>, Vec<FieldValue>) = filter.into_iter().unzip();

        let mut kinds = self.kinds();
        let entry = kinds.entry(kind).or_default();
        let position = entry.routers.iter().position(|r| r.fields == fields);
        let router = match position {
            Some(i) => &mut entry.routers[i],
            None => {
                tracing::debug!(kind = %kind, fields = ?fields, "Keyed router created");
                entry.routers.push(KeyedRouter::new(kind, fields));
                let last = entry.routers.len() - 1;
                &mut entry.routers[last]
            }
        };
        let key = router.describe(&values);
        let list = router.list_for(values, &self.kinds);
        let handle = list.push(
            self.next_id(),
            Route::Keyed {
                kind,
                key: key.clone(),
            },
            Arc::new(callback),
        );
        drop(kinds);
        tracing::debug!(kind = %kind, key = %key, "Keyed subscriber added");
        Ok(handle)
    }

    /// Subscribe to every event regardless of kind
    pub fn subscribe_global<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        self.global
            .push(self.next_id(), Route::Global, Arc::new(callback))
    }

    /// Subscribers interested in `event` by kind: unconditional ones first,
    /// then keyed matches in router creation order. Global subscribers are
    /// not included; see [`global_subscribers`](Self::global_subscribers).
    pub fn lookup(&self, event: &Event) -> Vec<Arc<Subscriber>> {
        let mut out = Vec::new();
        let kinds = self.kinds();
        if let Some(entry) = kinds.get(&event.kind()) {
            entry.unconditional.snapshot_into(&mut out);
            for router in &entry.routers {
                router.snapshot_into(event, &mut out);
            }
        }
        out
    }

    /// Snapshot of the catch-all list
    pub fn global_subscribers(&self) -> Vec<Arc<Subscriber>> {
        let mut out = Vec::new();
        self.global.snapshot_into(&mut out);
        out
    }

    /// Field-name tuples of the routers for `kind`, in creation order
    pub fn router_fields(&self, kind: EventKind) -> Vec<Vec<String>> {
        self.kinds()
            .get(&kind)
            .map(|entry| entry.routers.iter().map(|r| r.fields.clone()).collect())
            .unwrap_or_default()
    }

    /// Value tuples held by each router of `kind`, in creation order
    pub fn router_value_counts(&self, kind: EventKind) -> Vec<usize> {
        self.kinds()
            .get(&kind)
            .map(|entry| entry.routers.iter().map(KeyedRouter::value_count).collect())
            .unwrap_or_default()
    }

    /// Total number of live subscribers, global ones included
    pub fn subscriber_count(&self) -> usize {
        let kinds = self.kinds();
        let scoped: usize = kinds
            .values()
            .map(|entry| {
                entry.unconditional.len()
                    + entry
                        .routers
                        .iter()
                        .flat_map(|r| r.lists.values())
                        .map(|l| l.len())
                        .sum::<usize>()
            })
            .sum();
        scoped + self.global.len()
    }

    /// Drop every subscription. Outstanding handles become no-ops.
    pub fn clear(&self) {
        let mut kinds = self.kinds();
        for entry in kinds.values() {
            entry.unconditional.clear();
            for router in &entry.routers {
                router.clear();
            }
        }
        kinds.clear();
        self.global.clear();
        tracing::debug!("Subscription registry cleared");
    }

    fn kinds(&self) -> std::sync::MutexGuard<'_, KindMap> {
        self.kinds.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(|part| !part.is_empty())
}
