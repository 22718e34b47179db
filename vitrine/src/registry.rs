// Copyright 2026 vitrine Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use hashbrown::{hash_map::EntryRef, HashMap, HashSet};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    error::{Error, Result},
    image::DecodedImage,
    loader::{BoxLoadError, ImageLoader},
    record::ImageRecord,
};

/// Opaque identity of a consumer attaching images to the registry.
///
/// The registry only ever tests identities for membership in a record's
/// reference set; it never controls the owner's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Mint a process-unique owner identity.
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

type Notifier = oneshot::Sender<Result<Arc<ImageRecord>>>;
type Waiter = oneshot::Receiver<Result<Arc<ImageRecord>>>;

/// Waiter list for a single in-flight load.
///
/// Shared between the slot and the task driving the load, so waiters are
/// notified even after the slot has been cleared away.
#[derive(Default)]
struct Inflight {
    notifiers: Mutex<Vec<Notifier>>,
}

impl Inflight {
    fn subscribe(&self) -> Waiter {
        let (tx, rx) = oneshot::channel();
        self.notifiers.lock().push(tx);
        rx
    }

    fn drain(&self) -> Vec<Notifier> {
        std::mem::take(&mut *self.notifiers.lock())
    }
}

struct Slot {
    record: Arc<ImageRecord>,
    owners: HashSet<OwnerId>,
    inflight: Option<Arc<Inflight>>,
}

impl Slot {
    fn new(record: Arc<ImageRecord>) -> Self {
        Self {
            record,
            owners: HashSet::new(),
            inflight: None,
        }
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<Arc<str>, Slot>,
}

struct Shared {
    state: Mutex<State>,
}

static INSTANCE: Mutex<Option<ImageRegistry>> = Mutex::new(None);

/// Shared, url-keyed image store used by all owners of a process.
///
/// The registry holds exactly one [`ImageRecord`] per url, no matter how
/// many owners reference it, and runs at most one load per url at a time;
/// callers arriving while a load is in flight attach to the running load
/// instead of issuing a second one. A record stays in the registry for as
/// long as at least one owner references it or a load for it is in flight.
///
/// `ImageRegistry` is a cheap cloneable handle; clones operate on the same
/// underlying store.
pub struct ImageRegistry {
    shared: Arc<Shared>,
}

impl Clone for ImageRegistry {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl Debug for ImageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRegistry").finish_non_exhaustive()
    }
}

impl Default for ImageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageRegistry {
    /// Create a standalone registry, detached from the process-wide instance.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Access the process-wide registry, creating it on first use.
    pub fn instance() -> Self {
        INSTANCE.lock().get_or_insert_with(Self::new).clone()
    }

    /// Tear down the process-wide registry.
    ///
    /// Equivalent to [`ImageRegistry::clear_all`] followed by discarding the
    /// instance; the next [`ImageRegistry::instance`] call starts fresh.
    pub fn dispose() {
        let registry = INSTANCE.lock().take();
        if let Some(registry) = registry {
            registry.clear_all();
        }
    }

    /// Register an image under `url` for `owner`, optionally with already
    /// decoded data.
    ///
    /// If a record for `url` exists, `owner` is attached to it and the
    /// existing record is returned; `data` only fills a record that is not
    /// yet loaded (first writer wins). Never fails.
    pub fn register_image(
        &self,
        owner: OwnerId,
        url: &str,
        data: Option<Arc<dyn DecodedImage>>,
    ) -> Arc<ImageRecord> {
        let mut state = self.shared.state.lock();
        let slot = Self::attach(&mut state, owner, url);
        if let Some(data) = data {
            if !slot.record.is_loaded() {
                slot.record.fill(data);
            }
        }
        slot.record.clone()
    }

    /// Attach `owner` to `url`, creating a placeholder record if absent, and
    /// return the record together with a fetch future.
    ///
    /// With `start_load` set, a load via `loader` begins unless one is
    /// already in flight for `url`; in that case the caller attaches to the
    /// running load and no second loader invocation happens. The returned
    /// [`ImageFetch`] resolves once the pending load settles, or immediately
    /// with the record as-is when nothing is pending.
    ///
    /// On load failure the record is evicted from the registry entirely, so
    /// a later `add_image` call can retry from scratch.
    pub fn add_image(
        &self,
        owner: OwnerId,
        url: &str,
        loader: &dyn ImageLoader,
        start_load: bool,
    ) -> (Arc<ImageRecord>, ImageFetch) {
        let mut state = self.shared.state.lock();
        let slot = Self::attach(&mut state, owner, url);
        let record = slot.record.clone();

        if record.is_loaded() {
            let fetch = ImageFetch::ready(Ok(record.clone()));
            return (record, fetch);
        }

        if let Some(inflight) = slot.inflight.as_ref() {
            let fetch = ImageFetch::wait(record.url_arc().clone(), inflight.subscribe());
            return (record, fetch);
        }

        if !start_load {
            let fetch = ImageFetch::ready(Ok(record.clone()));
            return (record, fetch);
        }

        let inflight = Arc::new(Inflight::default());
        let waiter = inflight.subscribe();
        slot.inflight = Some(inflight.clone());
        drop(state);

        tracing::trace!("[registry]: start load (url: {url})");
        let load = loader.load(url);
        let registry = self.clone();
        let driven = record.clone();
        tokio::spawn(async move {
            let outcome = load.await;
            registry.settle(&driven, &inflight, outcome);
        });

        let fetch = ImageFetch::wait(record.url_arc().clone(), waiter);
        (record, fetch)
    }

    /// Synchronous lookup of the record for `url`. Never triggers a load.
    pub fn find_image(&self, url: &str) -> Option<Arc<ImageRecord>> {
        self.shared
            .state
            .lock()
            .slots
            .get(url)
            .map(|slot| slot.record.clone())
    }

    /// Detach `owner` from `url` alone; returns whether the owner was
    /// attached. The record is released when its reference set empties and
    /// no load is in flight for it.
    pub fn remove_image(&self, owner: OwnerId, url: &str) -> bool {
        let mut state = self.shared.state.lock();
        let (removed, release) = match state.slots.get_mut(url) {
            Some(slot) => (
                slot.owners.remove(&owner),
                slot.owners.is_empty() && slot.inflight.is_none(),
            ),
            None => return false,
        };
        if release {
            tracing::trace!("[registry]: release record (url: {url})");
            state.slots.remove(url);
        }
        removed
    }

    /// Detach `owner` from every record it references. Records left with no
    /// owner and no in-flight load are released. Idempotent.
    pub fn clear(&self, owner: OwnerId) {
        let mut state = self.shared.state.lock();
        state.slots.retain(|url, slot| {
            slot.owners.remove(&owner);
            let keep = !slot.owners.is_empty() || slot.inflight.is_some();
            if !keep {
                tracing::trace!("[registry]: release record (url: {url})");
            }
            keep
        });
    }

    /// Release every record unconditionally, even while owners are still
    /// attached. Running loads are not cancelled; their settlement against
    /// the emptied registry is discarded.
    pub fn clear_all(&self) {
        let mut state = self.shared.state.lock();
        let released = state.slots.len();
        state.slots.clear();
        tracing::debug!("[registry]: cleared all records (count: {released})");
    }

    /// Number of records currently held.
    pub fn size(&self) -> usize {
        self.shared.state.lock().slots.len()
    }

    fn attach<'a>(state: &'a mut State, owner: OwnerId, url: &str) -> &'a mut Slot {
        let slot = match state.slots.entry_ref(url) {
            EntryRef::Occupied(o) => o.into_mut(),
            EntryRef::Vacant(v) => {
                tracing::trace!("[registry]: create record (url: {url})");
                v.insert(Slot::new(Arc::new(ImageRecord::new(url, None))))
            }
        };
        slot.owners.insert(owner);
        slot
    }

    /// Apply the outcome of a load driven by [`ImageRegistry::add_image`].
    ///
    /// The slot's in-flight handle must still be `inflight` for the outcome
    /// to be applied to the registry; a forced reset may have superseded the
    /// flight, in which case the registry stays untouched and only the
    /// waiters observe the outcome.
    fn settle(
        &self,
        record: &Arc<ImageRecord>,
        inflight: &Arc<Inflight>,
        outcome: std::result::Result<Arc<dyn DecodedImage>, BoxLoadError>,
    ) {
        let url = record.url();
        let mut state = self.shared.state.lock();
        let current = state
            .slots
            .get(url)
            .and_then(|slot| slot.inflight.as_ref())
            .is_some_and(|active| Arc::ptr_eq(active, inflight));

        let result = match outcome {
            Ok(bitmap) => {
                if !record.is_loaded() {
                    record.fill(bitmap);
                }
                if current {
                    let orphaned = match state.slots.get_mut(url) {
                        Some(slot) => {
                            slot.inflight = None;
                            slot.owners.is_empty()
                        }
                        None => false,
                    };
                    if orphaned {
                        tracing::trace!("[registry]: discard orphaned load (url: {url})");
                        state.slots.remove(url);
                    }
                } else {
                    tracing::trace!("[registry]: discard superseded load (url: {url})");
                }
                Ok(record.clone())
            }
            Err(source) => {
                if current {
                    tracing::trace!("[registry]: evict record after failed load (url: {url})");
                    state.slots.remove(url);
                }
                Err(Error::load(record.url_arc().clone(), source))
            }
        };
        drop(state);

        for notifier in inflight.drain() {
            let _ = notifier.send(result.clone());
        }
    }
}

/// Future returned by [`ImageRegistry::add_image`].
///
/// Resolves to the loaded record once the url settles, or immediately with
/// the record as-is when it was already loaded (or no load was requested)
/// at call time. Every fetch attached to one in-flight load observes the
/// same outcome, including failure.
#[must_use = "fetches do nothing unless polled"]
pub struct ImageFetch {
    inner: FetchInner,
}

enum FetchInner {
    Ready(Option<Result<Arc<ImageRecord>>>),
    Wait { url: Arc<str>, waiter: Waiter },
}

#[derive(Debug, thiserror::Error)]
#[error("loading task dropped before settling")]
struct LoadAbandoned;

impl Debug for ImageFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            FetchInner::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            FetchInner::Wait { url, .. } => f.debug_tuple("Wait").field(url).finish(),
        }
    }
}

impl ImageFetch {
    fn ready(result: Result<Arc<ImageRecord>>) -> Self {
        Self {
            inner: FetchInner::Ready(Some(result)),
        }
    }

    fn wait(url: Arc<str>, waiter: Waiter) -> Self {
        Self {
            inner: FetchInner::Wait { url, waiter },
        }
    }

    /// Whether the fetch is attached to an in-flight load and needs to be
    /// awaited for the record to be loaded.
    pub fn need_await(&self) -> bool {
        matches!(self.inner, FetchInner::Wait { .. })
    }
}

impl Future for ImageFetch {
    type Output = Result<Arc<ImageRecord>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            FetchInner::Ready(result) => {
                Poll::Ready(result.take().expect("fetch polled after completion"))
            }
            FetchInner::Wait { url, waiter } => match Pin::new(waiter).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(Error::load(url.clone(), LoadAbandoned))),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
