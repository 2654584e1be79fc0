use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gateway_core::adapter::FrameCallback;
use gateway_core::config::SubscriptionCaps;
use gateway_core::{
    AdjustType, GatewayError, Mode, Subscription, SubscriptionId, SubscriptionKind, SymbolCode,
    TickFrame, UpstreamAdapter,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

struct SubEntry {
    subscription: Subscription,
    tx: broadcast::Sender<TickFrame>,
    // Keeps the channel's receiver count above zero between subscribe() and
    // the first consumer() call, so early frames are buffered up to
    // queue_depth instead of being dropped by `Sender::send` returning an
    // error for a receiver-less channel. Never read from directly.
    _idle_rx: broadcast::Receiver<TickFrame>,
    dropped: Arc<AtomicU64>,
}

#[derive(Default)]
struct ManagerState {
    subs: HashMap<SubscriptionId, SubEntry>,
    by_symbol: HashMap<SymbolCode, HashSet<SubscriptionId>>,
    firehose: HashSet<SubscriptionId>,
}

struct Inner {
    state: Mutex<ManagerState>,
    caps: SubscriptionCaps,
    mode: Mode,
    adapter: Arc<dyn UpstreamAdapter>,
}

/// Owns the set of live subscriptions, the symbol index, and each
/// subscription's bounded queue. Bridges the adapter's callback thread into
/// the server's async consumers.
///
/// Cheaply `Clone`-able — every clone shares the same underlying state via a
/// shared `Arc`.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDescriptor {
    pub id: SubscriptionId,
    pub symbols: Vec<SymbolCode>,
    pub adjust: AdjustType,
    pub kind: SubscriptionKind,
    pub created_at: chrono::DateTime<Utc>,
    pub last_activity_at: chrono::DateTime<Utc>,
    pub active: bool,
    pub queued_frames: usize,
    pub dropped_frames: u64,
}

impl SubscriptionManager {
    pub fn new(caps: SubscriptionCaps, mode: Mode, adapter: Arc<dyn UpstreamAdapter>) -> Self {
        SubscriptionManager {
            inner: Arc::new(Inner {
                state: Mutex::new(ManagerState::default()),
                caps,
                mode,
                adapter,
            }),
        }
    }

    fn dispatch_frame(&self, frame: TickFrame) {
        let mut senders: Vec<broadcast::Sender<TickFrame>> = Vec::new();
        {
            let state = self.inner.state.lock();
            let mut ids: HashSet<SubscriptionId> = HashSet::new();
            for symbol in frame.keys() {
                if let Some(set) = state.by_symbol.get(symbol) {
                    ids.extend(set.iter().copied());
                }
            }
            ids.extend(state.firehose.iter().copied());
            for id in ids {
                if let Some(entry) = state.subs.get(&id) {
                    if entry.subscription.active {
                        senders.push(entry.tx.clone());
                    }
                }
            }
        }
        for tx in senders {
            // A closed channel means every consumer has already dropped its
            // receiver; dropping the frame is correct, not an error.
            let _ = tx.send(frame.clone());
        }
    }

    fn frame_callback(&self) -> FrameCallback {
        let manager = self.clone();
        Arc::new(move |frame| manager.dispatch_frame(frame))
    }

    /// Register a per-symbol subscription. Rejects empty/blank symbol
    /// lists and the subscription cap before ever calling the adapter; an
    /// adapter error rolls the local state back.
    pub async fn subscribe(
        &self,
        symbols: Vec<SymbolCode>,
        adjust: AdjustType,
    ) -> Result<SubscriptionId, GatewayError> {
        if symbols.is_empty() {
            return Err(GatewayError::EmptySymbols);
        }

        let subscription = Subscription::new_per_symbol(symbols.clone(), adjust);
        let id = subscription.id;
        let (tx, rx) = broadcast::channel(self.inner.caps.queue_depth.max(1));

        {
            let mut state = self.inner.state.lock();
            if state.subs.len() >= self.inner.caps.max_subs {
                return Err(GatewayError::SubLimit);
            }
            for symbol in &symbols {
                state.by_symbol.entry(symbol.clone()).or_default().insert(id);
            }
            state.subs.insert(
                id,
                SubEntry {
                    subscription: subscription.clone(),
                    tx,
                    _idle_rx: rx,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
            );
        }

        let callback = self.frame_callback();
        if let Err(err) = self
            .inner
            .adapter
            .subscribe_symbols(&symbols, adjust, callback)
            .await
        {
            self.rollback(id, &symbols, false);
            return Err(err);
        }

        Ok(id)
    }

    /// Register a firehose subscription. Refused when the cap is off or in
    /// `Mock` mode, where there is no adapter-backed feed to firehose from.
    pub async fn subscribe_firehose(&self) -> Result<SubscriptionId, GatewayError> {
        if !self.inner.caps.firehose_enabled {
            return Err(GatewayError::FailedPrecondition(
                "firehose subscriptions are disabled".to_string(),
            ));
        }
        if self.inner.mode == Mode::Mock {
            return Err(GatewayError::FailedPrecondition(
                "firehose is not supported in mock mode".to_string(),
            ));
        }

        let subscription = Subscription::new_firehose();
        let id = subscription.id;
        let (tx, rx) = broadcast::channel(self.inner.caps.queue_depth.max(1));

        {
            let mut state = self.inner.state.lock();
            if state.subs.len() >= self.inner.caps.max_subs {
                return Err(GatewayError::SubLimit);
            }
            state.firehose.insert(id);
            state.subs.insert(
                id,
                SubEntry {
                    subscription: subscription.clone(),
                    tx,
                    _idle_rx: rx,
                    dropped: Arc::new(AtomicU64::new(0)),
                },
            );
        }

        let callback = self.frame_callback();
        if let Err(err) = self.inner.adapter.subscribe_firehose(callback).await {
            self.rollback(id, &[], true);
            return Err(err);
        }

        Ok(id)
    }

    fn rollback(&self, id: SubscriptionId, symbols: &[SymbolCode], was_firehose: bool) {
        let mut state = self.inner.state.lock();
        state.subs.remove(&id);
        if was_firehose {
            state.firehose.remove(&id);
        }
        for symbol in symbols {
            if let Some(set) = state.by_symbol.get_mut(symbol) {
                set.remove(&id);
                if set.is_empty() {
                    state.by_symbol.remove(symbol);
                }
            }
        }
    }

    /// Idempotent: unsubscribing an unknown or already-inactive id succeeds
    /// silently rather than returning `NOT_FOUND`.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), GatewayError> {
        let (symbols_to_drop, was_firehose, found) = {
            let mut state = self.inner.state.lock();
            let Some(entry) = state.subs.get_mut(&id) else {
                return Ok(());
            };
            entry.subscription.active = false;
            let symbols = entry.subscription.symbols.clone();
            let was_firehose = entry.subscription.kind == SubscriptionKind::Firehose;

            let mut freed_symbols = Vec::new();
            for symbol in &symbols {
                if let Some(set) = state.by_symbol.get_mut(symbol) {
                    set.remove(&id);
                    if set.is_empty() {
                        state.by_symbol.remove(symbol);
                        freed_symbols.push(symbol.clone());
                    }
                }
            }
            if was_firehose {
                state.firehose.remove(&id);
            }
            state.subs.remove(&id);
            (freed_symbols, was_firehose, true)
        };

        if !found {
            return Ok(());
        }

        for symbol in &symbols_to_drop {
            if let Err(err) = self.inner.adapter.unsubscribe(symbol.as_str()).await {
                tracing::warn!(%symbol, error = %err, "adapter unsubscribe failed, local state already cleared");
            }
        }
        if was_firehose {
            if let Err(err) = self.inner.adapter.unsubscribe("*").await {
                tracing::warn!(error = %err, "adapter firehose unsubscribe failed, local state already cleared");
            }
        }
        Ok(())
    }

    pub fn describe(&self, id: SubscriptionId) -> Option<SubscriptionDescriptor> {
        let state = self.inner.state.lock();
        state.subs.get(&id).map(|entry| to_descriptor(entry))
    }

    pub fn list(&self) -> Vec<SubscriptionDescriptor> {
        let state = self.inner.state.lock();
        state.subs.values().map(to_descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().subs.len()
    }

    /// A dedicated, single-consumer receiver for the subscription's queue.
    /// Starting a second consumer on the same id is undefined behaviour.
    pub fn consumer(&self, id: SubscriptionId) -> Option<broadcast::Receiver<TickFrame>> {
        let state = self.inner.state.lock();
        state.subs.get(&id).map(|entry| entry.tx.subscribe())
    }

    fn record_drop(&self, id: SubscriptionId, skipped: u64) {
        let state = self.inner.state.lock();
        if let Some(entry) = state.subs.get(&id) {
            entry.dropped.fetch_add(skipped, Ordering::Relaxed);
        }
    }

    pub fn is_active(&self, id: SubscriptionId) -> bool {
        let state = self.inner.state.lock();
        state
            .subs
            .get(&id)
            .map(|e| e.subscription.active)
            .unwrap_or(false)
    }

    /// Called by the Streaming Endpoint each time a frame is yielded or a
    /// heartbeat ping is received, to reset the idle-sweep clock.
    pub fn touch(&self, id: SubscriptionId) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.subs.get_mut(&id) {
            entry.subscription.last_activity_at = Utc::now();
        }
    }

    /// Removes subscriptions whose `last_activity_at` exceeds the
    /// configured heartbeat timeout. Intended to run on a periodic tick
    /// from the Lifecycle component.
    pub async fn sweep_idle(&self) -> usize {
        let timeout = self.inner.caps.heartbeat_timeout();
        let expired: Vec<SubscriptionId> = {
            let state = self.inner.state.lock();
            let now = Utc::now();
            state
                .subs
                .values()
                .filter(|entry| {
                    now.signed_duration_since(entry.subscription.last_activity_at)
                        .to_std()
                        .map(|elapsed| elapsed > timeout)
                        .unwrap_or(false)
                })
                .map(|entry| entry.subscription.id)
                .collect()
        };
        for id in &expired {
            let _ = self.unsubscribe(*id).await;
        }
        expired.len()
    }

    /// Unsubscribes every live subscription. Called during shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<SubscriptionId> = {
            let state = self.inner.state.lock();
            state.subs.keys().copied().collect()
        };
        for id in ids {
            let _ = self.unsubscribe(id).await;
        }
    }
}

fn to_descriptor(entry: &SubEntry) -> SubscriptionDescriptor {
    SubscriptionDescriptor {
        id: entry.subscription.id,
        symbols: entry.subscription.symbols.clone(),
        adjust: entry.subscription.adjust,
        kind: entry.subscription.kind,
        created_at: entry.subscription.created_at,
        last_activity_at: entry.subscription.last_activity_at,
        active: entry.subscription.active,
        queued_frames: entry.tx.len(),
        dropped_frames: entry.dropped.load(Ordering::Relaxed),
    }
}

/// Consumes frames from a subscription's queue, waking up at least once a
/// second to observe cancellation.
pub async fn next_frame(
    manager: &SubscriptionManager,
    id: SubscriptionId,
    rx: &mut broadcast::Receiver<TickFrame>,
) -> FrameWait {
    loop {
        if !manager.is_active(id) {
            return FrameWait::Ended;
        }
        match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Ok(frame)) => {
                manager.touch(id);
                return FrameWait::Frame(frame);
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                manager.record_drop(id, skipped);
                return FrameWait::Dropped(skipped);
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return FrameWait::Ended,
            Err(_elapsed) => continue,
        }
    }
}

pub enum FrameWait {
    Frame(TickFrame),
    Dropped(u64),
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::adapter::SimulationAdapter;

    fn manager(caps: SubscriptionCaps) -> SubscriptionManager {
        SubscriptionManager::new(caps, Mode::Mock, Arc::new(SimulationAdapter::new()))
    }

    fn caps(max_subs: usize, queue_depth: usize) -> SubscriptionCaps {
        SubscriptionCaps {
            max_subs,
            queue_depth,
            heartbeat_timeout_secs: 60,
            firehose_enabled: true,
        }
    }

    #[tokio::test]
    async fn empty_symbols_is_rejected_before_touching_state() {
        let mgr = manager(caps(10, 10));
        let err = mgr.subscribe(vec![], AdjustType::None).await.unwrap_err();
        assert_eq!(err, GatewayError::EmptySymbols);
        assert_eq!(mgr.len(), 0);
    }

    #[tokio::test]
    async fn subscription_cap_is_enforced_and_state_is_unchanged_on_rejection() {
        let mgr = manager(caps(2, 10));
        let s1 = SymbolCode::parse("A").unwrap();
        let s2 = SymbolCode::parse("B").unwrap();
        let s3 = SymbolCode::parse("C").unwrap();
        mgr.subscribe(vec![s1], AdjustType::None).await.unwrap();
        mgr.subscribe(vec![s2], AdjustType::None).await.unwrap();
        let err = mgr
            .subscribe(vec![s3], AdjustType::None)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::SubLimit);
        assert_eq!(mgr.len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_for_unknown_ids() {
        let mgr = manager(caps(10, 10));
        let bogus = SubscriptionId::new();
        mgr.unsubscribe(bogus).await.unwrap();
        mgr.unsubscribe(bogus).await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_then_resubscribe_frees_cap_slot() {
        let mgr = manager(caps(1, 10));
        let s1 = SymbolCode::parse("A").unwrap();
        let id = mgr.subscribe(vec![s1], AdjustType::None).await.unwrap();
        let s2 = SymbolCode::parse("B").unwrap();
        assert!(mgr
            .subscribe(vec![s2.clone()], AdjustType::None)
            .await
            .is_err());
        mgr.unsubscribe(id).await.unwrap();
        mgr.subscribe(vec![s2], AdjustType::None).await.unwrap();
        assert_eq!(mgr.len(), 1);
    }

    #[tokio::test]
    async fn firehose_disabled_cap_rejects() {
        let mgr = manager(caps(10, 10));
        // firehose_enabled true above; flip it off for this case.
        let mgr = SubscriptionManager::new(
            SubscriptionCaps {
                firehose_enabled: false,
                ..caps(10, 10)
            },
            Mode::Dev,
            Arc::new(SimulationAdapter::new()),
        );
        let _ = &mgr; // silence unused warning if branch above is reordered
        let err = mgr.subscribe_firehose().await.unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn firehose_refused_in_mock_mode() {
        let mgr = SubscriptionManager::new(
            SubscriptionCaps {
                firehose_enabled: true,
                ..caps(10, 10)
            },
            Mode::Mock,
            Arc::new(SimulationAdapter::new()),
        );
        let err = mgr.subscribe_firehose().await.unwrap_err();
        assert!(matches!(err, GatewayError::FailedPrecondition(_)));
    }

    #[tokio::test]
    async fn two_subscriptions_on_same_symbol_both_receive_dispatched_frame() {
        let mgr = manager(caps(10, 10));
        let symbol = SymbolCode::parse("A").unwrap();
        let id1 = mgr
            .subscribe(vec![symbol.clone()], AdjustType::None)
            .await
            .unwrap();
        let id2 = mgr
            .subscribe(vec![symbol.clone()], AdjustType::None)
            .await
            .unwrap();
        let mut rx1 = mgr.consumer(id1).unwrap();
        let mut rx2 = mgr.consumer(id2).unwrap();

        let mut frame = TickFrame::new();
        frame.insert(
            symbol.clone(),
            gateway_core::Quote {
                last_price: Default::default(),
                volume: 0,
                amount: Default::default(),
                open: Default::default(),
                high: Default::default(),
                low: Default::default(),
                close: Default::default(),
                bid: None,
                ask: None,
                ts: Utc::now(),
            },
        );
        mgr.dispatch_frame(frame.clone());

        let got1 = next_frame(&mgr, id1, &mut rx1).await;
        let got2 = next_frame(&mgr, id2, &mut rx2).await;
        assert!(matches!(got1, FrameWait::Frame(_)));
        assert!(matches!(got2, FrameWait::Frame(_)));
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let mgr = manager(caps(10, 10));
        let symbol = SymbolCode::parse("A").unwrap();
        let id = mgr
            .subscribe(vec![symbol.clone()], AdjustType::None)
            .await
            .unwrap();
        let mut rx = mgr.consumer(id).unwrap();
        mgr.unsubscribe(id).await.unwrap();

        let mut frame = TickFrame::new();
        frame.insert(
            symbol,
            gateway_core::Quote {
                last_price: Default::default(),
                volume: 0,
                amount: Default::default(),
                open: Default::default(),
                high: Default::default(),
                low: Default::default(),
                close: Default::default(),
                bid: None,
                ask: None,
                ts: Utc::now(),
            },
        );
        mgr.dispatch_frame(frame);
        let got = next_frame(&mgr, id, &mut rx).await;
        assert!(matches!(got, FrameWait::Ended));
    }
}
