//! Connectivity monitor.
//!
//! Raw reachability observations go in through [`ConnectivityMonitor::report`];
//! a background task publishes a transition only once the observed value has
//! been stable for the debounce window, so a flapping link does not trigger a
//! burst of drains.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::sync::remote::RemoteBackend;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, Listener>>,
}

impl Listeners {
    fn notify(&self, online: bool) {
        let callbacks: Vec<Listener> = match self.callbacks.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback(online);
        }
    }
}

pub struct ConnectivityMonitor {
    raw: mpsc::UnboundedSender<bool>,
    status: watch::Receiver<bool>,
    listeners: Arc<Listeners>,
    debouncer: JoinHandle<()>,
}

/// Handle returned by [`ConnectivityMonitor::on_connection_change`].
/// The callback stays registered until this is dropped or unsubscribed.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut map) = listeners.callbacks.lock() {
                map.remove(&self.id);
            }
        }
    }
}

impl ConnectivityMonitor {
    /// Start a monitor with a known initial state. Must be called inside a
    /// tokio runtime.
    pub fn new(initially_online: bool, debounce: Duration) -> Self {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(initially_online);
        let listeners = Arc::new(Listeners::default());
        let debouncer = tokio::spawn(run_debouncer(raw_rx, status_tx, listeners.clone(), debounce));
        Self {
            raw: raw_tx,
            status: status_rx,
            listeners,
            debouncer,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.status.borrow()
    }

    /// Feed one raw observation
    pub fn report(&self, online: bool) {
        let _ = self.raw.send(online);
    }

    /// Register a callback invoked with the new state on every transition
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.listeners.callbacks.lock() {
            map.insert(id, Arc::new(callback));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Receiver for async observers; `changed()` fires on each transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.clone()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.debouncer.abort();
    }
}

async fn run_debouncer(
    mut raw: mpsc::UnboundedReceiver<bool>,
    status: watch::Sender<bool>,
    listeners: Arc<Listeners>,
    debounce: Duration,
) {
    while let Some(mut candidate) = raw.recv().await {
        // wait for a quiet period; every new observation restarts it
        loop {
            tokio::select! {
                next = raw.recv() => match next {
                    Some(value) => candidate = value,
                    None => return,
                },
                _ = tokio::time::sleep(debounce) => break,
            }
        }

        if *status.borrow() == candidate {
            continue;
        }
        status.send_replace(candidate);
        if candidate {
            tracing::info!("connection restored");
        } else {
            tracing::warn!("connection lost, writes will be queued locally");
        }
        listeners.notify(candidate);
    }
}

/// Periodically probe the remote backend and report the result
pub fn spawn_probe(
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<dyn RemoteBackend>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = match remote.health().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("health probe failed: {e}");
                    false
                }
            };
            monitor.report(reachable);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    async fn settle() {
        tokio::time::sleep(DEBOUNCE * 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stable_change_is_published() {
        let monitor = ConnectivityMonitor::new(false, DEBOUNCE);
        assert!(!monitor.is_online());
        monitor.report(true);
        settle().await;
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_is_collapsed_into_one_transition() {
        let monitor = ConnectivityMonitor::new(false, DEBOUNCE);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = monitor.on_connection_change(move |online| sink.lock().unwrap().push(online));

        for value in [true, false, true, false, true] {
            monitor.report(value);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn flap_back_to_the_same_state_publishes_nothing() {
        let monitor = ConnectivityMonitor::new(true, DEBOUNCE);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _sub = monitor.on_connection_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.report(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.report(true);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribed_listener_is_not_called() {
        let monitor = ConnectivityMonitor::new(false, DEBOUNCE);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = monitor.on_connection_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        monitor.report(true);
        settle().await;
        sub.unsubscribe();
        monitor.report(false);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn watch_receivers_see_transitions() {
        let monitor = ConnectivityMonitor::new(false, DEBOUNCE);
        let mut rx = monitor.subscribe();
        monitor.report(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
