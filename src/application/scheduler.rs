//! Trigger scheduler: one tick task per (pair, interval) plus manual and
//! emergency triggers.
//!
//! Each pair owns a mailbox with a single pending slot and a busy flag.
//! The busy flag enforces at-most-one in-flight cycle per pair; a boundary
//! that arrives while the pair is busy (or a trigger already pending) is
//! coalesced and counted, never queued. Emergency triggers may replace a
//! pending trigger but never interrupt a running cycle. Missed boundaries
//! are not backfilled: every tick is computed from fresh wall-clock time.

use crate::domain::journal::TriggerCause;
use crate::domain::market::Pair;
use crate::infrastructure::observability::Metrics;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub pair: Pair,
    pub fire_time: DateTime<Utc>,
    pub cause: TriggerCause,
}

struct Mailbox {
    pair: Pair,
    busy: AtomicBool,
    pending: Mutex<Option<Trigger>>,
    notify: Notify,
    last_fire: Mutex<Option<DateTime<Utc>>>,
}

pub struct TriggerScheduler {
    mailboxes: HashMap<String, Arc<Mailbox>>,
    metrics: Arc<Metrics>,
}

impl TriggerScheduler {
    pub fn new(pairs: &[Pair], metrics: Arc<Metrics>) -> Self {
        let mailboxes = pairs
            .iter()
            .map(|pair| {
                (
                    pair.symbol(),
                    Arc::new(Mailbox {
                        pair: pair.clone(),
                        busy: AtomicBool::new(false),
                        pending: Mutex::new(None),
                        notify: Notify::new(),
                        last_fire: Mutex::new(None),
                    }),
                )
            })
            .collect();
        Self { mailboxes, metrics }
    }

    pub fn pairs(&self) -> Vec<Pair> {
        self.mailboxes.values().map(|m| m.pair.clone()).collect()
    }

    /// Manual trigger for one pair, coalesced like a scheduled one.
    pub fn trigger_now(&self, symbol: &str) -> Result<()> {
        let mailbox = self.mailbox(symbol)?;
        self.post(mailbox, TriggerCause::Manual, Utc::now());
        Ok(())
    }

    /// Emergency trigger: replaces any pending trigger for the pair. A
    /// cycle already in flight still finishes first.
    pub fn trigger_emergency(&self, symbol: &str, reason: &str) -> Result<()> {
        let mailbox = self.mailbox(symbol)?;
        warn!(
            "TriggerScheduler: EMERGENCY trigger for {} ({})",
            symbol, reason
        );
        self.post(mailbox, TriggerCause::Emergency, Utc::now());
        Ok(())
    }

    /// Awaits the next trigger for a pair, marking it busy. The caller
    /// must `mark_idle` when its cycle ends. Returns None once `shutdown`
    /// flips.
    pub async fn next_trigger(
        &self,
        symbol: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Option<Trigger> {
        let mailbox = self.mailbox(symbol).ok()?;
        loop {
            let notified = mailbox.notify.notified();
            if let Some(trigger) = mailbox.pending.lock().unwrap().take() {
                mailbox.busy.store(true, Ordering::SeqCst);
                *mailbox.last_fire.lock().unwrap() = Some(trigger.fire_time);
                return Some(trigger);
            }
            tokio::select! {
                _ = notified => {}
                changed = shutdown.changed() => {
                    // A dropped sender shuts the worker down like a flip.
                    if changed.is_err() || *shutdown.borrow() {
                        return None;
                    }
                }
            }
        }
    }

    pub fn mark_idle(&self, symbol: &str) {
        if let Ok(mailbox) = self.mailbox(symbol) {
            mailbox.busy.store(false, Ordering::SeqCst);
            // A trigger may have landed while the cycle ran.
            mailbox.notify.notify_one();
        }
    }

    pub fn in_flight(&self, symbol: &str) -> bool {
        self.mailbox(symbol)
            .map(|m| m.busy.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Spawns the boundary tick task for every pair.
    pub fn spawn_tickers(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        self.mailboxes
            .values()
            .map(|mailbox| {
                let scheduler = self.clone();
                let mailbox = mailbox.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    info!(
                        "TriggerScheduler: Ticking {} every {}",
                        mailbox.pair,
                        mailbox.pair.interval
                    );
                    loop {
                        // Fresh wall clock each lap: a missed boundary is
                        // skipped, never replayed.
                        let now = Utc::now();
                        let boundary = mailbox.pair.interval.next_boundary(now);
                        let wait = (boundary - now).to_std().unwrap_or(Duration::ZERO);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {
                                scheduler.post(mailbox.clone(), TriggerCause::Scheduled, boundary);
                            }
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    break;
                                }
                            }
                        }
                    }
                })
            })
            .collect()
    }

    fn mailbox(&self, symbol: &str) -> Result<Arc<Mailbox>> {
        self.mailboxes
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no schedule for pair '{}'", symbol))
    }

    fn post(&self, mailbox: Arc<Mailbox>, cause: TriggerCause, fire_time: DateTime<Utc>) {
        // fire_time never decreases per pair.
        let fire_time = {
            let last = mailbox.last_fire.lock().unwrap();
            match *last {
                Some(last_fire) if fire_time < last_fire => last_fire,
                _ => fire_time,
            }
        };
        let trigger = Trigger {
            pair: mailbox.pair.clone(),
            fire_time,
            cause,
        };

        let symbol = mailbox.pair.symbol();
        let mut pending = mailbox.pending.lock().unwrap();
        let busy = mailbox.busy.load(Ordering::SeqCst);

        match cause {
            TriggerCause::Emergency => {
                if let Some(replaced) = pending.replace(trigger) {
                    debug!(
                        "TriggerScheduler: Emergency preempted pending {:?} trigger for {}",
                        replaced.cause, symbol
                    );
                }
                mailbox.notify.notify_one();
            }
            TriggerCause::Scheduled | TriggerCause::Manual => {
                if busy || pending.is_some() {
                    self.metrics
                        .skipped_busy_total
                        .with_label_values(&[symbol.as_str()])
                        .inc();
                    debug!(
                        "TriggerScheduler: Coalesced {:?} trigger for {} (busy={})",
                        cause, symbol, busy
                    );
                } else {
                    *pending = Some(trigger);
                    mailbox.notify.notify_one();
                }
            }
        }
    }
}
