//! The monitor cycle.
//!
//! A [`Monitor`] runs on a fixed interval.  Each cycle takes a snapshot of
//! the subscriber table and, for every subscriber in the monitoring state,
//! polls its sources in registration order:
//!
//! ```text
//!   fetch ──► window ──► admit ──► render ──► deliver ──► record
//!     │                    │                     │
//!  failure: skip source    │               failure: item stays pending
//!                   quota reached: stop subscriber, send notice once
//! ```
//!
//! ## Failure containment
//!
//! Failures are contained at the smallest scope: a failed delivery affects
//! one message, a failed fetch one source, and a corrupt record or a panic
//! one subscriber.  A cycle always completes.
//!
//! ## Concurrency
//!
//! Cycles never overlap: [`Monitor::run`] awaits each cycle before waiting
//! for the next tick, and an overrunning cycle delays the next tick.
//! Within a cycle subscribers are processed on separate tasks (bounded by
//! `max_concurrent_subscribers`).  Each task holds its subscriber's lock for
//! the whole pass, so the front end's writes to that subscriber wait for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::delivery::DeliveryChannel;
use crate::error::{DeliveryError, FetchError, SubscriberError};
use crate::gate::{self, Admission};
use crate::registry::{Registry, SharedSubscriber};
use crate::source::{Feed, FeedSource};
use crate::subscriber::{Subscriber, SubscriberId};
use crate::transform::Renderer;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub window: usize,
    pub max_concurrent_subscribers: usize,
    pub fetch_timeout: Duration,
    pub delivery_timeout: Duration,
    pub quota_notice: String,
}

impl From<&EngineConfig> for MonitorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            window: config.window,
            max_concurrent_subscribers: config.max_concurrent_subscribers,
            fetch_timeout: config.fetch_timeout(),
            delivery_timeout: config.delivery_timeout(),
            quota_notice: config.quota_notice_text(),
        }
    }
}

/// Totals for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Subscribers in the monitoring state that were visited.
    pub subscribers: usize,
    pub delivered: usize,
    pub fetch_failures: usize,
    pub delivery_failures: usize,
    pub notices_sent: usize,
    /// Subscribers whose processing failed as a whole.
    pub subscriber_failures: usize,
}

#[derive(Debug, Default)]
struct SubscriberReport {
    visited: bool,
    delivered: usize,
    fetch_failures: usize,
    delivery_failures: usize,
    notices_sent: usize,
}

impl CycleReport {
    fn absorb(&mut self, report: SubscriberReport) {
        if report.visited {
            self.subscribers += 1;
        }
        self.delivered += report.delivered;
        self.fetch_failures += report.fetch_failures;
        self.delivery_failures += report.delivery_failures;
        self.notices_sent += report.notices_sent;
    }
}

/// Drives the poll → dedup → render → deliver pass.  Cheap to clone.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<Registry>,
    source: Arc<dyn FeedSource>,
    renderer: Renderer,
    channel: Arc<dyn DeliveryChannel>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        registry: Arc<Registry>,
        source: Arc<dyn FeedSource>,
        renderer: Renderer,
        channel: Arc<dyn DeliveryChannel>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                source,
                renderer,
                channel,
                settings,
            }),
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run cycles until `shutdown` becomes `true` (or its sender is dropped).
    ///
    /// The first cycle starts immediately.  Shutdown is only observed between
    /// cycles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.settings.poll_interval;
        info!(interval_secs = interval.as_secs(), "monitor started");

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = timer.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let started = Instant::now();
            let report = self.run_cycle().await;
            let summary = self.inner.registry.summary().await;
            let elapsed = started.elapsed();

            info!(
                subscribers = report.subscribers,
                delivered = report.delivered,
                fetch_failures = report.fetch_failures,
                delivery_failures = report.delivery_failures,
                notices_sent = report.notices_sent,
                subscriber_failures = report.subscriber_failures,
                registered = summary.subscribers,
                active = summary.active,
                elapsed_ms = elapsed.as_millis() as u64,
                "cycle finished"
            );
            if elapsed > interval {
                warn!(
                    elapsed_secs = elapsed.as_secs(),
                    interval_secs = interval.as_secs(),
                    "cycle overran its interval; next cycle delayed"
                );
            }
        }

        info!("monitor stopped");
    }

    /// Run one full cycle over a snapshot of the subscriber table.
    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = self.inner.registry.snapshot().await;
        debug!(subscribers = snapshot.len(), "cycle started");

        let permits = Arc::new(Semaphore::new(
            self.inner.settings.max_concurrent_subscribers.max(1),
        ));
        let tasks: Vec<(SubscriberId, JoinHandle<_>)> = snapshot
            .into_iter()
            .map(|(id, entry)| {
                let monitor = self.clone();
                let permits = Arc::clone(&permits);
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    monitor.process_subscriber(id, entry).await
                });
                (id, handle)
            })
            .collect();

        let mut report = CycleReport::default();
        for (id, handle) in tasks {
            match handle.await {
                Ok(Ok(subscriber_report)) => report.absorb(subscriber_report),
                Ok(Err(e)) => {
                    error!(subscriber = %id, error = %e, "subscriber skipped this cycle");
                    report.subscriber_failures += 1;
                }
                Err(e) => {
                    error!(subscriber = %id, error = %e, "subscriber task failed");
                    report.subscriber_failures += 1;
                }
            }
        }
        report
    }

    async fn process_subscriber(
        &self,
        id: SubscriberId,
        entry: SharedSubscriber,
    ) -> Result<SubscriberReport, SubscriberError> {
        let mut subscriber = entry.lock().await;
        let mut report = SubscriberReport::default();
        if !subscriber.is_monitoring() {
            return Ok(report);
        }
        subscriber.check_invariants()?;
        report.visited = true;

        let quota = self.inner.registry.quota_limit();
        if subscriber.is_exhausted(quota) {
            // Only a notice that failed to go out earlier is left to do.
            self.send_quota_notice(&mut subscriber, &mut report).await;
            return Ok(report);
        }

        let sources = subscriber.sources().to_vec();
        'sources: for url in &sources {
            let feed = match self.fetch(url).await {
                Ok(feed) => feed,
                Err(e) => {
                    warn!(subscriber = %id, source = %url, error = %e, "fetch failed");
                    report.fetch_failures += 1;
                    continue;
                }
            };

            for item in gate::window(&feed.items, self.inner.settings.window) {
                match gate::admit(&subscriber, item, quota) {
                    Admission::Admitted => {}
                    Admission::AlreadySeen => continue,
                    Admission::QuotaExhausted => break 'sources,
                }

                let text = self.inner.renderer.render(item).await;
                match self.deliver(id, &text).await {
                    Ok(()) => {
                        subscriber.record_delivery(&item.permalink);
                        report.delivered += 1;
                        info!(
                            subscriber = %id,
                            permalink = %item.permalink,
                            delivered = subscriber.delivered_count(),
                            "item delivered"
                        );
                        if subscriber.is_exhausted(quota) {
                            break 'sources;
                        }
                    }
                    Err(e) => {
                        warn!(
                            subscriber = %id,
                            permalink = %item.permalink,
                            error = %e,
                            "delivery failed; will retry next cycle"
                        );
                        report.delivery_failures += 1;
                    }
                }
            }
        }

        if subscriber.is_exhausted(quota) {
            self.send_quota_notice(&mut subscriber, &mut report).await;
        }
        Ok(report)
    }

    async fn send_quota_notice(&self, subscriber: &mut Subscriber, report: &mut SubscriberReport) {
        if subscriber.notice_sent {
            return;
        }
        match self.deliver(subscriber.id, &self.inner.settings.quota_notice).await {
            Ok(()) => {
                subscriber.notice_sent = true;
                report.notices_sent += 1;
                info!(subscriber = %subscriber.id, "quota exhausted; notice sent");
            }
            Err(e) => {
                warn!(subscriber = %subscriber.id, error = %e, "quota notice not delivered; will retry");
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Feed, FetchError> {
        let timeout = self.inner.settings.fetch_timeout;
        tokio::time::timeout(timeout, self.inner.source.fetch(url))
            .await
            .unwrap_or(Err(FetchError::Timeout(timeout)))
    }

    async fn deliver(&self, to: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        let timeout = self.inner.settings.delivery_timeout;
        tokio::time::timeout(timeout, self.inner.channel.send(to, text))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(timeout)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
