//! The wall runtime: one thread owns the log and the cursor.
//!
//! [`Wall::run`] is a cooperative event loop. It waits on a channel with a
//! timeout equal to the nearest cadence deadline, so tick, poll and redraw
//! timers interleave with incoming messages without preemption. Each handler
//! runs to completion before the next one starts.
//!
//! Blocking work never runs on the loop thread:
//! - fetches (bootstrap and poll) run on short-lived helper threads and send
//!   their result back as a [`WallEvent::Fetched`];
//! - the push subscription runs on the store's own thread and forwards rows
//!   as [`WallEvent::Push`].
//!
//! At most one fetch is in flight. A poll that comes due while one is
//! outstanding is skipped for that cycle.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::cadence::Cadence;
use crate::error::StoreError;
use crate::playback::{PlaybackParams, Scheduler, Tick};
use crate::post::RawPost;
use crate::store::{PostQuery, PostStore, PushEvent, Subscription};
use crate::sync::{IngestionSync, SyncStats};

/// Upper bound on a single wait, so a stalled clock never hangs the loop.
const MAX_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Bootstrap,
    Poll,
}

impl FetchKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Poll => "poll",
        }
    }
}

/// Messages delivered to the runtime loop.
#[derive(Debug)]
pub enum WallEvent {
    Fetched {
        kind: FetchKind,
        result: Result<Vec<RawPost>, StoreError>,
    },
    Push(PushEvent),
    Shutdown,
}

/// Whether the runtime should keep going after a surface update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Everything a surface needs to draw the wall.
#[derive(Debug)]
pub struct WallView<'a> {
    /// Most recent tick result. `Tick::Empty` until the first tick.
    pub tick: &'a Tick,
    /// `true` when `tick` was produced for this update, `false` on redraws.
    pub fresh: bool,
    /// The initial load has not finished yet.
    pub loading: bool,
    pub log_len: usize,
    pub stats: &'a SyncStats,
    pub push_connected: bool,
    pub next_tick_in: Duration,
    /// Fraction of the current tick period elapsed, in `[0, 1]`.
    pub tick_progress: f64,
}

/// Where frames go: a terminal, stdout, a test recorder.
pub trait Surface {
    /// Render the wall.
    ///
    /// # Errors
    ///
    /// Rendering errors abort the run.
    fn show(&mut self, view: &WallView<'_>) -> Result<Flow>;

    /// How often to redraw between ticks, if at all.
    fn redraw_interval(&self) -> Option<Duration> {
        None
    }
}

impl<F> Surface for F
where
    F: FnMut(&WallView<'_>) -> Result<Flow>,
{
    fn show(&mut self, view: &WallView<'_>) -> Result<Flow> {
        self(view)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WallOptions {
    pub params: PlaybackParams,
    pub poll_interval: Duration,
    /// Stop after this many displayed posts.
    pub max_frames: Option<u64>,
}

impl Default for WallOptions {
    fn default() -> Self {
        Self {
            params: PlaybackParams::default(),
            poll_interval: Duration::from_secs(30),
            max_frames: None,
        }
    }
}

/// Totals reported when the runtime returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub frames: u64,
    pub log_len: usize,
    pub stats: SyncStats,
}

/// Cloneable handle for stopping a running wall from another thread.
#[derive(Debug, Clone)]
pub struct WallHandle {
    tx: Sender<WallEvent>,
}

impl WallHandle {
    /// Ask the runtime to tear down. Returns `false` if it already stopped.
    pub fn shutdown(&self) -> bool {
        self.tx.send(WallEvent::Shutdown).is_ok()
    }
}

pub struct Wall {
    store: Arc<dyn PostStore>,
    options: WallOptions,
    sync: IngestionSync,
    scheduler: Scheduler,
    tx: Sender<WallEvent>,
    rx: Receiver<WallEvent>,
    fetch_in_flight: bool,
    bootstrapped: bool,
    /// Pushes received before the bootstrap settled, merged right after it.
    early_pushes: Vec<RawPost>,
    push_connected: bool,
    last_tick: Tick,
    ticks: u64,
    frames: u64,
}

impl Wall {
    #[must_use]
    pub fn new(store: Arc<dyn PostStore>, options: WallOptions) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            store,
            options,
            sync: IngestionSync::new(),
            scheduler: Scheduler::new(options.params),
            tx,
            rx,
            fetch_in_flight: false,
            bootstrapped: false,
            early_pushes: Vec::new(),
            push_connected: false,
            last_tick: Tick::Empty,
            ticks: 0,
            frames: 0,
        }
    }

    #[must_use]
    pub fn handle(&self) -> WallHandle {
        WallHandle {
            tx: self.tx.clone(),
        }
    }

    #[must_use]
    pub const fn sync(&self) -> &IngestionSync {
        &self.sync
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run until the surface stops, a shutdown arrives, or `max_frames` is
    /// reached. The push subscription is released before returning.
    ///
    /// The first tick fires as soon as the initial load settles, whether it
    /// succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `surface`.
    pub fn run(&mut self, surface: &mut dyn Surface) -> Result<RunSummary> {
        tracing::info!(store = %self.store.describe(), "wall starting");

        let subscription = self.subscribe();
        let outcome = self.event_loop(surface);
        drop(subscription);

        tracing::info!(
            ticks = self.ticks,
            frames = self.frames,
            log_len = self.sync.log().len(),
            "wall stopped"
        );
        outcome?;

        Ok(RunSummary {
            ticks: self.ticks,
            frames: self.frames,
            log_len: self.sync.log().len(),
            stats: self.sync.stats().clone(),
        })
    }

    fn subscribe(&self) -> Subscription {
        let tx = self.tx.clone();
        let sink = Box::new(move |event: PushEvent| {
            let _ = tx.send(WallEvent::Push(event));
        });
        match self.store.subscribe(sink) {
            Ok(subscription) => subscription,
            Err(err) => {
                tracing::warn!(
                    code = %err.code(),
                    error = %err,
                    "push subscription unavailable, relying on polls"
                );
                Subscription::idle()
            }
        }
    }

    fn event_loop(&mut self, surface: &mut dyn Surface) -> Result<()> {
        let start = Instant::now();
        self.start_fetch(FetchKind::Bootstrap);

        let mut tick: Option<Cadence> = None;
        let mut poll = Cadence::delayed(self.options.poll_interval, start);
        let mut redraw = surface
            .redraw_interval()
            .map(|period| Cadence::delayed(period, start));

        loop {
            let now = Instant::now();

            if tick.is_none() && self.bootstrapped {
                tick = Some(Cadence::immediate(self.options.params.tick_period(), now));
            }

            if poll.is_due(now) {
                poll.fire(now);
                self.start_fetch(FetchKind::Poll);
            }

            if let Some(cadence) = tick.as_mut().filter(|c| c.is_due(now)) {
                cadence.fire(now);
                self.last_tick = self.scheduler.tick(self.sync.posts());
                self.ticks += 1;
                let shown = matches!(self.last_tick, Tick::Show(_));
                if shown {
                    self.frames += 1;
                }

                let view = self.view(true, tick.as_ref(), now);
                if surface.show(&view)? == Flow::Stop {
                    return Ok(());
                }
                if shown && self.options.max_frames.is_some_and(|max| self.frames >= max) {
                    return Ok(());
                }
            } else if let Some(cadence) = redraw.as_mut().filter(|c| c.is_due(now)) {
                cadence.fire(now);
                let view = self.view(false, tick.as_ref(), now);
                if surface.show(&view)? == Flow::Stop {
                    return Ok(());
                }
            }

            let wait = [
                tick.as_ref().map(|c| c.time_until(now)),
                Some(poll.time_until(now)),
                redraw.as_ref().map(|c| c.time_until(now)),
            ]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT);

            match self.rx.recv_timeout(wait) {
                Ok(WallEvent::Shutdown) => return Ok(()),
                Ok(event) => {
                    self.handle_event(event);
                    while let Ok(next) = self.rx.try_recv() {
                        if matches!(next, WallEvent::Shutdown) {
                            return Ok(());
                        }
                        self.handle_event(next);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }

    fn view<'a>(&'a self, fresh: bool, tick: Option<&Cadence>, now: Instant) -> WallView<'a> {
        WallView {
            tick: &self.last_tick,
            fresh,
            loading: !self.bootstrapped,
            log_len: self.sync.log().len(),
            stats: self.sync.stats(),
            push_connected: self.push_connected,
            next_tick_in: tick.map_or(Duration::ZERO, |c| c.time_until(now)),
            tick_progress: tick.map_or(0.0, |c| c.progress(now)),
        }
    }

    fn handle_event(&mut self, event: WallEvent) {
        match event {
            WallEvent::Fetched { kind, result } => {
                self.fetch_in_flight = false;
                match kind {
                    FetchKind::Bootstrap => {
                        self.sync.apply_bootstrap(result);
                        self.bootstrapped = true;
                        for row in std::mem::take(&mut self.early_pushes) {
                            self.sync.apply_push(row);
                        }
                    }
                    FetchKind::Poll => {
                        self.sync.apply_poll(result);
                    }
                }
            }
            WallEvent::Push(PushEvent::Inserted(row)) => {
                if self.bootstrapped {
                    self.sync.apply_push(row);
                } else {
                    self.early_pushes.push(row);
                }
            }
            WallEvent::Push(PushEvent::Connected) => {
                tracing::info!("push channel connected");
                self.push_connected = true;
            }
            WallEvent::Push(PushEvent::Disconnected) => {
                tracing::warn!("push channel disconnected");
                self.push_connected = false;
            }
            WallEvent::Shutdown => {}
        }
    }

    fn start_fetch(&mut self, kind: FetchKind) {
        if self.fetch_in_flight {
            tracing::debug!(kind = kind.as_str(), "fetch already in flight, skipping");
            return;
        }

        let query = match kind {
            FetchKind::Bootstrap => PostQuery::all(),
            FetchKind::Poll => self.sync.poll_query(),
        };
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();

        let spawned = thread::Builder::new()
            .name(format!("xwall-{}", kind.as_str()))
            .spawn(move || {
                let result = store.fetch_posts(&query);
                let _ = tx.send(WallEvent::Fetched { kind, result });
            });

        match spawned {
            Ok(_) => self.fetch_in_flight = true,
            Err(err) => {
                tracing::warn!(kind = kind.as_str(), error = %err, "could not start fetch thread");
                if kind == FetchKind::Bootstrap {
                    self.bootstrapped = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn row(id: &str, minute: u32) -> RawPost {
        RawPost {
            source_id: Some(id.to_string()),
            content: Some(format!("post {id}")),
            created_at: Some(format!("2024-05-01T10:{minute:02}:00Z")),
            ..RawPost::default()
        }
    }

    fn fast_options() -> WallOptions {
        WallOptions {
            params: PlaybackParams::new(15, 5, Duration::from_millis(10), 50).expect("valid"),
            poll_interval: Duration::from_millis(15),
            max_frames: Some(500),
        }
    }

    #[test]
    fn shows_bootstrapped_posts_in_order() {
        let store = MemoryStore::with_rows(vec![row("a", 1), row("b", 2), row("c", 3)]);
        let mut wall = Wall::new(Arc::new(store), WallOptions {
            max_frames: Some(4),
            ..fast_options()
        });

        let mut shown = Vec::new();
        let mut surface = |view: &WallView<'_>| -> Result<Flow> {
            if let Some(frame) = view.tick.frame() {
                shown.push((frame.post.source_id.clone(), frame.label()));
            }
            Ok(Flow::Continue)
        };
        let summary = wall.run(&mut surface).expect("run");

        assert_eq!(summary.frames, 4);
        let ids: Vec<&str> = shown.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "a"]);
        assert_eq!(shown[0].1, "1/3 · Window 1");
    }

    #[test]
    fn failed_bootstrap_shows_empty_then_poll_recovers() {
        let store = MemoryStore::with_rows(vec![row("a", 1), row("b", 2)]);
        store.fail_next_fetches(1);
        let mut wall = Wall::new(Arc::new(store.clone()), fast_options());

        let mut first_tick = None;
        let mut surface = |view: &WallView<'_>| -> Result<Flow> {
            if view.fresh && first_tick.is_none() {
                first_tick = Some(view.tick.clone());
            }
            Ok(if view.tick.frame().is_some() {
                Flow::Stop
            } else {
                Flow::Continue
            })
        };
        let summary = wall.run(&mut surface).expect("run");

        assert_eq!(first_tick, Some(Tick::Empty));
        assert_eq!(summary.stats.fetch_failures, 1);
        assert_eq!(summary.log_len, 2);
        assert!(store.fetch_count() >= 2);
    }

    #[test]
    fn pushed_row_is_not_duplicated_by_poll() {
        let store = MemoryStore::with_rows(vec![row("a", 1)]);
        let writer = store.clone();
        let mut wall = Wall::new(Arc::new(store), fast_options());

        let mut inserted = false;
        let mut surface = |view: &WallView<'_>| -> Result<Flow> {
            if !inserted && view.tick.frame().is_some() {
                writer.insert(row("b", 2));
                inserted = true;
            }
            Ok(if view.stats.duplicates >= 1 {
                Flow::Stop
            } else {
                Flow::Continue
            })
        };
        let summary = wall.run(&mut surface).expect("run");

        assert_eq!(summary.log_len, 2);
        assert!(summary.stats.duplicates >= 1);
        assert!(summary.stats.pushes >= 1);
    }

    #[test]
    fn teardown_releases_subscription() {
        let store = MemoryStore::with_rows(vec![row("a", 1)]);
        let probe = store.clone();
        let mut wall = Wall::new(Arc::new(store), WallOptions {
            max_frames: Some(2),
            ..fast_options()
        });

        let mut seen_subscribers = 0;
        let mut surface = |view: &WallView<'_>| -> Result<Flow> {
            seen_subscribers = probe.subscriber_count();
            assert!(view.push_connected);
            Ok(Flow::Continue)
        };
        wall.run(&mut surface).expect("run");

        assert_eq!(seen_subscribers, 1);
        assert_eq!(probe.subscriber_count(), 0);
    }

    #[test]
    fn shutdown_handle_stops_the_loop() {
        let store = MemoryStore::new();
        let mut wall = Wall::new(Arc::new(store), WallOptions {
            max_frames: None,
            ..fast_options()
        });
        let handle = wall.handle();

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.shutdown();
        });
        let mut surface = |_: &WallView<'_>| -> Result<Flow> { Ok(Flow::Continue) };
        let summary = wall.run(&mut surface).expect("run");
        stopper.join().expect("join");

        assert_eq!(summary.frames, 0);
        assert!(summary.ticks >= 1);
    }

    #[test]
    fn surface_error_aborts_run() {
        let store = MemoryStore::with_rows(vec![row("a", 1)]);
        let mut wall = Wall::new(Arc::new(store), fast_options());
        let mut surface =
            |_: &WallView<'_>| -> Result<Flow> { Err(anyhow::anyhow!("terminal gone")) };
        let err = wall.run(&mut surface).expect_err("must fail");
        assert!(err.to_string().contains("terminal gone"));
    }
}
