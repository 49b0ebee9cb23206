use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    protocol::{self, Command},
    queue::{self, CommandQueue, WriteOp, QUEUE_CAPACITY},
    report::{SessionReport, SessionReporter},
    session::{BeltEvent, SessionState},
    transport::{NotificationStream, PadTransport},
    types::{SessionSnapshot, StatusReading},
};

/// Interval between automatic status requests
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Per-connection session driver
///
/// One `PadDriver` exists per physical connection. It owns the bounded
/// command queue, the single paced writer, the status poller and the
/// notification decoder, and tracks the latest reading plus the session
/// accumulators. Nothing is shared across reconnects, so a stale writer can
/// never outlive its link.
///
/// [`close`](Self::close) is idempotent and joins all owned tasks before
/// releasing the transport, so no write can race a closed link.
pub struct PadDriver {
    transport: Arc<dyn PadTransport>,
    queue: CommandQueue,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    latest: Arc<RwLock<Option<StatusReading>>>,
    session: Mutex<SessionState>,
    reporter: Option<Arc<dyn SessionReporter>>,
    closed: AtomicBool,
}

impl PadDriver {
    /// Build a driver on top of a connected transport and its notification
    /// stream
    ///
    /// Spawns the writer, the poller (which immediately requests a first
    /// status) and the notification decoder. The optional reporter is
    /// consulted whenever the belt stops.
    #[must_use]
    pub fn new(
        transport: Arc<dyn PadTransport>,
        notifications: NotificationStream,
        reporter: Option<Arc<dyn SessionReporter>>,
    ) -> Self {
        let (queue, ops) = CommandQueue::bounded(QUEUE_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let latest = Arc::new(RwLock::new(None));

        let writer = tokio::spawn(queue::run_writer(
            ops,
            Arc::clone(&transport),
            shutdown.subscribe(),
        ));
        let poller = tokio::spawn(run_poller(queue.clone(), shutdown.subscribe()));
        let decoder = tokio::spawn(run_notifications(
            notifications,
            Arc::clone(&latest),
            shutdown.subscribe(),
        ));

        Self {
            transport,
            queue,
            shutdown,
            tasks: Mutex::new(vec![writer, poller, decoder]),
            latest,
            session: Mutex::new(SessionState::new()),
            reporter,
            closed: AtomicBool::new(false),
        }
    }

    /// Start the belt and bring it to `target_speed` km/h
    ///
    /// If the pad was last seen in standby, a mode change is enqueued first
    /// since standby ignores belt commands. Marks the session started.
    ///
    /// # Panics
    ///
    /// Panics if `target_speed` is outside `[0, 6]` km/h.
    pub async fn start(&self, target_speed: f64) {
        self.session.lock().await.begin();

        let last_mode = self.latest.read().await.map(|r| r.mode);
        self.enqueue(queue::expand_command(
            Command::Start { target_speed },
            last_mode,
        ))
        .await;
    }

    /// Stop the belt and run session-close accounting
    pub async fn stop(&self) {
        self.session.lock().await.end();
        self.enqueue(queue::expand_command(Command::Stop, None)).await;
        self.report_session().await;
    }

    /// Change the belt speed without touching the started flag
    ///
    /// # Panics
    ///
    /// Panics if `speed` is outside `[0, 6]` km/h.
    pub async fn change_speed(&self, speed: f64) {
        self.enqueue(queue::expand_command(Command::ChangeSpeed(speed), None))
            .await;
    }

    /// Enqueue an immediate status request, ahead of the poller's schedule
    pub async fn request_stats(&self) {
        self.enqueue(vec![WriteOp::frame(protocol::request_stats())])
            .await;
    }

    /// Latest decoded status reading, if any has arrived
    pub async fn latest_status(&self) -> Option<StatusReading> {
        *self.latest.read().await
    }

    /// Fold the latest reading into the session and return a UI snapshot
    ///
    /// Detects starts/stops made on the device's own controls; an external
    /// stop runs the same session-close accounting as [`stop`](Self::stop).
    pub async fn sync_session(&self) -> SessionSnapshot {
        let reading = self.latest_status().await;
        let event = self.session.lock().await.observe(reading);
        match event {
            BeltEvent::ExternallyStarted => info!("belt started on the device"),
            BeltEvent::ExternallyStopped => {
                info!("belt stopped on the device");
                self.report_session().await;
            }
            BeltEvent::None => {}
        }
        self.session.lock().await.snapshot()
    }

    /// Whether the session accounting currently considers the belt started
    pub async fn started(&self) -> bool {
        self.session.lock().await.started()
    }

    /// Whether the underlying link is still up
    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    /// Tear the session down: stop all tasks, join them, release the link
    ///
    /// Idempotent; a second call is a no-op. Waits for the writer, poller
    /// and decoder to fully exit before disconnecting, so nothing writes to
    /// a closed transport.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                debug!(error = %err, "driver task ended abnormally");
            }
        }

        self.session.lock().await.void();

        if let Err(err) = self.transport.disconnect().await {
            warn!(error = %err, "error releasing transport");
        }
    }

    async fn enqueue(&self, ops: Vec<WriteOp>) {
        for op in ops {
            if self.queue.push(op).await.is_err() {
                warn!("command dropped: queue closed");
                return;
            }
        }
    }

    async fn report_session(&self) {
        let Some(reporter) = &self.reporter else {
            return;
        };

        let report = {
            let session = self.session.lock().await;
            let (duration, steps, distance_km) = session.current();
            SessionReport {
                start_ts: session.started_at(),
                duration,
                steps,
                distance_km,
            }
        };

        match reporter.report(&report).await {
            // only reset on a confirmed delivery - otherwise the totals
            // carry forward into the next stop event
            Ok(true) => self.session.lock().await.reset_current(),
            Ok(false) => {}
            Err(err) => error!(error = %err, "session report failed"),
        }
    }
}

async fn run_poller(queue: CommandQueue, mut shutdown: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if queue.push(WriteOp::frame(protocol::request_stats())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run_notifications(
    mut notifications: NotificationStream,
    latest: Arc<RwLock<Option<StatusReading>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = notifications.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        match protocol::decode_status(&frame) {
            Ok(Some(reading)) => *latest.write().await = Some(reading),
            Ok(None) => {}
            Err(err) => debug!(error = %err, "dropping malformed status frame"),
        }
    }
}
