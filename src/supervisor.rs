use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{
    config::Config,
    driver::PadDriver,
    error::Result,
    report::{SessionReporter, WebhookReporter},
    transport::{discover_candidates, Discoverer},
    types::{ConnectionState, Intent, ScanParams, SessionSnapshot},
};

/// Supervisor loop tick interval
pub const TICK: Duration = Duration::from_millis(500);

/// Wait between failed discovery attempts
pub const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// UI boundary: receives connection-state and session updates to render
pub trait StatusSink: Send + Sync {
    /// Render the current state and accumulated session stats
    fn render(&self, state: ConnectionState, snapshot: &SessionSnapshot);
}

/// Headless [`StatusSink`] that logs through `tracing`
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn render(&self, state: ConnectionState, snapshot: &SessionSnapshot) {
        if state == ConnectionState::Ready {
            let secs = snapshot.time_total.as_secs();
            info!(
                "WP: {}m{:02}s - {:.2} km (~{} steps) @ [{:.1} km/h]",
                secs / 60,
                secs % 60,
                snapshot.km_total,
                snapshot.steps_total,
                snapshot.speed,
            );
        } else {
            info!("WP: {state}");
        }
    }
}

/// Connection supervisor: discovery, connection, polling and reconnection
///
/// Owns at most one [`PadDriver`] at a time. Runs a cooperative loop on a
/// fixed tick: while disconnected it retries discovery with a backoff, once
/// connected it waits for the first reading, and while ready it advances the
/// session accounting and refreshes the UI. Link loss from any state
/// collapses back to [`ConnectionState::Disconnected`] and the cycle
/// restarts. Discovery strategies are passed in explicitly at construction.
pub struct Supervisor {
    discoverers: Vec<Box<dyn Discoverer>>,
    scan: ScanParams,
    target_speed: f64,
    reporter: Option<Arc<dyn SessionReporter>>,
    sink: Box<dyn StatusSink>,
    intents: mpsc::Receiver<Intent>,
    state: ConnectionState,
    driver: Option<PadDriver>,
}

impl Supervisor {
    /// Create a supervisor from explicit parts
    #[must_use]
    pub fn new(
        discoverers: Vec<Box<dyn Discoverer>>,
        scan: ScanParams,
        target_speed: f64,
        reporter: Option<Arc<dyn SessionReporter>>,
        sink: Box<dyn StatusSink>,
        intents: mpsc::Receiver<Intent>,
    ) -> Self {
        Self {
            discoverers,
            scan,
            target_speed,
            reporter,
            sink,
            intents,
            state: ConnectionState::Disconnected,
            driver: None,
        }
    }

    /// Create a supervisor wired up from a loaded [`Config`]
    #[must_use]
    pub fn from_config(
        discoverers: Vec<Box<dyn Discoverer>>,
        config: &Config,
        sink: Box<dyn StatusSink>,
        intents: mpsc::Receiver<Intent>,
    ) -> Self {
        let scan = ScanParams {
            preferred_device: config.preferred_device(),
            ..ScanParams::default()
        };
        let reporter: Arc<dyn SessionReporter> = Arc::new(WebhookReporter::new(
            config.webhook_url.clone(),
            config.webhook_threshold(),
        ));
        Self::new(
            discoverers,
            scan,
            config.target_speed,
            Some(reporter),
            sink,
            intents,
        )
    }

    /// Run the supervisor until a quit intent arrives
    ///
    /// Terminates only on [`Intent::Quit`], which disconnects any active
    /// session first.
    pub async fn run(mut self) {
        info!("supervisor started");
        while self.tick().await {}
        info!("supervisor stopped");
    }

    async fn tick(&mut self) -> bool {
        while let Ok(intent) = self.intents.try_recv() {
            if self.handle_intent(intent).await {
                self.teardown().await;
                return false;
            }
        }

        let link_lost = match &self.driver {
            Some(driver) => !driver.is_connected().await,
            None => false,
        };
        if link_lost {
            info!("link lost, tearing session down");
            self.teardown().await;
        }

        match self.state {
            ConnectionState::Disconnected => {
                if let Err(err) = self.attempt_connect().await {
                    error!(error = %err, "connection attempt failed");
                    self.state = ConnectionState::Disconnected;
                }
                if self.state == ConnectionState::Disconnected {
                    // still not connected, wait a bit before trying again
                    self.render_idle();
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    return true;
                }
            }
            ConnectionState::Connected => {
                if let Some(driver) = &self.driver {
                    if driver.latest_status().await.is_some() {
                        self.state = ConnectionState::Ready;
                    }
                }
            }
            _ => {}
        }

        if self.state == ConnectionState::Ready {
            if let Some(driver) = &self.driver {
                let snapshot = driver.sync_session().await;
                self.sink.render(self.state, &snapshot);
            }
        } else {
            self.render_idle();
        }

        tokio::time::sleep(TICK).await;
        true
    }

    /// Returns `true` when the supervisor should shut down
    async fn handle_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::Start => {
                if let Some(driver) = self.ready_driver() {
                    driver.start(self.target_speed).await;
                }
            }
            Intent::Stop => {
                if let Some(driver) = self.ready_driver() {
                    driver.stop().await;
                }
            }
            Intent::ChangeSpeed(speed) => {
                self.target_speed = speed;
                if let Some(driver) = self.ready_driver() {
                    if driver.started().await {
                        driver.change_speed(speed).await;
                    }
                }
            }
            Intent::Quit => return true,
        }
        false
    }

    fn ready_driver(&self) -> Option<&PadDriver> {
        if self.state == ConnectionState::Ready {
            self.driver.as_ref()
        } else {
            None
        }
    }

    async fn attempt_connect(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Scanning);

        let candidates = discover_candidates(&self.discoverers, &self.scan).await?;
        let Some(candidate) = candidates.into_iter().next() else {
            info!("no walkingpad found");
            self.state = ConnectionState::Disconnected;
            return Ok(());
        };

        info!(device = %candidate.address, "connecting walkingpad");
        self.set_state(ConnectionState::Connecting);

        let (transport, notifications) = candidate.connect().await?;
        self.driver = Some(PadDriver::new(
            transport,
            notifications,
            self.reporter.clone(),
        ));
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.render_idle();
    }

    fn render_idle(&self) {
        self.sink.render(self.state, &SessionSnapshot::default());
    }
}
