//! Agent shell: periodic data collection around an AgentX [`Session`].
//!
//! The shell owns the reconnect policy. Each iteration of [`Agent::run`]
//! reconnects when needed, refreshes the dataset once the period has elapsed
//! and serves at most one request. Failures never end the loop; only the
//! cancel flag does.

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};

use crate::agentx::{Dataset, Oid, Session};

/// Pause after a failed connect, collection or serve before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Data source plugged into the agent shell.
pub trait Application {
    type Error: fmt::Display;

    /// Declares the OID subtrees to register. Returning `false` aborts the agent.
    fn setup(&mut self, registrations: &mut Registrations) -> bool;

    /// Builds a fresh dataset.
    fn collect(&mut self) -> Result<Dataset, Self::Error>;
}

/// Ordered, duplicate-free set of OID subtrees to register with the master.
#[derive(Clone, Debug, Default)]
pub struct Registrations {
    subtrees: Vec<Oid>,
}

impl Registrations {
    pub fn new() -> Self {
        Registrations::default()
    }

    /// Adds `subtree` unless it is already present.
    pub fn register(&mut self, subtree: Oid) {
        if self.subtrees.contains(&subtree) {
            log::debug!("Subtree {} already queued for registration", subtree);
            return;
        }
        self.subtrees.push(subtree);
    }

    pub fn register_all(&mut self, subtrees: impl IntoIterator<Item = Oid>) {
        for subtree in subtrees {
            self.register(subtree);
        }
    }

    pub fn subtrees(&self) -> &[Oid] {
        &self.subtrees
    }

    pub fn is_empty(&self) -> bool {
        self.subtrees.is_empty()
    }
}

/// Error returned when the agent cannot start at all.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Application setup failed")]
    SetupFailed,
}

/// Polling loop around a [`Session`] and an [`Application`].
pub struct Agent<A: Application> {
    session: Session,
    application: A,
    period: Duration,
    registrations: Registrations,
    next_update: Option<Instant>,
    last_update: Option<DateTime<Utc>>,
}

impl<A: Application> Agent<A> {
    pub fn new(session: Session, application: A, period: Duration) -> Self {
        Agent {
            session,
            application,
            period,
            registrations: Registrations::new(),
            next_update: None,
            last_update: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn registrations(&self) -> &Registrations {
        &self.registrations
    }

    /// Time of the last successful collection.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Runs until `cancel` is set, then closes the session.
    pub fn run(&mut self, cancel: &AtomicBool) -> Result<(), AgentError> {
        if !self.application.setup(&mut self.registrations) {
            log::error!("Application setup failed, not starting the agent");
            return Err(AgentError::SetupFailed);
        }
        log::info!(
            "Agent set up with {} subtrees, update period {:?}",
            self.registrations.subtrees().len(),
            self.period
        );

        self.update();

        while !cancel.load(Ordering::Relaxed) {
            self.step();
        }

        log::info!("Agent shutting down");
        self.session.close();
        Ok(())
    }

    /// One iteration of the main loop.
    pub fn step(&mut self) {
        if !self.session.is_connected() {
            if let Err(e) = self.session.start(self.registrations.subtrees()) {
                log::warn!("AgentX session setup failed: {}", e);
                thread::sleep(RETRY_DELAY);
                return;
            }
        }

        if self.update_due() && !self.update() {
            thread::sleep(RETRY_DELAY);
            return;
        }

        if let Err(e) = self.session.serve_once() {
            log::error!("AgentX serving failed: {}", e);
            self.session.disconnect();
            thread::sleep(RETRY_DELAY);
        }
    }

    fn update_due(&self) -> bool {
        self.next_update
            .map_or(true, |deadline| Instant::now() >= deadline)
    }

    /// Collects a new dataset and installs it. Returns `false` on failure.
    ///
    /// The deadline for the next collection is pushed out either way, so a
    /// failing backend is retried once per period while stale data keeps
    /// being served.
    fn update(&mut self) -> bool {
        self.next_update = Some(Instant::now() + self.period);
        match self.application.collect() {
            Ok(dataset) => {
                self.session.update(dataset);
                self.last_update = Some(Utc::now());
                true
            }
            Err(e) => {
                match self.last_update {
                    Some(at) => log::warn!(
                        "Data collection failed: {}; serving data from {}",
                        e,
                        at.to_rfc3339()
                    ),
                    None => log::warn!("Data collection failed: {}; no data to serve yet", e),
                }
                false
            }
        }
    }
}
