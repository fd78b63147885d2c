//! Periodic live comparison against the current enrollment.
//!
//! One task owns all session state. Ticks fire at a fixed cadence; a tick that
//! finds the previous detection cycle still running is skipped, so at most one
//! cycle is ever in flight.

use crate::engine::{EngineHandle, LiveDetection};
use crate::enrollment::EnrollmentStore;
use crate::gate::{TokenSigner, PROTECTED_ROUTE};
use chrono::{DateTime, Utc};
use facegate_core::{EnrollmentRecord, EuclideanMatcher, MatchResult, Matcher, TriggerPolicy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub interval: Duration,
    pub detect_timeout: Duration,
    pub redirect_delay: Duration,
    pub threshold: f32,
    pub policy: TriggerPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No enrollment, or camera/provider not ready.
    Idle,
    Polling,
    /// Terminal for the session.
    Verified,
}

/// Everything the loop publishes about the current session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub state: LoopState,
    pub last_result: Option<MatchResult>,
    pub verified_at: Option<DateTime<Utc>>,
    /// Signed verification token, minted once per session.
    #[serde(skip)]
    pub token: Option<String>,
    pub navigate_to: Option<&'static str>,
    pub navigations: u32,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub failed_ticks: u64,
}

impl SessionSnapshot {
    fn fresh() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            state: LoopState::Idle,
            last_result: None,
            verified_at: None,
            token: None,
            navigate_to: None,
            navigations: 0,
            ticks: 0,
            skipped_ticks: 0,
            failed_ticks: 0,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}

enum LoopCommand {
    Reset { reply: oneshot::Sender<()> },
    Shutdown,
}

/// Cheap, cloneable access to a running loop.
#[derive(Clone)]
pub struct LoopClient {
    commands: mpsc::Sender<LoopCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl LoopClient {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn session_id(&self) -> Uuid {
        self.snapshot.borrow().session_id
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Start a new session: drop the in-flight cycle, the pending navigation,
    /// the last result and the verification.
    pub async fn reset(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(LoopCommand::Reset { reply }).await.is_ok() {
            let _ = done.await;
        }
    }
}

pub struct MatchLoop {
    client: LoopClient,
    task: JoinHandle<()>,
}

impl MatchLoop {
    pub fn client(&self) -> LoopClient {
        self.client.clone()
    }

    /// Stop ticking, cancel outstanding work, and release the camera.
    pub async fn shutdown(self) {
        let _ = self.client.commands.send(LoopCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "match loop task failed");
        }
    }
}

pub fn spawn_match_loop(
    engine: EngineHandle,
    store: Arc<EnrollmentStore>,
    signer: Arc<TokenSigner>,
    settings: LoopSettings,
) -> MatchLoop {
    let (task, client) = LoopTask::new(engine, store, signer, settings);
    MatchLoop {
        client,
        task: tokio::spawn(task.run()),
    }
}

enum CycleOutcome {
    NotReady,
    NoFace,
    Compared(MatchResult),
    Failed(String),
}

struct LoopTask {
    engine: EngineHandle,
    store: Arc<EnrollmentStore>,
    signer: Arc<TokenSigner>,
    settings: LoopSettings,
    snapshot: watch::Sender<SessionSnapshot>,
    ticker: Interval,
    commands: mpsc::Receiver<LoopCommand>,
    /// Holds at most one detection cycle, tagged with the session it ran for.
    cycles: JoinSet<(Uuid, CycleOutcome)>,
    navigate_at: Option<Instant>,
}

impl LoopTask {
    fn new(
        engine: EngineHandle,
        store: Arc<EnrollmentStore>,
        signer: Arc<TokenSigner>,
        settings: LoopSettings,
    ) -> (Self, LoopClient) {
        let (commands_tx, commands) = mpsc::channel(8);
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::fresh());

        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let task = Self {
            engine,
            store,
            signer,
            settings,
            snapshot,
            ticker,
            commands,
            cycles: JoinSet::new(),
            navigate_at: None,
        };
        let client = LoopClient {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (task, client)
    }

    async fn run(mut self) {
        tracing::info!(
            interval_ms = self.settings.interval.as_millis() as u64,
            threshold = self.settings.threshold,
            min_percentage = self.settings.policy.min_percentage,
            "match loop started"
        );

        loop {
            let navigation_deadline = self.navigate_at.unwrap_or_else(Instant::now);
            tokio::select! {
                _ = self.ticker.tick() => self.on_tick(),
                Some(joined) = self.cycles.join_next() => match joined {
                    Ok((session, outcome)) => self.on_outcome(session, outcome),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "match cycle panicked");
                        self.snapshot.send_modify(|s| s.failed_ticks += 1);
                    }
                },
                _ = tokio::time::sleep_until(navigation_deadline), if self.navigate_at.is_some() => {
                    self.navigate_at = None;
                    self.snapshot.send_modify(|s| {
                        s.navigate_to = Some(PROTECTED_ROUTE);
                        s.navigations += 1;
                    });
                    tracing::info!(route = PROTECTED_ROUTE, "navigation issued");
                }
                cmd = self.commands.recv() => match cmd {
                    Some(LoopCommand::Reset { reply }) => {
                        self.reset();
                        let _ = reply.send(());
                    }
                    Some(LoopCommand::Shutdown) | None => break,
                },
            }
        }

        self.cycles.abort_all();
        self.navigate_at = None;
        match tokio::time::timeout(self.settings.detect_timeout, self.engine.release_camera()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "camera release failed"),
            Err(_) => tracing::warn!("camera release timed out"),
        }
        tracing::info!("match loop stopped");
    }

    fn on_tick(&mut self) {
        if !self.cycles.is_empty() {
            tracing::debug!("previous match cycle still running; tick skipped");
            self.snapshot.send_modify(|s| s.skipped_ticks += 1);
            return;
        }

        let record = match self.store.current() {
            Some(record) if self.engine.live_ready() => record,
            _ => {
                self.set_state(LoopState::Idle);
                return;
            }
        };

        self.set_state(LoopState::Polling);
        self.snapshot.send_modify(|s| s.ticks += 1);
        let session = self.snapshot.borrow().session_id;
        let cycle = run_cycle(
            self.engine.clone(),
            record,
            self.settings.threshold,
            self.settings.detect_timeout,
        );
        self.cycles.spawn(async move { (session, cycle.await) });
    }

    fn on_outcome(&mut self, session: Uuid, outcome: CycleOutcome) {
        // A cycle can finish after a reset; its result belongs to the old session.
        let current = self.snapshot.borrow().session_id;
        if session != current {
            tracing::debug!(%session, %current, "discarding outcome from a previous session");
            return;
        }

        let result = match outcome {
            CycleOutcome::NotReady => {
                tracing::debug!("camera frame not ready");
                return;
            }
            CycleOutcome::NoFace => {
                tracing::debug!("no face in frame");
                return;
            }
            CycleOutcome::Failed(reason) => {
                tracing::warn!(%reason, "match cycle failed");
                self.snapshot.send_modify(|s| s.failed_ticks += 1);
                return;
            }
            CycleOutcome::Compared(result) => result,
        };

        tracing::debug!(
            label = %result.label,
            distance = result.distance,
            percentage = result.percentage,
            is_match = result.is_match,
            "match cycle complete"
        );

        let trigger =
            !self.snapshot.borrow().is_verified() && self.settings.policy.should_trigger(&result);
        if !trigger {
            self.snapshot.send_modify(|s| s.last_result = Some(result));
            return;
        }

        tracing::info!(
            distance = result.distance,
            percentage = result.percentage,
            delay_ms = self.settings.redirect_delay.as_millis() as u64,
            "face verified"
        );
        let token = self.signer.mint(session);
        self.navigate_at = Some(Instant::now() + self.settings.redirect_delay);
        self.snapshot.send_modify(|s| {
            s.last_result = Some(result);
            s.state = LoopState::Verified;
            s.verified_at = Some(Utc::now());
            s.token = Some(token);
        });
    }

    fn set_state(&self, state: LoopState) {
        self.snapshot.send_if_modified(|s| {
            if s.state == LoopState::Verified || s.state == state {
                return false;
            }
            s.state = state;
            true
        });
    }

    fn reset(&mut self) {
        self.cycles.abort_all();
        self.navigate_at = None;
        let fresh = SessionSnapshot::fresh();
        tracing::info!(session = %fresh.session_id, "session reset");
        self.snapshot.send_replace(fresh);
    }
}

async fn run_cycle(
    engine: EngineHandle,
    record: Arc<EnrollmentRecord>,
    threshold: f32,
    timeout: Duration,
) -> CycleOutcome {
    let detection = match tokio::time::timeout(timeout, engine.detect_live()).await {
        Err(_) => return CycleOutcome::Failed(format!("detection timed out after {timeout:?}")),
        Ok(Err(e)) => return CycleOutcome::Failed(e.to_string()),
        Ok(Ok(LiveDetection::NotReady)) => return CycleOutcome::NotReady,
        Ok(Ok(LiveDetection::NoFace)) => return CycleOutcome::NoFace,
        Ok(Ok(LiveDetection::Face(detection))) => detection,
    };

    match EuclideanMatcher.compare(&detection.descriptor, &record, threshold) {
        Ok(result) => CycleOutcome::Compared(result),
        Err(e) => CycleOutcome::Failed(e.to_string()),
    }
}
