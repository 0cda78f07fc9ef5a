// src/ui/mod.rs
// UI Module - the page state the controller drives

mod alerts;
mod button;

pub use alerts::{Alert, AlertArea, AlertKind};
pub use button::ButtonState;

use crate::api::JobStatus;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

/// How long a notification stays up on its own
pub const ALERT_TTL: Duration = Duration::from_secs(5);

/// Non-terminal job state, for the progress indicator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub progress_id: String,
    pub status: JobStatus,
    pub percent: Option<u32>,
    pub message: Option<String>,
}

/// Everything a renderer needs to draw the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum UiEvent {
    Button(ButtonState),
    AlertShown(Alert),
    AlertDismissed(Uuid),
    Progress(JobProgress),
    Reload,
    Navigate(String),
}

/// Shared handle on the page: submit button, alert area and navigation.
///
/// Clones share state. Locks are never held across an `.await`.
#[derive(Clone)]
pub struct UiHandle {
    events: mpsc::UnboundedSender<UiEvent>,
    button: Arc<Mutex<ButtonState>>,
    alerts: Arc<Mutex<AlertArea>>,
    alert_timers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    navigations: Arc<Mutex<Vec<JoinHandle<()>>>>,
    alert_ttl: Duration,
}

impl UiHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        Self::with_alert_ttl(ALERT_TTL)
    }

    pub fn with_alert_ttl(alert_ttl: Duration) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            events,
            button: Arc::new(Mutex::new(ButtonState::default())),
            alerts: Arc::new(Mutex::new(AlertArea::default())),
            alert_timers: Arc::new(Mutex::new(Vec::new())),
            navigations: Arc::new(Mutex::new(Vec::new())),
            alert_ttl,
        };
        (handle, receiver)
    }

    fn emit(&self, event: UiEvent) {
        // Nobody listening is fine; the page state is still tracked here.
        let _ = self.events.send(event);
    }

    pub fn button_state(&self) -> ButtonState {
        match self.button.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Disable the submit button for a new job. False if one is already running.
    pub fn claim_submit(&self) -> bool {
        let claimed = match self.button.lock() {
            Ok(mut guard) => guard.claim(),
            Err(_) => false,
        };
        if claimed {
            self.emit(UiEvent::Button(ButtonState::Processing));
        }
        claimed
    }

    /// Re-enable the submit button
    pub fn release_submit(&self) {
        let changed = match self.button.lock() {
            Ok(mut guard) => guard.release(),
            Err(_) => false,
        };
        if changed {
            self.emit(UiEvent::Button(ButtonState::Ready));
        }
    }

    /// Append a notification; it dismisses itself after the alert TTL
    pub fn show_alert(&self, kind: AlertKind, message: impl Into<String>) -> Uuid {
        let alert = Alert::new(kind, message);
        let id = alert.id;

        match kind {
            AlertKind::Danger => tracing::error!("{}", alert.message),
            AlertKind::Warning => tracing::warn!("{}", alert.message),
            AlertKind::Success => tracing::info!("{}", alert.message),
        }

        if let Ok(mut area) = self.alerts.lock() {
            area.push(alert.clone());
        }
        self.emit(UiEvent::AlertShown(alert));

        let handle = self.clone();
        let ttl = self.alert_ttl;
        let timer = tokio::spawn(async move {
            sleep(ttl).await;
            handle.dismiss(id);
        });

        if let Ok(mut timers) = self.alert_timers.lock() {
            timers.retain(|t| !t.is_finished());
            timers.push(timer);
        }

        id
    }

    /// Close one notification. No-op if it is already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = match self.alerts.lock() {
            Ok(mut area) => area.remove(id).is_some(),
            Err(_) => false,
        };
        if removed {
            self.emit(UiEvent::AlertDismissed(id));
        }
        removed
    }

    /// Close every visible notification at once (the Escape key)
    pub fn dismiss_all(&self) -> usize {
        let drained = match self.alerts.lock() {
            Ok(mut area) => area.drain(),
            Err(_) => Vec::new(),
        };
        for alert in &drained {
            self.emit(UiEvent::AlertDismissed(alert.id));
        }
        drained.len()
    }

    pub fn visible_alerts(&self) -> Vec<Alert> {
        match self.alerts.lock() {
            Ok(area) => area.visible().to_vec(),
            Err(_) => Vec::new(),
        }
    }

    pub fn progress(&self, progress: JobProgress) {
        self.emit(UiEvent::Progress(progress));
    }

    /// Reload the page once `delay` has passed
    pub fn schedule_reload(&self, delay: Duration) {
        self.schedule_navigation(UiEvent::Reload, delay);
    }

    /// Go to `path` once `delay` has passed
    pub fn schedule_navigate(&self, path: impl Into<String>, delay: Duration) {
        self.schedule_navigation(UiEvent::Navigate(path.into()), delay);
    }

    fn schedule_navigation(&self, event: UiEvent, delay: Duration) {
        tracing::debug!("Scheduling {:?} in {}ms", event, delay.as_millis());
        let handle = self.clone();
        let task = tokio::spawn(async move {
            sleep(delay).await;
            handle.emit(event);
        });

        if let Ok(mut navigations) = self.navigations.lock() {
            navigations.push(task);
        }
    }

    /// Wait for every scheduled reload or navigation to fire
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> = match self.navigations.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };

        for task in pending {
            let _ = task.await;
        }
    }

    /// Drop every pending timer, as leaving the page would
    pub fn unload(&self) {
        for timers in [&self.alert_timers, &self.navigations] {
            if let Ok(mut guard) = timers.lock() {
                for task in guard.drain(..) {
                    task.abort();
                }
            }
        }
    }
}
