// src/render.rs
// Terminal renderer for page events

use crate::ui::{AlertKind, UiEvent};
use tokio::sync::mpsc;

/// Human-readable line for one event. `None` for events with nothing to show.
pub fn format_event(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Button(state) => Some(format!("[{}]", state.label())),
        UiEvent::AlertShown(alert) => {
            let tag = match alert.kind {
                AlertKind::Success => "ok",
                AlertKind::Warning => "warning",
                AlertKind::Danger => "error",
            };
            Some(format!("{}: {}", tag, alert.message))
        }
        UiEvent::AlertDismissed(_) => None,
        UiEvent::Progress(progress) => {
            let mut line = format!("job {}: {}", progress.progress_id, progress.status);
            if let Some(percent) = progress.percent {
                line.push_str(&format!(" ({}%)", percent));
            }
            if let Some(message) = progress.message.as_deref() {
                line.push_str(&format!(" - {}", message));
            }
            Some(line)
        }
        UiEvent::Reload => Some("(page reloaded)".to_string()),
        UiEvent::Navigate(path) => Some(format!("(navigated to {})", path)),
    }
}

/// Print events until every sender is gone
pub async fn render(mut events: mpsc::UnboundedReceiver<UiEvent>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
        } else if let Some(line) = format_event(&event) {
            println!("{}", line);
        }
    }
}
