use serde::Serialize;

/// The submit affordance. Held in `Processing` while a job is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    #[default]
    Ready,
    Processing,
}

impl ButtonState {
    pub fn label(&self) -> &'static str {
        match self {
            ButtonState::Ready => "Upload",
            ButtonState::Processing => "Processing...",
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, ButtonState::Ready)
    }

    /// Ready -> Processing. Returns false when a job already holds the button.
    pub fn claim(&mut self) -> bool {
        if *self == ButtonState::Processing {
            return false;
        }
        *self = ButtonState::Processing;
        true
    }

    /// Back to Ready. Returns true if the state changed.
    pub fn release(&mut self) -> bool {
        let changed = *self != ButtonState::Ready;
        *self = ButtonState::Ready;
        changed
    }
}
