// Deferred in-app permission prompt state machine

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::permission::{PermissionGate, PermissionState};

/// Delay between mount and the prompt becoming visible.
pub const PROMPT_SHOW_DELAY: Duration = Duration::from_secs(2);

/// Prompt visibility states.
///
/// `Accepted` and `Dismissed` are terminal: the prompt is no longer visible
/// and will not be shown again within the same mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptState {
    #[default]
    Hidden,
    Shown,
    Accepted,
    Dismissed,
}

impl PromptState {
    pub fn is_visible(&self) -> bool {
        matches!(self, PromptState::Shown)
    }
}

/// The deferred, dismissible prompt asking the user to enable notifications.
///
/// The prompt schedules itself `PROMPT_SHOW_DELAY` after mount and only when
/// the platform permission is exactly `Unset` at mount time. Once it leaves
/// `Hidden` through either edge it never re-shows for this mount.
pub struct PermissionPrompt {
    gate: PermissionGate,
    delay: Duration,
    state: Mutex<PromptState>,
}

impl PermissionPrompt {
    pub fn new(gate: PermissionGate) -> Self {
        Self {
            gate,
            delay: PROMPT_SHOW_DELAY,
            state: Mutex::new(PromptState::Hidden),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn state(&self) -> PromptState {
        *self.state.lock()
    }

    pub fn is_visible(&self) -> bool {
        self.state().is_visible()
    }

    /// Run the deferred show for this mount.
    ///
    /// Resolves `true` if the prompt became visible. Any permission state
    /// other than `Unset` at mount time means the prompt never shows.
    pub async fn deferred_show(&self) -> bool {
        if self.gate.state() != PermissionState::Unset {
            debug!(state = %self.gate.state(), "permission already settled, prompt stays hidden");
            return false;
        }

        tokio::time::sleep(self.delay).await;

        let mut state = self.state.lock();
        if *state != PromptState::Hidden {
            return false;
        }
        *state = PromptState::Shown;
        true
    }

    /// User accepted the prompt: hide it and run the permission request.
    ///
    /// Returns the grant result; `false` when the prompt was not visible.
    pub async fn accept(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != PromptState::Shown {
                return false;
            }
            *state = PromptState::Accepted;
        }
        self.gate.request().await
    }

    /// User dismissed the prompt without requesting permission.
    ///
    /// Returns `false` when the prompt was not visible.
    pub fn dismiss(&self) -> bool {
        let mut state = self.state.lock();
        if *state != PromptState::Shown {
            return false;
        }
        *state = PromptState::Dismissed;
        true
    }
}
