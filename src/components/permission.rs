// Permission gate: user-consent policy over the raw platform accessor

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backends::NotificationSurface;

/// Host platform notification permission, mirroring the platform's own
/// permission store.
///
/// `Unset` means the user has never answered a prompt. The state never
/// silently becomes `Granted`; only an explicit user-initiated request (and
/// the user consenting in the host UI) moves it there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Unset,
    Granted,
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionState::Unset => "unset",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// Mediates user consent for native notifications.
///
/// All reads and requests go through the injected surface; the gate never
/// consults ambient process state, so tests substitute a fake surface.
#[derive(Clone)]
pub struct PermissionGate {
    surface: Arc<dyn NotificationSurface>,
}

impl PermissionGate {
    pub fn new(surface: Arc<dyn NotificationSurface>) -> Self {
        Self { surface }
    }

    /// Current permission state. Side-effect free.
    ///
    /// A host without a notification surface reports `Denied`: nothing will
    /// ever prompt and nothing will ever be presented, which is exactly the
    /// denied contract.
    pub fn state(&self) -> PermissionState {
        if !self.surface.supported() {
            return PermissionState::Denied;
        }
        self.surface.permission()
    }

    /// Request permission, prompting the user in the host UI at most once.
    ///
    /// Returns `true` only if the state is `Granted` afterwards. Already
    /// granted returns `true` and already denied returns `false`, in both
    /// cases without prompting; a denial is only recoverable by the user
    /// changing host settings outside this gate's control.
    pub async fn request(&self) -> bool {
        if !self.surface.supported() {
            warn!("this host does not support notifications");
            return false;
        }

        match self.surface.permission() {
            PermissionState::Granted => true,
            PermissionState::Denied => {
                warn!("notification permission was denied");
                false
            }
            PermissionState::Unset => match self.surface.request_permission().await {
                Ok(PermissionState::Granted) => true,
                Ok(state) => {
                    debug!(%state, "notification permission not granted");
                    false
                }
                Err(error) => {
                    warn!(%error, "permission request failed");
                    false
                }
            },
        }
    }
}

impl fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionGate")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemorySurface;

    #[test]
    fn granted_short_circuits_without_prompting() {
        let surface = Arc::new(MemorySurface::new());
        surface.set_permission(PermissionState::Granted);
        let gate = PermissionGate::new(surface.clone());

        assert!(tokio_test::block_on(gate.request()));
        assert_eq!(surface.prompt_count(), 0);
    }

    #[test]
    fn denied_never_reprompts() {
        let surface = Arc::new(MemorySurface::new());
        surface.set_permission(PermissionState::Denied);
        let gate = PermissionGate::new(surface.clone());

        assert!(!tokio_test::block_on(gate.request()));
        assert_eq!(surface.prompt_count(), 0);
    }

    #[test]
    fn unset_prompts_and_returns_grant_result() {
        let surface = Arc::new(MemorySurface::new());
        surface.set_prompt_response(PermissionState::Granted);
        let gate = PermissionGate::new(surface.clone());

        assert!(tokio_test::block_on(gate.request()));
        assert_eq!(surface.prompt_count(), 1);
        assert_eq!(gate.state(), PermissionState::Granted);
    }

    #[test]
    fn unset_prompt_dismissed_stays_unset() {
        let surface = Arc::new(MemorySurface::new());
        surface.set_prompt_response(PermissionState::Unset);
        let gate = PermissionGate::new(surface.clone());

        assert!(!tokio_test::block_on(gate.request()));
        assert_eq!(gate.state(), PermissionState::Unset);
    }

    #[test]
    fn unsupported_host_reads_denied_and_never_prompts() {
        let surface = Arc::new(MemorySurface::unsupported());
        let gate = PermissionGate::new(surface.clone());

        assert_eq!(gate.state(), PermissionState::Denied);
        assert!(!tokio_test::block_on(gate.request()));
        assert_eq!(surface.prompt_count(), 0);
    }
}
