// Platform notification surfaces
// The capability seam between the presenter and the host notification system

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::components::{BoxFuture, NotifyResult, PermissionState};

#[cfg(target_os = "linux")]
pub mod dbus;
pub mod memory;

#[cfg(target_os = "linux")]
pub use dbus::DbusSurface;
pub use memory::MemorySurface;

pub(crate) const CLICK_CHANNEL_CAPACITY: usize = 64;

/// Everything the presenter asks the platform to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationSpec {
    pub title: String,
    pub body: String,
    /// Stable identity used by the host for de-duplication and replacement.
    pub tag: String,
    pub icon: String,
    pub badge: String,
    /// Keep the notification up until the user acts on it.
    pub require_interaction: bool,
    pub silent: bool,
}

/// Opaque handle to one displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Default-action click on a displayed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub handle: SurfaceHandle,
}

/// Capability interface to the host notification system.
///
/// The pipeline never touches platform globals directly; permission reads,
/// prompts, and notification display all pass through this trait, so tests
/// substitute [`MemorySurface`].
pub trait NotificationSurface: Send + Sync {
    /// Whether this host has a working notification surface at all.
    fn supported(&self) -> bool {
        true
    }

    /// Raw tri-state permission read. Policy (no re-prompt after denial,
    /// short-circuit on grant) lives in `PermissionGate`.
    fn permission(&self) -> PermissionState;

    /// Raw permission prompt. May show host UI once; resolves to the state
    /// the user left behind.
    fn request_permission(&self) -> BoxFuture<'_, NotifyResult<PermissionState>>;

    fn present(&self, spec: PresentationSpec) -> BoxFuture<'_, NotifyResult<SurfaceHandle>>;

    fn dismiss(&self, handle: SurfaceHandle) -> BoxFuture<'_, NotifyResult<()>>;

    /// Subscribe to default-action clicks, in platform delivery order.
    fn subscribe_clicks(&self) -> broadcast::Receiver<ClickEvent>;
}

/// Pick the native surface for this host.
///
/// `None` means notifications are a disabled feature here, not an error:
/// callers fall back to an unsupported [`MemorySurface`] and every permission
/// request resolves negatively without prompting.
pub async fn platform_surface() -> Option<Arc<dyn NotificationSurface>> {
    #[cfg(target_os = "linux")]
    {
        match dbus::DbusSurface::connect().await {
            Ok(surface) => Some(Arc::new(surface) as Arc<dyn NotificationSurface>),
            Err(error) => {
                tracing::debug!(%error, "no session notification service");
                None
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
