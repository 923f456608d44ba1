// In-memory notification surface for tests and hosts without a native one

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use super::{
    CLICK_CHANNEL_CAPACITY, ClickEvent, NotificationSurface, PresentationSpec, SurfaceHandle,
};
use crate::components::{BoxFuture, NotifyError, NotifyResult, PermissionState};

/// Scriptable surface: a settable permission store, a log of presented and
/// dismissed notifications, and click injection.
///
/// Also serves as the fallback surface on hosts with no native one, in its
/// [`MemorySurface::unsupported`] form.
pub struct MemorySurface {
    supported: bool,
    permission: RwLock<PermissionState>,
    prompt_response: RwLock<PermissionState>,
    prompt_count: AtomicUsize,
    fail_presents: AtomicBool,
    next_handle: AtomicU64,
    presented: Mutex<Vec<(SurfaceHandle, PresentationSpec)>>,
    dismissed: Mutex<Vec<SurfaceHandle>>,
    clicks: broadcast::Sender<ClickEvent>,
}

impl MemorySurface {
    pub fn new() -> Self {
        let (clicks, _) = broadcast::channel(CLICK_CHANNEL_CAPACITY);
        Self {
            supported: true,
            permission: RwLock::new(PermissionState::Unset),
            prompt_response: RwLock::new(PermissionState::Granted),
            prompt_count: AtomicUsize::new(0),
            fail_presents: AtomicBool::new(false),
            next_handle: AtomicU64::new(0),
            presented: Mutex::new(Vec::new()),
            dismissed: Mutex::new(Vec::new()),
            clicks,
        }
    }

    /// A surface for hosts without notification support: presents fail and
    /// permission requests resolve negatively.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    /// Seed the permission store, as if the user had answered before.
    pub fn set_permission(&self, state: PermissionState) {
        *self.permission.write() = state;
    }

    /// What the next prompt resolves to. `Unset` models the user closing the
    /// host dialog without answering.
    pub fn set_prompt_response(&self, state: PermissionState) {
        *self.prompt_response.write() = state;
    }

    /// Make subsequent `present` calls fail.
    pub fn set_fail_presents(&self, fail: bool) {
        self.fail_presents.store(fail, Ordering::SeqCst);
    }

    /// How many times the host prompt was invoked.
    pub fn prompt_count(&self) -> usize {
        self.prompt_count.load(Ordering::SeqCst)
    }

    pub fn presented(&self) -> Vec<(SurfaceHandle, PresentationSpec)> {
        self.presented.lock().clone()
    }

    pub fn presented_count(&self) -> usize {
        self.presented.lock().len()
    }

    pub fn dismissed(&self) -> Vec<SurfaceHandle> {
        self.dismissed.lock().clone()
    }

    /// Inject a user click on a displayed notification.
    pub fn click(&self, handle: SurfaceHandle) {
        let _ = self.clicks.send(ClickEvent { handle });
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSurface for MemorySurface {
    fn supported(&self) -> bool {
        self.supported
    }

    fn permission(&self) -> PermissionState {
        *self.permission.read()
    }

    fn request_permission(&self) -> BoxFuture<'_, NotifyResult<PermissionState>> {
        Box::pin(async move {
            if !self.supported {
                return Err(NotifyError::Unsupported);
            }
            self.prompt_count.fetch_add(1, Ordering::SeqCst);
            let response = *self.prompt_response.read();
            // The store only moves on an explicit user answer.
            if response != PermissionState::Unset {
                *self.permission.write() = response;
            }
            Ok(response)
        })
    }

    fn present(&self, spec: PresentationSpec) -> BoxFuture<'_, NotifyResult<SurfaceHandle>> {
        Box::pin(async move {
            if !self.supported {
                return Err(NotifyError::Unsupported);
            }
            if self.fail_presents.load(Ordering::SeqCst) {
                return Err(NotifyError::surface("injected presentation failure"));
            }
            let handle = SurfaceHandle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
            self.presented.lock().push((handle, spec));
            Ok(handle)
        })
    }

    fn dismiss(&self, handle: SurfaceHandle) -> BoxFuture<'_, NotifyResult<()>> {
        Box::pin(async move {
            self.dismissed.lock().push(handle);
            Ok(())
        })
    }

    fn subscribe_clicks(&self) -> broadcast::Receiver<ClickEvent> {
        self.clicks.subscribe()
    }
}
