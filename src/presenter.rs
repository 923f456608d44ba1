// Notification presenter: urgency policy, auto-dismiss, click handling

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backends::{NotificationSurface, PresentationSpec, SurfaceHandle};
use crate::components::{NotificationRecord, PermissionGate, PermissionState};

/// How long non-critical notifications stay up before the presenter dismisses
/// them.
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(10);

const DEFAULT_TAG_PREFIX: &str = "deepflow";
const DEFAULT_ICON: &str = "deepflow";
const DEFAULT_BADGE: &str = "deepflow-badge";

/// Invoked when the user clicks a notification, with the record's navigation
/// URL. Window focus and navigation belong to the embedder; the presenter
/// only reports the activation and dismisses the notification.
pub type ActivateCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Presentation defaults applied when a record carries no overrides.
#[derive(Debug, Clone)]
pub struct PresenterPolicy {
    pub auto_dismiss_after: Duration,
    /// Prefix of the derived presentation tag, `{prefix}-{record id}`.
    pub tag_prefix: String,
    pub default_icon: String,
    pub default_badge: String,
}

impl Default for PresenterPolicy {
    fn default() -> Self {
        Self {
            auto_dismiss_after: AUTO_DISMISS_AFTER,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            default_icon: DEFAULT_ICON.to_string(),
            default_badge: DEFAULT_BADGE.to_string(),
        }
    }
}

/// Bridges decoded records into platform notifications.
///
/// The presenter owns each record for its display lifecycle: from the
/// permission check through presentation, clicks, and dismissal. A record
/// whose presentation fails is logged and forgotten; it never affects the
/// records after it.
pub struct Presenter {
    inner: Arc<PresenterInner>,
    click_task: JoinHandle<()>,
}

struct PresenterInner {
    surface: Arc<dyn NotificationSurface>,
    gate: PermissionGate,
    policy: PresenterPolicy,
    active: DashMap<SurfaceHandle, ActiveNotification>,
    on_activate: Option<ActivateCallback>,
}

struct ActiveNotification {
    record: NotificationRecord,
    auto_dismiss: Option<JoinHandle<()>>,
}

impl Presenter {
    pub fn new(
        surface: Arc<dyn NotificationSurface>,
        gate: PermissionGate,
        policy: PresenterPolicy,
        on_activate: Option<ActivateCallback>,
    ) -> Self {
        let inner = Arc::new(PresenterInner {
            surface,
            gate,
            policy,
            active: DashMap::new(),
            on_activate,
        });
        // Subscribe before spawning so no click sent after construction can
        // slip past the listener.
        let clicks = inner.surface.subscribe_clicks();
        let click_task = tokio::spawn(click_loop(Arc::clone(&inner), clicks));
        Self { inner, click_task }
    }

    /// Present a record on the platform surface, if permission allows.
    ///
    /// Returns the surface handle of the displayed notification, or `None`
    /// when permission is not granted or presentation failed. Neither case
    /// is an error for the caller.
    pub async fn present(&self, record: NotificationRecord) -> Option<SurfaceHandle> {
        present_on(&self.inner, record).await
    }

    /// Dismiss a displayed notification ahead of its timer.
    pub async fn dismiss(&self, handle: SurfaceHandle) -> bool {
        let Some((_, active)) = self.inner.active.remove(&handle) else {
            return false;
        };
        if let Some(timer) = active.auto_dismiss {
            timer.abort();
        }
        if let Err(error) = self.inner.surface.dismiss(handle).await {
            debug!(%error, "dismiss failed");
        }
        true
    }

    /// Number of notifications currently on screen.
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.click_task.abort();
        for entry in self.inner.active.iter() {
            if let Some(timer) = &entry.value().auto_dismiss {
                timer.abort();
            }
        }
    }
}

impl PresenterInner {
    fn spec_for(&self, record: &NotificationRecord) -> PresentationSpec {
        let overrides = record.options.clone().unwrap_or_default();
        PresentationSpec {
            title: record.title.clone(),
            body: record.body.clone(),
            tag: overrides
                .tag
                .unwrap_or_else(|| format!("{}-{}", self.policy.tag_prefix, record.id)),
            icon: overrides
                .icon
                .unwrap_or_else(|| self.policy.default_icon.clone()),
            badge: overrides
                .badge
                .unwrap_or_else(|| self.policy.default_badge.clone()),
            require_interaction: overrides
                .require_interaction
                .unwrap_or_else(|| record.urgency.requires_interaction()),
            silent: overrides
                .silent
                .unwrap_or_else(|| record.urgency.is_silent()),
        }
    }

    async fn expire(&self, handle: SurfaceHandle) {
        // Already gone means the user or a click got there first.
        if self.active.remove(&handle).is_some()
            && let Err(error) = self.surface.dismiss(handle).await
        {
            debug!(%error, "auto-dismiss failed");
        }
    }

    async fn handle_click(&self, handle: SurfaceHandle) {
        let Some((_, active)) = self.active.remove(&handle) else {
            debug!(handle = handle.as_raw(), "click for unknown notification");
            return;
        };
        if let Some(timer) = active.auto_dismiss {
            timer.abort();
        }
        if let Some(on_activate) = &self.on_activate {
            on_activate(active.record.navigation_url().map(str::to_owned));
        }
        // The clicked notification always goes away afterwards.
        if let Err(error) = self.surface.dismiss(handle).await {
            debug!(%error, "dismiss after click failed");
        }
    }
}

async fn present_on(
    inner: &Arc<PresenterInner>,
    record: NotificationRecord,
) -> Option<SurfaceHandle> {
    if inner.gate.state() != PermissionState::Granted {
        debug!(id = %record.id, "permission not granted, skipping presentation");
        return None;
    }

    let spec = inner.spec_for(&record);
    let handle = match inner.surface.present(spec).await {
        Ok(handle) => handle,
        Err(error) => {
            // One bad record must not break the ones after it.
            warn!(id = %record.id, %error, "failed to present notification");
            return None;
        }
    };

    let auto_dismiss = record.urgency.auto_dismisses().then(|| {
        let timer_inner = Arc::clone(inner);
        let after = inner.policy.auto_dismiss_after;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            timer_inner.expire(handle).await;
        })
    });

    inner.active.insert(
        handle,
        ActiveNotification {
            record,
            auto_dismiss,
        },
    );
    Some(handle)
}

async fn click_loop(
    inner: Arc<PresenterInner>,
    mut clicks: tokio::sync::broadcast::Receiver<crate::backends::ClickEvent>,
) {
    loop {
        match clicks.recv().await {
            Ok(click) => inner.handle_click(click.handle).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "dropped click events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
