// Subscription lifecycle: one handle wiring gate, prompt, presenter, stream

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::backends::{MemorySurface, NotificationSurface, platform_surface};
use crate::components::{
    BoxFuture, ConnectionState, NotificationRecord, NotifyResult, PermissionGate,
    PermissionPrompt,
};
use crate::presenter::{ActivateCallback, Presenter, PresenterPolicy};
use crate::stream::{RecordSink, StreamConfig, StreamConnector};

/// Invoked once per successfully decoded record, after the presentation side
/// effect and independent of it: a denied permission still delivers records
/// here.
pub type RecordCallback = Arc<dyn Fn(&NotificationRecord) + Send + Sync>;

/// The notification pipeline for one user subscription.
///
/// Construction wires the permission gate, the deferred prompt, the
/// presenter, and a (not yet active) stream connector. [`enable`] opens the
/// subscription; [`disable`] or drop tears it down, closing the connection
/// and cancelling any pending reconnect.
///
/// [`enable`]: NotificationPipeline::enable
/// [`disable`]: NotificationPipeline::disable
pub struct NotificationPipeline {
    user_id: String,
    stream_config: StreamConfig,
    gate: PermissionGate,
    prompt: Arc<PermissionPrompt>,
    presenter: Arc<Presenter>,
    sink: Arc<PipelineSink>,
    connector: Mutex<Option<StreamConnector>>,
}

impl NotificationPipeline {
    pub fn builder() -> NotificationPipelineBuilder {
        NotificationPipelineBuilder::default()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn permission(&self) -> &PermissionGate {
        &self.gate
    }

    /// The deferred permission prompt for this mount. The embedder drives
    /// `deferred_show` and surfaces accept/dismiss in its UI.
    pub fn prompt(&self) -> Arc<PermissionPrompt> {
        Arc::clone(&self.prompt)
    }

    pub fn presenter(&self) -> Arc<Presenter> {
        Arc::clone(&self.presenter)
    }

    /// Connection status for optional display. Transport problems never
    /// raise dialogs; they show up here and heal themselves.
    pub fn connection(&self) -> ConnectionState {
        self.connector
            .lock()
            .as_ref()
            .map(StreamConnector::state)
            .unwrap_or_default()
    }

    pub fn enabled(&self) -> bool {
        self.connector.lock().is_some()
    }

    /// Open the subscription. Requires a non-empty user id; enabling an
    /// already-enabled pipeline keeps the existing connection.
    pub fn enable(&self) -> bool {
        if self.user_id.is_empty() {
            debug!("no user id, notification stream stays off");
            return false;
        }
        let mut slot = self.connector.lock();
        if slot.is_some() {
            return true;
        }
        match StreamConnector::spawn(
            self.stream_config.clone(),
            self.user_id.clone(),
            Arc::clone(&self.sink) as Arc<dyn RecordSink>,
        ) {
            Ok(connector) => {
                *slot = Some(connector);
                true
            }
            Err(error) => {
                warn!(%error, "failed to start notification stream");
                false
            }
        }
    }

    /// Tear the subscription down. Idempotent.
    pub fn disable(&self) {
        if let Some(connector) = self.connector.lock().take() {
            connector.shutdown();
        }
    }
}

impl Drop for NotificationPipeline {
    fn drop(&mut self) {
        self.disable();
    }
}

struct PipelineSink {
    presenter: Arc<Presenter>,
    callback: Option<RecordCallback>,
}

impl RecordSink for PipelineSink {
    fn deliver(&self, record: NotificationRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // Present first, then hand to the callback sink; the callback
            // fires regardless of whether a notification was created.
            self.presenter.present(record.clone()).await;
            if let Some(callback) = &self.callback {
                callback(&record);
            }
        })
    }
}

/// Fluent construction for [`NotificationPipeline`].
#[derive(Default)]
pub struct NotificationPipelineBuilder {
    user_id: String,
    backend_base: Option<String>,
    reconnect_delay: Option<Duration>,
    prompt_delay: Option<Duration>,
    policy: PresenterPolicy,
    surface: Option<Arc<dyn NotificationSurface>>,
    on_record: Option<RecordCallback>,
    on_activate: Option<ActivateCallback>,
}

impl NotificationPipelineBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Backend base URL; defaults to the local development backend.
    pub fn backend_base(mut self, base: impl Into<String>) -> Self {
        self.backend_base = Some(base.into());
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    pub fn prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    pub fn policy(mut self, policy: PresenterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Substitute the platform surface; tests inject a [`MemorySurface`].
    pub fn surface(mut self, surface: Arc<dyn NotificationSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn on_record(mut self, callback: impl Fn(&NotificationRecord) + Send + Sync + 'static) -> Self {
        self.on_record = Some(Arc::new(callback));
        self
    }

    pub fn on_activate(mut self, callback: impl Fn(Option<String>) + Send + Sync + 'static) -> Self {
        self.on_activate = Some(Arc::new(callback));
        self
    }

    /// Assemble the pipeline. Picks the native platform surface when none
    /// was injected; a host without one gets the disabled-feature fallback.
    pub async fn build(self) -> NotifyResult<NotificationPipeline> {
        let mut stream_config = StreamConfig::default();
        if let Some(base) = &self.backend_base {
            stream_config.backend_base = Url::parse(base)?;
        }
        if let Some(delay) = self.reconnect_delay {
            stream_config.reconnect_delay = delay;
        }
        // Surface endpoint problems now rather than at enable time.
        if !self.user_id.is_empty() {
            stream_config.stream_endpoint(&self.user_id)?;
        }

        let surface = match self.surface {
            Some(surface) => surface,
            None => platform_surface().await.unwrap_or_else(|| {
                Arc::new(MemorySurface::unsupported()) as Arc<dyn NotificationSurface>
            }),
        };

        let gate = PermissionGate::new(Arc::clone(&surface));
        let presenter = Arc::new(Presenter::new(
            Arc::clone(&surface),
            gate.clone(),
            self.policy,
            self.on_activate,
        ));
        let mut prompt = PermissionPrompt::new(gate.clone());
        if let Some(delay) = self.prompt_delay {
            prompt = prompt.with_delay(delay);
        }

        let sink = Arc::new(PipelineSink {
            presenter: Arc::clone(&presenter),
            callback: self.on_record,
        });

        Ok(NotificationPipeline {
            user_id: self.user_id,
            stream_config,
            gate,
            prompt: Arc::new(prompt),
            presenter,
            sink,
            connector: Mutex::new(None),
        })
    }
}
