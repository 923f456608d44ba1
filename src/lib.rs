//! Real-time notification delivery pipeline for the DeepFlow dashboard.
//!
//! Bridges the backend's server-sent notification stream into native
//! platform notifications: a permission gate and deferred prompt negotiate
//! user consent, a supervised stream connector keeps one connection alive
//! with a fixed-delay reconnect, and an urgency-aware presenter turns decoded
//! records into notifications the host can display.
//!
//! ```no_run
//! use deepflow_notify::NotificationPipeline;
//!
//! # async fn demo() -> deepflow_notify::NotifyResult<()> {
//! let pipeline = NotificationPipeline::builder()
//!     .user_id("user-123")
//!     .backend_base("http://localhost:8000")
//!     .on_record(|record| println!("got {}", record.title))
//!     .build()
//!     .await?;
//!
//! if pipeline.permission().request().await {
//!     pipeline.enable();
//! }
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod components;
pub mod pipeline;
pub mod presenter;
pub mod stream;

// Re-export the working set at the crate root for convenience
pub use backends::*;
pub use components::*;
pub use pipeline::*;
pub use presenter::*;
pub use stream::*;
