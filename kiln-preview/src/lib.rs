//! Live preview for kiln templates.
//!
//! Every edit to the template or its data schedules a render after a quiet
//! period. Render calls can overlap and finish out of order, so each one is
//! tagged with a sequence number and only the response to the newest call is
//! ever displayed. Output is shown through a [`PreviewSurface`] as a
//! [`SandboxedDocument`]: scripts may run, but without the host's origin.
//!
//! ```no_run
//! use kiln_preview::{LocalClient, PreviewConfig, Previewer, samples};
//! # struct Window;
//! # impl kiln_preview::PreviewSurface for Window {
//! #     fn show_document(&mut self, _: &kiln_preview::SandboxedDocument) {}
//! #     fn clear(&mut self) {}
//! #     fn show_error(&mut self, _: &kiln_preview::PreviewError) {}
//! #     fn dismiss_error(&mut self) {}
//! #     fn set_loading(&mut self, _: bool) {}
//! # }
//! # async fn demo() {
//! let (previewer, handle) = Previewer::new(PreviewConfig::default(), LocalClient::default(), Window);
//! let task = tokio::spawn(previewer.run());
//!
//! handle.load_sample(samples::find("loops").unwrap()).unwrap();
//! handle.set_data(r#"{"products": []}"#).unwrap();
//! handle.shutdown().unwrap();
//! let _window = task.await.unwrap();
//! # }
//! ```

mod client;
mod config;
mod error;
mod previewer;
pub mod samples;
mod sequence;
mod surface;

pub use client::{HttpClient, LocalClient, RenderClient};
pub use config::PreviewConfig;
pub use error::PreviewError;
pub use previewer::{Closed, PreviewHandle, Previewer};
pub use samples::Sample;
pub use sequence::{Sequencer, Ticket};
pub use surface::{PreviewSurface, SandboxedDocument};
