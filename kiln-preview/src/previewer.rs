//! The live-preview loop.
//!
//! A [`Previewer`] owns the editor state and runs as a single tokio task.
//! Edits arrive through a [`PreviewHandle`] and re-arm one debounce
//! deadline. When the deadline passes, the current template and data are
//! sent to the [`RenderClient`] tagged with a fresh [`Ticket`]; only the
//! response carrying the newest ticket ever reaches the surface.

use std::sync::Arc;

use kiln::{RenderRequest, RenderResponse};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::client::RenderClient;
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::samples::Sample;
use crate::sequence::{Sequencer, Ticket};
use crate::surface::{PreviewSurface, SandboxedDocument};

/// The previewer task has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the previewer has shut down")]
pub struct Closed;

#[derive(Debug)]
enum Command {
    SetTemplate(String),
    SetData(String),
    Load { template: String, data: String },
    Clear,
    DismissError,
    Shutdown,
}

/// Sends edits to a running [`Previewer`].
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl PreviewHandle {
    fn send(&self, command: Command) -> Result<(), Closed> {
        self.commands.send(command).map_err(|_| Closed)
    }

    pub fn set_template(&self, template: impl Into<String>) -> Result<(), Closed> {
        self.send(Command::SetTemplate(template.into()))
    }

    /// Replace the data document. `data` is JSON text.
    pub fn set_data(&self, data: impl Into<String>) -> Result<(), Closed> {
        self.send(Command::SetData(data.into()))
    }

    /// Replace both template and data.
    pub fn load(&self, template: impl Into<String>, data: impl Into<String>) -> Result<(), Closed> {
        self.send(Command::Load {
            template: template.into(),
            data: data.into(),
        })
    }

    pub fn load_sample(&self, sample: &Sample) -> Result<(), Closed> {
        self.load(sample.template, sample.data)
    }

    /// Reset to an empty template and `{}` data, and clear the preview.
    pub fn clear(&self) -> Result<(), Closed> {
        self.send(Command::Clear)
    }

    pub fn dismiss_error(&self) -> Result<(), Closed> {
        self.send(Command::DismissError)
    }

    /// Stop the previewer. Responses still in flight are dropped.
    pub fn shutdown(&self) -> Result<(), Closed> {
        self.send(Command::Shutdown)
    }
}

/// Owns the editor state and drives a [`PreviewSurface`].
pub struct Previewer<C, S> {
    config: PreviewConfig,
    client: Arc<C>,
    surface: S,
    template: String,
    data: String,
    deadline: Option<Instant>,
    sequencer: Sequencer,
    commands: mpsc::UnboundedReceiver<Command>,
    responses: mpsc::UnboundedReceiver<(Ticket, RenderResponse)>,
    responder: mpsc::UnboundedSender<(Ticket, RenderResponse)>,
}

impl<C, S> std::fmt::Debug for Previewer<C, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Previewer")
            .field("config", &self.config)
            .field("template_len", &self.template.len())
            .field("data_len", &self.data.len())
            .field("deadline", &self.deadline)
            .field("sequencer", &self.sequencer)
            .finish_non_exhaustive()
    }
}

impl<C: RenderClient, S: PreviewSurface> Previewer<C, S> {
    /// Create a previewer starting from an empty template and `{}` data.
    /// Nothing happens until [`run`](Self::run) is polled.
    pub fn new(config: PreviewConfig, client: C, surface: S) -> (Self, PreviewHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (responder, responses) = mpsc::unbounded_channel();
        let previewer = Self {
            config,
            client: Arc::new(client),
            surface,
            template: String::new(),
            data: "{}".to_string(),
            deadline: None,
            sequencer: Sequencer::new(),
            commands,
            responses,
            responder,
        };
        (previewer, PreviewHandle { commands: command_tx })
    }

    /// Process edits and responses until shut down or every handle is
    /// dropped. Returns the surface.
    pub async fn run(mut self) -> S {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.apply(command),
                },
                Some((ticket, response)) = self.responses.recv() => {
                    self.receive(ticket, response);
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.fire();
                }
            }
        }
        tracing::debug!(
            issued = self.sequencer.last_issued(),
            pending = self.sequencer.is_pending(),
            "previewer stopped"
        );
        self.surface
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetTemplate(template) => {
                self.template = template;
                self.rearm();
            }
            Command::SetData(data) => {
                self.data = data;
                self.rearm();
            }
            Command::Load { template, data } => {
                self.template = template;
                self.data = data;
                self.rearm();
            }
            Command::Clear => {
                self.template.clear();
                self.data = "{}".to_string();
                self.deadline = None;
                self.show_nothing();
            }
            Command::DismissError => self.surface.dismiss_error(),
            Command::Shutdown => {}
        }
    }

    fn rearm(&mut self) {
        self.deadline = Some(Instant::now() + self.config.debounce);
    }

    /// The quiet period passed; render what the editor holds now.
    fn fire(&mut self) {
        if self.template.trim().is_empty() {
            tracing::trace!("blank template, clearing without a render call");
            self.show_nothing();
            return;
        }

        let ticket = self.sequencer.issue();
        tracing::debug!(%ticket, template_len = self.template.len(), "requesting render");
        self.surface.set_loading(true);

        let request = RenderRequest::new(self.template.clone(), self.data.clone());
        let client = self.client.clone();
        let responder = self.responder.clone();
        tokio::spawn(async move {
            let response = client.render(request).await;
            // the previewer may be gone by now
            let _ = responder.send((ticket, response));
        });
    }

    fn receive(&mut self, ticket: Ticket, response: RenderResponse) {
        if !self.sequencer.accept(ticket) {
            tracing::debug!(
                %ticket,
                latest = self.sequencer.last_issued(),
                "dropping superseded response"
            );
            return;
        }
        self.surface.set_loading(false);
        match response {
            RenderResponse::Rendered { rendered } => {
                tracing::debug!(%ticket, len = rendered.len(), "showing render");
                self.surface.show_document(&SandboxedDocument::new(rendered));
                self.surface.dismiss_error();
            }
            RenderResponse::Failed(body) => {
                let error = PreviewError::from(body);
                tracing::debug!(
                    %ticket,
                    message = %error.message,
                    details = ?error.details,
                    "render failed"
                );
                if !self.config.keep_last_render_on_error {
                    self.surface.clear();
                }
                self.surface.show_error(&error);
            }
        }
    }

    /// Clear the preview and forget any request still in flight.
    fn show_nothing(&mut self) {
        if self.sequencer.is_pending() {
            self.surface.set_loading(false);
        }
        self.sequencer.supersede();
        self.surface.clear();
        self.surface.dismiss_error();
    }
}
