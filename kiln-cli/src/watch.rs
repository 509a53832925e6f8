//! `kiln watch`: re-render whenever the template or data file changes and
//! keep a sandboxed preview page up to date on disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use kiln_preview::{
    PreviewConfig, PreviewError, PreviewSurface, Previewer, RenderClient, SandboxedDocument,
};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

pub struct WatchArgs {
    pub template: PathBuf,
    pub data: PathBuf,
    pub out: PathBuf,
    pub debounce: Duration,
}

/// Writes the preview host page to a file and logs errors.
#[derive(Debug)]
pub struct FileSurface {
    out: PathBuf,
    error_shown: bool,
}

impl FileSurface {
    pub fn new(out: PathBuf) -> Self {
        Self {
            out,
            error_shown: false,
        }
    }

    fn write(&self, document: &SandboxedDocument) {
        match std::fs::write(&self.out, document.host_page()) {
            Ok(()) => tracing::info!(out = %self.out.display(), "preview updated"),
            Err(err) => {
                tracing::error!(out = %self.out.display(), error = %err, "could not write preview")
            }
        }
    }
}

impl PreviewSurface for FileSurface {
    fn show_document(&mut self, document: &SandboxedDocument) {
        self.write(document);
    }

    fn clear(&mut self) {
        self.write(&SandboxedDocument::new(""));
    }

    fn show_error(&mut self, error: &PreviewError) {
        self.error_shown = true;
        tracing::error!("{}", error_line(error));
        if let Some(raw) = &error.raw {
            tracing::error!("\n{raw}");
        }
    }

    fn dismiss_error(&mut self) {
        if std::mem::take(&mut self.error_shown) {
            tracing::info!("error resolved");
        }
    }

    fn set_loading(&mut self, loading: bool) {
        tracing::trace!(loading, "render in flight");
    }
}

/// `message (details)`, the one-line form of a failed render.
fn error_line(error: &PreviewError) -> String {
    match &error.details {
        Some(details) => format!("{} ({details})", error.message),
        None => error.message.clone(),
    }
}

/// Which of the watched files an event touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Changed {
    Template,
    Data,
}

pub async fn run<C: RenderClient>(client: C, args: WatchArgs) -> Result<()> {
    let template_path = std::fs::canonicalize(&args.template)
        .wrap_err_with(|| format!("resolving {}", args.template.display()))?;
    let data_path = std::fs::canonicalize(&args.data)
        .wrap_err_with(|| format!("resolving {}", args.data.display()))?;

    let config = PreviewConfig::default().with_debounce(args.debounce);
    let (previewer, handle) = Previewer::new(config, client, FileSurface::new(args.out));
    let task = tokio::spawn(previewer.run());

    handle.load(read(&template_path)?, read(&data_path)?)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        let _ = tx.send(event);
    })?;
    // watch the directories so editors that replace files on save are seen
    let mut dirs: Vec<&Path> = [&template_path, &data_path]
        .into_iter()
        .filter_map(|path| path.parent())
        .collect();
    dirs.dedup();
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    tracing::info!(
        template = %template_path.display(),
        data = %data_path.display(),
        "watching for changes, ctrl-c to stop"
    );

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watch error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                for changed in classify(&event.paths, &template_path, &data_path) {
                    let path = match changed {
                        Changed::Template => &template_path,
                        Changed::Data => &data_path,
                    };
                    let text = match read(path) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!("{err:#}");
                            continue;
                        }
                    };
                    tracing::debug!(path = %path.display(), "changed");
                    match changed {
                        Changed::Template => handle.set_template(text)?,
                        Changed::Data => handle.set_data(text)?,
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(watcher);
    handle.shutdown()?;
    task.await?;
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))
}

fn classify(paths: &[PathBuf], template: &Path, data: &Path) -> Vec<Changed> {
    let mut changed = Vec::new();
    for path in paths {
        let which = if path == template {
            Changed::Template
        } else if path == data {
            Changed::Data
        } else {
            continue;
        };
        if !changed.contains(&which) {
            changed.push(which);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_matched_to_the_watched_files() {
        let template = Path::new("/work/page.ejs");
        let data = Path::new("/work/page.json");
        let paths = vec![
            PathBuf::from("/work/page.json"),
            PathBuf::from("/work/other.txt"),
            PathBuf::from("/work/page.json"),
            PathBuf::from("/work/page.ejs"),
        ];
        assert_eq!(
            classify(&paths, template, data),
            vec![Changed::Data, Changed::Template]
        );
        assert!(classify(&[PathBuf::from("/elsewhere")], template, data).is_empty());
    }

    #[kiln_testhelpers::test]
    fn failed_renders_are_logged_with_their_context() {
        let mut surface = FileSurface::new(PathBuf::from("unused.html"));
        let error = PreviewError::new(
            "ReferenceError: user is not defined",
            Some("Error on line 2".into()),
        );
        assert_eq!(
            error_line(&error),
            "ReferenceError: user is not defined (Error on line 2)"
        );
        assert_eq!(error_line(&PreviewError::new("Network error", None)), "Network error");

        surface.show_error(&PreviewError {
            raw: Some(" >> 2| <%= user.name %>".to_string()),
            ..error
        });
        assert!(surface.error_shown);
        surface.dismiss_error();
        assert!(!surface.error_shown);
    }
}
