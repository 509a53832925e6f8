use std::time::Duration;

/// How the previewer reacts to edits and failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Quiet period after the last edit before a render is requested
    pub debounce: Duration,
    /// Keep showing the last successful render when a render fails,
    /// instead of clearing the preview
    pub keep_last_render_on_error: bool,
}

impl PreviewConfig {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn keep_last_render_on_error(mut self, keep: bool) -> Self {
        self.keep_last_render_on_error = keep;
        self
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
            keep_last_render_on_error: true,
        }
    }
}
