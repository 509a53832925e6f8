//! The display side of the previewer.

use kiln::escape_html;

use crate::PreviewError;

/// Rendered HTML that is only ever displayed inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedDocument {
    html: String,
}

impl SandboxedDocument {
    /// `sandbox` attribute for the preview frame: scripts may run, but the
    /// document gets an opaque origin and cannot reach the host page.
    pub const SANDBOX: &'static str = "allow-scripts";

    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// The untrusted HTML itself.
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// An `<iframe>` element embedding the document through `srcdoc`.
    pub fn iframe(&self) -> String {
        format!(
            r#"<iframe title="Preview" sandbox="{}" srcdoc="{}"></iframe>"#,
            Self::SANDBOX,
            escape_html(&self.html)
        )
    }

    /// A complete host page showing the document full-size.
    pub fn host_page(&self) -> String {
        format!(
            concat!(
                "<!DOCTYPE html>\n",
                "<html lang=\"en\">\n",
                "<head>\n",
                "<meta charset=\"UTF-8\">\n",
                "<title>kiln preview</title>\n",
                "<style>html, body, iframe {{ margin: 0; border: 0; width: 100%; height: 100%; }}</style>\n",
                "</head>\n",
                "<body>\n",
                "{}\n",
                "</body>\n",
                "</html>\n",
            ),
            self.iframe()
        )
    }
}

/// Something that displays the preview: a window, a file on disk, a test
/// recorder.
///
/// The previewer calls these in response to edits and render results; a
/// surface never sees output from a superseded request.
pub trait PreviewSurface: Send + 'static {
    /// Replace the preview with `document`.
    fn show_document(&mut self, document: &SandboxedDocument);

    /// Show nothing.
    fn clear(&mut self);

    /// Show a dismissible error notification.
    fn show_error(&mut self, error: &PreviewError);

    fn dismiss_error(&mut self);

    /// Whether a render is in flight.
    fn set_loading(&mut self, loading: bool);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srcdoc_is_attribute_escaped() {
        let document =
            SandboxedDocument::new(r#"<p class="x">Tom & 'Jerry'</p><script>alert(1)</script>"#);
        insta::assert_snapshot!(document.iframe(), @r#"<iframe title="Preview" sandbox="allow-scripts" srcdoc="&lt;p class=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/p&gt;&lt;script&gt;alert(1)&lt;/script&gt;"></iframe>"#);
    }

    #[test]
    fn host_page_never_grants_same_origin() {
        let page = SandboxedDocument::new("<h1>hi</h1>").host_page();
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains(r#"sandbox="allow-scripts""#));
        assert!(!page.contains("allow-same-origin"));
    }
}
