//! Where render requests go: the engine in this process, or a render
//! service over HTTP.

use std::future::Future;
use std::sync::Arc;

use kiln::{Engine, ErrorBody, RenderError, RenderRequest, RenderResponse};

/// Performs one render call.
///
/// Calls may complete in any order; the previewer sorts that out.
pub trait RenderClient: Send + Sync + 'static {
    fn render(&self, request: RenderRequest) -> impl Future<Output = RenderResponse> + Send;
}

/// Renders with an in-process [`Engine`] on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct LocalClient {
    engine: Arc<Engine>,
}

impl LocalClient {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new(Arc::new(Engine::new()))
    }
}

impl RenderClient for LocalClient {
    fn render(&self, request: RenderRequest) -> impl Future<Output = RenderResponse> + Send {
        let engine = self.engine.clone();
        async move {
            let rendered =
                tokio::task::spawn_blocking(move || engine.render_request(&request)).await;
            match rendered {
                Ok(result) => RenderResponse::from(result),
                Err(err) => RenderResponse::from(Err(RenderError::internal(err.to_string()))),
            }
        }
    }
}

/// Posts requests to a render service's `/api/render`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClient {
    /// `server` is the service's base URL, e.g. `http://127.0.0.1:3000`.
    pub fn new(server: &str) -> Self {
        Self::with_client(reqwest::Client::new(), server)
    }

    pub fn with_client(client: reqwest::Client, server: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/render", server.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &RenderRequest) -> reqwest::Result<RenderResponse> {
        // failures come back as 4xx/5xx with a JSON body, so the status is
        // not treated as an error
        self.client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?
            .json::<RenderResponse>()
            .await
    }
}

impl RenderClient for HttpClient {
    fn render(&self, request: RenderRequest) -> impl Future<Output = RenderResponse> + Send {
        async move {
            match self.post(&request).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(endpoint = %self.endpoint, error = %err, "render call failed");
                    RenderResponse::Failed(ErrorBody {
                        error: "Network error".to_string(),
                        details: Some(err.to_string()),
                        kind: None,
                        line: None,
                        raw: None,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[kiln_testhelpers::test(tokio::test)]
    async fn local_client_renders_on_the_blocking_pool() {
        let client = LocalClient::default();
        let response = client
            .render(RenderRequest::new("<%= 6 * 7 %>", "{}"))
            .await;
        assert_eq!(
            response,
            RenderResponse::Rendered {
                rendered: "42".to_string()
            }
        );
    }

    #[kiln_testhelpers::test(tokio::test)]
    async fn unreachable_servers_are_network_errors() {
        // nothing listens on the discard port
        let client = HttpClient::new("http://127.0.0.1:9/");
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/api/render");
        let RenderResponse::Failed(body) = client.render(RenderRequest::new("x", "{}")).await else {
            panic!("expected a failure");
        };
        assert_eq!(body.error, "Network error");
        assert!(body.details.is_some());
        assert_eq!(body.kind, None);
    }
}
