use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln::{ErrorBody, ErrorKind, RenderRequest, RenderResponse};
use kiln_preview::{
    LocalClient, PreviewConfig, PreviewError, PreviewSurface, Previewer, RenderClient,
    SandboxedDocument, samples,
};
use tokio::time::sleep;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Show(String),
    Clear,
    Error(String, Option<String>),
    Dismiss,
    Loading(bool),
}

#[derive(Debug, Default)]
struct Recorder {
    events: Vec<Event>,
    /// Context of the most recent error shown
    last_raw: Option<String>,
}

impl Recorder {
    fn shown(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Show(html) => Some(html.as_str()),
                _ => None,
            })
            .collect()
    }

    fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Error(message, _) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl PreviewSurface for Recorder {
    fn show_document(&mut self, document: &SandboxedDocument) {
        self.events.push(Event::Show(document.html().to_string()));
    }

    fn clear(&mut self) {
        self.events.push(Event::Clear);
    }

    fn show_error(&mut self, error: &PreviewError) {
        self.events
            .push(Event::Error(error.message.clone(), error.details.clone()));
        self.last_raw = error.raw.clone();
    }

    fn dismiss_error(&mut self) {
        self.events.push(Event::Dismiss);
    }

    fn set_loading(&mut self, loading: bool) {
        self.events.push(Event::Loading(loading));
    }
}

/// Echoes the template back after a delay read from the data, e.g.
/// `{"delay": 500}`; templates starting with `fail` fail instead.
#[derive(Debug, Default)]
struct Scripted {
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl RenderClient for Scripted {
    fn render(&self, request: RenderRequest) -> impl Future<Output = RenderResponse> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.template.clone());
        let delay = serde_json::from_str::<serde_json::Value>(&request.data)
            .ok()
            .and_then(|data| data["delay"].as_u64())
            .unwrap_or(10);
        async move {
            sleep(Duration::from_millis(delay)).await;
            if request.template.starts_with("fail") {
                RenderResponse::Failed(ErrorBody {
                    error: "ReferenceError: x is not defined".to_string(),
                    details: Some("Error on line 1".to_string()),
                    kind: Some(ErrorKind::Runtime),
                    line: Some(1),
                    raw: Some(format!(">> 1| {}", request.template)),
                })
            } else {
                RenderResponse::Rendered {
                    rendered: request.template,
                }
            }
        }
    }
}

fn start(
    config: PreviewConfig,
    client: Scripted,
) -> (kiln_preview::PreviewHandle, tokio::task::JoinHandle<Recorder>) {
    let (previewer, handle) = Previewer::new(config, client, Recorder::default());
    (handle, tokio::spawn(previewer.run()))
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn newest_response_wins_even_when_it_arrives_first() {
    let (handle, task) = start(PreviewConfig::default(), Scripted::default());

    handle.load("slow", r#"{"delay": 1000}"#).unwrap();
    sleep(Duration::from_millis(400)).await;
    handle.load("fast", r#"{"delay": 10}"#).unwrap();
    sleep(Duration::from_millis(2000)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    assert_eq!(surface.shown(), vec!["fast"]);
    assert_eq!(surface.events.last(), Some(&Event::Dismiss));
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn edits_inside_the_quiet_period_coalesce() {
    let client = Scripted::default();
    let calls = client.calls.clone();
    let seen = client.seen.clone();
    let (handle, task) = start(PreviewConfig::default(), client);

    for template in ["H", "He", "Hel", "Hell", "Hello"] {
        handle.set_template(template).unwrap();
        sleep(Duration::from_millis(100)).await;
    }
    sleep(Duration::from_millis(1000)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec!["Hello"]);
    assert_eq!(surface.shown(), vec!["Hello"]);
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn blank_templates_clear_without_calling_and_supersede_in_flight_calls() {
    let client = Scripted::default();
    let calls = client.calls.clone();
    let (handle, task) = start(PreviewConfig::default(), client);

    handle.load("late", r#"{"delay": 1000}"#).unwrap();
    sleep(Duration::from_millis(400)).await;
    handle.set_template("   \n ").unwrap();
    sleep(Duration::from_millis(2000)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(surface.shown().is_empty());
    assert_eq!(
        surface.events,
        vec![
            Event::Loading(true),
            Event::Loading(false),
            Event::Clear,
            Event::Dismiss
        ]
    );
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn failures_keep_the_last_render_by_default() {
    let (handle, task) = start(PreviewConfig::default(), Scripted::default());

    handle.set_template("good").unwrap();
    sleep(Duration::from_millis(500)).await;
    handle.set_template("fail here").unwrap();
    sleep(Duration::from_millis(500)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    assert_eq!(surface.shown(), vec!["good"]);
    assert_eq!(
        surface.events.last(),
        Some(&Event::Error(
            "ReferenceError: x is not defined".to_string(),
            Some("Error on line 1".to_string())
        ))
    );
    let after_good = surface
        .events
        .iter()
        .skip_while(|event| !matches!(event, Event::Show(_)))
        .skip(1);
    assert!(after_good.into_iter().all(|event| *event != Event::Clear));
    assert_eq!(surface.last_raw.as_deref(), Some(">> 1| fail here"));
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn failures_can_clear_the_preview() {
    let config = PreviewConfig::default().keep_last_render_on_error(false);
    let (handle, task) = start(config, Scripted::default());

    handle.set_template("good").unwrap();
    sleep(Duration::from_millis(500)).await;
    handle.set_template("fail").unwrap();
    sleep(Duration::from_millis(500)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    let tail: Vec<_> = surface.events.iter().rev().take(2).collect();
    assert_eq!(
        tail[0],
        &Event::Error(
            "ReferenceError: x is not defined".to_string(),
            Some("Error on line 1".to_string())
        )
    );
    assert_eq!(tail[1], &Event::Clear);
}

#[kiln_testhelpers::test(tokio::test(start_paused = true))]
async fn clear_resets_immediately() {
    let client = Scripted::default();
    let calls = client.calls.clone();
    let (handle, task) = start(PreviewConfig::default(), client);

    handle.set_template("pending").unwrap();
    sleep(Duration::from_millis(100)).await;
    handle.clear().unwrap();
    sleep(Duration::from_millis(1000)).await;

    handle.shutdown().unwrap();
    let surface = task.await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    // nothing was in flight, so the loading indicator is left alone
    assert_eq!(surface.events, vec![Event::Clear, Event::Dismiss]);
}

#[kiln_testhelpers::test(tokio::test)]
async fn every_sample_renders_with_the_local_engine() {
    let client = LocalClient::default();
    for sample in samples::all() {
        let response = client
            .render(RenderRequest::new(sample.template, sample.data))
            .await;
        let RenderResponse::Rendered { rendered } = response else {
            panic!("sample {} failed: {response:?}", sample.slug);
        };
        assert!(rendered.starts_with("<!DOCTYPE html>"), "{}", sample.slug);
        assert!(!rendered.contains("<%"), "{}", sample.slug);
    }
}

#[kiln_testhelpers::test(tokio::test)]
async fn sample_output_matches_its_data() {
    let client = LocalClient::default();
    let loops = samples::find("loops").unwrap();
    let RenderResponse::Rendered { rendered } = client
        .render(RenderRequest::new(loops.template, loops.data))
        .await
    else {
        panic!("loops sample failed");
    };
    assert!(rendered.contains("Total items: 4"));
    assert!(rendered.contains("$1299.99"));
    assert_eq!(rendered.matches("✗ Out of Stock").count(), 1);

    let complex = samples::find("complex-data").unwrap();
    let RenderResponse::Rendered { rendered } = client
        .render(RenderRequest::new(complex.template, complex.data))
        .await
    else {
        panic!("complex sample failed");
    };
    assert!(rendered.contains("Total Employees: 4"));
    assert_eq!(rendered.matches("Remote").count(), 2);
}
