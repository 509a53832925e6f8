#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub use kiln_testhelpers_macros::test;

use std::sync::{LazyLock, Once};
use std::time::Instant;

use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding a `tracing` targets filter for tests.
pub const LOG_ENV: &str = "KILN_LOG";

static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);

/// Prints time since the first [`setup`] call, so interleaved test logs
/// line up with paused-clock tests that never advance wall time.
struct SinceSetup;

impl FormatTime for SinceSetup {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let elapsed = EPOCH.elapsed();
        write!(w, "+{}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis())
    }
}

/// Frames from the test harness, panic machinery and tokio's runtime.
fn is_harness_frame(name: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "test::run_test",
        "test::__rust_begin_short_backtrace",
        "std::panicking::",
        "std::panic::",
        "core::panicking::",
        "core::ops::function::FnOnce::call_once",
        "tokio::runtime::",
    ];
    PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

fn install_backtraces() {
    color_backtrace::BacktracePrinter::new()
        .verbosity(color_backtrace::Verbosity::Medium)
        .add_frame_filter(Box::new(|frames| {
            frames.retain(|frame| !frame.name.as_deref().is_some_and(is_harness_frame));
        }))
        .install(Box::new(termcolor::StandardStream::stderr(
            termcolor::ColorChoice::Auto,
        )));
}

/// `KILN_LOG=kiln::script=trace,kiln_preview=debug`, or everything at
/// debug when unset or unparsable.
fn filter_from_env() -> Targets {
    std::env::var(LOG_ENV)
        .ok()
        .and_then(|spec| spec.parse().ok())
        .unwrap_or_else(|| Targets::new().with_default(tracing::Level::DEBUG))
}

fn install_subscriber() {
    let layer = tracing_subscriber::fmt::layer()
        .with_test_writer()
        .with_timer(SinceSetup)
        .with_target(true)
        .with_line_number(true)
        .compact();

    // another harness may already own the global subscriber
    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter_from_env())
        .try_init();
}

/// Install the test tracing subscriber and backtrace printer.
///
/// Every test may call this; only the first call in a process does anything.
pub fn setup() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        LazyLock::force(&EPOCH);
        install_backtraces();
        install_subscriber();
    });
}
