//! The `kiln` command.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `render` | Render a template once |
//! | `serve` | Serve `POST /api/render` over HTTP |
//! | `watch` | Re-render on every change and keep a preview page up to date |
//! | `samples` | List or print the bundled sample templates |

mod logging;
mod render;
mod watch;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use kiln::{Engine, EngineConfig};
use kiln_preview::{HttpClient, LocalClient, samples};

#[derive(Parser)]
#[command(name = "kiln", version)]
#[command(
    about = "Render EJS-style templates, serve them, or preview them live",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template once and print the HTML
    Render {
        /// Template file
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// JSON data file
        #[arg(short, long, value_name = "FILE", conflicts_with = "json")]
        data: Option<PathBuf>,

        /// JSON data given inline
        #[arg(long, value_name = "TEXT")]
        json: Option<String>,

        /// Write the HTML here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Serve the render endpoint
    Serve {
        /// Address to listen on
        #[arg(long, env = "KILN_ADDR", default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        /// Compiled templates to keep in memory (0 disables the cache)
        #[arg(long, env = "KILN_CACHE", default_value_t = 64)]
        cache: usize,
    },
    /// Watch a template and its data, writing a sandboxed preview page on every change
    Watch {
        /// Template file
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// JSON data file
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Preview page to write
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Quiet period after a change before rendering
        #[arg(long, env = "KILN_DEBOUNCE_MS", default_value_t = 300)]
        debounce_ms: u64,

        /// Render through a running `kiln serve` instead of in-process
        #[arg(long, env = "KILN_SERVER", value_name = "URL")]
        server: Option<String>,
    },
    /// List the sample templates, or print one
    Samples {
        /// Sample slug or name
        name: Option<String>,

        /// Print the sample's JSON data instead of its template
        #[arg(long, requires = "name")]
        data: bool,
    },
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    logging::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            template,
            data,
            json,
            out,
        } => render::run(
            &Engine::with_config(EngineConfig {
                cache_capacity: 0,
                ..EngineConfig::default()
            }),
            render::RenderArgs {
                template,
                data,
                json,
                out,
            },
        ),
        Commands::Serve { addr, cache } => {
            let engine = Arc::new(Engine::with_config(EngineConfig {
                cache_capacity: cache,
                ..EngineConfig::default()
            }));
            runtime()?.block_on(kiln_axum::serve(addr, engine))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Watch {
            template,
            data,
            out,
            debounce_ms,
            server,
        } => {
            let args = watch::WatchArgs {
                template,
                data,
                out,
                debounce: Duration::from_millis(debounce_ms),
            };
            let runtime = runtime()?;
            match server {
                Some(server) => runtime.block_on(watch::run(HttpClient::new(&server), args))?,
                None => runtime.block_on(watch::run(LocalClient::default(), args))?,
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Samples { name, data } => {
            match name {
                None => {
                    for sample in samples::all() {
                        println!("{:<16} {:<16} {}", sample.slug, sample.name, sample.description);
                    }
                }
                Some(name) => {
                    let sample =
                        samples::find(&name).ok_or_else(|| eyre!("no sample named {name:?}"))?;
                    print!("{}", if data { sample.data } else { sample.template });
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_defaults() {
        let cli =
            Cli::try_parse_from(["kiln", "watch", "a.ejs", "a.json", "--out", "a.html"]).unwrap();
        let Commands::Watch { debounce_ms, .. } = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(debounce_ms, 300);
    }
}
