//! `kiln render`: one render, with failures reported as diagnostics.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use kiln::{Engine, RenderError};
use miette::{GraphicalReportHandler, GraphicalTheme};

pub struct RenderArgs {
    pub template: PathBuf,
    pub data: Option<PathBuf>,
    pub json: Option<String>,
    pub out: Option<PathBuf>,
}

pub fn run(engine: &Engine, args: RenderArgs) -> Result<ExitCode> {
    let template = std::fs::read_to_string(&args.template)
        .wrap_err_with(|| format!("reading template {}", args.template.display()))?;
    let data = match (&args.data, args.json) {
        (Some(path), _) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("reading data {}", path.display()))?,
        (None, Some(json)) => json,
        (None, None) => "{}".to_string(),
    };

    match engine.render(&template, &data) {
        Ok(html) => {
            match &args.out {
                Some(out) => std::fs::write(out, html)
                    .wrap_err_with(|| format!("writing {}", out.display()))?,
                None => print!("{html}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", report(&err, &args.template, &template));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Render `err` as a miette report over `source`.
pub fn report(err: &RenderError, path: &Path, source: &str) -> String {
    let diagnostic = err.to_diagnostic(&path.display().to_string(), source);
    let mut out = String::new();
    let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode());
    if handler.render_report(&mut out, &diagnostic).is_err() {
        // fall back to the plain snippet
        out = err.raw.clone().unwrap_or_else(|| err.message.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[kiln_testhelpers::test]
    fn reports_name_the_file_and_the_error() {
        let source = "<p>\n  <%= missing %>\n</p>\n";
        let err = Engine::new().render(source, "{}").unwrap_err();
        let report = report(&err, Path::new("page.ejs"), source);
        assert!(report.contains("page.ejs"), "{report}");
        assert!(report.contains("ReferenceError: missing is not defined"), "{report}");
    }
}
