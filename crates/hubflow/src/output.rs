//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item detail views don't use `Tabled` derive.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Render one streamed item. Streams are line-oriented, so table and
/// plain fall back to compact JSON and YAML items get a document marker.
pub fn render_stream_item<T>(format: &OutputFormat, data: &T) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Json => render_json(data, false),
        OutputFormat::Yaml => Ok(format!("---\n{}", render_yaml(data)?.trim_end())),
        OutputFormat::Table | OutputFormat::JsonCompact | OutputFormat::Plain => {
            render_json(data, true)
        }
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
    let _ = stdout.flush();
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let out = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(out)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stream_items_are_single_lines_by_default() {
        let value = json!({ "kind": "change", "changed": ["state.on"] });
        let out = render_stream_item(&OutputFormat::Table, &value).unwrap();
        assert!(!out.contains('\n'));
        assert!(out.contains("state.on"));
    }

    #[test]
    fn yaml_stream_items_start_a_document() {
        let value = json!({ "kind": "start" });
        let out = render_stream_item(&OutputFormat::Yaml, &value).unwrap();
        assert!(out.starts_with("---\n"));
        assert!(out.contains("kind: start"));
    }

    #[test]
    fn plain_list_is_one_id_per_line() {
        #[derive(Tabled)]
        struct Row {
            path: String,
        }
        let data = vec!["lights/device_id/1".to_string(), "groups/device_id/2".to_string()];
        let out = render_list(
            &OutputFormat::Plain,
            &data,
            |s| Row { path: s.clone() },
            Clone::clone,
        )
        .unwrap();
        assert_eq!(out, "lights/device_id/1\ngroups/device_id/2");
    }
}
