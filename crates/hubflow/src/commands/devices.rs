//! Device command handlers.

use hubflow_core::{Bridge, BridgeConfig, CoreError, Device};
use serde_json::{Map, Value};
use tabled::Tabled;

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

/// State attributes shown in the table view before truncating.
const STATE_PREVIEW: usize = 3;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            path: d.device_path.clone(),
            name: d.name.clone(),
            dtype: d.device_type.clone().unwrap_or_default(),
            state: preview(&d.state),
        }
    }
}

fn preview(attrs: &Map<String, Value>) -> String {
    let mut parts: Vec<String> = attrs
        .iter()
        .take(STATE_PREVIEW)
        .map(|(k, v)| format!("{k}={}", scalar(v)))
        .collect();
    if attrs.len() > STATE_PREVIEW {
        parts.push("…".into());
    }
    parts.join(" ")
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn detail(d: &Device) -> String {
    let mut lines = vec![
        format!("Path:     {}", d.device_path),
        format!("Domain:   {}", d.domain),
        format!("ID:       {}", d.id),
        format!("Name:     {}", d.name),
        format!("Type:     {}", d.device_type.as_deref().unwrap_or("-")),
        format!("UniqueID: {}", d.uniqueid.as_deref().unwrap_or("-")),
    ];
    for (section, attrs) in [("State", &d.state), ("Config", &d.config)] {
        if attrs.is_empty() {
            continue;
        }
        lines.push(format!("{section}:"));
        for (k, v) in attrs {
            lines.push(format!("  {k}: {}", scalar(v)));
        }
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    config: BridgeConfig,
    args: DevicesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List(filter) => {
            let query = util::build_query(&filter)?;
            let devices = Bridge::oneshot(config, |bridge| async move {
                bridge.devices(&query).await
            })
            .await?;

            let out = output::render_list(&global.output, &devices, |d: &Device| DeviceRow::from(d), |d| {
                d.device_path.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        DevicesCommand::Get { path } => {
            let device = Bridge::oneshot(config, |bridge| async move {
                bridge
                    .device_by_path(&path)
                    .await
                    .ok_or(CoreError::DeviceNotFound { identifier: path })
            })
            .await?;

            let out = output::render_single(&global.output, &device, detail, |d| {
                d.device_path.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
