//! Watch handler: run the bridge and print notices as they arrive.

use std::sync::Arc;

use hubflow_core::{Bridge, BridgeConfig, ChannelDirectory, ListenerId};
use tracing::{debug, info};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

const LISTENER: &str = "hubflow-cli";

pub async fn handle(
    config: BridgeConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let query = util::build_query(&args.filter)?;
    let directory = Arc::new(ChannelDirectory::new());
    let listener = ListenerId::new(LISTENER);
    let mut notices = directory.attach(listener.clone());

    let bridge = Bridge::new(config, directory.clone())?;

    for path in &args.paths {
        bridge.register_path(listener.clone(), path.as_str()).await;
    }
    // Without explicit paths, follow every device the query selects.
    if args.paths.is_empty() || util::has_filter(&args.filter) {
        bridge.register_query(listener.clone(), query).await;
    }
    if args.raw {
        bridge.register_raw(listener.clone()).await;
    }

    bridge.start().await?;
    info!(url = %bridge.config().url, "watching gateway, press Ctrl-C to stop");

    let result = loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break signal.map_err(CliError::from);
            }
            notice = notices.recv() => {
                let Some(notice) = notice else {
                    debug!("listener detached");
                    break Ok(());
                };
                match output::render_stream_item(&global.output, &notice) {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    bridge.remove_listener(&listener).await;
    directory.detach(&listener);
    bridge.shutdown().await;
    result
}
