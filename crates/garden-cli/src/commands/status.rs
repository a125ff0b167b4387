//! Status command implementation.

use std::time::Duration;

use anyhow::Result;

use garden_core::Config;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_frame, format_status_json};
use crate::util::{open_session, settle};

pub async fn cmd_status(
    loaded: Result<Config>,
    format: OutputFormat,
    wait: Duration,
    opts: &FormatOptions,
) -> Result<()> {
    let mut session = open_session(loaded).await;
    settle(&mut session, wait).await;
    let device_id = session.config().device_id.clone();

    let frame = session.frame();
    let content = match format {
        OutputFormat::Text => format_frame(&frame, opts),
        OutputFormat::Json => {
            format_status_json(&device_id, &frame, session.diagnostics().snapshot(), opts)?
        }
    };
    print!("{}", content);

    session.shutdown().await;
    Ok(())
}
