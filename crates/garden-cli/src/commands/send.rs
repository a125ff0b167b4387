//! Send command implementation.

use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use garden_core::{Config, Control, Session};

use crate::format::FormatOptions;
use crate::style;

/// Send one command once the device state is known.
///
/// The mode guard needs the current mode, so the session is settled first.
pub async fn cmd_send(
    config: Config,
    control: Control,
    wait: Duration,
    opts: &FormatOptions,
) -> Result<()> {
    let mut session = Session::start(config).await;
    crate::util::settle(&mut session, wait).await;

    let result = session.dispatch(control.command()).await;
    session.shutdown().await;

    match result {
        Ok(ack) => {
            info!("{} acknowledged by transport", ack.command);
            println!(
                "{}",
                style::format_notice(
                    garden_core::NoticeLevel::Success,
                    &format!("Command sent: {}", ack.command),
                    opts.no_color
                )
            );
            Ok(())
        }
        Err(e) => bail!("{}", e),
    }
}
