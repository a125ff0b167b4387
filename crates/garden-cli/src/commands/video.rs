//! Video URL command implementation.

use std::time::Duration;

use anyhow::Result;

use garden_core::{Config, NoticeLevel, Session};

use crate::format::FormatOptions;
use crate::style;
use crate::util::{open_session, settle};

pub async fn cmd_video_url(
    loaded: Result<Config>,
    wait: Duration,
    opts: &FormatOptions,
) -> Result<()> {
    let mut session = open_session(loaded).await;
    settle_if_needed(&mut session, wait).await;

    match session.frame().video_url {
        Some(url) => println!("{}", url),
        None => eprintln!(
            "{}",
            style::format_notice(
                NoticeLevel::Warning,
                "Stream host not set. Use --stream-host or STREAM_HOST.",
                opts.no_color
            )
        ),
    }

    session.shutdown().await;
    Ok(())
}

/// A configured stream host never needs device data.
async fn settle_if_needed(session: &mut Session, wait: Duration) {
    if session.config().video.stream_host.is_none() {
        settle(session, wait).await;
    }
}
