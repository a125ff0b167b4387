//! Colors for the text dashboard.

use owo_colors::OwoColorize;

use garden_core::{ConnectionStatus, Mode, NoticeLevel};

/// Connection indicator with a leading dot.
pub fn format_status(status: ConnectionStatus, no_color: bool) -> String {
    let text = format!("● {}", status);
    if no_color {
        return text;
    }
    match status {
        ConnectionStatus::ConnectedWithData => text.green().to_string(),
        ConnectionStatus::ConnectedNoData => text.yellow().to_string(),
        ConnectionStatus::Disconnected => text.red().to_string(),
    }
}

pub fn format_mode(mode: Mode, no_color: bool) -> String {
    let text = mode.to_string();
    if no_color {
        return text;
    }
    match mode {
        Mode::Auto => text.cyan().bold().to_string(),
        Mode::Manual => text.magenta().bold().to_string(),
        Mode::Unknown => text.dimmed().to_string(),
    }
}

pub fn format_pump(pump_on: Option<bool>, no_color: bool) -> String {
    let text = match pump_on {
        Some(true) => "ON",
        Some(false) => "OFF",
        None => "N/A",
    };
    if no_color {
        return text.to_string();
    }
    match pump_on {
        Some(true) => text.green().bold().to_string(),
        Some(false) => text.to_string(),
        None => text.dimmed().to_string(),
    }
}

/// Prefix a notice with its level.
pub fn format_notice(level: NoticeLevel, message: &str, no_color: bool) -> String {
    let label = match level {
        NoticeLevel::Success => "[ok]",
        NoticeLevel::Warning => "[warning]",
        NoticeLevel::Error => "[error]",
        NoticeLevel::Unavailable => "[unavailable]",
    };
    if no_color {
        return format!("{} {}", label, message);
    }
    let label = match level {
        NoticeLevel::Success => label.green().to_string(),
        NoticeLevel::Warning => label.yellow().to_string(),
        NoticeLevel::Error | NoticeLevel::Unavailable => label.red().bold().to_string(),
    };
    format!("{} {}", label, message)
}

pub fn format_heading(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.bold().underline().to_string()
    }
}

pub fn format_label(text: &str, no_color: bool) -> String {
    if no_color {
        text.to_string()
    } else {
        text.dimmed().to_string()
    }
}
