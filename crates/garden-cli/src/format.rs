//! Text and JSON rendering of dashboard frames.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use garden_core::{Control, DeviceSnapshot, DiagnosticsReport, Frame, Render, TransportKind};

use crate::style;

/// Placeholder for values the device has not reported.
pub const MISSING: &str = "N/A";

/// Shown when the snapshot has no forecast text.
pub const NO_FORECAST: &str = "No forecast available.";

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            compact: false,
        }
    }
}

/// Two decimals and a unit, or the placeholder.
pub fn format_float(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2} {}", v, unit),
        None => MISSING.to_string(),
    }
}

/// Raw sensor counts get a `(raw)` suffix.
pub fn format_raw(value: Option<i64>) -> String {
    match value {
        Some(v) => format!("{} (raw)", v),
        None => MISSING.to_string(),
    }
}

fn format_time(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| MISSING.to_string())
}

fn control_line(frame: &Frame, opts: &FormatOptions) -> String {
    [
        ("on", Control::PumpOn),
        ("off", Control::PumpOff),
        ("mode", Control::ToggleMode),
    ]
    .iter()
    .map(|(key, control)| {
        let entry = format!("[{}] {}", key, control.label());
        if frame.is_enabled(*control) {
            entry
        } else {
            style::format_label(&format!("{} (disabled)", entry), opts.no_color)
        }
    })
    .collect::<Vec<_>>()
    .join("   ")
}

/// Render a frame as a plain-text dashboard.
pub fn format_frame(frame: &Frame, opts: &FormatOptions) -> String {
    let snapshot: &DeviceSnapshot = frame.snapshot();
    let nc = opts.no_color;
    let label = |text: &str| style::format_label(text, nc);
    let mut out = String::new();

    out.push_str(&style::format_heading("Smart Garden Dashboard", nc));
    out.push('\n');
    out.push_str(&format!(
        "{} {}\n",
        label("Connection:"),
        style::format_status(frame.view.status, nc)
    ));
    if let Some(kind) = frame.transport {
        let source = match kind {
            TransportKind::Pull => "record store",
            TransportKind::Push => "MQTT broker",
        };
        out.push_str(&format!("{} {}\n", label("Source:"), source));
    }
    if frame.view.last_update.is_some() {
        out.push_str(&format!(
            "{} {}\n",
            label("Updated:"),
            format_time(frame.view.last_update)
        ));
    }
    if !frame.view.status.is_connected()
        && let Some(error) = &frame.view.last_error
    {
        out.push_str(&format!("{} {}\n", label("Last error:"), error));
    }

    out.push_str(&format!(
        "\n{}\n  {}\n",
        style::format_heading(
            &format!(
                "Daily forecast for {}",
                snapshot.city.as_deref().unwrap_or(MISSING)
            ),
            nc
        ),
        snapshot.forecast_description.as_deref().unwrap_or(NO_FORECAST)
    ));

    out.push_str(&format!("\n{}\n", style::format_heading("Live sensor data", nc)));
    let rows = [
        ("Air temp", format_float(snapshot.air_temp, "°C")),
        ("Air humidity", format_float(snapshot.air_humidity, "%")),
        ("Light", format_float(snapshot.light_lux, "lux")),
        ("Soil", format_raw(snapshot.soil_moisture)),
        ("Water", format_raw(snapshot.water_level)),
        ("Last motion", format_time(snapshot.last_motion_time)),
    ];
    for (name, value) in rows {
        out.push_str(&format!("  {} {}\n", label(&format!("{:<13}", name)), value));
    }

    out.push_str(&format!("\n{}\n", style::format_heading("Live feed", nc)));
    match &frame.video_url {
        Some(url) => out.push_str(&format!("  {}\n", url)),
        None => out.push_str(&format!(
            "  {}\n",
            style::format_notice(
                garden_core::NoticeLevel::Warning,
                "Stream host not set.",
                nc
            )
        )),
    }
    out.push_str(&format!(
        "  Detected fingers: {}\n",
        snapshot
            .finger_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| MISSING.to_string())
    ));
    out.push_str(&format!("  {}\n", label("Show 2 fingers to toggle modes.")));

    let mode = match snapshot.mode {
        Some(mode) => style::format_mode(mode, nc),
        None => MISSING.to_string(),
    };
    out.push_str(&format!("\nMode: {}\n", mode));
    out.push_str(&format!(
        "Pump: {}\n",
        style::format_pump(snapshot.pump_on, nc)
    ));
    out.push_str(&format!("{}\n", label("Manual control (only in MANUAL mode)")));
    out.push_str(&format!("  {}\n", control_line(frame, opts)));

    if !frame.notices.is_empty() {
        out.push('\n');
        for notice in &frame.notices {
            out.push_str(&style::format_notice(notice.level, &notice.message, nc));
            out.push('\n');
        }
    }

    out
}

/// Machine-readable status.
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub device_id: &'a str,
    pub status: garden_core::ConnectionStatus,
    pub status_text: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    pub last_error: Option<&'a str>,
    pub snapshot: &'a DeviceSnapshot,
    pub video_url: Option<&'a str>,
    pub notices: Vec<&'a str>,
    pub diagnostics: DiagnosticsReport,
}

pub fn format_status_json(
    device_id: &str,
    frame: &Frame,
    diagnostics: DiagnosticsReport,
    opts: &FormatOptions,
) -> Result<String> {
    let report = StatusReport {
        device_id,
        status: frame.view.status,
        status_text: frame.view.status.to_string(),
        last_update: frame.view.last_update,
        last_error: frame.view.last_error.as_deref(),
        snapshot: frame.snapshot(),
        video_url: frame.video_url.as_deref(),
        notices: frame.notices.iter().map(|n| n.message.as_str()).collect(),
        diagnostics,
    };
    let json = if opts.compact {
        serde_json::to_string(&report)?
    } else {
        serde_json::to_string_pretty(&report)?
    };
    Ok(json + "\n")
}

/// Writes each frame to a terminal or pipe.
///
/// Identical consecutive frames are written once.
pub struct TextRenderer<W: Write> {
    out: W,
    opts: FormatOptions,
    clear_screen: bool,
    last: Option<String>,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W, opts: FormatOptions, clear_screen: bool) -> Self {
        Self {
            out,
            opts,
            clear_screen,
            last: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, text: &str) -> std::io::Result<()> {
        if self.clear_screen {
            write!(self.out, "\x1b[2J\x1b[H")?;
        } else if self.last.is_some() {
            writeln!(self.out, "{}", "-".repeat(40))?;
        }
        self.out.write_all(text.as_bytes())?;
        self.out.flush()
    }
}

impl<W: Write> Render for TextRenderer<W> {
    fn render(&mut self, frame: &Frame) {
        let text = format_frame(frame, &self.opts);
        if self.last.as_deref() == Some(text.as_str()) {
            return;
        }
        if let Err(e) = self.write_frame(&text) {
            warn!("Failed to write dashboard: {}", e);
        }
        self.last = Some(text);
    }
}
