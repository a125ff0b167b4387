//! The boundary to the presentation layer.

use garden_types::{DeviceSnapshot, Mode};

use crate::dispatch::Control;
use crate::notice::Notice;
use crate::state::StateView;
use crate::transport::TransportKind;

/// Everything a renderer needs for one pass.
///
/// A frame is a copy: renderers cannot reach back into the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Device state and connection status.
    pub view: StateView,
    /// Notices still on screen.
    pub notices: Vec<Notice>,
    /// Camera feed URL, if known.
    pub video_url: Option<String>,
    /// Active transport, `None` while unavailable.
    pub transport: Option<TransportKind>,
}

impl Frame {
    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.view.snapshot
    }

    /// Displayed mode; `Unknown` until the device reports one.
    pub fn mode(&self) -> Mode {
        self.view.snapshot.mode.unwrap_or_default()
    }

    /// Whether `control` should be offered.
    pub fn is_enabled(&self, control: Control) -> bool {
        control.is_enabled(self.mode())
    }
}

/// Draws frames.
///
/// Called once per refresh cycle from the session's task, never from a
/// transport's background task.
pub trait Render {
    fn render(&mut self, frame: &Frame);
}

impl<F> Render for F
where
    F: FnMut(&Frame),
{
    fn render(&mut self, frame: &Frame) {
        self(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;

    #[test]
    fn test_controls_follow_mode() {
        let store = StateStore::new();
        let mut frame = Frame {
            view: store.current_view(),
            notices: Vec::new(),
            video_url: None,
            transport: None,
        };
        assert_eq!(frame.mode(), Mode::Unknown);
        assert!(!frame.is_enabled(Control::PumpOn));
        assert!(frame.is_enabled(Control::ToggleMode));

        frame.view.snapshot.mode = Some(Mode::Manual);
        assert!(frame.is_enabled(Control::PumpOff));
    }

    #[test]
    fn test_closure_renderer() {
        let mut count = 0;
        let mut renderer = |_: &Frame| count += 1;
        let frame = Frame {
            view: StateStore::new().current_view(),
            notices: Vec::new(),
            video_url: None,
            transport: None,
        };
        renderer.render(&frame);
        renderer.render(&frame);
        assert_eq!(count, 2);
    }
}
