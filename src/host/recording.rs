use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::core::Rect;
use crate::overlay::plane::{OverlayPlane, PlaneSource};

/// One call made on a [`RecordingPlane`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneOp {
    /// `show`.
    Show,
    /// `hide`.
    Hide,
    /// `set_output_window`.
    Output(Rect),
    /// `set_rgb_input_buffer`.
    Source(PlaneSource),
    /// `wait_for_vsync`.
    Vsync,
}

#[derive(Debug, Default)]
struct LogInner {
    ops: Vec<PlaneOp>,
    visible: bool,
    output: Option<Rect>,
    source: Option<PlaneSource>,
}

/// Shared view of what a [`RecordingPlane`] was asked to do.
#[derive(Clone, Debug, Default)]
pub struct PlaneLog {
    inner: Rc<RefCell<LogInner>>,
}

impl PlaneLog {
    /// Every operation so far, oldest first.
    pub fn ops(&self) -> Vec<PlaneOp> {
        self.inner.borrow().ops.clone()
    }

    /// Forget recorded operations; plane state is kept.
    pub fn clear(&self) {
        self.inner.borrow_mut().ops.clear();
    }

    /// `true` between `show` and `hide`.
    pub fn visible(&self) -> bool {
        self.inner.borrow().visible
    }

    /// Last output window.
    pub fn output(&self) -> Option<Rect> {
        self.inner.borrow().output
    }

    /// Last input buffer.
    pub fn source(&self) -> Option<PlaneSource> {
        self.inner.borrow().source
    }

    /// Number of recorded operations matching `pred`.
    pub fn count(&self, pred: impl Fn(&PlaneOp) -> bool) -> usize {
        self.inner.borrow().ops.iter().filter(|op| pred(op)).count()
    }
}

/// Overlay plane that records calls instead of touching hardware.
#[derive(Debug, Default)]
pub struct RecordingPlane {
    log: PlaneLog,
}

impl RecordingPlane {
    /// A hidden plane and the log observing it.
    pub fn new() -> (Self, PlaneLog) {
        let plane = Self::default();
        let log = plane.log.clone();
        (plane, log)
    }

    fn record(&self, op: PlaneOp) {
        let mut inner = self.log.inner.borrow_mut();
        match op {
            PlaneOp::Show => inner.visible = true,
            PlaneOp::Hide => inner.visible = false,
            PlaneOp::Output(r) => inner.output = Some(r),
            PlaneOp::Source(s) => inner.source = Some(s),
            PlaneOp::Vsync => {}
        }
        tracing::trace!(?op, "overlay plane");
        inner.ops.push(op);
    }
}

impl OverlayPlane for RecordingPlane {
    fn show(&mut self) {
        self.record(PlaneOp::Show);
    }

    fn hide(&mut self) {
        self.record(PlaneOp::Hide);
    }

    fn set_output_window(&mut self, rect: Rect) {
        self.record(PlaneOp::Output(rect));
    }

    fn set_rgb_input_buffer(&mut self, source: &PlaneSource) {
        self.record(PlaneOp::Source(*source));
    }

    fn wait_for_vsync(&mut self) {
        self.record(PlaneOp::Vsync);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/recording.rs"]
mod tests;
