//! The two one-directional channels between the controller and a sampling
//! loop. Nothing else crosses that boundary.
//!
//! - Annotations (controller → loop) live in a single-slot mailbox: publishing
//!   replaces whatever the loop has not read yet, so the loop only ever sees
//!   the controller's latest state and never works through a backlog.
//! - Display messages (loop → controller) are queued and read without
//!   blocking; a line the controller does not pick up this tick is shown on a
//!   later one.

use tokio::sync::{mpsc, watch};

use super::annotation::Annotation;

/// What the sampling loop shows the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayMessage {
    /// Column header for the rows that follow.
    Header(String),
    /// One formatted sample row, including plausibility warnings.
    Row(String),
    /// One-line advisory, e.g. degraded hardware or a failed log write.
    Diagnostic(String),
}

pub struct AnnotationSender {
    tx: watch::Sender<Option<Annotation>>,
}

impl AnnotationSender {
    /// Replace the mailbox contents with `annotation`.
    pub fn publish(&self, annotation: Annotation) {
        // send_replace stores the value even when the loop has already exited
        self.tx.send_replace(Some(annotation));
    }
}

pub struct AnnotationReceiver {
    rx: watch::Receiver<Option<Annotation>>,
}

impl AnnotationReceiver {
    /// The newest annotation published since the last call, if any. Never
    /// blocks.
    pub fn take_latest(&mut self) -> Option<Annotation> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            Ok(false) | Err(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct DisplaySender {
    tx: mpsc::UnboundedSender<DisplayMessage>,
}

impl DisplaySender {
    /// Queue a message. A controller that stopped listening is not an error
    /// for the loop.
    pub fn send(&self, message: DisplayMessage) {
        let _ = self.tx.send(message);
    }
}

pub struct DisplayReceiver {
    rx: mpsc::UnboundedReceiver<DisplayMessage>,
}

impl DisplayReceiver {
    pub fn try_next(&mut self) -> Option<DisplayMessage> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<DisplayMessage> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Controller's ends of a session's channels.
pub struct ControllerEnds {
    pub annotations: AnnotationSender,
    pub display: DisplayReceiver,
}

/// Sampling loop's ends of a session's channels.
pub struct WorkerEnds {
    pub annotations: AnnotationReceiver,
    pub display: DisplaySender,
}

/// Fresh channel pair for a new session.
pub fn session_channels() -> (ControllerEnds, WorkerEnds) {
    let (annotation_tx, annotation_rx) = watch::channel(None);
    let (display_tx, display_rx) = mpsc::unbounded_channel();
    (
        ControllerEnds {
            annotations: AnnotationSender { tx: annotation_tx },
            display: DisplayReceiver { rx: display_rx },
        },
        WorkerEnds {
            annotations: AnnotationReceiver { rx: annotation_rx },
            display: DisplaySender { tx: display_tx },
        },
    )
}
