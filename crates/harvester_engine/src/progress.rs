use std::sync::mpsc;

use crate::{EngineEvent, RunProgress};

pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: RunProgress);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _progress: RunProgress) {}
}

#[derive(Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(sender: mpsc::Sender<EngineEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, progress: RunProgress) {
        let _ = self.sender.send(EngineEvent::Progress(progress));
    }
}
