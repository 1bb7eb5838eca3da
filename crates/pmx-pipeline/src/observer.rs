//! Stage observation for progress UI.

use crate::stage::TradeStage;
use parking_lot::Mutex;

/// Receives every stage transition with its display message.
///
/// The pipeline is UI-framework-agnostic; hosts implement this to drive
/// whatever progress surface they have.
pub trait StageObserver: Send + Sync {
    fn stage_changed(&self, stage: TradeStage, message: &str);
}

/// Observer that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStageObserver;

impl StageObserver for NullStageObserver {
    fn stage_changed(&self, _stage: TradeStage, _message: &str) {}
}

/// Observer recording transitions, for tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<(TradeStage, String)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(TradeStage, String)> {
        self.transitions.lock().clone()
    }

    pub fn stages(&self) -> Vec<TradeStage> {
        self.transitions.lock().iter().map(|(s, _)| *s).collect()
    }
}

impl StageObserver for RecordingObserver {
    fn stage_changed(&self, stage: TradeStage, message: &str) {
        self.transitions.lock().push((stage, message.to_string()));
    }
}
