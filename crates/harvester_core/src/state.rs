use crate::run::AbortReason;

/// Where the collection loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not started yet.
    #[default]
    Idle,
    ScanningPage,
    DecidingStop,
    Navigating,
    Done,
    Aborted(AbortReason),
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted(_))
    }
}

/// Page bounds and the navigation failure budget for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub min_pages: u32,
    pub max_pages: u32,
    /// Abort once consecutive failures exceed this.
    pub nav_failure_threshold: u32,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            min_pages: 1200,
            max_pages: 5000,
            nav_failure_threshold: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    limits: LoopLimits,
    phase: Phase,
    page_number: u32,
    passed_target_date: bool,
    consecutive_nav_failures: u32,
}

impl LoopState {
    pub fn new(limits: LoopLimits) -> Self {
        Self {
            limits,
            phase: Phase::Idle,
            page_number: 0,
            passed_target_date: false,
            consecutive_nav_failures: 0,
        }
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn passed_target_date(&self) -> bool {
        self.passed_target_date
    }

    pub fn consecutive_nav_failures(&self) -> u32 {
        self.consecutive_nav_failures
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn set_page_number(&mut self, page_number: u32) {
        self.page_number = page_number;
    }

    pub(crate) fn mark_passed_target_date(&mut self) {
        self.passed_target_date = true;
    }

    pub(crate) fn record_nav_failure(&mut self) -> u32 {
        self.consecutive_nav_failures += 1;
        self.consecutive_nav_failures
    }

    pub(crate) fn reset_nav_failures(&mut self) {
        self.consecutive_nav_failures = 0;
    }
}
