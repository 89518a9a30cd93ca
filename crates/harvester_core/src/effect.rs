use crate::run::RunOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ScanPage { page_number: u32 },
    Navigate { from_page: u32 },
    /// Wait the retry delay, then navigate again from the same page.
    RetryNavigation { from_page: u32, failures: u32 },
    Finish(RunOutcome),
}
