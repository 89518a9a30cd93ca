#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// The listing is open and sorted latest first.
    Started,
    /// Every record element on the current page was scanned, or scanning
    /// stopped early at a record older than the target date.
    PageScanned { passed_target_date: bool },
    /// Navigation was attempted and verified (`advanced`) or not.
    NavigationSettled { advanced: bool },
}
