/// A live status line for a long-running operation.
pub trait Progress: Send + Sync {
    /// Set the label shown in front of the status line (e.g., "Scanning").
    fn set_phase(&self, phase: &str);

    /// Install the callback that renders the status message.
    ///
    /// The callback is polled periodically; the total amount of work is never known up front.
    fn set_status(&self, callback: Box<dyn Fn() -> String + Send + Sync + 'static>);

    /// Print a message line without disrupting the status line.
    fn println(&self, msg: &str);

    /// Finish and clear the status line.
    fn done(&self);

    /// Whether the status message may contain ANSI colors.
    fn use_colors(&self) -> bool;
}
