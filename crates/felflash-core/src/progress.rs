//! Progress reporting for long-running flash operations

/// Sink for progress updates
///
/// Purely observational: implementations must not influence the operation.
pub trait Progress {
    /// Called once before the first chunk with the total number of bytes
    fn start(&mut self, total: usize);

    /// Called after each chunk with the number of bytes just completed
    fn update(&mut self, delta: usize);

    /// Called once after the last chunk
    fn finish(&mut self) {}
}

/// Progress sink that ignores all updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _total: usize) {}

    fn update(&mut self, _delta: usize) {}
}
