//! Step reporting for the boundary sweep.

/// Callback invoked by the sweep with `(visited, listed, message)` after
/// each candidate cell.
pub struct Progress {
    callback: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
}

impl Progress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    #[inline]
    pub fn report(&self, visited: usize, listed: usize, message: &str) {
        (self.callback)(visited, listed, message);
    }
}
