/// Renders text into a scannable image
pub trait QrRenderer: Send + Sync {
    /// PNG bytes, or `None` when rendering is unavailable or fails
    fn render(&self, text: &str) -> Option<Vec<u8>>;
}
