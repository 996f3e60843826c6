//! Progress reporting trait for scan sessions.

/// Event emitted while a scan session runs.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Name of the item currently being scanned.
    pub current_item: String,
    /// Items processed so far (emitted + skipped + dropped).
    pub processed: u32,
    /// Total candidates, when known up front.
    pub total: Option<u32>,
}

/// Trait for receiving progress updates. Implement this to integrate with
/// status lines, GUI displays, or FFI callbacks.
pub trait ProgressHandler: Send {
    fn on_progress(&self, event: ProgressEvent);
}

/// A no-op progress handler for when progress reporting is not needed.
pub struct NoopProgress;

impl ProgressHandler for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Helper to emit a progress event if a handler is provided.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    current_item: &str,
    processed: u32,
    total: Option<u32>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            current_item: current_item.to_string(),
            processed,
            total,
        });
    }
}
