// SPDX-License-Identifier: Apache-2.0
//! History-recording boundary for undo/redo grouping.

/// Handle for one open history recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingHandle(u64);

impl RecordingHandle {
    /// Constructs a handle from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// External undo/redo recorder.
///
/// Acquisition is best-effort: a `None` handle degrades only undo grouping,
/// never the correctness of the patch result. Every acquired handle is
/// finished exactly once, on every exit path of an apply call.
pub trait ChangeHistory {
    /// Tries to open a recording labelled `label`.
    fn try_begin(&mut self, label: &str) -> Option<RecordingHandle>;

    /// Closes a recording. `commit` is `true` on every engine exit path,
    /// including fatal aborts.
    fn finish(&mut self, handle: RecordingHandle, commit: bool);
}

/// History sink that never records. For hosts without an undo service.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistory;

impl ChangeHistory for NullHistory {
    fn try_begin(&mut self, _label: &str) -> Option<RecordingHandle> {
        None
    }

    fn finish(&mut self, _handle: RecordingHandle, _commit: bool) {}
}

/// One observed history event, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A recording was opened.
    Begun {
        /// Handle that was issued.
        handle: RecordingHandle,
        /// Label supplied by the engine.
        label: String,
    },
    /// A recording was closed.
    Finished {
        /// Handle that was closed.
        handle: RecordingHandle,
        /// Whether the recording was committed.
        commit: bool,
    },
}

/// Recording [`ChangeHistory`] used by the test suites.
#[derive(Debug, Default)]
pub struct RecordingHistory {
    next_raw: u64,
    /// Every event observed, in order.
    pub events: Vec<HistoryEvent>,
}

impl RecordingHistory {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeHistory for RecordingHistory {
    fn try_begin(&mut self, label: &str) -> Option<RecordingHandle> {
        self.next_raw += 1;
        let handle = RecordingHandle::from_raw(self.next_raw);
        self.events.push(HistoryEvent::Begun {
            handle,
            label: label.to_owned(),
        });
        Some(handle)
    }

    fn finish(&mut self, handle: RecordingHandle, commit: bool) {
        self.events.push(HistoryEvent::Finished { handle, commit });
    }
}
