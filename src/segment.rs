//! Content segment buffer
//!
//! Accumulates streamed text for one turn. A turn's output is split into
//! segments around tool activity; only the newest segment receives text, and
//! every append yields the segment's whole text because the downstream
//! renderer re-renders from scratch.

use serde::Serialize;

/// One contiguous block of response text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
struct Segment {
    text: String,
}

/// Outcome of [`SegmentBuffer::append`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Index of the segment that received the text
    pub segment: usize,
    /// Whether that segment was opened by this append
    pub opened: bool,
    /// Full accumulated text of the segment
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentBuffer {
    segments: Vec<Segment>,
    /// Tool activity was seen and no segment has been opened since
    tool_activity_pending: bool,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the active segment.
    ///
    /// Opens the first segment if none exists, or a fresh one if tool activity
    /// happened since the active segment was opened.
    pub fn append(&mut self, fragment: &str) -> AppendOutcome {
        let opened = if self.segments.is_empty() || self.tool_activity_pending {
            self.open_new_segment();
            true
        } else {
            false
        };
        let segment = self.segments.len() - 1;
        let active = &mut self.segments[segment];
        active.text.push_str(fragment);
        AppendOutcome {
            segment,
            opened,
            text: active.text.clone(),
        }
    }

    /// Start a new empty segment; earlier segments keep their text but no
    /// longer receive appends.
    pub fn open_new_segment(&mut self) -> usize {
        self.segments.push(Segment::default());
        self.tool_activity_pending = false;
        self.segments.len() - 1
    }

    /// Return the active segment, opening the first one if needed
    pub fn ensure_active(&mut self) -> (usize, bool) {
        match self.active() {
            Some(index) => (index, false),
            None => (self.open_new_segment(), true),
        }
    }

    /// Record that a tool finished; the next fragment goes to a new segment
    pub fn note_tool_activity(&mut self) {
        self.tool_activity_pending = true;
    }

    pub fn tool_activity_pending(&self) -> bool {
        self.tool_activity_pending
    }

    pub fn active(&self) -> Option<usize> {
        self.segments.len().checked_sub(1)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn text(&self, segment: usize) -> Option<&str> {
        self.segments.get(segment).map(|s| s.text.as_str())
    }

    /// Whether any segment received text
    pub fn has_content(&self) -> bool {
        self.segments.iter().any(|s| !s.text.is_empty())
    }
}
