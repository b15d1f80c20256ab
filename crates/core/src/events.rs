use std::ops::Range;

use crate::core::Attrs;
use crate::ops::Path;

/// What moved the selection. Fixers only react to pointer-driven moves;
/// the balloon reacts to all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Pointer,
    Api,
    Mutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Delete,
    Enter,
    Escape,
    Tab,
}

/// Synchronous notifications drained after each change block completes.
/// Handlers never observe a half-applied tree.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    SelectionChanged {
        source: SelectionSource,
        collapsed: bool,
    },
    /// Content was inserted at a collapsed caret (paste or programmatic
    /// insertion, not plain typing). `range` is the inserted global inline
    /// range within `block`, measured before normalization.
    ContentInserted {
        block: Path,
        range: Range<usize>,
    },
    /// A non-collapsed selection was replaced by typed content.
    /// `replaced_attrs` carries the replaced range's attributes when the
    /// whole range sat inside a single anchored run, captured before the
    /// deletion.
    ContentReplaced {
        block: Path,
        range: Range<usize>,
        replaced_attrs: Option<Attrs>,
    },
    /// Content was removed without replacement. `deleted_attrs` carries the
    /// attributes of the removed content at the deletion point.
    ContentDeleted {
        backward: bool,
        deleted_attrs: Attrs,
    },
    KeyPressed {
        key: Key,
    },
    DocumentChanged {
        source: Option<String>,
    },
}

/// Fixed handler tiers. Handlers run tier by tier in declaration order —
/// never in incidental registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    Normal,
    Low,
}
