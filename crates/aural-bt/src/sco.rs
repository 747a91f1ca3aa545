//! Shared SCO object for an HFP iodev pair.

use aural_core::Direction;

/// Opaque token for an established SCO socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoLink(pub u64);

/// The SCO link shared between the input and output halves of an HFP pair.
///
/// The first opener wires the link up; the last closer tears it down. The
/// per-direction attach flags are the reference count.
#[derive(Debug, Default)]
pub struct Sco {
    link: Option<ScoLink>,
    attached: [bool; Direction::COUNT],
}

impl Sco {
    /// Unwired SCO object.
    pub fn new() -> Self {
        Self::default()
    }

    /// The established link, if any.
    pub fn link(&self) -> Option<ScoLink> {
        self.link
    }

    /// Store the established link.
    pub fn set_link(&mut self, link: ScoLink) {
        self.link = Some(link);
    }

    /// Tear the link down.
    pub fn close_link(&mut self) -> Option<ScoLink> {
        self.link.take()
    }

    /// Mark a direction's iodev as attached.
    pub fn add_iodev(&mut self, direction: Direction) {
        self.attached[direction.index()] = true;
    }

    /// Mark a direction's iodev as detached.
    pub fn rm_iodev(&mut self, direction: Direction) {
        self.attached[direction.index()] = false;
    }

    /// Whether any half is still attached.
    pub fn has_iodev(&self) -> bool {
        self.attached.iter().any(|&a| a)
    }
}
