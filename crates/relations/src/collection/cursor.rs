//! Iteration Cursor - Position tracking that survives removals
//!
//! A collection keeps a single cursor over its ordered key space. Removing
//! the element under the cursor lands the cursor on the following element,
//! so the next advance must not move it again; removing an element before the
//! cursor shifts the position back by one; removing after it changes nothing.

/// Cursor state of a collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
    landed: bool,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position in the ordered key space
    pub fn position(&self) -> usize {
        self.position
    }

    /// True when the element under the cursor was removed and the cursor
    /// already sits on its successor
    pub fn is_landed(&self) -> bool {
        self.landed
    }

    pub fn rewind(&mut self) {
        self.position = 0;
        self.landed = false;
    }

    /// Move to the next element
    pub fn advance(&mut self) {
        if self.landed {
            self.landed = false;
        } else {
            self.position += 1;
        }
    }

    /// Record the removal of the element at `index`
    pub fn removed(&mut self, index: usize) {
        if index < self.position {
            self.position -= 1;
        } else if index == self.position {
            self.landed = true;
        }
    }

    /// Record the insertion of an element at `index`
    pub fn inserted(&mut self, index: usize) {
        if index < self.position {
            self.position += 1;
        }
    }
}
