//! Ownership bookkeeping for one function body: which names own their
//! value, which have given it away, which merely borrow.

use std::collections::HashMap;

use crate::ast::{DeclId, SourceOrigin, Type};

/// Ownership of a binding within its lexical scope.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum OwnershipState {
    /// Freshly allocated; the scope must free it exactly once.
    Owned,
    /// Ownership was transferred; any further use is an error.
    Moved { at: SourceOrigin },
    /// A reference to something owned elsewhere; must not be freed or
    /// moved out.
    Borrowed,
    /// Static-storage value; nothing to track.
    Literal,
}

#[derive(Clone, Debug)]
pub(crate) struct OwnershipEntry {
    pub name: String,
    pub state: OwnershipState,
    pub ty: Option<Type>,
    pub heap: bool,
    /// Whether the entry is a parameter of the enclosing function (as
    /// opposed to a let binding); picks the error kind on misuse.
    pub is_param: bool,
}

/// Frame-stacked ownership scope. Lookups walk innermost-out; state
/// updates hit the frame the entry lives in.
#[derive(Clone, Debug, Default)]
pub(crate) struct OwnershipScope {
    frames: Vec<HashMap<DeclId, OwnershipEntry>>,
}

impl OwnershipScope {
    pub(crate) fn new() -> OwnershipScope {
        OwnershipScope {
            frames: vec![HashMap::new()],
        }
    }

    pub(crate) fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn insert(&mut self, id: DeclId, entry: OwnershipEntry) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(id, entry);
        }
    }

    pub(crate) fn get(&self, id: &DeclId) -> Option<&OwnershipEntry> {
        self.frames.iter().rev().find_map(|frame| frame.get(id))
    }

    pub(crate) fn set_state(&mut self, id: &DeclId, state: OwnershipState) {
        for frame in self.frames.iter_mut().rev() {
            if let Some(entry) = frame.get_mut(id) {
                entry.state = state;
                return;
            }
        }
    }

    /// Merge the post-branch states of two copies of this scope back into
    /// one: a move on either branch is a move after the conditional.
    pub(crate) fn merge_branches(base: &mut OwnershipScope, left: OwnershipScope, right: OwnershipScope) {
        for (frame, (left_frame, right_frame)) in base
            .frames
            .iter_mut()
            .zip(left.frames.into_iter().zip(right.frames.into_iter()))
        {
            for (id, entry) in frame.iter_mut() {
                let moved = [&left_frame, &right_frame]
                    .iter()
                    .filter_map(|f| f.get(id))
                    .find(|e| matches!(e.state, OwnershipState::Moved { .. }));
                if let Some(moved_entry) = moved {
                    entry.state = moved_entry.state.clone();
                }
            }
        }
    }
}
