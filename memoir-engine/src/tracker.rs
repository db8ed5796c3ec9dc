//! Thread-local dependency tracking
//!
//! Every memoized execution opens a [`TrackingScope`], which pushes one
//! frame onto the current thread's stack. [`track`] adds a descriptor to
//! every open frame, so an inner computation's dependencies also reach
//! every enclosing computation still being recorded. With no scope open,
//! tracking is a silent no-op and instrumented code runs unchanged.

use memoir_core::{DependencySet, Descriptor};
use std::cell::RefCell;

thread_local! {
    static FRAMES: RefCell<Vec<DependencySet>> = const { RefCell::new(Vec::new()) };
}

/// Record a dependency in every scope open on this thread.
///
/// Does nothing when no scope is open.
pub fn track(descriptor: Descriptor) {
    FRAMES.with(|frames| {
        for frame in frames.borrow_mut().iter_mut() {
            frame.insert(descriptor.clone());
        }
    });
}

/// Merge a previously collected set into every scope open on this thread.
///
/// This is how a cache hit propagates the stored entry's dependencies to
/// whatever computation is consuming it, without re-running anything.
pub fn replay(deps: &DependencySet) {
    FRAMES.with(|frames| {
        for frame in frames.borrow_mut().iter_mut() {
            frame.merge(deps);
        }
    });
}

/// Number of scopes currently open on this thread.
pub fn scope_depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// One frame of dependency recording, scoped to its owner's lifetime.
///
/// # Design
///
/// Scopes nest strictly: each memoized execution enters before running the
/// wrapped computation and finishes after, so frames form a stack that
/// mirrors the call stack. Dropping an unfinished scope pops its frame and
/// discards what it collected, which is the right outcome for a failed
/// computation: nothing was cached, so nothing should be indexed, and the
/// next call on this thread starts clean.
#[derive(Debug)]
pub struct TrackingScope {
    finished: bool,
}

impl TrackingScope {
    /// Push a fresh frame and return the scope that owns it.
    pub fn enter() -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(DependencySet::new()));
        Self { finished: false }
    }

    /// Pop this scope's frame and return everything it collected.
    pub fn finish(mut self) -> DependencySet {
        self.finished = true;
        FRAMES
            .with(|frames| frames.borrow_mut().pop())
            .unwrap_or_default()
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if !self.finished {
            FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
