//! Module: stream
//! Responsibility: the pull-to-push seam for reactive wrappers.
//! The storage core stays a pull cursor; this adaptor translates
//! subscriber demand into `next_entry` calls, checks a cancel flag before
//! every pull, and reports completion when the cursor exhausts.

use burrowdb_core::{codec::Codec, cursor::Cursor, error::Error};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

///
/// StreamState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamState {
    /// Demand was satisfied; more elements may remain.
    Active,
    /// The cursor exhausted during this request.
    Complete,
    /// The cancel handle fired; no further pulls will happen.
    Cancelled,
}

///
/// CancelHandle
///
/// Shareable cancellation flag. Cancelling takes effect before the next
/// pull; an element already being delivered is not interrupted.
///

#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

///
/// CursorStream
///
/// Demand-driven wrapper around one cursor. The subscriber's thread drives
/// the pulls; nothing here is asynchronous.
///

pub struct CursorStream<C: Codec> {
    cursor: Cursor<C>,
    cancel: CancelHandle,
    state: StreamState,
}

impl<C: Codec> CursorStream<C> {
    #[must_use]
    pub fn new(cursor: Cursor<C>) -> Self {
        Self {
            cursor,
            cancel: CancelHandle::default(),
            state: StreamState::Active,
        }
    }

    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    #[must_use]
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// Satisfy up to `demand` elements, invoking `on_next` for each.
    ///
    /// Returns the stream state after the request; once `Complete` or
    /// `Cancelled` is returned, further requests deliver nothing.
    pub fn request(
        &mut self,
        demand: u64,
        mut on_next: impl FnMut(C::Item),
    ) -> Result<StreamState, Error> {
        for _ in 0..demand {
            if self.state != StreamState::Active {
                return Ok(self.state);
            }
            if self.cancel.is_cancelled() {
                self.state = StreamState::Cancelled;
                return Ok(self.state);
            }

            match self.cursor.next_entry()? {
                Some(item) => on_next(item),
                None => {
                    self.state = StreamState::Complete;
                    return Ok(self.state);
                }
            }
        }

        Ok(self.state)
    }
}
