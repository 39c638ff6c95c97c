//! Forward-only cursor over one keyed stream.
//!
//! `first` and `next` are the only operations that move a cursor. Once the
//! partition is exhausted the cursor stays exhausted, and further `next`
//! calls return [`Fetch::EndOfStream`] without touching the store.

use crate::error::{CycleError, Result};
use crate::store::{Fetch, KeyedStore, StreamHandle, StreamRecord};

#[derive(Debug)]
enum Position<R> {
    /// Partition opened, nothing read yet.
    Unread,
    At(R),
    Exhausted,
}

/// Positioned view over one partition of a [`KeyedStore`].
///
/// Keeps the current record and the one it replaced, so callers can look
/// back one record without re-reading.
pub struct StreamCursor<S: KeyedStore> {
    store: S,
    handle: Option<StreamHandle>,
    position: Position<S::Record>,
    previous: Option<S::Record>,
    reads: usize,
}

impl<S: KeyedStore> StreamCursor<S> {
    /// Opens the partition for `owner_key`. No record is read yet.
    pub fn open(mut store: S, owner_key: &str) -> Result<Self> {
        let handle = store.open_partition(owner_key)?;
        Ok(StreamCursor {
            store,
            handle: Some(handle),
            position: Position::Unread,
            previous: None,
            reads: 0,
        })
    }

    /// Positions at the first record of the partition.
    pub fn first(&mut self) -> Result<Fetch<&S::Record>> {
        let handle = self.live_handle()?;
        self.reads += 1;
        let fetched = self.store.read_first(handle)?;
        Ok(self.settle(fetched))
    }

    /// Advances to the next record of the partition.
    ///
    /// On a cursor that has not been read yet this is the same as [`first`].
    ///
    /// [`first`]: StreamCursor::first
    pub fn next(&mut self) -> Result<Fetch<&S::Record>> {
        match self.position {
            Position::Exhausted => return Ok(Fetch::EndOfStream),
            Position::Unread => return self.first(),
            Position::At(_) => {}
        }

        let handle = self.live_handle()?;
        self.reads += 1;
        let fetched = self.store.read_next(handle)?;
        Ok(self.settle(fetched))
    }

    pub fn current(&self) -> Option<&S::Record> {
        match &self.position {
            Position::At(r) => Some(r),
            _ => None,
        }
    }

    /// The record that was current before the last successful move.
    pub fn previous(&self) -> Option<&S::Record> {
        self.previous.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.position, Position::Exhausted)
    }

    /// Number of store reads this cursor has issued.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Releases the store handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.store.close(handle),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn live_handle(&self) -> Result<StreamHandle> {
        self.handle.ok_or_else(|| CycleError::Store {
            stream: S::Record::STREAM,
            message: "read on a closed cursor".to_string(),
        })
    }

    fn settle(&mut self, fetched: Fetch<S::Record>) -> Fetch<&S::Record> {
        let next = match fetched {
            Fetch::Record(r) => Position::At(r),
            Fetch::EndOfStream => Position::Exhausted,
        };
        if let Position::At(old) = std::mem::replace(&mut self.position, next) {
            self.previous = Some(old);
        }

        match self.current() {
            Some(r) => Fetch::Record(r),
            None => Fetch::EndOfStream,
        }
    }
}
