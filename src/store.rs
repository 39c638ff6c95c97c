//! Ordered keyed store contract and the in-memory implementation.
//!
//! A store serves one record stream, partitioned by owner key (the
//! carrier/road). Within a partition records come back in stream key order.
//! Reads return a [`Fetch`]: either a record or the end of the partition.

use crate::error::{CycleError, Result};
use csv::{ReaderBuilder, Trim};
use log::debug;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Outcome of a positioned read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    /// The read produced a record.
    Record(T),
    /// The partition has no more records.
    EndOfStream,
}

impl<T> Fetch<T> {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Fetch::EndOfStream)
    }

    pub fn record(self) -> Option<T> {
        match self {
            Fetch::Record(r) => Some(r),
            Fetch::EndOfStream => None,
        }
    }
}

/// Opaque handle to an open partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u32);

/// A record that can live in a keyed stream.
pub trait StreamRecord: Clone {
    /// Sort key within a partition.
    type Key: Ord;

    /// Stream name used in logs and errors.
    const STREAM: &'static str;

    /// Partition key (carrier/road).
    fn owner_key(&self) -> &str;

    fn stream_key(&self) -> Self::Key;
}

/// Ordered keyed store serving one stream.
///
/// Implementations must return the records of a partition in non-decreasing
/// [`StreamRecord::stream_key`] order. Any failure is a fatal I/O failure for
/// the run that issued it.
pub trait KeyedStore {
    type Record: StreamRecord;

    fn open_partition(&mut self, owner_key: &str) -> Result<StreamHandle>;

    /// Positions the handle at the first record of its partition.
    fn read_first(&mut self, handle: StreamHandle) -> Result<Fetch<Self::Record>>;

    /// Advances the handle to the next record of its partition.
    fn read_next(&mut self, handle: StreamHandle) -> Result<Fetch<Self::Record>>;

    fn close(&mut self, handle: StreamHandle) -> Result<()>;
}

impl<S: KeyedStore + ?Sized> KeyedStore for &mut S {
    type Record = S::Record;

    fn open_partition(&mut self, owner_key: &str) -> Result<StreamHandle> {
        (**self).open_partition(owner_key)
    }

    fn read_first(&mut self, handle: StreamHandle) -> Result<Fetch<Self::Record>> {
        (**self).read_first(handle)
    }

    fn read_next(&mut self, handle: StreamHandle) -> Result<Fetch<Self::Record>> {
        (**self).read_next(handle)
    }

    fn close(&mut self, handle: StreamHandle) -> Result<()> {
        (**self).close(handle)
    }
}

#[derive(Debug)]
struct OpenPartition {
    owner_key: String,
    /// Index of the record last returned; `None` before the first read.
    position: Option<usize>,
}

/// Keyed store held entirely in memory.
///
/// Records are stably sorted by `(owner_key, stream_key)` on construction,
/// so each partition is contiguous and in key order no matter how the
/// input was laid out. Records that tie on the key keep their input order.
#[derive(Debug)]
pub struct MemoryStore<R: StreamRecord> {
    records: Vec<R>,
    partitions: HashMap<u32, OpenPartition>,
    next_handle: u32,
}

impl<R: StreamRecord> MemoryStore<R> {
    pub fn from_records(mut records: Vec<R>) -> Self {
        records.sort_by(|a, b| {
            a.owner_key()
                .cmp(b.owner_key())
                .then_with(|| a.stream_key().cmp(&b.stream_key()))
        });

        MemoryStore {
            records,
            partitions: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Loads a store from CSV, converting each row with `parse`.
    ///
    /// Any row that fails to deserialize or convert fails the whole load.
    /// A keyed file with a corrupt record is unusable for a one-pass run.
    pub fn from_csv<Rd, Row, F>(reader: Rd, parse: F) -> Result<Self>
    where
        Rd: Read,
        Row: DeserializeOwned,
        F: Fn(&Row, usize) -> Result<R>,
    {
        let mut csv_reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut records = Vec::new();
        for (row_idx, result) in csv_reader.deserialize::<Row>().enumerate() {
            let row_num = row_idx + 2; // 1-indexed, accounting for header row
            let row = result.map_err(|e| CycleError::InvalidRecord {
                stream: R::STREAM,
                row: row_num,
                message: e.to_string(),
            })?;
            records.push(parse(&row, row_num)?);
        }

        debug!("Loaded {} {} records", records.len(), R::STREAM);
        Ok(MemoryStore::from_records(records))
    }

    /// Loads a store from a CSV file on disk.
    pub fn from_path<Row, F>(path: &Path, parse: F) -> Result<Self>
    where
        Row: DeserializeOwned,
        F: Fn(&Row, usize) -> Result<R>,
    {
        let file = File::open(path)?;
        MemoryStore::from_csv(BufReader::new(file), parse)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of partitions currently open.
    pub fn open_handles(&self) -> usize {
        self.partitions.len()
    }

    fn partition_mut(&mut self, handle: StreamHandle) -> Result<&mut OpenPartition> {
        self.partitions
            .get_mut(&handle.0)
            .ok_or(CycleError::UnknownHandle {
                stream: R::STREAM,
                handle: handle.0,
            })
    }
}

impl<R: StreamRecord> KeyedStore for MemoryStore<R> {
    type Record = R;

    fn open_partition(&mut self, owner_key: &str) -> Result<StreamHandle> {
        let handle = StreamHandle(self.next_handle);
        self.next_handle += 1;
        self.partitions.insert(
            handle.0,
            OpenPartition {
                owner_key: owner_key.to_string(),
                position: None,
            },
        );
        Ok(handle)
    }

    fn read_first(&mut self, handle: StreamHandle) -> Result<Fetch<R>> {
        let end = self.records.len();
        let owner = self.partition_mut(handle)?.owner_key.clone();
        let found = self.records.iter().position(|r| r.owner_key() == owner);

        let partition = self.partition_mut(handle)?;
        match found {
            Some(idx) => {
                partition.position = Some(idx);
                Ok(Fetch::Record(self.records[idx].clone()))
            }
            None => {
                partition.position = Some(end);
                Ok(Fetch::EndOfStream)
            }
        }
    }

    fn read_next(&mut self, handle: StreamHandle) -> Result<Fetch<R>> {
        let end = self.records.len();
        let (position, owner) = {
            let partition = self.partition_mut(handle)?;
            (partition.position, partition.owner_key.clone())
        };

        let Some(current) = position else {
            return self.read_first(handle);
        };

        let next = current.saturating_add(1);
        let hit = self
            .records
            .get(next)
            .is_some_and(|r| r.owner_key() == owner);

        let partition = self.partition_mut(handle)?;
        if hit {
            partition.position = Some(next);
            Ok(Fetch::Record(self.records[next].clone()))
        } else {
            partition.position = Some(end);
            Ok(Fetch::EndOfStream)
        }
    }

    fn close(&mut self, handle: StreamHandle) -> Result<()> {
        self.partitions
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(CycleError::UnknownHandle {
                stream: R::STREAM,
                handle: handle.0,
            })
    }
}
