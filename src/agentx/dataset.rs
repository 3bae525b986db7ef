//! Serving dataset: the OID -> value snapshot answered by the sub-agent.
//!
//! A [`Dataset`] is built from scratch on every collection cycle and never
//! mutated once installed. [`SharedDataset`] swaps whole datasets, so a
//! request is always resolved against exactly one version.

use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, PoisonError, RwLock},
};

use thiserror::Error;

use super::{
    oid::{Oid, OidParseError, MAX_OID_LEN},
    pdu::{SearchRange, VarBind, VarBindValue},
};

/// Errors raised while building a dataset.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatasetError {
    #[error("exception value for {0} cannot be stored in a dataset")]
    ExceptionValue(Oid),
    #[error("OID {oid} has {len} sub-identifiers, more than the SNMP limit of 128")]
    OidTooLong { oid: Oid, len: usize },
    #[error(transparent)]
    InvalidOid(#[from] OidParseError),
}

/// Sorted mapping of OIDs to values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dataset {
    entries: BTreeMap<Oid, VarBindValue>,
}

impl Dataset {
    pub fn new() -> Self {
        Dataset::default()
    }

    /// Stores `value` under `oid`, replacing any previous value.
    pub fn set(&mut self, oid: Oid, value: VarBindValue) -> Result<(), DatasetError> {
        if value.is_exception() {
            return Err(DatasetError::ExceptionValue(oid));
        }
        if oid.len() > MAX_OID_LEN {
            let len = oid.len();
            return Err(DatasetError::OidTooLong { oid, len });
        }
        self.entries.insert(oid, value);
        Ok(())
    }

    /// Like [`Dataset::set`], taking the OID in dotted text form.
    pub fn set_str(&mut self, oid: &str, value: VarBindValue) -> Result<(), DatasetError> {
        self.set(oid.parse()?, value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value(&self, oid: &Oid) -> Option<&VarBindValue> {
        self.entries.get(oid)
    }

    /// Iterates entries in ascending OID order.
    pub fn iter(&self) -> impl Iterator<Item = (&Oid, &VarBindValue)> {
        self.entries.iter()
    }

    /// Resolves a Get: exact match or noSuchObject.
    pub fn get(&self, oid: &Oid) -> VarBind {
        match self.entries.get(oid) {
            Some(value) => VarBind::new(oid.clone(), value.clone()),
            None => VarBind::new(oid.clone(), VarBindValue::NoSuchObject),
        }
    }

    /// Resolves a GetNext: the first OID after `range.start` and below
    /// `range.end`, or endOfMibView carrying the start OID.
    ///
    /// `start` itself only qualifies when the range's include flag is set.
    pub fn get_next(&self, range: &SearchRange) -> VarBind {
        match self.next_entry(&range.start, range.include, &range.end) {
            Some((oid, value)) => VarBind::new(oid.clone(), value.clone()),
            None => VarBind::new(range.start.clone(), VarBindValue::EndOfMibView),
        }
    }

    /// Resolves a GetBulk (RFC 2741 §7.2.3.3).
    ///
    /// Non-repeaters get a single GetNext each; the remaining ranges are walked
    /// `max_repetitions` times, interleaved per repetition. Every row holds one
    /// varbind per repeater: a repeater that already hit endOfMibView repeats
    /// it. The walk stops after the first row in which no repeater advanced.
    pub fn get_bulk(
        &self,
        non_repeaters: u16,
        max_repetitions: u16,
        ranges: &[SearchRange],
    ) -> Vec<VarBind> {
        let split = (non_repeaters as usize).min(ranges.len());
        let (singles, repeaters) = ranges.split_at(split);

        let mut varbinds: Vec<VarBind> = singles.iter().map(|r| self.get_next(r)).collect();

        let mut cursors: Vec<SearchRange> = repeaters.to_vec();
        let mut done = vec![false; cursors.len()];
        for _ in 0..max_repetitions {
            if cursors.is_empty() {
                break;
            }
            let mut row_complete = true;
            for (range, finished) in cursors.iter_mut().zip(done.iter_mut()) {
                if *finished {
                    varbinds.push(VarBind::new(
                        range.start.clone(),
                        VarBindValue::EndOfMibView,
                    ));
                    continue;
                }
                let vb = self.get_next(range);
                if vb.value == VarBindValue::EndOfMibView {
                    *finished = true;
                } else {
                    range.start = vb.oid.clone();
                    range.include = false;
                    row_complete = false;
                }
                varbinds.push(vb);
            }
            if row_complete {
                break;
            }
        }

        varbinds
    }

    fn next_entry(
        &self,
        start: &Oid,
        include: bool,
        end: &Oid,
    ) -> Option<(&Oid, &VarBindValue)> {
        let lower = if include {
            Bound::Included(start)
        } else {
            Bound::Excluded(start)
        };
        self.entries
            .range::<Oid, _>((lower, Bound::Unbounded))
            .next()
            .filter(|(oid, _)| end.is_empty() || *oid < end)
    }
}

/// Handle to the dataset currently being served.
///
/// Cloning the handle shares the underlying slot; installing a dataset is a
/// single pointer swap under the lock.
#[derive(Clone, Debug, Default)]
pub struct SharedDataset {
    current: Arc<RwLock<Arc<Dataset>>>,
}

impl SharedDataset {
    pub fn new() -> Self {
        SharedDataset::default()
    }

    /// Returns the dataset version in effect right now.
    pub fn snapshot(&self) -> Arc<Dataset> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs `dataset`, returning the version it replaced.
    pub fn replace(&self, dataset: Dataset) -> Arc<Dataset> {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, Arc::new(dataset))
    }
}
