//! Deferred results for pipelined and transactional execution
//!
//! While a connection is batching, every command returns a [`Pending`]
//! placeholder instead of a value. The placeholder carries no value of its
//! own; it is resolved against the [`BatchResults`] of the flush or commit
//! that closed its batch.

use crate::error::{RedisError, Result};
use crate::value::{CommandResult, FromValue, Value};
use std::fmt;
use std::marker::PhantomData;

/// Typed placeholder for a queued command's result
pub struct Pending<T> {
    batch: u64,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Pending<T> {
    pub(crate) fn new(batch: u64, index: usize) -> Self {
        Self {
            batch,
            index,
            _marker: PhantomData,
        }
    }

    /// Position of the command inside its batch
    pub fn index(&self) -> usize {
        self.index
    }

    fn retype<U>(self) -> Pending<U> {
        Pending::new(self.batch, self.index)
    }
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Pending<T> {}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("batch", &self.batch)
            .field("index", &self.index)
            .finish()
    }
}

/// Outcome of issuing a command: an immediate value in direct mode, a
/// placeholder while batching
#[must_use]
#[derive(Debug)]
pub enum Execution<T> {
    Done(T),
    Queued(Pending<T>),
}

impl<T> Execution<T> {
    /// The immediate value. Fails for queued commands, whose values only
    /// exist after the batch is flushed or committed.
    pub fn done(self) -> Result<T> {
        match self {
            Execution::Done(value) => Ok(value),
            Execution::Queued(pending) => Err(RedisError::usage(format!(
                "result #{} is pending until its batch is flushed or committed",
                pending.index
            ))),
        }
    }

    pub fn pending(self) -> Result<Pending<T>> {
        match self {
            Execution::Queued(pending) => Ok(pending),
            Execution::Done(_) => Err(RedisError::usage(
                "command was executed directly; there is no pending result",
            )),
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Execution::Queued(_))
    }
}

impl Execution<Value> {
    /// Typed view: converts immediate values now, re-types placeholders
    pub fn convert<U: FromValue>(self) -> Result<Execution<U>> {
        match self {
            Execution::Done(value) => U::from_value(value).map(Execution::Done),
            Execution::Queued(pending) => Ok(Execution::Queued(pending.retype())),
        }
    }
}

/// Per-command results of one flushed pipeline or committed transaction,
/// in submission order
#[derive(Debug, Clone)]
pub struct BatchResults {
    batch: u64,
    results: Vec<CommandResult>,
}

impl BatchResults {
    pub(crate) fn new(batch: u64, results: Vec<CommandResult>) -> Self {
        Self { batch, results }
    }

    /// Resolve a placeholder issued for this batch
    pub fn get<T: FromValue>(&self, pending: &Pending<T>) -> Result<T> {
        if pending.batch != self.batch {
            return Err(RedisError::usage(
                "pending result belongs to a different batch",
            ));
        }
        match self.results.get(pending.index) {
            Some(Ok(value)) => T::from_value(value.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(RedisError::usage(format!(
                "no result at position {}",
                pending.index
            ))),
        }
    }

    pub fn results(&self) -> &[CommandResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<CommandResult> {
        self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CommandResult> {
        self.results.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = (usize, &RedisError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }
}
