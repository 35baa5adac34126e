//! Sorted Set data structure operations
//!
//! Sorted Sets are collections of unique members, each associated with a score.
//! Members are ordered by score, enabling range queries, ranking, and leaderboard functionality.

use crate::cmd::{Cmd, ToArg};
use crate::commands::{CommandTarget, run};
use crate::error::Result;
use crate::pipeline::Execution;
use crate::value::{FromValue, ScoredMembers};

/// Sorted Set data structure interface
pub struct SortedSetManager<'a, C: ?Sized> {
    target: &'a mut C,
}

impl<'a, C: CommandTarget + ?Sized> SortedSetManager<'a, C> {
    pub(crate) fn new(target: &'a mut C) -> Self {
        Self { target }
    }

    /// Add members with scores (ZADD); returns how many were new
    pub async fn zadd<M: ToArg>(
        self,
        key: impl ToArg,
        members: &[(f64, M)],
    ) -> Result<Execution<i64>> {
        let mut cmd = Cmd::new("ZADD").key(key);
        for (score, member) in members {
            cmd.push_arg(score);
            cmd.push_arg(member);
        }
        run(self.target, cmd).await
    }

    /// Remove members (ZREM)
    pub async fn zrem<M: ToArg>(self, key: impl ToArg, members: &[M]) -> Result<Execution<i64>> {
        let mut cmd = Cmd::new("ZREM").key(key);
        for member in members {
            cmd.push_arg(member);
        }
        run(self.target, cmd).await
    }

    /// Score of a member, `None` if absent (ZSCORE)
    pub async fn zscore(self, key: impl ToArg, member: impl ToArg) -> Result<Execution<Option<f64>>> {
        run(self.target, Cmd::new("ZSCORE").key(key).arg(member)).await
    }

    /// Increment a member's score, returning the new score (ZINCRBY)
    pub async fn zincr_by(
        self,
        key: impl ToArg,
        delta: f64,
        member: impl ToArg,
    ) -> Result<Execution<f64>> {
        run(self.target, Cmd::new("ZINCRBY").key(key).arg(delta).arg(member)).await
    }

    pub async fn zcard(self, key: impl ToArg) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("ZCARD").key(key)).await
    }

    /// Zero-based rank by ascending score (ZRANK)
    pub async fn zrank(self, key: impl ToArg, member: impl ToArg) -> Result<Execution<Option<i64>>> {
        run(self.target, Cmd::new("ZRANK").key(key).arg(member)).await
    }

    /// Members by rank range (ZRANGE)
    pub async fn zrange<T: FromValue>(
        self,
        key: impl ToArg,
        start: i64,
        stop: i64,
    ) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("ZRANGE").key(key).arg(start).arg(stop)).await
    }

    /// Members with scores by rank range (ZRANGE ... WITHSCORES)
    pub async fn zrange_with_scores(
        self,
        key: impl ToArg,
        start: i64,
        stop: i64,
    ) -> Result<Execution<ScoredMembers>> {
        run(
            self.target,
            Cmd::new("ZRANGE").key(key).arg(start).arg(stop).arg("WITHSCORES"),
        )
        .await
    }

    /// Members with `min <= score <= max` (ZRANGEBYSCORE)
    pub async fn zrange_by_score<T: FromValue>(
        self,
        key: impl ToArg,
        min: f64,
        max: f64,
    ) -> Result<Execution<Vec<T>>> {
        run(self.target, Cmd::new("ZRANGEBYSCORE").key(key).arg(min).arg(max)).await
    }

    /// Count members with `min <= score <= max` (ZCOUNT)
    pub async fn zcount(self, key: impl ToArg, min: f64, max: f64) -> Result<Execution<i64>> {
        run(self.target, Cmd::new("ZCOUNT").key(key).arg(min).arg(max)).await
    }
}
