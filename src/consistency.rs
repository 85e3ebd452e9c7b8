//! Per-shard response tallies and read consistency evaluation.

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response tally for a single shard. The zero value means no response seen yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardConsistencyResult {
    pub success: usize,
    pub errors: usize,
    pub done: bool,
}

impl ShardConsistencyResult {
    #[inline]
    pub fn responses(&self) -> usize {
        self.success + self.errors
    }
}

/// Shard-indexed tallies for one query.
///
/// Pure counting structure; it encodes no consistency policy. The backing storage is reused
/// across queries, see [`ShardConsistencyResults::initialize`].
#[derive(Debug, Clone, Default)]
pub struct ShardConsistencyResults {
    results: Vec<ShardConsistencyResult>,
}

impl ShardConsistencyResults {
    /// Resets the tracker to exactly `n` zeroed shards.
    ///
    /// Reuses the existing allocation when its capacity is at least `n`, including after the
    /// tracker was truncated to zero length.
    pub fn initialize(&mut self, n: usize) {
        if self.results.capacity() >= n {
            self.results.clear();
            self.results.resize(n, ShardConsistencyResult::default());
        } else {
            self.results = vec![ShardConsistencyResult::default(); n];
        }
    }

    /// Shortens the tracker, keeping its allocation.
    pub fn truncate(&mut self, len: usize) {
        self.results.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.results.capacity()
    }

    pub fn get(&self, shard: usize) -> Option<&ShardConsistencyResult> {
        self.results.get(shard)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ShardConsistencyResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[ShardConsistencyResult] {
        &self.results
    }

    pub fn mark_success(&mut self, shard: usize) -> Result<&ShardConsistencyResult, ClientError> {
        let r = self.shard_mut(shard)?;
        r.success += 1;
        Ok(&*r)
    }

    pub fn mark_error(&mut self, shard: usize) -> Result<&ShardConsistencyResult, ClientError> {
        let r = self.shard_mut(shard)?;
        r.errors += 1;
        Ok(&*r)
    }

    pub fn mark_done(&mut self, shard: usize) -> Result<(), ClientError> {
        self.shard_mut(shard)?.done = true;
        Ok(())
    }

    fn shard_mut(&mut self, shard: usize) -> Result<&mut ShardConsistencyResult, ClientError> {
        let shard_count = self.results.len();
        self.results
            .get_mut(shard)
            .ok_or(ClientError::InvalidShard { shard, shard_count })
    }
}

/// How many replicas of each shard must answer successfully. Serde: snake_case string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadConsistencyLevel {
    /// Any outcome is accepted, including no successful replica.
    None,
    /// At least one replica.
    One,
    /// A majority when reachable, otherwise one replica once every replica has answered.
    UnstrictMajority,
    /// A strict majority of replicas.
    Majority,
    /// Every replica.
    All,
}

impl ReadConsistencyLevel {
    /// Successful replica responses that settle a shard without further conditions.
    pub fn required_successes(&self, replicas: usize) -> usize {
        match self {
            ReadConsistencyLevel::None => 0,
            ReadConsistencyLevel::One => 1,
            ReadConsistencyLevel::UnstrictMajority | ReadConsistencyLevel::Majority => {
                majority(replicas)
            }
            ReadConsistencyLevel::All => replicas,
        }
    }

    pub fn is_shard_satisfied(&self, shard: &ShardConsistencyResult, replicas: usize) -> bool {
        let required = self.required_successes(replicas);
        match self {
            ReadConsistencyLevel::None => true,
            ReadConsistencyLevel::UnstrictMajority => {
                shard.success >= required
                    || (shard.success >= 1 && shard.responses() >= replicas)
            }
            _ => shard.success >= required,
        }
    }

    /// True when enough replicas failed that the shard can never be satisfied.
    pub fn is_shard_unachievable(&self, shard: &ShardConsistencyResult, replicas: usize) -> bool {
        match self {
            ReadConsistencyLevel::None => false,
            ReadConsistencyLevel::One | ReadConsistencyLevel::UnstrictMajority => {
                shard.errors >= replicas.max(1)
            }
            ReadConsistencyLevel::Majority => {
                shard.errors > replicas.saturating_sub(majority(replicas))
            }
            ReadConsistencyLevel::All => shard.errors >= 1,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ReadConsistencyLevel::None => "none",
            ReadConsistencyLevel::One => "one",
            ReadConsistencyLevel::UnstrictMajority => "unstrict_majority",
            ReadConsistencyLevel::Majority => "majority",
            ReadConsistencyLevel::All => "all",
        }
    }
}

#[inline]
fn majority(replicas: usize) -> usize {
    replicas / 2 + 1
}

impl fmt::Display for ReadConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadConsistencyLevel {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ReadConsistencyLevel::None),
            "one" => Ok(ReadConsistencyLevel::One),
            "unstrict_majority" | "unstrictmajority" => Ok(ReadConsistencyLevel::UnstrictMajority),
            "majority" => Ok(ReadConsistencyLevel::Majority),
            "all" => Ok(ReadConsistencyLevel::All),
            other => Err(ClientError::ConfigError(format!(
                "unknown read consistency level: {other}"
            ))),
        }
    }
}

/// Read consistency requested for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyPolicy {
    pub level: ReadConsistencyLevel,
    /// Replication factor of the namespace being queried.
    pub replicas: usize,
}

impl Default for ConsistencyPolicy {
    fn default() -> Self {
        Self {
            level: ReadConsistencyLevel::UnstrictMajority,
            replicas: 3,
        }
    }
}

/// Outcome of evaluating a tracker against a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Every shard is satisfied and contributed at least one successful response.
    pub exhaustive: bool,
    /// Shards that have not been satisfied (yet).
    pub unsatisfied_shards: usize,
    /// Shards that can no longer be satisfied.
    pub unachievable_shards: usize,
}

impl ConsistencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.unsatisfied_shards == 0
    }
}

impl ConsistencyPolicy {
    /// Creates a policy. A replication factor of zero is rejected.
    pub fn new(level: ReadConsistencyLevel, replicas: usize) -> Result<Self, ClientError> {
        let policy = Self { level, replicas };
        policy.validate()?;
        Ok(policy)
    }

    /// Checks a policy built from a struct literal or deserialized from configuration.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.replicas == 0 {
            return Err(ClientError::ConfigError(format!(
                "read consistency {} requires at least one replica",
                self.level
            )));
        }
        Ok(())
    }

    pub fn evaluate(&self, results: &ShardConsistencyResults) -> ConsistencyReport {
        let mut report = ConsistencyReport {
            exhaustive: true,
            unsatisfied_shards: 0,
            unachievable_shards: 0,
        };
        for shard in results.iter() {
            let satisfied = self.level.is_shard_satisfied(shard, self.replicas);
            if !satisfied {
                report.unsatisfied_shards += 1;
                if self.level.is_shard_unachievable(shard, self.replicas) {
                    report.unachievable_shards += 1;
                }
            }
            if !satisfied || shard.success == 0 {
                report.exhaustive = false;
            }
        }
        report
    }

    /// Evaluates the tracker, failing when any shard misses the requested level.
    pub fn check(
        &self,
        results: &ShardConsistencyResults,
        last_error: Option<&str>,
    ) -> Result<ConsistencyReport, ClientError> {
        self.validate()?;
        let report = self.evaluate(results);
        if report.is_satisfied() {
            Ok(report)
        } else {
            Err(ClientError::ConsistencyUnsatisfied {
                level: self.level,
                failed_shards: report.unsatisfied_shards,
                shard_count: results.len(),
                last_error: last_error.map(str::to_string),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(success: usize, errors: usize) -> ShardConsistencyResult {
        ShardConsistencyResult {
            success,
            errors,
            done: false,
        }
    }

    #[test]
    fn test_initialize_length() {
        let mut results = ShardConsistencyResults::default();
        assert_eq!(results.len(), 0);
        results.initialize(10);
        assert_eq!(results.len(), 10);
        results.initialize(100);
        assert_eq!(results.len(), 100);
    }

    #[test]
    fn test_initialize_length_after_truncate() {
        let mut results = ShardConsistencyResults::default();
        results.initialize(100);
        assert_eq!(results.len(), 100);
        let capacity = results.capacity();
        results.truncate(0);
        results.initialize(1);
        assert_eq!(results.len(), 1);
        assert_eq!(results.capacity(), capacity);
    }

    #[test]
    fn test_initialize_resets_values() {
        let mut results = ShardConsistencyResults::default();
        results.initialize(10);
        results.mark_success(3).unwrap();
        results.mark_error(7).unwrap();
        results.mark_done(3).unwrap();

        results.initialize(10);
        for elem in results.iter() {
            assert_eq!(*elem, ShardConsistencyResult::default());
        }
    }

    #[test]
    fn test_mark_out_of_range() {
        let mut results = ShardConsistencyResults::default();
        results.initialize(2);
        match results.mark_success(2) {
            Err(ClientError::InvalidShard { shard, shard_count }) => {
                assert_eq!(shard, 2);
                assert_eq!(shard_count, 2);
            }
            other => panic!("Expected InvalidShard error, got {:?}", other),
        }
    }

    #[test]
    fn test_level_thresholds() {
        use ReadConsistencyLevel as L;

        assert!(L::None.is_shard_satisfied(&tally(0, 3), 3));
        assert!(!L::None.is_shard_unachievable(&tally(0, 3), 3));

        assert!(L::One.is_shard_satisfied(&tally(1, 2), 3));
        assert!(!L::One.is_shard_satisfied(&tally(0, 2), 3));
        assert!(L::One.is_shard_unachievable(&tally(0, 3), 3));

        assert!(L::Majority.is_shard_satisfied(&tally(2, 1), 3));
        assert!(!L::Majority.is_shard_satisfied(&tally(1, 2), 3));
        assert!(L::Majority.is_shard_unachievable(&tally(1, 2), 3));
        assert!(!L::Majority.is_shard_unachievable(&tally(1, 1), 3));

        // Unstrict majority settles for one success once every replica has answered.
        assert!(!L::UnstrictMajority.is_shard_satisfied(&tally(1, 1), 3));
        assert!(L::UnstrictMajority.is_shard_satisfied(&tally(1, 2), 3));
        assert!(L::UnstrictMajority.is_shard_satisfied(&tally(2, 0), 3));
        assert!(L::UnstrictMajority.is_shard_unachievable(&tally(0, 3), 3));

        assert!(L::All.is_shard_satisfied(&tally(3, 0), 3));
        assert!(!L::All.is_shard_satisfied(&tally(2, 0), 3));
        assert!(L::All.is_shard_unachievable(&tally(2, 1), 3));
    }

    #[test]
    fn test_evaluate_all_requires_every_shard() {
        let policy = ConsistencyPolicy::new(ReadConsistencyLevel::All, 1).unwrap();
        let mut results = ShardConsistencyResults::default();
        results.initialize(2);
        results.mark_success(0).unwrap();
        results.mark_error(1).unwrap();

        let report = policy.evaluate(&results);
        assert!(!report.is_satisfied());
        assert!(!report.exhaustive);
        assert_eq!(report.unachievable_shards, 1);

        match policy.check(&results, Some("connection refused")) {
            Err(ClientError::ConsistencyUnsatisfied {
                level,
                failed_shards,
                shard_count,
                last_error,
            }) => {
                assert_eq!(level, ReadConsistencyLevel::All);
                assert_eq!(failed_shards, 1);
                assert_eq!(shard_count, 2);
                assert_eq!(last_error.as_deref(), Some("connection refused"));
            }
            other => panic!("Expected ConsistencyUnsatisfied, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_none_tolerates_but_is_not_exhaustive() {
        let policy = ConsistencyPolicy::new(ReadConsistencyLevel::None, 1).unwrap();
        let mut results = ShardConsistencyResults::default();
        results.initialize(2);
        results.mark_success(0).unwrap();
        results.mark_error(1).unwrap();

        let report = policy.check(&results, None).unwrap();
        assert!(!report.exhaustive);
    }

    #[test]
    fn test_evaluate_zero_shards_is_exhaustive() {
        let report = ConsistencyPolicy::default().check(&ShardConsistencyResults::default(), None);
        assert!(report.unwrap().exhaustive);
    }

    #[test]
    fn test_tolerated_replica_error_stays_exhaustive() {
        let policy = ConsistencyPolicy::new(ReadConsistencyLevel::Majority, 3).unwrap();
        let mut results = ShardConsistencyResults::default();
        results.initialize(1);
        results.mark_success(0).unwrap();
        results.mark_success(0).unwrap();
        results.mark_error(0).unwrap();
        assert!(policy.check(&results, None).unwrap().exhaustive);
    }

    #[test]
    fn test_policy_rejects_zero_replicas() {
        assert!(matches!(
            ConsistencyPolicy::new(ReadConsistencyLevel::All, 0),
            Err(ClientError::ConfigError(_))
        ));

        // A zero-replica policy that bypassed `new` must not pass as satisfied.
        let policy = ConsistencyPolicy {
            level: ReadConsistencyLevel::All,
            replicas: 0,
        };
        let mut results = ShardConsistencyResults::default();
        results.initialize(1);
        assert!(matches!(
            policy.check(&results, None),
            Err(ClientError::ConfigError(_))
        ));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy = ConsistencyPolicy::new(ReadConsistencyLevel::UnstrictMajority, 3).unwrap();
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"level":"unstrict_majority","replicas":3}"#);
        assert_eq!(serde_json::from_str::<ConsistencyPolicy>(&json).unwrap(), policy);

        for level in [
            ReadConsistencyLevel::None,
            ReadConsistencyLevel::One,
            ReadConsistencyLevel::UnstrictMajority,
            ReadConsistencyLevel::Majority,
            ReadConsistencyLevel::All,
        ] {
            // Serde names match the `FromStr`/`Display` names.
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{}\"", level));
            assert_eq!(serde_json::from_str::<ReadConsistencyLevel>(&json).unwrap(), level);

            let encoded = bincode::serialize(&level).unwrap();
            assert_eq!(bincode::deserialize::<ReadConsistencyLevel>(&encoded).unwrap(), level);
        }
        assert!(serde_json::from_str::<ReadConsistencyLevel>(r#""quorum""#).is_err());
    }

    #[test]
    fn test_level_parse_and_display() {
        for level in [
            ReadConsistencyLevel::None,
            ReadConsistencyLevel::One,
            ReadConsistencyLevel::UnstrictMajority,
            ReadConsistencyLevel::Majority,
            ReadConsistencyLevel::All,
        ] {
            assert_eq!(level.to_string().parse::<ReadConsistencyLevel>().unwrap(), level);
        }
        assert_eq!(
            " Majority ".parse::<ReadConsistencyLevel>().unwrap(),
            ReadConsistencyLevel::Majority
        );
        assert!(matches!(
            "quorum".parse::<ReadConsistencyLevel>(),
            Err(ClientError::ConfigError(_))
        ));
    }
}
