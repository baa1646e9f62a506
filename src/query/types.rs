//! Query inputs: which days to read and what to compute.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::{ParsePartitionKeyError, PartitionKey};

/// Days targeted by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSelector {
    /// Every recorded day, chronologically.
    All,
    /// A single day, which may have no partition.
    Date(PartitionKey),
}

impl fmt::Display for DateSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Date(key) => key.fmt(f),
        }
    }
}

impl FromStr for DateSelector {
    type Err = ParsePartitionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Date)
    }
}

impl Serialize for DateSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Aggregate requested for each resolved day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr, Display)]
#[strum(ascii_case_insensitive)]
pub enum AggregationKind {
    #[strum(to_string = "min")]
    Min,
    #[strum(to_string = "max")]
    Max,
    #[strum(to_string = "avg")]
    Avg,
    /// Number of unanswered probes.
    #[strum(to_string = "timeout", serialize = "timeoutCount")]
    Timeout,
    /// Every stored row, timeouts included.
    #[strum(to_string = "getAll")]
    GetAll,
    /// Min, max, avg and timeout count together.
    #[strum(to_string = "all", serialize = "allKinds")]
    AllKinds,
}

impl AggregationKind {
    /// Individual aggregates this kind expands to. Empty for [`Self::GetAll`].
    pub fn aggregates(self) -> &'static [AggregationKind] {
        match self {
            Self::Min => &[Self::Min],
            Self::Max => &[Self::Max],
            Self::Avg => &[Self::Avg],
            Self::Timeout => &[Self::Timeout],
            Self::AllKinds => &[Self::Min, Self::Max, Self::Avg, Self::Timeout],
            Self::GetAll => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_date_selector_parse() {
        assert_eq!("all".parse::<DateSelector>().unwrap(), DateSelector::All);
        assert_eq!("ALL".parse::<DateSelector>().unwrap(), DateSelector::All);

        let selector: DateSelector = "30092024".parse().unwrap();
        let expected = PartitionKey::new(NaiveDate::from_ymd_opt(2024, 9, 30).unwrap());
        assert_eq!(selector, DateSelector::Date(expected));
        assert_eq!(selector.to_string(), "30092024");
    }

    #[test]
    fn test_date_selector_rejects_malformed() {
        assert!("2024-09-30".parse::<DateSelector>().is_err());
        assert!("31022024".parse::<DateSelector>().is_err());
        assert!("".parse::<DateSelector>().is_err());
    }

    #[test]
    fn test_aggregation_kind_parse() {
        assert_eq!("min".parse::<AggregationKind>().unwrap(), AggregationKind::Min);
        assert_eq!("MAX".parse::<AggregationKind>().unwrap(), AggregationKind::Max);
        assert_eq!(
            "timeoutCount".parse::<AggregationKind>().unwrap(),
            AggregationKind::Timeout
        );
        assert_eq!(
            "getall".parse::<AggregationKind>().unwrap(),
            AggregationKind::GetAll
        );
        assert_eq!(
            "allKinds".parse::<AggregationKind>().unwrap(),
            AggregationKind::AllKinds
        );
        assert!("median".parse::<AggregationKind>().is_err());
    }

    #[test]
    fn test_aggregation_kind_display() {
        assert_eq!(AggregationKind::Timeout.to_string(), "timeout");
        assert_eq!(AggregationKind::GetAll.as_ref(), "getAll");
        assert_eq!(AggregationKind::AllKinds.to_string(), "all");
    }

    #[test]
    fn test_all_kinds_expands_in_order() {
        assert_eq!(
            AggregationKind::AllKinds.aggregates(),
            &[
                AggregationKind::Min,
                AggregationKind::Max,
                AggregationKind::Avg,
                AggregationKind::Timeout
            ]
        );
        assert!(AggregationKind::GetAll.aggregates().is_empty());
    }
}
