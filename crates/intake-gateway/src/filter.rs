// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use regex::RegexSet;

use crate::payload::V1Metric;

/// Drops the agent's self-monitoring metrics (`datadog.*` namespaces).
pub const DEFAULT_EXCLUDE_PATTERN: &str = r".+\.datadog\..+";

/// Exclusion filters on metric names. A metric matching any pattern is dropped.
#[derive(Debug, Clone)]
pub struct Filters {
    set: RegexSet,
}

impl Default for Filters {
    fn default() -> Self {
        Filters {
            set: RegexSet::empty(),
        }
    }
}

impl Filters {
    /// Compiles `patterns` into a single matcher. Patterns are unanchored.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Filters {
            set: RegexSet::new(patterns)?,
        })
    }

    /// The filters applied when none are configured.
    #[must_use]
    pub fn datadog() -> Self {
        #[allow(clippy::expect_used)]
        Filters::new([DEFAULT_EXCLUDE_PATTERN]).expect("default pattern is valid")
    }

    #[must_use]
    pub fn is_excluded(&self, name: &str) -> bool {
        self.set.is_match(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.set.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Removes excluded metrics in place, keeping the relative order of the rest.
    pub fn exclude_v1_metrics(&self, metrics: &mut Vec<V1Metric>) {
        if self.is_empty() {
            return;
        }
        metrics.retain(|m| !self.is_excluded(&m.metric));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn metrics(names: &[&str]) -> Vec<V1Metric> {
        names
            .iter()
            .map(|name| V1Metric {
                metric: (*name).to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_exclude_v1_metrics() {
        let cases = [
            (
                vec![DEFAULT_EXCLUDE_PATTERN],
                vec!["system.cpu.system", "foo.datadog.bar"],
                vec!["system.cpu.system"],
            ),
            (
                vec![".+"],
                vec!["system.cpu.system", "foo.datadog.bar"],
                vec![],
            ),
            (
                vec![DEFAULT_EXCLUDE_PATTERN],
                vec!["system.cpu.system", "system.cpu.user"],
                vec!["system.cpu.system", "system.cpu.user"],
            ),
        ];

        for (patterns, input, expected) in cases {
            let filters = Filters::new(patterns).expect("invalid pattern");
            let mut input = metrics(&input);
            filters.exclude_v1_metrics(&mut input);
            assert_eq!(input, metrics(&expected));
        }
    }

    #[test]
    fn test_default_filters() {
        let filters = Filters::datadog();
        assert_eq!(filters.len(), 1);
        assert!(filters.is_excluded("datadog.agent.running.datadog.x"));
        assert!(filters.is_excluded("foo.datadog.bar"));
        assert!(!filters.is_excluded("datadog.agent.running"));
    }

    #[test]
    fn test_no_filters_keep_everything() {
        let filters = Filters::default();
        let mut input = metrics(&["a", "foo.datadog.bar"]);
        filters.exclude_v1_metrics(&mut input);
        assert_eq!(input.len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Filters::new(["(unclosed"]).is_err());
    }

    proptest! {
        #[test]
        fn test_filtering_is_idempotent_and_ordered(
            names in prop::collection::vec("[a-z]{1,4}(\\.(datadog|cpu|mem)){0,2}(\\.[a-z]{1,4})?", 0..20)
        ) {
            let filters = Filters::datadog();
            let mut once = metrics(&names.iter().map(String::as_str).collect::<Vec<_>>());
            filters.exclude_v1_metrics(&mut once);

            let mut twice = once.clone();
            filters.exclude_v1_metrics(&mut twice);
            prop_assert_eq!(&once, &twice);

            let kept: Vec<&str> = names
                .iter()
                .map(String::as_str)
                .filter(|n| !filters.is_excluded(n))
                .collect();
            let result: Vec<&str> = once.iter().map(|m| m.metric.as_str()).collect();
            prop_assert_eq!(result, kept);
        }
    }
}
