use chrono::{DateTime, Utc};
use regex::Regex;
use std::time::Duration;

use crate::types::EventRecord;

#[derive(Debug, Clone)]
pub enum MessageMatcher {
    /// Case-sensitive substring.
    Contains(String),
    Pattern(Regex),
}

impl MessageMatcher {
    fn is_match(&self, message: &str) -> bool {
        match self {
            MessageMatcher::Contains(needle) => message.contains(needle.as_str()),
            MessageMatcher::Pattern(re) => re.is_match(message),
        }
    }
}

/// Predicate over a single event: optional exact reason, message matcher and
/// optional maximum event age.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub reason: Option<String>,
    pub message: MessageMatcher,
    pub max_age: Option<Duration>,
}

impl MatchRule {
    pub fn contains(reason: Option<&str>, needle: &str) -> Self {
        Self {
            reason: reason.map(str::to_string),
            message: MessageMatcher::Contains(needle.to_string()),
            max_age: None,
        }
    }

    pub fn pattern(reason: Option<&str>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            reason: reason.map(str::to_string),
            message: MessageMatcher::Pattern(Regex::new(pattern)?),
            max_age: None,
        })
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn is_satisfied_by(&self, event: &EventRecord, now: DateTime<Utc>) -> bool {
        if let Some(reason) = &self.reason
            && event.reason != *reason
        {
            return false;
        }
        if let (Some(max_age), Some(seen)) = (self.max_age, event.last_timestamp)
            && let Ok(max_age) = chrono::Duration::from_std(max_age)
            && seen < now - max_age
        {
            return false;
        }
        self.message.is_match(&event.message)
    }
}

/// True if any event satisfies the rule.
pub fn matches(events: &[EventRecord], rule: &MatchRule, now: DateTime<Utc>) -> bool {
    events.iter().any(|e| rule.is_satisfied_by(e, now))
}

/// A rule that matched, with the most recent event that satisfied it.
#[derive(Debug, Clone, Copy)]
pub struct RuleHit<'a> {
    pub rule: &'a str,
    pub event: &'a EventRecord,
}

/// Named rules, evaluated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(String, MatchRule)>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing an existing one with the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, rule: MatchRule) {
        let name = name.into();
        if let Some(slot) = self.rules.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = rule;
        } else {
            self.rules.push((name, rule));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(n, _)| n.as_str())
    }

    /// First rule (in order) satisfied by any event.
    pub fn first_match<'a>(
        &'a self,
        events: &'a [EventRecord],
        now: DateTime<Utc>,
    ) -> Option<RuleHit<'a>> {
        let (name, rule) = self
            .rules
            .iter()
            .find(|(_, rule)| matches(events, rule, now))?;
        events
            .iter()
            .filter(|e| rule.is_satisfied_by(e, now))
            .max_by_key(|e| e.last_timestamp)
            .map(|event| RuleHit { rule: name, event })
    }
}
