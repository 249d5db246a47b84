// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Matchers and extractors evaluated against a response's data map.
//!
//! [`Operators::execute`] is protocol agnostic: the protocol supplies the
//! per-matcher and per-extractor evaluation functions that know how to select
//! the requested part of its own responses. Extractors run first so that the
//! values they produce are visible to matchers evaluated in the same call.

use std::borrow::Cow;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CompileError;
use crate::observability::messages::{protocol::MatcherEvaluated, StructuredLog};
use crate::output::{extracted_value, InternalEvent};

pub mod dsl;
pub mod extractors;
pub mod matchers;

pub use extractors::{Extractor, ExtractorType};
pub use matchers::{ConditionType, Matcher, MatcherType};

/// Outcome of running one request's operators over one response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperatorResult {
    /// Matcher condition satisfied.
    pub matched: bool,
    /// At least one user-visible value was extracted.
    pub extracted: bool,
    /// Matcher name to matched snippets, in evaluation order.
    pub matches: IndexMap<String, Vec<String>>,
    /// Extractor name to extracted values, user-visible extractors only.
    pub extracts: IndexMap<String, Vec<String>>,
    /// Deduplicated user-visible extractions in first-seen order.
    pub output_extracts: Vec<String>,
    /// Internal extractor name to values, for later steps.
    pub dynamic_values: IndexMap<String, Vec<String>>,
    /// Payload values of the variation that produced the response.
    pub payload_values: IndexMap<String, Value>,
}

impl OperatorResult {
    /// Matched, extracted or captured something for later steps.
    pub fn has_outcome(&self) -> bool {
        self.matched || self.extracted || !self.dynamic_values.is_empty()
    }

    /// Dynamic values in the shape they take inside an internal event.
    pub fn dynamic_event(&self) -> InternalEvent {
        self.dynamic_values
            .iter()
            .map(|(name, values)| (name.clone(), extracted_value(values)))
            .collect()
    }

    /// Folds a later evaluation (e.g. after an interaction) into this result.
    pub fn merge(&mut self, other: &OperatorResult) {
        self.matched |= other.matched;
        self.extracted |= other.extracted;
        for (name, snippets) in &other.matches {
            self.matches.insert(name.clone(), snippets.clone());
        }
        for (name, values) in &other.extracts {
            self.extracts.insert(name.clone(), values.clone());
        }
        for value in &other.output_extracts {
            if !self.output_extracts.contains(value) {
                self.output_extracts.push(value.clone());
            }
        }
        for (name, values) in &other.dynamic_values {
            self.dynamic_values.insert(name.clone(), values.clone());
        }
    }
}

fn default_true() -> bool {
    true
}

/// Ordered matchers and extractors plus the rule combining the matchers.
#[derive(Debug, Clone, Deserialize)]
pub struct Operators {
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub extractors: Vec<Extractor>,
    #[serde(default, alias = "matchers-condition")]
    pub matchers_condition: ConditionType,
    /// With no matchers, a successful extraction counts as a match.
    #[serde(default = "default_true", alias = "match-on-extraction")]
    pub match_on_extraction: bool,
}

impl Default for Operators {
    fn default() -> Self {
        Self {
            matchers: Vec::new(),
            extractors: Vec::new(),
            matchers_condition: ConditionType::Or,
            match_on_extraction: true,
        }
    }
}

impl Operators {
    pub fn new(matchers: Vec<Matcher>, extractors: Vec<Extractor>) -> Self {
        Self {
            matchers,
            extractors,
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: ConditionType) -> Self {
        self.matchers_condition = condition;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty() && self.extractors.is_empty()
    }

    /// Names every matcher can be referenced by from workflow branches.
    pub fn matcher_names(&self) -> Vec<String> {
        self.matchers
            .iter()
            .enumerate()
            .map(|(i, m)| m.effective_name(i))
            .collect()
    }

    pub fn compile(&mut self) -> Result<(), CompileError> {
        for matcher in &mut self.matchers {
            matcher.compile()?;
        }
        for extractor in &mut self.extractors {
            extractor.compile()?;
        }
        Ok(())
    }

    /// Evaluates extractors then matchers over `data`.
    ///
    /// `match_fn` returns the raw predicate of one matcher; negation is applied
    /// here. Returns the result and whether the response counts as a match
    /// overall.
    pub fn execute<M, E>(
        &self,
        data: &InternalEvent,
        match_fn: M,
        extract_fn: E,
        debug: bool,
    ) -> (OperatorResult, bool)
    where
        M: Fn(&InternalEvent, &Matcher) -> (bool, Vec<String>),
        E: Fn(&InternalEvent, &Extractor) -> Vec<String>,
    {
        let mut result = OperatorResult::default();
        let mut data = Cow::Borrowed(data);
        let mut seen = HashSet::new();

        for (index, extractor) in self.extractors.iter().enumerate() {
            let values = extract_fn(&*data, extractor);
            if values.is_empty() {
                continue;
            }

            if extractor.internal {
                result
                    .dynamic_values
                    .entry(extractor.name.clone())
                    .or_default()
                    .extend(values.iter().cloned());
            }
            if !extractor.internal || extractor.export {
                for value in &values {
                    if seen.insert(value.clone()) {
                        result.output_extracts.push(value.clone());
                    }
                }
                result
                    .extracts
                    .entry(extractor.effective_name(index))
                    .or_default()
                    .extend(values.iter().cloned());
            }
            if !extractor.name.is_empty() {
                data.to_mut()
                    .insert(extractor.name.clone(), extracted_value(&values));
            }
        }
        result.extracted = !result.output_extracts.is_empty();

        let mut matched = false;
        for (index, matcher) in self.matchers.iter().enumerate() {
            let (raw, snippets) = match_fn(&*data, matcher);
            let is_match = matcher.result(raw);
            let name = matcher.effective_name(index);

            if debug {
                MatcherEvaluated {
                    matcher: &name,
                    matcher_type: matcher.matcher_type.as_str(),
                    matched: is_match,
                    snippets: snippets.len(),
                }
                .log();
            }

            if !is_match {
                if self.matchers_condition == ConditionType::And {
                    matched = false;
                    result.matches.clear();
                    break;
                }
                continue;
            }

            matched = true;
            let snippets = if matcher.negative { Vec::new() } else { snippets };
            result.matches.insert(name, snippets);
        }
        result.matched = matched;

        let overall = if self.matchers.is_empty() {
            self.match_on_extraction && (result.extracted || !result.dynamic_values.is_empty())
        } else {
            result.matched
        };

        (result, overall)
    }
}
