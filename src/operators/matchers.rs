// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use super::dsl::{self, Expression};
use crate::errors::CompileError;
use crate::output::InternalEvent;

/// How a list of predicates is combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionType {
    And,
    #[default]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherType {
    Word,
    Regex,
    Status,
    Size,
    Binary,
    Dsl,
}

impl MatcherType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherType::Word => "word",
            MatcherType::Regex => "regex",
            MatcherType::Status => "status",
            MatcherType::Size => "size",
            MatcherType::Binary => "binary",
            MatcherType::Dsl => "dsl",
        }
    }
}

#[derive(Debug, Clone, Default)]
enum CompiledMatcher {
    #[default]
    Uncompiled,
    Words(Vec<String>),
    Regex(Vec<Regex>),
    Status,
    Size,
    Binary(Vec<Vec<u8>>),
    Dsl(Vec<Expression>),
}

/// A single predicate over a response.
#[derive(Debug, Clone, Deserialize)]
pub struct Matcher {
    #[serde(rename = "type")]
    pub matcher_type: MatcherType,
    #[serde(default)]
    pub name: String,
    /// Response part to read; protocol default when empty.
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub condition: ConditionType,
    #[serde(default)]
    pub negative: bool,
    #[serde(default, alias = "case-insensitive")]
    pub case_insensitive: bool,
    #[serde(default, alias = "match-all")]
    pub match_all: bool,
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub regex: Vec<String>,
    #[serde(default)]
    pub status: Vec<u16>,
    #[serde(default)]
    pub size: Vec<usize>,
    #[serde(default)]
    pub binary: Vec<String>,
    #[serde(default)]
    pub dsl: Vec<String>,
    #[serde(skip)]
    compiled: CompiledMatcher,
}

impl Matcher {
    pub fn new(matcher_type: MatcherType) -> Self {
        Self {
            matcher_type,
            name: String::new(),
            part: String::new(),
            condition: ConditionType::Or,
            negative: false,
            case_insensitive: false,
            match_all: false,
            words: Vec::new(),
            regex: Vec::new(),
            status: Vec::new(),
            size: Vec::new(),
            binary: Vec::new(),
            dsl: Vec::new(),
            compiled: CompiledMatcher::Uncompiled,
        }
    }

    pub fn words<I: IntoIterator<Item = S>, S: Into<String>>(words: I) -> Self {
        let mut matcher = Self::new(MatcherType::Word);
        matcher.words = words.into_iter().map(Into::into).collect();
        matcher
    }

    pub fn regexes<I: IntoIterator<Item = S>, S: Into<String>>(patterns: I) -> Self {
        let mut matcher = Self::new(MatcherType::Regex);
        matcher.regex = patterns.into_iter().map(Into::into).collect();
        matcher
    }

    pub fn statuses<I: IntoIterator<Item = u16>>(codes: I) -> Self {
        let mut matcher = Self::new(MatcherType::Status);
        matcher.status = codes.into_iter().collect();
        matcher
    }

    pub fn expressions<I: IntoIterator<Item = S>, S: Into<String>>(expressions: I) -> Self {
        let mut matcher = Self::new(MatcherType::Dsl);
        matcher.dsl = expressions.into_iter().map(Into::into).collect();
        matcher
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn negated(mut self) -> Self {
        self.negative = true;
        self
    }

    pub fn with_condition(mut self, condition: ConditionType) -> Self {
        self.condition = condition;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn on_part(mut self, part: &str) -> Self {
        self.part = part.to_string();
        self
    }

    /// Name used in results: the configured name or `<type>-<position>`.
    pub fn effective_name(&self, index: usize) -> String {
        if self.name.is_empty() {
            format!("{}-{}", self.matcher_type.as_str(), index + 1)
        } else {
            self.name.clone()
        }
    }

    /// Validates the matcher and precompiles its patterns.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        let label = if self.name.is_empty() {
            self.matcher_type.as_str().to_string()
        } else {
            self.name.clone()
        };
        let require = |empty: bool, field: &str| {
            if empty {
                Err(CompileError::invalid_matcher(
                    label.clone(),
                    format!("{} matcher requires at least one entry in '{}'", field, field),
                ))
            } else {
                Ok(())
            }
        };

        self.compiled = match self.matcher_type {
            MatcherType::Word => {
                require(self.words.is_empty(), "words")?;
                let words = if self.case_insensitive {
                    self.words.iter().map(|w| w.to_lowercase()).collect()
                } else {
                    self.words.clone()
                };
                CompiledMatcher::Words(words)
            }
            MatcherType::Regex => {
                require(self.regex.is_empty(), "regex")?;
                let compiled = self
                    .regex
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(self.case_insensitive)
                            .build()
                            .map_err(|source| CompileError::InvalidRegex {
                                pattern: pattern.clone(),
                                source,
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledMatcher::Regex(compiled)
            }
            MatcherType::Status => {
                require(self.status.is_empty(), "status")?;
                CompiledMatcher::Status
            }
            MatcherType::Size => {
                require(self.size.is_empty(), "size")?;
                CompiledMatcher::Size
            }
            MatcherType::Binary => {
                require(self.binary.is_empty(), "binary")?;
                let normalized = self
                    .binary
                    .iter()
                    .map(|hex_value| match hex::decode(hex_value) {
                        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
                        Ok(_) => Err(CompileError::invalid_matcher(
                            label.clone(),
                            "empty binary sequence",
                        )),
                        Err(e) => Err(CompileError::invalid_matcher(
                            label.clone(),
                            format!("invalid hex '{}': {}", hex_value, e),
                        )),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledMatcher::Binary(normalized)
            }
            MatcherType::Dsl => {
                require(self.dsl.is_empty(), "dsl")?;
                let expressions = self
                    .dsl
                    .iter()
                    .map(|source| dsl::compile(source))
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledMatcher::Dsl(expressions)
            }
        };
        Ok(())
    }

    /// Applies `negative` to a raw predicate outcome.
    pub fn result(&self, matched: bool) -> bool {
        matched != self.negative
    }

    /// Evaluates the matcher's raw predicate (before negation).
    ///
    /// `corpus` is the text of the selected part; status and size read their
    /// numbers from `status_code` and the corpus length respectively. Binary
    /// matchers expect the part's bytes hex encoded, see
    /// [`binary_corpus`](crate::protocols::common::binary_corpus).
    pub fn evaluate(&self, corpus: &str, data: &InternalEvent) -> (bool, Vec<String>) {
        match &self.compiled {
            CompiledMatcher::Uncompiled => (false, Vec::new()),
            CompiledMatcher::Words(words) => self.match_words(corpus, words),
            CompiledMatcher::Regex(patterns) => self.match_regex(corpus, patterns),
            CompiledMatcher::Status => {
                let code = data
                    .get("status_code")
                    .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));
                (self.match_status(code), Vec::new())
            }
            CompiledMatcher::Size => (self.match_size(corpus.len()), Vec::new()),
            CompiledMatcher::Binary(needles) => self.match_binary(corpus, needles),
            CompiledMatcher::Dsl(expressions) => (self.match_dsl(data, expressions), Vec::new()),
        }
    }

    fn match_words(&self, corpus: &str, words: &[String]) -> (bool, Vec<String>) {
        let lowered;
        let corpus = if self.case_insensitive {
            lowered = corpus.to_lowercase();
            lowered.as_str()
        } else {
            corpus
        };

        let mut matched = Vec::new();
        for (i, word) in words.iter().enumerate() {
            if !corpus.contains(word.as_str()) {
                match self.condition {
                    ConditionType::And => return (false, Vec::new()),
                    ConditionType::Or => continue,
                }
            }
            if self.condition == ConditionType::Or && !self.match_all {
                return (true, vec![word.clone()]);
            }
            matched.push(word.clone());
            if i == words.len() - 1 && !self.match_all {
                return (true, matched);
            }
        }

        if !matched.is_empty() && self.match_all {
            return (true, matched);
        }
        (false, Vec::new())
    }

    fn match_regex(&self, corpus: &str, patterns: &[Regex]) -> (bool, Vec<String>) {
        let mut matched = Vec::new();
        for (i, pattern) in patterns.iter().enumerate() {
            if !pattern.is_match(corpus) {
                match self.condition {
                    ConditionType::And => return (false, Vec::new()),
                    ConditionType::Or => continue,
                }
            }
            let found: Vec<String> = pattern
                .find_iter(corpus)
                .map(|m| m.as_str().to_string())
                .collect();
            if self.condition == ConditionType::Or && !self.match_all {
                return (true, found);
            }
            matched.extend(found);
            if i == patterns.len() - 1 && !self.match_all {
                return (true, matched);
            }
        }

        if !matched.is_empty() && self.match_all {
            return (true, matched);
        }
        (false, Vec::new())
    }

    fn match_binary(&self, hex_corpus: &str, needles: &[Vec<u8>]) -> (bool, Vec<String>) {
        let Ok(corpus) = hex::decode(hex_corpus) else {
            return (false, Vec::new());
        };
        let mut matched = Vec::new();
        for (i, needle) in needles.iter().enumerate() {
            let found = corpus.windows(needle.len()).any(|window| window == needle.as_slice());
            if !found {
                match self.condition {
                    ConditionType::And => return (false, Vec::new()),
                    ConditionType::Or => continue,
                }
            }
            let snippet = self.binary[i].clone();
            if self.condition == ConditionType::Or && !self.match_all {
                return (true, vec![snippet]);
            }
            matched.push(snippet);
            if i == needles.len() - 1 && !self.match_all {
                return (true, matched);
            }
        }

        if !matched.is_empty() && self.match_all {
            return (true, matched);
        }
        (false, Vec::new())
    }

    fn match_status(&self, code: Option<u64>) -> bool {
        code.map(|code| self.status.iter().any(|s| u64::from(*s) == code))
            .unwrap_or(false)
    }

    fn match_size(&self, length: usize) -> bool {
        self.size.contains(&length)
    }

    fn match_dsl(&self, data: &InternalEvent, expressions: &[Expression]) -> bool {
        let mut results = expressions.iter().map(|e| e.matches(data));
        match self.condition {
            ConditionType::And => results.all(|r| r),
            ConditionType::Or => results.any(|r| r),
        }
    }
}
