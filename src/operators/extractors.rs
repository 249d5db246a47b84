// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::Value;

use super::dsl::{self, Expression};
use crate::errors::CompileError;
use crate::output::{value_as_string, InternalEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorType {
    Regex,
    Kval,
    Json,
    Dsl,
}

impl ExtractorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractorType::Regex => "regex",
            ExtractorType::Kval => "kval",
            ExtractorType::Json => "json",
            ExtractorType::Dsl => "dsl",
        }
    }
}

#[derive(Debug, Clone, Default)]
enum CompiledExtractor {
    #[default]
    Uncompiled,
    Regex(Vec<Regex>),
    Kval(Vec<String>),
    Json(Vec<Vec<String>>),
    Dsl(Vec<Expression>),
}

/// Pulls values out of a response, either for the user or for later steps.
#[derive(Debug, Clone, Deserialize)]
pub struct Extractor {
    #[serde(rename = "type")]
    pub extractor_type: ExtractorType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub regex: Vec<String>,
    /// Capture group returned by regex extractors; 0 is the whole match.
    #[serde(default)]
    pub group: usize,
    #[serde(default)]
    pub kval: Vec<String>,
    /// Dot-separated paths into a JSON body, e.g. `data.items.0.id`.
    #[serde(default)]
    pub json: Vec<String>,
    #[serde(default)]
    pub dsl: Vec<String>,
    /// Values feed later steps instead of the output.
    #[serde(default)]
    pub internal: bool,
    /// Internal values that should also appear in the output.
    #[serde(default)]
    pub export: bool,
    #[serde(default, alias = "case-insensitive")]
    pub case_insensitive: bool,
    #[serde(skip)]
    compiled: CompiledExtractor,
}

impl Extractor {
    pub fn new(extractor_type: ExtractorType) -> Self {
        Self {
            extractor_type,
            name: String::new(),
            part: String::new(),
            regex: Vec::new(),
            group: 0,
            kval: Vec::new(),
            json: Vec::new(),
            dsl: Vec::new(),
            internal: false,
            export: false,
            case_insensitive: false,
            compiled: CompiledExtractor::Uncompiled,
        }
    }

    pub fn regex_group<S: Into<String>>(pattern: S, group: usize) -> Self {
        let mut extractor = Self::new(ExtractorType::Regex);
        extractor.regex = vec![pattern.into()];
        extractor.group = group;
        extractor
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn on_part(mut self, part: &str) -> Self {
        self.part = part.to_string();
        self
    }

    /// Key used in `extracts`: the configured name or `<type>-<position>`.
    pub fn effective_name(&self, index: usize) -> String {
        if self.name.is_empty() {
            format!("{}-{}", self.extractor_type.as_str(), index + 1)
        } else {
            self.name.clone()
        }
    }

    pub fn compile(&mut self) -> Result<(), CompileError> {
        let label = if self.name.is_empty() {
            self.extractor_type.as_str().to_string()
        } else {
            self.name.clone()
        };
        if self.internal && self.name.is_empty() {
            return Err(CompileError::invalid_extractor(
                label,
                "internal extractors must be named",
            ));
        }
        let require = |empty: bool, field: &str| {
            if empty {
                Err(CompileError::invalid_extractor(
                    label.clone(),
                    format!("requires at least one entry in '{}'", field),
                ))
            } else {
                Ok(())
            }
        };

        self.compiled = match self.extractor_type {
            ExtractorType::Regex => {
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
                if let Some(pattern) = compiled.iter().find(|r| r.captures_len() <= self.group) {
                    return Err(CompileError::invalid_extractor(
                        label.clone(),
                        format!("pattern '{}' has no group {}", pattern.as_str(), self.group),
                    ));
                }
                CompiledExtractor::Regex(compiled)
            }
            ExtractorType::Kval => {
                require(self.kval.is_empty(), "kval")?;
                CompiledExtractor::Kval(self.kval.iter().map(|k| normalize_key(k)).collect())
            }
            ExtractorType::Json => {
                require(self.json.is_empty(), "json")?;
                let paths = self
                    .json
                    .iter()
                    .map(|path| {
                        path.trim_start_matches('.')
                            .split('.')
                            .filter(|segment| !segment.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .collect();
                CompiledExtractor::Json(paths)
            }
            ExtractorType::Dsl => {
                require(self.dsl.is_empty(), "dsl")?;
                let expressions = self
                    .dsl
                    .iter()
                    .map(|source| dsl::compile(source))
                    .collect::<Result<Vec<_>, _>>()?;
                CompiledExtractor::Dsl(expressions)
            }
        };
        Ok(())
    }

    /// Runs the extractor over `corpus` (the selected part) or `data`.
    ///
    /// Order follows declaration order and first appearance; duplicates are
    /// dropped.
    pub fn evaluate(&self, corpus: &str, data: &InternalEvent) -> Vec<String> {
        let mut values = Vec::new();
        let mut push = |value: String| {
            if !value.is_empty() && !values.contains(&value) {
                values.push(value);
            }
        };

        match &self.compiled {
            CompiledExtractor::Uncompiled => {}
            CompiledExtractor::Regex(patterns) => {
                for pattern in patterns {
                    for captures in pattern.captures_iter(corpus) {
                        if let Some(group) = captures.get(self.group) {
                            push(group.as_str().to_string());
                        }
                    }
                }
            }
            CompiledExtractor::Kval(keys) => {
                for key in keys {
                    let found = data
                        .iter()
                        .find(|(candidate, _)| normalize_key(candidate) == *key);
                    if let Some((_, value)) = found {
                        push(value_as_string(value));
                    }
                }
            }
            CompiledExtractor::Json(paths) => {
                if let Ok(document) = serde_json::from_str::<Value>(corpus) {
                    for path in paths {
                        if let Some(value) = query(&document, path) {
                            match value {
                                Value::String(s) => push(s.clone()),
                                other => push(other.to_string()),
                            }
                        }
                    }
                }
            }
            CompiledExtractor::Dsl(expressions) => {
                for expression in expressions {
                    if let Ok(value) = expression.evaluate(data) {
                        push(value_as_string(&value));
                    }
                }
            }
        }

        values
    }
}

/// Header-style keys compare lowercased with `-` folded to `_`.
fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace('-', "_")
}

fn query<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
