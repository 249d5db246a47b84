// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Payload sets and the attack types that combine them into variations.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::CompileError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackType {
    /// The same value goes into every position.
    #[default]
    Batteringram,
    /// The i-th value of every set is used together; sets must be equally long.
    Pitchfork,
    /// Cartesian product of every set.
    Clusterbomb,
}

/// Payload values as written in a template: an inline list or a file of lines.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PayloadSource {
    Values(Vec<String>),
    File(String),
}

impl PayloadSource {
    fn load(&self, base_dir: Option<&Path>) -> Result<Vec<String>, CompileError> {
        match self {
            PayloadSource::Values(values) => Ok(values.clone()),
            PayloadSource::File(path) => {
                let path = match base_dir {
                    Some(dir) if Path::new(path).is_relative() => dir.join(path),
                    _ => Path::new(path).to_path_buf(),
                };
                let content =
                    fs::read_to_string(&path).map_err(|e| CompileError::InvalidGenerator {
                        reason: format!("cannot read payload file '{}': {}", path.display(), e),
                    })?;
                Ok(content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect())
            }
        }
    }
}

/// Expands named payload sets into per-variation value maps.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadGenerator {
    attack: AttackType,
    sets: IndexMap<String, Vec<String>>,
}

impl PayloadGenerator {
    pub fn new(
        sources: &IndexMap<String, PayloadSource>,
        attack: AttackType,
        base_dir: Option<&Path>,
    ) -> Result<Self, CompileError> {
        let mut sets = IndexMap::new();
        for (name, source) in sources {
            let values = source.load(base_dir)?;
            if values.is_empty() {
                return Err(CompileError::InvalidGenerator {
                    reason: format!("payload set '{}' is empty", name),
                });
            }
            sets.insert(name.clone(), values);
        }

        if attack == AttackType::Pitchfork {
            let mut lengths = sets.values().map(Vec::len);
            if let Some(first) = lengths.next() {
                if lengths.any(|len| len != first) {
                    return Err(CompileError::InvalidGenerator {
                        reason: "pitchfork payload sets must have the same length".to_string(),
                    });
                }
            }
        }

        Ok(Self { attack, sets })
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Number of value maps [`combinations`](Self::combinations) yields.
    pub fn total(&self) -> usize {
        if self.sets.is_empty() {
            return 0;
        }
        match self.attack {
            AttackType::Batteringram => self.distinct_values().len(),
            AttackType::Pitchfork => self.sets.values().map(Vec::len).next().unwrap_or(0),
            AttackType::Clusterbomb => self.sets.values().map(Vec::len).product(),
        }
    }

    fn distinct_values(&self) -> Vec<&String> {
        let mut values: Vec<&String> = Vec::new();
        for value in self.sets.values().flatten() {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    /// Lazily yields one value map per variation in declaration order.
    ///
    /// Clusterbomb combinations are decoded from their position, so memory
    /// stays proportional to the payload sets rather than their product.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations::new(Some(self))
    }
}

/// Iterator over payload value maps.
///
/// Built without a generator it yields a single empty map, so requests
/// without payloads still run once.
pub struct Combinations<'a> {
    generator: Option<&'a PayloadGenerator>,
    distinct: Vec<&'a String>,
    position: usize,
    total: usize,
}

impl<'a> Combinations<'a> {
    pub fn new(generator: Option<&'a PayloadGenerator>) -> Self {
        let (distinct, total) = match generator {
            Some(g) if g.attack == AttackType::Batteringram => {
                let distinct = g.distinct_values();
                let total = distinct.len();
                (distinct, total)
            }
            Some(g) => (Vec::new(), g.total()),
            None => (Vec::new(), 1),
        };
        Self {
            generator,
            distinct,
            position: 0,
            total,
        }
    }

    fn at(&self, generator: &PayloadGenerator, position: usize) -> IndexMap<String, Value> {
        match generator.attack {
            AttackType::Batteringram => generator
                .sets
                .keys()
                .map(|name| (name.clone(), Value::String(self.distinct[position].clone())))
                .collect(),
            AttackType::Pitchfork => generator
                .sets
                .iter()
                .map(|(name, values)| (name.clone(), Value::String(values[position].clone())))
                .collect(),
            AttackType::Clusterbomb => {
                // Mixed radix: the last set varies fastest.
                let mut indices = vec![0; generator.sets.len()];
                let mut rest = position;
                for (slot, values) in generator.sets.values().enumerate().rev() {
                    indices[slot] = rest % values.len();
                    rest /= values.len();
                }
                generator
                    .sets
                    .iter()
                    .zip(indices)
                    .map(|((name, values), i)| (name.clone(), Value::String(values[i].clone())))
                    .collect()
            }
        }
    }
}

impl Iterator for Combinations<'_> {
    type Item = IndexMap<String, Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let item = match self.generator {
            Some(generator) => self.at(generator, self.position),
            None => IndexMap::new(),
        };
        self.position += 1;
        Some(item)
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.position = self.position.saturating_add(n);
        self.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total.saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}
