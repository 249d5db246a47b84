// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Pieces shared by every protocol: payload generation, `{{marker}}`
//! substitution and the translation of operator outcomes into result events.

pub mod generators;
pub mod replacer;

use chrono::Utc;

use crate::operators::Operators;
use crate::output::{value_as_string, InternalEvent, InternalWrappedEvent, ResultEvent};
use crate::protocols::ProtocolType;
use crate::template::TemplateMeta;

/// Text of a response part, empty when the part is absent.
pub fn part_corpus(data: &InternalEvent, part: &str) -> String {
    data.get(part).map(value_as_string).unwrap_or_default()
}

/// Hex text a `binary` matcher searches for `part`.
///
/// Parts received as raw bytes keep an exact `<part>_hex` sibling in the
/// event; any other part is hex encoded from its text.
pub fn binary_corpus(data: &InternalEvent, part: &str) -> String {
    match data.get(&format!("{}_hex", part)) {
        Some(value) => value_as_string(value),
        None => hex::encode(part_corpus(data, part)),
    }
}

/// Whether an outcome should be reported to the user.
///
/// With matchers, only a match counts; extraction-only operators report
/// whenever something user-visible was extracted.
pub fn is_reportable(operators: &Operators, wrapped: &InternalWrappedEvent) -> bool {
    match &wrapped.operators_result {
        Some(result) if operators.matchers.is_empty() => {
            result.extracted && operators.match_on_extraction
        }
        Some(result) => result.matched,
        None => false,
    }
}

/// One event per matched matcher, else one per extractor, else a single event.
pub fn make_result_events(
    meta: &TemplateMeta,
    protocol: ProtocolType,
    operators: &Operators,
    wrapped: &InternalWrappedEvent,
) -> Vec<ResultEvent> {
    let result = match &wrapped.operators_result {
        Some(result) if is_reportable(operators, wrapped) => result,
        _ => return Vec::new(),
    };

    let field = |key: &str| {
        wrapped
            .internal_event
            .get(key)
            .map(value_as_string)
            .filter(|value| !value.is_empty())
    };
    let base = ResultEvent {
        template_id: meta.id.clone(),
        template_path: meta.path.clone(),
        info: meta.info.clone(),
        protocol: protocol.to_string(),
        host: field("host").unwrap_or_default(),
        matched_at: field("matched").unwrap_or_default(),
        matcher_name: None,
        extractor_name: None,
        extracted_results: result.output_extracts.clone(),
        request: field("request"),
        response: field("response"),
        payload_values: result.payload_values.clone(),
        interaction: wrapped.internal_event.get("interaction").cloned(),
        timestamp: Utc::now(),
    };

    if !result.matches.is_empty() {
        return result
            .matches
            .keys()
            .map(|name| ResultEvent {
                matcher_name: Some(name.clone()),
                ..base.clone()
            })
            .collect();
    }

    if !result.extracts.is_empty() {
        return result
            .extracts
            .iter()
            .map(|(name, values)| ResultEvent {
                extractor_name: Some(name.clone()),
                extracted_results: values.clone(),
                ..base.clone()
            })
            .collect();
    }

    vec![base]
}
