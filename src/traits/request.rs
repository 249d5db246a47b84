// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::config::ExecuterOptions;
use crate::engine::input::ScanTarget;
use crate::errors::{CompileError, ExecutionError};
use crate::operators::{Extractor, Matcher, OperatorResult, Operators};
use crate::output::{InternalEvent, InternalWrappedEvent, ResultEvent};
use crate::protocols::ProtocolType;
use crate::template::TemplateMeta;

/// Receives one wrapped event per variation, in declaration order.
///
/// Returning an error abandons the request's remaining variations for the
/// current input.
pub type EventCallback<'a> =
    dyn FnMut(InternalWrappedEvent) -> Result<(), ExecutionError> + Send + 'a;

/// One protocol step of a template.
///
/// Implementations are compiled once and then shared read-only by every
/// concurrent execution.
#[async_trait]
pub trait ProtocolRequest: Send + Sync {
    /// Validates the definition and precompiles operators, generators and
    /// transport settings. Calling it again is a no-op.
    fn compile(&mut self, options: &ExecuterOptions) -> Result<(), CompileError>;

    /// Number of physical exchanges one input produces.
    fn requests(&self) -> usize;

    /// Step id, empty when the step is anonymous.
    fn id(&self) -> &str;

    fn protocol(&self) -> ProtocolType;

    fn operators(&self) -> &Operators;

    /// Identity of the template this step belongs to.
    fn meta(&self) -> &TemplateMeta;

    /// Raw predicate of one matcher over this protocol's data map.
    fn matches(&self, data: &InternalEvent, matcher: &Matcher) -> (bool, Vec<String>);

    fn extract(&self, data: &InternalEvent, extractor: &Extractor) -> Vec<String>;

    /// Runs every variation against `input`.
    ///
    /// `dynamic_values` and `previous` hold what earlier steps produced; the
    /// callback is invoked once per completed variation.
    async fn execute_with_results(
        &self,
        input: &ScanTarget,
        dynamic_values: &InternalEvent,
        previous: &InternalEvent,
        callback: &mut EventCallback<'_>,
    ) -> Result<(), ExecutionError>;

    fn make_result_events(&self, wrapped: &InternalWrappedEvent) -> Vec<ResultEvent>;

    /// Fingerprint of the physical exchange; `None` when the step cannot
    /// share an exchange with other templates.
    fn cluster_key(&self) -> Option<String> {
        None
    }

    /// Runs this step's operators over `data`. `Some` when anything matched
    /// or was extracted.
    fn evaluate(&self, data: &InternalEvent, debug: bool) -> Option<OperatorResult> {
        let operators = self.operators();
        if operators.is_empty() {
            return None;
        }
        let (result, _) = operators.execute(
            data,
            |data, matcher| self.matches(data, matcher),
            |data, extractor| self.extract(data, extractor),
            debug,
        );
        result.has_outcome().then_some(result)
    }
}
