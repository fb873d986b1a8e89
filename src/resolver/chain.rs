// Strategy Chain Resolver - ordered fallback over extractors
//
// Per request:
//   Pending -> TryingStrategy(0) -> ... -> Succeeded | Exhausted
// Any extractor failure (including a timeout or a candidate the validator
// proved broken) advances to the next strategy. The first accepted
// candidate stops the chain; later strategies are never invoked.
// Strategies run strictly one after another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::errors::{ExtractError, FailureClass, ResolveError, StrategyFailure};
use super::models::{
    ExtractOptions, ExtractionRequest, MediaCandidate, RequestId, StrategyKind, ValidationOutcome,
    Verdict,
};
use super::platform::Platform;
use super::profiles::profile;
use super::traits::Extractor;
use super::validator::CandidateValidator;

/// One extractor per strategy kind
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<StrategyKind, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extractor under its own kind, replacing any previous one
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn with(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.register(extractor);
        self
    }

    /// The platform's configured chain, limited to registered extractors
    pub fn chain_for(&self, platform: Platform) -> Vec<Arc<dyn Extractor>> {
        profile(platform)
            .chain
            .iter()
            .filter_map(|kind| {
                let found = self.extractors.get(kind).cloned();
                if found.is_none() {
                    tracing::debug!(%kind, %platform, "no extractor registered, skipping");
                }
                found
            })
            .collect()
    }
}

/// A candidate that made it through the chain
#[derive(Debug)]
pub struct ResolvedCandidate {
    pub candidate: MediaCandidate,
    pub outcome: ValidationOutcome,
    pub strategy: &'static str,
    pub kind: StrategyKind,
    pub attempt_index: usize,
    /// Failures of the strategies tried before this one
    pub failures: Vec<StrategyFailure>,
}

#[derive(Debug)]
pub enum ChainState {
    Pending,
    TryingStrategy(usize),
    Succeeded(Box<ResolvedCandidate>),
    Exhausted(Vec<StrategyFailure>),
}

pub struct ChainResolver {
    registry: ExtractorRegistry,
    validator: Arc<CandidateValidator>,
}

impl ChainResolver {
    pub fn new(registry: ExtractorRegistry, validator: Arc<CandidateValidator>) -> Self {
        Self {
            registry,
            validator,
        }
    }

    pub async fn resolve(
        &self,
        source_url: &str,
        platform: Platform,
        request_id: RequestId,
        options: &ExtractOptions,
    ) -> Result<ResolvedCandidate, ResolveError> {
        let chain = self.registry.chain_for(platform);
        let mut failures: Vec<StrategyFailure> = Vec::new();
        let mut state = ChainState::Pending;

        loop {
            state = match state {
                ChainState::Pending => ChainState::TryingStrategy(0),
                ChainState::TryingStrategy(index) => match chain.get(index) {
                    None => ChainState::Exhausted(std::mem::take(&mut failures)),
                    Some(extractor) => {
                        let request = ExtractionRequest {
                            source_url: source_url.to_string(),
                            platform,
                            attempt_index: index,
                            request_id,
                        };
                        match self.try_strategy(extractor.as_ref(), &request, options).await {
                            Ok((candidate, outcome)) => {
                                ChainState::Succeeded(Box::new(ResolvedCandidate {
                                    candidate,
                                    outcome,
                                    strategy: extractor.name(),
                                    kind: extractor.kind(),
                                    attempt_index: index,
                                    failures: std::mem::take(&mut failures),
                                }))
                            }
                            Err(failure) => {
                                failures.push(failure);
                                ChainState::TryingStrategy(index + 1)
                            }
                        }
                    }
                },
                ChainState::Succeeded(resolved) => return Ok(*resolved),
                ChainState::Exhausted(failures) => {
                    tracing::warn!(%platform, tried = failures.len(), "all strategies failed");
                    return Err(ResolveError::ExtractionExhausted { platform, failures });
                }
            };
        }
    }

    /// Run one extractor under the attempt timeout and validate its output
    async fn try_strategy(
        &self,
        extractor: &dyn Extractor,
        request: &ExtractionRequest,
        options: &ExtractOptions,
    ) -> Result<(MediaCandidate, ValidationOutcome), StrategyFailure> {
        let name = extractor.name();
        let kind = extractor.kind();
        let index = request.attempt_index;
        let started = Instant::now();

        tracing::info!(strategy = name, %kind, attempt = index, "trying strategy");

        let budget = options.attempt_budget();
        let attempt = tokio::time::timeout(budget, extractor.attempt(request, options))
            .await
            .unwrap_or(Err(ExtractError::Timeout(budget)));

        let candidate = match attempt {
            Ok(candidate) => candidate,
            Err(err) => {
                tracing::info!(
                    strategy = name,
                    attempt = index,
                    class = ?err.class(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "strategy failed"
                );
                return Err(StrategyFailure::from_error(name, kind, index, &err));
            }
        };

        let outcome = self.validator.validate(&candidate, request.platform).await;
        match outcome.verdict {
            Verdict::Valid => {
                tracing::info!(
                    strategy = name,
                    attempt = index,
                    confidence = ?candidate.confidence,
                    signature = outcome.signature.unwrap_or("-"),
                    "candidate validated"
                );
            }
            Verdict::Unknown => {
                tracing::warn!(
                    strategy = name,
                    attempt = index,
                    url = candidate.raw_url().unwrap_or("<local>"),
                    "candidate could not be validated, passing through"
                );
            }
            Verdict::Invalid => {
                tracing::info!(
                    strategy = name,
                    attempt = index,
                    status = ?outcome.probed_status,
                    "candidate rejected by probe"
                );
                return Err(StrategyFailure {
                    strategy: name,
                    kind,
                    attempt_index: index,
                    class: FailureClass::InvalidCandidate,
                    message: format!(
                        "probe rejected candidate (status {}, content-type {})",
                        outcome
                            .probed_status
                            .map_or_else(|| "-".to_string(), |s| s.to_string()),
                        outcome.probed_content_type.as_deref().unwrap_or("-")
                    ),
                });
            }
        }

        Ok((candidate, outcome))
    }
}
