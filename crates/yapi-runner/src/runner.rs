//! Executes single requests and request chains.

use bytes::Bytes;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use yapi_analyzer::{JqChecker, ValidationError, validate_chain, validate_request};
use yapi_config::{EnvSource, MapResolver, ResolveError, compile};
use yapi_core::duration::parse_duration;
use yapi_core::{ConfigV1, Request, Response, TransportProvider};

use crate::context::ChainContext;
use crate::error::{RunError, RunnerResult};
use crate::expect::{ExpectationResult, check_expectations};
use crate::filter::{JqFilter, ResponseFilter};
use crate::interpolate::interpolate_step;

/// A completed request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub request: Request,
    pub response: Response,
    /// The response body after `jq_filter`.
    pub body: String,
    /// `application/json` when a filter rewrote the body, else the response's.
    pub content_type: Option<String>,
}

impl RequestOutcome {
    /// The response as later steps see it: the filtered body with the
    /// original status and headers.
    pub fn visible_response(&self) -> Response {
        Response {
            body: Bytes::from(self.body.clone()),
            ..self.response.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub name: String,
    pub outcome: RequestOutcome,
    pub expectation: ExpectationResult,
}

/// Result of a chain execution.
#[derive(Debug, Clone, Default)]
pub struct ChainResult {
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    /// Set when a step's expectations failed.
    pub error: Option<String>,
}

impl ChainResult {
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| !s.expectation.all_passed())
    }
}

/// Event emitted during chain execution.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    StepStarted {
        index: usize,
        step: String,
    },
    StepDelayed {
        step: String,
        #[serde(with = "millis")]
        delay: Duration,
    },
    StepCompleted {
        step: String,
        status: u16,
        #[serde(with = "millis")]
        duration: Duration,
        passed: bool,
    },
    ChainCompleted {
        success: bool,
    },
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}

/// Runs requests through the transports of a [`TransportProvider`].
#[derive(Clone)]
pub struct Runner {
    transports: Arc<dyn TransportProvider>,
    filter: Arc<dyn ResponseFilter>,
    env: EnvSource,
    /// Project/environment variables, consulted after the environment.
    vars: HashMap<String, String>,
}

impl Runner {
    pub fn new(transports: Arc<dyn TransportProvider>) -> Self {
        Self {
            transports,
            filter: Arc::new(JqFilter),
            env: EnvSource::process(),
            vars: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    pub fn with_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn filter(&self) -> &dyn ResponseFilter {
        self.filter.as_ref()
    }

    /// Compile a single-request document and run it.
    pub async fn run_config(
        &self,
        cancel: &CancellationToken,
        config: &ConfigV1,
    ) -> RunnerResult<RequestOutcome> {
        let resolver = MapResolver::new(self.env.clone(), self.vars.clone());
        let request = compile(config, &resolver)
            .into_request()
            .map_err(RunError::Compile)?;
        check_request(&request, config)?;
        self.run_request(cancel, request).await
    }

    /// Execute a compiled request and apply its `jq_filter`.
    pub async fn run_request(
        &self,
        cancel: &CancellationToken,
        request: Request,
    ) -> RunnerResult<RequestOutcome> {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        let kind = request.transport();
        let transport = self
            .transports
            .transport(kind)
            .ok_or(RunError::NoTransport(kind))?;

        debug!(transport = transport.name(), url = %request.url, method = %request.method, "Executing request");
        let response = transport.execute(cancel, &request).await?;
        debug!(status = response.status_code, elapsed_ms = response.duration.as_millis() as u64, "Response received");

        let raw = response.body_text();
        let (body, content_type) = match request.jq_filter.as_deref() {
            Some(expr) if !expr.trim().is_empty() => (
                self.filter.apply(&raw, expr)?,
                Some("application/json".to_string()),
            ),
            _ => (raw, response.header("Content-Type").map(str::to_string)),
        };

        Ok(RequestOutcome {
            request,
            response,
            body,
            content_type,
        })
    }

    /// Execute a chain, returning a channel of events and a handle to get the final result.
    pub fn execute_chain(
        &self,
        cancel: CancellationToken,
        base: ConfigV1,
    ) -> (
        mpsc::Receiver<ChainEvent>,
        tokio::task::JoinHandle<RunnerResult<ChainResult>>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let runner = self.clone();
        let handle =
            tokio::spawn(async move { runner.run_chain(&cancel, &base, Some(tx)).await });
        (rx, handle)
    }

    /// Run the steps of `base.chain` in order.
    ///
    /// Each step is merged over `base`, interpolated against the results of
    /// earlier steps, executed, and checked against its own `expect` block.
    /// A failed expectation ends the chain with `success == false`; any
    /// other failure is returned as an error.
    pub async fn run_chain(
        &self,
        cancel: &CancellationToken,
        base: &ConfigV1,
        events: Option<mpsc::Sender<ChainEvent>>,
    ) -> RunnerResult<ChainResult> {
        let emit = |event: ChainEvent| {
            let events = events.clone();
            async move {
                if let Some(tx) = events {
                    let _ = tx.send(event).await;
                }
            }
        };

        let diagnostics = validate_chain("", base, &base.chain, &self.env, &JqChecker);
        if diagnostics.iter().any(|d| d.is_error()) {
            return Err(ValidationError { diagnostics }.into());
        }

        let mut ctx = ChainContext::with_env(self.env.clone());
        let mut result = ChainResult {
            success: true,
            ..Default::default()
        };

        for (index, step) in base.chain.iter().enumerate() {
            let name = step.name.as_str();
            info!(step = %name, index, "Starting step");
            emit(ChainEvent::StepStarted {
                index,
                step: name.to_string(),
            })
            .await;

            let merged = base.merge(step);
            let config =
                interpolate_step(&merged, &ctx, &self.vars).map_err(|e| RunError::from(e).in_step(name))?;

            if !config.delay.trim().is_empty() {
                let delay = parse_duration(&config.delay).map_err(|message| {
                    RunError::InvalidDelay {
                        delay: config.delay.clone(),
                        message,
                    }
                    .in_step(name)
                })?;
                if !delay.is_zero() {
                    debug!(step = %name, delay_ms = delay.as_millis() as u64, "Delaying step");
                    emit(ChainEvent::StepDelayed {
                        step: name.to_string(),
                        delay,
                    })
                    .await;
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RunError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }

            // Already interpolated; a second pass would re-expand resolved values.
            let verbatim = |_: &str| -> Result<Option<String>, ResolveError> { Ok(None) };
            let request = compile(&config, &verbatim)
                .into_request()
                .map_err(|errors| RunError::Compile(errors).in_step(name))?;
            check_request(&request, &config).map_err(|e| e.in_step(name))?;

            let outcome = match self.run_request(cancel, request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(step = %name, error = %e, "Step failed");
                    return Err(e.in_step(name));
                }
            };

            let expectation = check_expectations(
                &step.config.expect,
                outcome.response.status_code,
                &outcome.body,
                &outcome.response.headers,
                self.filter.as_ref(),
            );
            ctx.add_result(name, &outcome.visible_response());

            let passed = expectation.all_passed();
            info!(
                step = %name,
                status = outcome.response.status_code,
                elapsed_ms = outcome.response.duration.as_millis() as u64,
                passed,
                "Step completed"
            );
            emit(ChainEvent::StepCompleted {
                step: name.to_string(),
                status: outcome.response.status_code,
                duration: outcome.response.duration,
                passed,
            })
            .await;

            let failure = expectation.error.clone();
            result.steps.push(StepOutcome {
                name: name.to_string(),
                outcome,
                expectation,
            });

            if let Some(message) = failure {
                error!(step = %name, error = %message, "Step assertion failed");
                result.success = false;
                result.error = Some(format!("step '{name}' assertion failed: {message}"));
                break;
            }
        }

        emit(ChainEvent::ChainCompleted {
            success: result.success,
        })
        .await;
        Ok(result)
    }
}

/// Reject a compiled request the transports cannot run.
fn check_request(request: &Request, config: &ConfigV1) -> RunnerResult<()> {
    let diagnostics = validate_request(request, config);
    if diagnostics.iter().any(|d| d.is_error()) {
        return Err(ValidationError { diagnostics }.into());
    }
    Ok(())
}
