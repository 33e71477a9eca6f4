//! The remote side of a dispatch: named handlers and the agent that runs
//! them.
//!
//! Execution functions are dispatched by path string (`test.ping`,
//! `state.apply`, ...) over a registry of typed handlers chosen at
//! startup — no runtime code loading.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::envelope::{self, JobResult, Value};
use crate::error::Result;

/// One named execution function.
///
/// Handlers return their error as a plain string; the agent folds it into
/// a failed JobResult rather than letting it escape the target.
pub trait Handler: Send + Sync {
    fn call(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> std::result::Result<Value, String>;
}

impl<F> Handler for F
where
    F: Fn(&[Value], &BTreeMap<String, Value>) -> std::result::Result<Value, String> + Send + Sync,
{
    fn call(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> std::result::Result<Value, String> {
        self(args, kwargs)
    }
}

/// Maps function paths to handler implementations.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the diagnostic functions every fleet
    /// carries: `test.ping` answers true, `test.echo` returns its
    /// positional arguments.
    pub fn with_builtins() -> Self {
        fn ping(
            _args: &[Value],
            _kwargs: &BTreeMap<String, Value>,
        ) -> std::result::Result<Value, String> {
            Ok(Value::Bool(true))
        }
        fn echo(
            args: &[Value],
            _kwargs: &BTreeMap<String, Value>,
        ) -> std::result::Result<Value, String> {
            Ok(Value::Sequence(args.to_vec()))
        }

        let mut registry = Self::new();
        registry.register("test.ping", ping);
        registry.register("test.echo", echo);
        registry
    }

    pub fn register(&mut self, function_path: impl Into<String>, handler: impl Handler + 'static) {
        self.handlers.insert(function_path.into(), Box::new(handler));
    }

    pub fn get(&self, function_path: &str) -> Option<&dyn Handler> {
        self.handlers.get(function_path).map(|h| h.as_ref())
    }

    pub fn contains(&self, function_path: &str) -> bool {
        self.handlers.contains_key(function_path)
    }
}

/// One addressable executor: decodes a request envelope, runs the named
/// handler, and encodes the result envelope.
pub struct Agent {
    target_id: String,
    handlers: Arc<HandlerRegistry>,
}

impl Agent {
    pub fn new(target_id: impl Into<String>, handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            target_id: target_id.into(),
            handlers,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Handle one encoded request, producing an encoded result.
    ///
    /// An unknown function path or a handler error becomes a failed
    /// JobResult; only a malformed inbound envelope is a transport-level
    /// error.
    pub fn handle(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let request = envelope::decode_request(payload)?;
        tracing::debug!(
            target_id = %self.target_id,
            job_id = %request.job_id,
            function = %request.function_path,
            "Handling request"
        );

        let result = match self.handlers.get(&request.function_path) {
            Some(handler) => {
                match handler.call(&request.positional_args, &request.keyword_args) {
                    Ok(value) => JobResult::success(request.job_id, self.target_id.clone(), value),
                    Err(detail) => {
                        JobResult::failure(request.job_id, self.target_id.clone(), detail)
                    }
                }
            }
            None => JobResult::failure(
                request.job_id,
                self.target_id.clone(),
                format!("unknown function: {}", request.function_path),
            ),
        };

        envelope::encode_result(&result)
    }
}
