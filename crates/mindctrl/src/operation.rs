//! Typed operations
//!
//! An [`Operation`] pairs a method name with its input and, once finished,
//! its output envelope. It can run once, either synchronously with
//! [`Operation::execute`] or asynchronously with [`Operation::start`] and
//! [`Operation::start_channel`].
//! Using it out of order is reported as [`MindctrlError::Operation`].

use crate::{CallHandle, MindctrlError, Result, Router};
use mindctrl_proto::method::{self, BrowserInfo, MethodOutput, NoInput, PlatformInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Operation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// Input may still be changed
    NotStarted,
    /// Request sent, waiting for the response
    Started,
    /// Outcome available
    Finished,
}

/// One remote method call
#[derive(Debug)]
pub struct Operation<I, O> {
    method: String,
    input: I,
    state: OperationState,
    outcome: Option<Result<MethodOutput<O>>>,
}

impl<I, O> Operation<I, O>
where
    I: Serialize + Send + 'static,
    O: DeserializeOwned + Default + Send + 'static,
{
    /// Create an operation for `method`
    pub fn new(method: impl Into<String>, input: I) -> Self {
        Self {
            method: method.into(),
            input,
            state: OperationState::NotStarted,
            outcome: None,
        }
    }

    /// Remote method name
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Lifecycle state
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Method input
    pub fn input(&self) -> &I {
        &self.input
    }

    /// Mutable method input; only before the operation starts
    pub fn input_mut(&mut self) -> Result<&mut I> {
        self.ensure_not_started()?;
        Ok(&mut self.input)
    }

    /// Run the operation and wait for its result
    pub async fn execute(&mut self, router: &mut Router) -> Result<&O> {
        self.ensure_not_started()?;
        self.state = OperationState::Started;

        let outcome = router.call(&self.method, &self.input).await;
        self.finish(outcome);
        self.result()
    }

    /// Send the operation and return at once. `callback` receives the
    /// finished operation from a later [`Router::dispatch`].
    pub async fn start<F>(mut self, router: &mut Router, callback: F) -> Result<CallHandle>
    where
        F: FnOnce(Operation<I, O>) + Send + 'static,
    {
        self.ensure_not_started()?;

        let params = serde_json::to_value(&self.input)?;
        let method = self.method.clone();
        self.state = OperationState::Started;

        let handle = router
            .start(&method, &params, move |outcome: Result<MethodOutput<O>>| {
                self.finish(outcome);
                callback(self);
            })
            .await;

        Ok(handle)
    }

    /// Start the operation and deliver it to `channel` once finished
    ///
    /// Delivery happens from [`Router::dispatch`] like any other completion.
    pub async fn start_channel(
        self,
        router: &mut Router,
        channel: mpsc::UnboundedSender<Operation<I, O>>,
    ) -> Result<CallHandle> {
        self.start(router, move |op| {
            if let Err(mpsc::error::SendError(op)) = channel.send(op) {
                debug!("Dropping finished {} operation, receiver is gone", op.method);
            }
        })
        .await
    }

    /// Outcome of a finished operation
    ///
    /// Transport errors come back as they were raised; a method that ran
    /// and reported failure comes back as [`MindctrlError::MethodFailure`].
    pub fn result(&self) -> Result<&O> {
        match (&self.state, &self.outcome) {
            (OperationState::Finished, Some(Ok(output))) if output.success => Ok(&output.result),
            (OperationState::Finished, Some(Ok(output))) => {
                Err(MindctrlError::MethodFailure(output.message.clone()))
            }
            (OperationState::Finished, Some(Err(e))) => Err(e.clone()),
            (OperationState::NotStarted, _) => Err(MindctrlError::Operation(format!(
                "{} has not started",
                self.method
            ))),
            _ => Err(MindctrlError::Operation(format!("{} has not finished", self.method))),
        }
    }

    /// Take the output of a finished, successful operation
    pub fn into_result(self) -> Result<O> {
        self.result()?;
        match self.outcome {
            Some(Ok(output)) => Ok(output.result),
            _ => Err(MindctrlError::Operation(format!("{} has no output", self.method))),
        }
    }

    fn ensure_not_started(&self) -> Result<()> {
        match self.state {
            OperationState::NotStarted => Ok(()),
            _ => Err(MindctrlError::Operation(format!("{} already started", self.method))),
        }
    }

    fn finish(&mut self, outcome: Result<MethodOutput<O>>) {
        self.outcome = Some(outcome);
        self.state = OperationState::Finished;
    }
}

/// Check that the server answers
pub fn ping() -> Operation<NoInput, ()> {
    Operation::new(method::PING, NoInput {})
}

/// Describe the browser running the server
pub fn get_browser_info() -> Operation<NoInput, BrowserInfo> {
    Operation::new(method::GET_BROWSER_INFO, NoInput {})
}

/// Describe the platform the browser runs on
pub fn get_platform_info() -> Operation<NoInput, PlatformInfo> {
    Operation::new(method::GET_PLATFORM_INFO, NoInput {})
}
