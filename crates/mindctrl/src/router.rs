//! Call multiplexing
//!
//! [`Router`] lets any number of calls share one [`Codec`]. Synchronous
//! calls run their round trip in place; asynchronous calls are written at
//! once and completed later by [`Router::dispatch`], which the caller drives.
//! Responses for asynchronous calls that turn up while a synchronous call
//! is waiting are queued and handed out by `dispatch` in arrival order.

use crate::{Codec, MindctrlError, Result, SessionState};
use mindctrl_proto::{CallId, ResponsePacket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

type Completion = Box<dyn FnOnce(Result<ResponsePacket>) + Send>;

/// Handle of an asynchronous call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallHandle(CallId);

impl CallHandle {
    /// Call identifier on the wire
    pub fn id(&self) -> CallId {
        self.0
    }
}

struct PendingCall {
    method: String,
    completion: Completion,
}

/// Call multiplexer over one session
pub struct Router {
    /// Correlation engine
    codec: Codec,
    /// Next call identifier
    next_id: CallId,
    /// Outstanding asynchronous calls
    pending: BTreeMap<CallId, PendingCall>,
    /// Completions seen but not yet dispatched
    completed: VecDeque<(CallId, Result<ResponsePacket>)>,
}

impl Router {
    /// Create a router over a Ready codec
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            next_id: 1,
            pending: BTreeMap::new(),
            completed: VecDeque::new(),
        }
    }

    /// Underlying codec
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.codec.state()
    }

    /// Number of outstanding asynchronous calls
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether the call behind `handle` has not completed yet
    pub fn is_pending(&self, handle: CallHandle) -> bool {
        self.pending.contains_key(&handle.0)
    }

    /// Call `method` and wait for its output
    pub async fn call<I, O>(&mut self, method: &str, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let id = self.allocate_id();
        self.codec.write_request(id, method, input).await?;

        loop {
            let header = self.codec.read_response().await?;

            if header.id == id {
                return self.codec.read_response_body();
            }

            if self.pending.contains_key(&header.id) {
                let packet = self.codec.take_response()?;
                self.completed.push_back((header.id, Ok(packet)));
            } else {
                warn!("Discarding response {} for {} with no caller", header.id, header.method);
                self.codec.discard_response_body()?;
            }
        }
    }

    /// Start `method` without waiting. `callback` runs exactly once, from
    /// a later [`Router::dispatch`].
    pub async fn start<I, O, F>(&mut self, method: &str, input: &I, callback: F) -> CallHandle
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + 'static,
        F: FnOnce(Result<O>) + Send + 'static,
    {
        let id = self.allocate_id();
        self.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                completion: completion(callback),
            },
        );

        if let Err(e) = self.codec.write_request(id, method, input).await {
            debug!("Request {} for {} failed: {}", id, method, e);
            self.completed.push_back((id, Err(e)));
        }

        CallHandle(id)
    }

    /// Complete one asynchronous call
    ///
    /// Waits until an outstanding call completes, runs its callback and
    /// returns whether other calls are still outstanding. Returns `false` at
    /// once when nothing is outstanding. Once the session is dead each call
    /// completes with [`MindctrlError::ServerDead`], oldest first.
    pub async fn dispatch(&mut self) -> bool {
        let remainder = self.pending.len();
        if remainder == 0 {
            return false;
        }

        loop {
            let (id, result) = match self.completed.pop_front() {
                Some(completed) => completed,
                None => self.next_completion().await,
            };

            match self.pending.remove(&id) {
                Some(call) => {
                    debug!("Completing call {} for {}", id, call.method);
                    (call.completion)(result);
                    return remainder > 1;
                }
                None => warn!("Discarding response {} with no caller", id),
            }
        }
    }

    /// Disconnect from the broker. Outstanding calls are dropped without
    /// their callbacks running.
    pub async fn close(self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!("Closing with {} outstanding calls", self.pending.len());
        }
        self.codec.close().await
    }

    fn allocate_id(&mut self) -> CallId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Read until a response arrives or the session dies. On death the
    /// oldest outstanding call takes the error.
    async fn next_completion(&mut self) -> (CallId, Result<ResponsePacket>) {
        let failure = match self.codec.read_response().await {
            Ok(header) => match self.codec.take_response() {
                Ok(packet) => return (header.id, Ok(packet)),
                Err(e) => e,
            },
            Err(e) => e,
        };

        let oldest = self.pending.keys().next().copied().unwrap_or(0);
        if failure != MindctrlError::ServerDead {
            debug!("Call {} failed: {}", oldest, failure);
        }
        (oldest, Err(failure))
    }
}

/// Wrap a typed callback so it decodes the response output first
fn completion<O, F>(callback: F) -> Completion
where
    O: DeserializeOwned + 'static,
    F: FnOnce(Result<O>) + Send + 'static,
{
    Box::new(move |result: Result<ResponsePacket>| {
        callback(result.and_then(|packet| Ok(packet.output::<O>()?)))
    })
}
