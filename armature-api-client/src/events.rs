//! Request lifecycle listeners.
//!
//! Three fixed stages run around every call:
//!
//! - **pre-request**: `(Request) -> Request`, before the plugin chain
//! - **post-request**: `(&Request, Response) -> Response`, after the transport
//! - **response-contents**: `(Contents) -> Contents`, after the body is read
//!
//! Each listener receives the value left by the previous one and returns the
//! value for the next. Listeners run in descending priority; equal
//! priorities run in registration order. The first error aborts the call.

use crate::{Contents, Request, Response, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Listener run before the request is sent.
pub type PreRequestListener = Arc<dyn Fn(Request) -> Result<Request> + Send + Sync>;

/// Listener run after the response is received.
pub type PostRequestListener = Arc<dyn Fn(&Request, Response) -> Result<Response> + Send + Sync>;

/// Listener run on the response contents.
pub type ResponseContentsListener = Arc<dyn Fn(Contents) -> Result<Contents> + Send + Sync>;

/// Lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Before the request is sent.
    PreRequest,
    /// After the response is received.
    PostRequest,
    /// After the body is extracted.
    ResponseContents,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::PreRequest => write!(f, "pre-request"),
            Stage::PostRequest => write!(f, "post-request"),
            Stage::ResponseContents => write!(f, "response-contents"),
        }
    }
}

/// Priority-ordered listener list, stable for equal priorities.
struct Listeners<H> {
    entries: Vec<(i32, H)>,
}

impl<H> Default for Listeners<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H: Clone> Clone for Listeners<H> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<H> Listeners<H> {
    fn add(&mut self, handler: H, priority: i32) {
        let position = self.entries.partition_point(|(p, _)| *p >= priority);
        self.entries.insert(position, (priority, handler));
    }

    fn iter(&self) -> impl Iterator<Item = &H> {
        self.entries.iter().map(|(_, h)| h)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The three-stage listener pipeline.
#[derive(Default, Clone)]
pub struct EventPipeline {
    pre_request: Listeners<PreRequestListener>,
    post_request: Listeners<PostRequestListener>,
    response_contents: Listeners<ResponseContentsListener>,
}

impl EventPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-request listener.
    pub fn add_pre_request_listener<F>(&mut self, handler: F, priority: i32)
    where
        F: Fn(Request) -> Result<Request> + Send + Sync + 'static,
    {
        self.pre_request.add(Arc::new(handler), priority);
    }

    /// Register a post-request listener.
    pub fn add_post_request_listener<F>(&mut self, handler: F, priority: i32)
    where
        F: Fn(&Request, Response) -> Result<Response> + Send + Sync + 'static,
    {
        self.post_request.add(Arc::new(handler), priority);
    }

    /// Register a response-contents listener.
    pub fn add_response_contents_listener<F>(&mut self, handler: F, priority: i32)
    where
        F: Fn(Contents) -> Result<Contents> + Send + Sync + 'static,
    {
        self.response_contents.add(Arc::new(handler), priority);
    }

    /// Number of listeners registered for a stage.
    pub fn listener_count(&self, stage: Stage) -> usize {
        match stage {
            Stage::PreRequest => self.pre_request.len(),
            Stage::PostRequest => self.post_request.len(),
            Stage::ResponseContents => self.response_contents.len(),
        }
    }

    /// Remove all listeners of a stage.
    pub fn clear(&mut self, stage: Stage) {
        match stage {
            Stage::PreRequest => self.pre_request.clear(),
            Stage::PostRequest => self.post_request.clear(),
            Stage::ResponseContents => self.response_contents.clear(),
        }
    }

    /// Run the pre-request stage.
    pub fn pre_request(&self, mut request: Request) -> Result<Request> {
        for listener in self.pre_request.iter() {
            request = listener(request).inspect_err(|e| aborted(Stage::PreRequest, e))?;
        }
        Ok(request)
    }

    /// Run the post-request stage.
    pub fn post_request(&self, request: &Request, mut response: Response) -> Result<Response> {
        for listener in self.post_request.iter() {
            response =
                listener(request, response).inspect_err(|e| aborted(Stage::PostRequest, e))?;
        }
        Ok(response)
    }

    /// Run the response-contents stage.
    pub fn response_contents(&self, mut contents: Contents) -> Result<Contents> {
        for listener in self.response_contents.iter() {
            contents =
                listener(contents).inspect_err(|e| aborted(Stage::ResponseContents, e))?;
        }
        Ok(contents)
    }
}

fn aborted(stage: Stage, error: &crate::ApiClientError) {
    debug!(%stage, error = %error, "Listener aborted request");
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("pre_request", &self.pre_request.len())
            .field("post_request", &self.post_request.len())
            .field("response_contents", &self.response_contents.len())
            .finish()
    }
}
