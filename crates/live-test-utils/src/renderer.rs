//! Recording renderer.

use live_runtime::render::{RenderContext, RenderError, Renderer};
use serde::Serialize;
use std::sync::{Arc, Mutex};

type FailWhen<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// Renders snapshots as JSON and records every snapshot it sees.
///
/// Clones share the same record, so keep one clone in the test and hand the
/// other to the runtime.
pub struct RecordingRenderer<S> {
    rendered: Arc<Mutex<Vec<(RenderContext, S)>>>,
    fail_when: Option<FailWhen<S>>,
}

impl<S> Clone for RecordingRenderer<S> {
    fn clone(&self) -> Self {
        Self {
            rendered: Arc::clone(&self.rendered),
            fail_when: self.fail_when.clone(),
        }
    }
}

impl<S> Default for RecordingRenderer<S> {
    fn default() -> Self {
        Self {
            rendered: Arc::new(Mutex::new(Vec::new())),
            fail_when: None,
        }
    }
}

impl<S: Clone> RecordingRenderer<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail rendering (without recording) when `predicate` holds.
    #[must_use]
    pub fn failing_when(mut self, predicate: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Arc::new(predicate));
        self
    }

    /// Snapshots rendered so far, in order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<S> {
        self.rendered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// Revisions rendered so far, in order.
    #[must_use]
    pub fn revisions(&self) -> Vec<u64> {
        self.rendered
            .lock()
            .unwrap()
            .iter()
            .map(|(ctx, _)| ctx.revision)
            .collect()
    }

    /// Number of successful renders.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rendered.lock().unwrap().len()
    }
}

impl<S> Renderer<S> for RecordingRenderer<S>
where
    S: Clone + Serialize + Send + Sync + 'static,
{
    fn render(&self, ctx: &RenderContext, snapshot: &S) -> Result<String, RenderError> {
        if self.fail_when.as_ref().is_some_and(|fail| fail(snapshot)) {
            return Err(RenderError::Template("configured to fail".to_string()));
        }
        let body = serde_json::to_string(snapshot)?;
        self.rendered.lock().unwrap().push((*ctx, snapshot.clone()));
        Ok(body)
    }
}
