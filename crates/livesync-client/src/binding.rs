//! Ties observers to the lifetime of a view.
//!
//! A [`Binding`] belongs to one view. Every observer it obtains through
//! [`Binding::model`] re-renders the view on update and is released with it.
//! Observers are shared through the [`ObserverCache`], so another view of the
//! same entity keeps its subscription until it is released too.

use std::sync::Arc;

use parking_lot::Mutex;

use livesync_proto::FieldMap;

use crate::cache::ObserverCache;
use crate::emitter::{Callback, ListenerId, Topic};
use crate::error::Error;
use crate::observer::Observer;

/// Observers owned by one view.
pub struct Binding {
    cache: Arc<ObserverCache>,
    render: Callback,
    bound: Mutex<Vec<(Observer, ListenerId)>>,
}

impl Binding {
    /// Create a binding whose observers invoke `render` on every update.
    pub fn new(cache: Arc<ObserverCache>, render: Callback) -> Self {
        Self {
            cache,
            render,
            bound: Mutex::new(Vec::new()),
        }
    }

    /// Obtain a live observer for an entity and start listening.
    ///
    /// The observer is remembered even if listening fails, so
    /// [`teardown`](Self::teardown) still releases it.
    pub async fn model(&self, entity_type: &str, fields: FieldMap) -> Result<Observer, Error> {
        let observer = self.cache.acquire(entity_type, fields)?;
        let render_id = observer.on(Topic::Updated, self.render.clone());
        self.bound.lock().push((observer.clone(), render_id));

        observer.listen().await?;
        Ok(observer)
    }

    /// Number of observers currently bound.
    pub fn len(&self) -> usize {
        self.bound.lock().len()
    }

    /// Check if no observer is bound.
    pub fn is_empty(&self) -> bool {
        self.bound.lock().is_empty()
    }

    /// Remove the render callback from every bound observer and release it.
    ///
    /// The cache destroys an observer once its last holder releases it. Each
    /// observer is released once; later calls do nothing. Every observer is
    /// processed even if one fails, and the first failure is returned.
    pub async fn teardown(&self) -> Result<(), Error> {
        let bound = std::mem::take(&mut *self.bound.lock());
        let mut first_error = None;

        for (observer, render_id) in bound {
            observer.off(&Topic::Updated, render_id);
            if let Err(e) = self.cache.release(&observer).await {
                tracing::warn!(?observer, error = %e, "failed to release observer");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("bound", &self.bound.lock().len())
            .finish()
    }
}
