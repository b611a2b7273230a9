use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use arc_swap::ArcSwapOption;

use crate::core::AbortTrigger;

struct AbortTarget {
    trigger: Arc<dyn AbortTrigger>,
}

struct Inner {
    aborted: AtomicBool,
    target: ArcSwapOption<AbortTarget>,
}

/// Lets a caller abort an in-flight request from another task.
///
/// Before each execution attempt the director binds the connection's
/// abort trigger here. Aborting shuts that connection down, which the
/// executing attempt then observes as an I/O failure.
#[derive(Clone)]
pub struct AbortSignal {
    inner: Arc<Inner>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self {
            inner: Arc::new(Inner {
                aborted: AtomicBool::new(false),
                target: ArcSwapOption::empty(),
            }),
        }
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    /// Abort the request and the connection currently bound to it.
    pub fn abort(&self) {
        if self.inner.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(target) = self.inner.target.swap(None) {
            if let Err(e) = target.trigger.abort_connection() {
                log::debug!("Error aborting connection: {e}");
            }
        }
    }

    /// Bind the trigger of the connection about to be used.
    pub(crate) fn bind(&self, trigger: Option<Arc<dyn AbortTrigger>>) -> io::Result<()> {
        if self.is_aborted() {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "request already aborted",
            ));
        }

        let target = trigger.map(|trigger| Arc::new(AbortTarget { trigger }));
        self.inner.target.store(target);

        // an abort racing with the store may have missed the new target
        if self.is_aborted() {
            if let Some(target) = self.inner.target.swap(None) {
                if let Err(e) = target.trigger.abort_connection() {
                    log::debug!("Error aborting connection: {e}");
                }
            }
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "request aborted",
            ));
        }
        Ok(())
    }

    /// Detach the bound connection. A later abort no longer reaches it.
    pub(crate) fn unbind(&self) {
        self.inner.target.store(None);
    }

    pub fn is_bound(&self) -> bool {
        self.inner.target.load().is_some()
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .field("bound", &self.is_bound())
            .finish()
    }
}
