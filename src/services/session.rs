//! Scoped session lifetime around all remote-service work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::simulation::{EventSender, ServiceError, SimulationService, Teardown};

/// A session with the simulation service that is released exactly once.
///
/// Prefer [`with_session`], which releases on every exit path. When a
/// `Session` is dropped without being released (panic, cancelled future) the
/// release is scheduled on the current tokio runtime.
pub struct Session {
    service: Arc<dyn SimulationService>,
    teardown: Teardown,
    released: AtomicBool,
}

impl Session {
    /// Capture the teardown capability up front so release never has to guess.
    pub fn new(service: Arc<dyn SimulationService>) -> Self {
        let teardown = service.teardown();
        Self {
            service,
            teardown,
            released: AtomicBool::new(false),
        }
    }

    pub async fn connect(&self, events: Option<EventSender>) -> Result<(), ServiceError> {
        self.service.connect(events).await
    }

    pub fn service(&self) -> Arc<dyn SimulationService> {
        Arc::clone(&self.service)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the session. Only the first call does anything; failures are logged.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        release_with(self.service.as_ref(), self.teardown).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!("Session dropped without release, scheduling teardown");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let service = Arc::clone(&self.service);
                let teardown = self.teardown;
                handle.spawn(async move {
                    release_with(service.as_ref(), teardown).await;
                });
            }
            Err(_) => tracing::warn!("No runtime available, session left open"),
        }
    }
}

async fn release_with(service: &dyn SimulationService, teardown: Teardown) {
    let result = match teardown {
        Teardown::Disconnect => service.disconnect().await,
        Teardown::Close => service.close().await,
        Teardown::None => {
            tracing::debug!("Simulation service has no teardown, nothing to release");
            return;
        }
    };

    match result {
        Ok(()) => tracing::debug!(?teardown, "Session released"),
        Err(e) => tracing::warn!(?teardown, error = %e, "Session teardown failed"),
    }
}

/// Run `work` inside a connected session and release it afterwards, whether
/// `connect` failed, `work` failed, or everything succeeded.
pub async fn with_session<T, E, F, Fut>(
    service: Arc<dyn SimulationService>,
    events: Option<EventSender>,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(Arc<dyn SimulationService>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<ServiceError>,
{
    let session = Session::new(service);

    let outcome = match session.connect(events).await {
        Ok(()) => work(session.service()).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to open simulation session");
            Err(e.into())
        }
    };

    session.release().await;
    outcome
}
