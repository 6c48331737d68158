use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hyper::StatusCode;
use tokio::time;

use crate::catalog::RequestSpec;
use crate::executor::{CallError, Outcome, RequestExecutor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StubCall {
    Succeed,
    Fail,
    Panic,
}

/// In-memory executor: sleeps `delay`, then answers per call index.
pub(crate) struct StubExecutor {
    delay: Duration,
    behaviour: Box<dyn Fn(usize) -> StubCall + Send + Sync>,
    calls: AtomicUsize,
    seen: Mutex<Vec<&'static str>>,
}

impl StubExecutor {
    pub(crate) fn new(
        delay: Duration,
        behaviour: impl Fn(usize) -> StubCall + Send + Sync + 'static,
    ) -> Self {
        StubExecutor {
            delay,
            behaviour: Box::new(behaviour),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding(delay: Duration) -> Self {
        Self::new(delay, |_| StubCall::Succeed)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Spec names in call order.
    pub(crate) fn seen(&self) -> Vec<&'static str> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl RequestExecutor for StubExecutor {
    fn execute(&self, spec: &RequestSpec) -> impl Future<Output = Outcome> + Send {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(spec.name());
        }
        let call = (self.behaviour)(index);
        let delay = self.delay;
        async move {
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            match call {
                StubCall::Succeed => Outcome::Success { latency: delay },
                StubCall::Fail => Outcome::Failed(CallError::Http {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }),
                StubCall::Panic => panic!("stub call {index} panicked"),
            }
        }
    }
}
