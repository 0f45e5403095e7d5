//! Periodic report-channel keep-alive for [`CurtainMotor`].
//!
//! Uses the [`tokio`](https://crates.io/crates/tokio) crate.
//!
//! Some covering firmware revisions stop reporting unless their report
//! channel is polled on a fixed period. [`KeepAlive`] owns that recurring
//! send as an explicit task tied to the engine's lifecycle: started once the
//! engine is activated, aborted deterministically when the guard is dropped.

extern crate std;

use crate::covering::{CurtainMotor, FlagStore};
use core::{fmt::Debug, time::Duration};
use embedded_io_async::Write;
use log::warn;
use std::sync::Arc;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

/// Default keep-alive period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

/// Scoped keep-alive task for one covering engine.
///
/// Sends the fixed report query through the shared engine on every tick.
/// Failures are logged and not retried; the query is a best-effort poll, not
/// an acknowledged request. Dropping the guard aborts the task, so it can
/// never outlive the engine it polls.
///
/// The engine is not `Send`, so the task runs on the current thread; callers
/// must be inside a [`tokio::task::LocalSet`] (or a current-thread runtime
/// driving one).
#[derive(Debug)]
pub struct KeepAlive {
    task: JoinHandle<()>,
}

impl KeepAlive {
    /// Starts the keep-alive task.
    ///
    /// The first query is sent one full `period` after the call; an
    /// immediate poll would race the activation traffic for no benefit.
    pub fn start<P, S>(motor: Arc<Mutex<CurtainMotor<P, S>>>, period: Duration) -> Self
    where
        P: Write + 'static,
        P::Error: Debug,
        S: FlagStore + 'static,
    {
        let task = tokio::task::spawn_local(async move {
            let mut tick = time::interval(period);

            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // interval() fires immediately on the first tick.
            tick.tick().await;

            loop {
                tick.tick().await;

                if let Err(err) = motor.lock().await.send_keep_alive().await {
                    warn!("Keep-alive query failed: {err:?}");
                }
            }
        });

        Self { task }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covering::CoveringConfig;
    use crate::tests::init_logger;
    use alloc::{boxed::Box, rc::Rc, vec::Vec};
    use core::{cell::RefCell, convert::Infallible};
    use embedded_io_async::ErrorType;
    use tokio::task::LocalSet;

    #[derive(Clone, Default)]
    struct CountingPort(Rc<RefCell<Vec<u8>>>);

    impl CountingPort {
        fn bytes_sent(&self) -> usize {
            self.0.borrow().len()
        }
    }

    impl ErrorType for CountingPort {
        type Error = Infallible;
    }

    impl Write for CountingPort {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
            self.0.borrow_mut().extend_from_slice(buf);

            Ok(buf.len())
        }

        async fn flush(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    struct CalibratedStore;

    #[async_trait::async_trait(?Send)]
    impl FlagStore for CalibratedStore {
        async fn load(&mut self, _key: &str) -> Option<bool> {
            Some(true)
        }

        async fn save(&mut self, _key: &str, _value: bool) {}
    }

    #[tokio::test(flavor = "current_thread")]
    async fn queries_periodically_and_aborts_on_drop() {
        init_logger();

        LocalSet::new()
            .run_until(async {
                let port = CountingPort::default();
                let motor = Arc::new(Mutex::new(CurtainMotor::new(
                    port.clone(),
                    CalibratedStore,
                    CoveringConfig::default(),
                )));

                motor.lock().await.activate().await.unwrap();

                let keep_alive = KeepAlive::start(Arc::clone(&motor), Duration::from_millis(5));

                time::sleep(Duration::from_millis(40)).await;

                let sent = port.bytes_sent();

                assert!(sent > 0, "queries should have been sent");
                assert_eq!(sent % crate::QUERY_FRAME.len(), 0, "only whole queries should be sent");

                drop(keep_alive);
                time::sleep(Duration::from_millis(25)).await;

                assert_eq!(port.bytes_sent(), sent, "dropped guard should stop the queries");
            })
            .await;
    }
}
