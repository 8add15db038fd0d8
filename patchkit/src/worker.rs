//! One test execution per worker thread, bounded by a wall-clock timeout.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::harness::{InstrumentedSuite, TestId, TestStatus};
use crate::session::Session;

/// Run one test on its own thread and block until it finishes or the timeout
/// elapses. Timeout, worker panic, and a worker error all score `Failed`.
///
/// Threads cannot be killed: on timeout the session's cancellation flag is
/// raised for cooperative suites and the thread is abandoned. A straggler
/// that keeps mutating the session afterwards is exactly the divergence the
/// orchestrator's consistency checks are there to catch.
pub fn run_test_with_timeout<S>(
    suite: &Arc<S>,
    test: &TestId,
    session: &Session,
    timeout: Duration,
) -> TestStatus
where
    S: InstrumentedSuite + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let worker_suite = Arc::clone(suite);
    let worker_test = test.clone();
    let worker_session = session.clone();

    let spawned = thread::Builder::new()
        .name(format!("test-{}-{}", test.class, test.method))
        .spawn(move || {
            let result = worker_suite.run_test(&worker_test, &worker_session);
            // The receiver may be gone if the driver already timed out.
            let _ = sender.send(result);
        });
    if let Err(err) = spawned {
        warn!(%test, %err, "could not spawn test worker");
        return TestStatus::Failed;
    }

    match receiver.recv_timeout(timeout) {
        Ok(Ok(status)) => {
            debug!(%test, ?status, "test finished");
            status
        }
        Ok(Err(err)) => {
            debug!(%test, %err, "test errored");
            TestStatus::Failed
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(%test, timeout_secs = timeout.as_secs(), "test timed out");
            session.request_cancel();
            TestStatus::Failed
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!(%test, "test worker panicked");
            TestStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use std::time::Instant;

    enum Script {
        Pass,
        Error,
        Panic,
        HangUntilCancelled,
    }

    struct OneShotSuite {
        script: Script,
    }

    impl InstrumentedSuite for OneShotSuite {
        fn reset_globals(&self) {}

        fn run_test(&self, _test: &TestId, session: &Session) -> Result<TestStatus> {
            match self.script {
                Script::Pass => Ok(TestStatus::Passed),
                Script::Error => bail!("assertion failed"),
                Script::Panic => panic!("boom"),
                Script::HangUntilCancelled => {
                    while !session.cancel_requested() {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Ok(TestStatus::Passed)
                }
            }
        }
    }

    fn run(script: Script, timeout: Duration) -> TestStatus {
        let suite = Arc::new(OneShotSuite { script });
        let test = TestId::new("Example", "case");
        run_test_with_timeout(&suite, &test, &Session::new(), timeout)
    }

    #[test]
    fn passing_test_reports_its_status() {
        assert_eq!(run(Script::Pass, Duration::from_secs(5)), TestStatus::Passed);
    }

    #[test]
    fn worker_error_scores_failed() {
        assert_eq!(run(Script::Error, Duration::from_secs(5)), TestStatus::Failed);
    }

    #[test]
    fn worker_panic_scores_failed() {
        assert_eq!(run(Script::Panic, Duration::from_secs(5)), TestStatus::Failed);
    }

    #[test]
    fn timeout_scores_failed_without_waiting_on_the_worker() {
        let started = Instant::now();
        assert_eq!(
            run(Script::HangUntilCancelled, Duration::from_millis(50)),
            TestStatus::Failed
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
