//! Sequencing verbs: PAUSE and the wait-slot arming verbs.

use super::{Dispatcher, VerbContext, VerbHandler};
use crate::interpreter::args::{ArgShape, Args};
use crate::runtime::error::{DispatchError, DispatchResult};
use crate::runtime::wait::WaitTarget;
use async_trait::async_trait;
use std::time::Duration;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("PAUSE", Pause);
    dispatcher.register("AWAIT-ANY", AwaitAny);
    dispatcher.register("AWAIT-SYNC", AwaitSync);
}

/// `PAUSE:ms`, the only verb that holds the loop for a fixed time.
struct Pause;

#[async_trait]
impl VerbHandler for Pause {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let duration = Duration::from_millis(args.u64(0)?);
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cx.cancel.cancelled() => Err(DispatchError::Canceled(args.verb().to_string())),
        }
    }
}

/// `AWAIT-ANY:timeoutMs`; the wait applies to the next clause.
struct AwaitAny;

#[async_trait]
impl VerbHandler for AwaitAny {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let timeout = Duration::from_millis(args.u64(0)?);
        cx.performer.wait_slot().arm(WaitTarget::Any, timeout);
        Ok(())
    }
}

/// `AWAIT-SYNC:name,timeoutMs`; the wait applies to the next clause.
struct AwaitSync;

#[async_trait]
impl VerbHandler for AwaitSync {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(2)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let name = args.unquoted(0).unwrap_or_default();
        if name.is_empty() {
            return Err(args.invalid(0, "sync name"));
        }
        let timeout = Duration::from_millis(args.u64(1)?);
        cx.performer
            .wait_slot()
            .arm(WaitTarget::from_name(name), timeout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use crate::runtime::error::DispatchError;
    use crate::runtime::wait::WaitTarget;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn await_sync_arms_the_slot_with_quotes_stripped() {
        let mut harness = Harness::new();
        harness.run("AWAIT-SYNC:\"foo\",1000").await.unwrap();
        assert_eq!(
            harness.performer.wait_slot().pending(),
            Some(WaitTarget::Named("foo".into()))
        );

        harness.run("AWAIT-ANY:500").await.unwrap();
        assert_eq!(harness.performer.wait_slot().pending(), Some(WaitTarget::Any));
    }

    #[tokio::test]
    async fn pause_waits_and_honors_cancellation() {
        let mut harness = Harness::new();
        let started = Instant::now();
        harness.run("PAUSE:50").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));

        harness.cancel.cancel();
        let started = Instant::now();
        let err = harness.run("PAUSE:5000").await.unwrap_err();
        assert!(matches!(err, DispatchError::Canceled(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
