use super::{Dispatcher, VerbContext, VerbHandler};
use crate::interpreter::args::{ArgShape, Args, unquote};
use crate::runtime::error::DispatchResult;
use crate::runtime::follow::FollowTarget;
use async_trait::async_trait;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("FOLLOW-FACE", FollowFace);
    dispatcher.register("FOLLOW-OBJECT", FollowObject);
    dispatcher.register("STOP-FOLLOW", StopFollow);
}

/// `FOLLOW-FACE[:label]`
struct FollowFace;

#[async_trait]
impl VerbHandler for FollowFace {
    fn shape(&self) -> ArgShape {
        ArgShape::range(0, 1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let label = args
            .unquoted(0)
            .filter(|label| !label.is_empty())
            .map(str::to_string);
        cx.performer.follow().start(FollowTarget::Face(label));
        Ok(())
    }
}

/// `FOLLOW-OBJECT:label`
struct FollowObject;

#[async_trait]
impl VerbHandler for FollowObject {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let label = unquote(args.text(0)?).to_string();
        cx.performer.follow().start(FollowTarget::Object(label));
        Ok(())
    }
}

struct StopFollow;

#[async_trait]
impl VerbHandler for StopFollow {
    fn shape(&self) -> ArgShape {
        ArgShape::NONE
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, _args: &Args) -> DispatchResult<()> {
        cx.performer.follow().stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use crate::runtime::follow::FollowTarget;

    #[tokio::test]
    async fn follow_verbs_start_and_stop_the_loop() {
        let mut harness = Harness::new();
        harness.run("FOLLOW-OBJECT:cup").await.unwrap();
        assert_eq!(
            harness.performer.follow().target(),
            Some(FollowTarget::Object("cup".into()))
        );

        harness.run("FOLLOW-FACE").await.unwrap();
        assert_eq!(
            harness.performer.follow().target(),
            Some(FollowTarget::Face(None))
        );

        harness.run("STOP-FOLLOW").await.unwrap();
        assert!(!harness.performer.follow().is_following());
        assert_eq!(harness.performer.follow().target(), None);
    }
}
