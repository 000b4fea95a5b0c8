use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::interpreter::args::{ArgShape, Args, unquote};
use crate::runtime::error::DispatchResult;
use async_trait::async_trait;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("START-SKILL", StartSkill);
    dispatcher.register("STOP-SKILL", StopSkill);
}

/// `START-SKILL:id[,key=value...]`
struct StartSkill;

#[async_trait]
impl VerbHandler for StartSkill {
    fn shape(&self) -> ArgShape {
        ArgShape::at_least(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let id = unquote(args.text(0)?).to_string();
        let params = args.key_values(1);
        cx.performer
            .capabilities()
            .skills
            .run_skill(&id, params)
            .await
            .for_verb(args)
    }
}

/// `STOP-SKILL:id`
struct StopSkill;

#[async_trait]
impl VerbHandler for StopSkill {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let id = unquote(args.text(0)?).to_string();
        cx.performer
            .capabilities()
            .skills
            .cancel_skill(&id)
            .await
            .for_verb(args)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use crate::capability::CapabilityCall;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn skills_start_with_parameters_and_stop() {
        let mut harness = Harness::new();
        harness
            .run("START-SKILL:\"8be20a90-1150-44ac-a756-ebe4de30689e\",greeting=hi")
            .await
            .unwrap();
        harness.run("STOP-SKILL:8be20a90-1150-44ac-a756-ebe4de30689e").await.unwrap();

        let mut params = BTreeMap::new();
        params.insert("greeting".to_string(), "hi".to_string());
        assert_eq!(
            harness.recorder.calls(),
            vec![
                CapabilityCall::RunSkill {
                    id: "8be20a90-1150-44ac-a756-ebe4de30689e".into(),
                    params,
                },
                CapabilityCall::CancelSkill {
                    id: "8be20a90-1150-44ac-a756-ebe4de30689e".into(),
                },
            ]
        );
    }
}
