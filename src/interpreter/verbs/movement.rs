//! HEAD, ARMS and ARM verbs, by duration or by velocity.

use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::capability::{ArmSide, HeadPose, MoveTiming};
use crate::interpreter::args::{ArgShape, Args};
use crate::runtime::error::DispatchResult;
use async_trait::async_trait;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("HEAD", HeadMove { velocity: false });
    dispatcher.register("HEAD-V", HeadMove { velocity: true });
    dispatcher.register("ARMS", ArmsMove { velocity: false });
    dispatcher.register("ARMS-V", ArmsMove { velocity: true });
    dispatcher.register("ARM", ArmMove { velocity: false });
    dispatcher.register("ARM-V", ArmMove { velocity: true });
}

fn timing(args: &Args, index: usize, velocity: bool) -> DispatchResult<MoveTiming> {
    if velocity {
        Ok(MoveTiming::Velocity(args.f64(index)?))
    } else {
        Ok(MoveTiming::Duration(args.u64(index)?))
    }
}

/// `HEAD:pitch,roll,yaw,ms` / `HEAD-V:pitch,roll,yaw,velocity`
struct HeadMove {
    velocity: bool,
}

#[async_trait]
impl VerbHandler for HeadMove {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(4)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let pose = HeadPose {
            pitch: args.opt_f64(0)?,
            roll: args.opt_f64(1)?,
            yaw: args.opt_f64(2)?,
        };
        let timing = timing(args, 3, self.velocity)?;
        cx.performer
            .capabilities()
            .movement
            .move_head(pose, timing)
            .await
            .for_verb(args)
    }
}

/// `ARMS:left,right,ms`; an empty position leaves that arm alone.
struct ArmsMove {
    velocity: bool,
}

#[async_trait]
impl VerbHandler for ArmsMove {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(3)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let left = args.opt_f64(0)?;
        let right = args.opt_f64(1)?;
        let timing = timing(args, 2, self.velocity)?;
        let movement = &cx.performer.capabilities().movement;

        if let Some(degrees) = left {
            movement
                .move_arm(ArmSide::Left, degrees, timing)
                .await
                .for_verb(args)?;
        }
        if let Some(degrees) = right {
            movement
                .move_arm(ArmSide::Right, degrees, timing)
                .await
                .for_verb(args)?;
        }
        Ok(())
    }
}

/// `ARM:side,degrees,ms`
struct ArmMove {
    velocity: bool,
}

#[async_trait]
impl VerbHandler for ArmMove {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(3)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let side = args
            .str(0)
            .and_then(ArmSide::parse)
            .ok_or_else(|| args.invalid(0, "arm side"))?;
        let degrees = args.f64(1)?;
        let timing = timing(args, 2, self.velocity)?;
        cx.performer
            .capabilities()
            .movement
            .move_arm(side, degrees, timing)
            .await
            .for_verb(args)
    }
}
