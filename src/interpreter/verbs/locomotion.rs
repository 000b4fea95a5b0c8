//! Drive-train verbs.

use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::interpreter::args::{ArgShape, Args};
use crate::runtime::error::DispatchResult;
use async_trait::async_trait;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("DRIVE", Drive);
    dispatcher.register("HEADING", DriveCurve { arc: false });
    dispatcher.register("ARC", DriveCurve { arc: true });
    dispatcher.register("TURN", Turn);
    dispatcher.register("STOP", StopDriving { halt: false });
    dispatcher.register("HALT", StopDriving { halt: true });
}

/// `DRIVE:linear,angular,ms`
struct Drive;

#[async_trait]
impl VerbHandler for Drive {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(3)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let (linear, angular, time_ms) = (args.f64(0)?, args.f64(1)?, args.u64(2)?);
        cx.performer
            .capabilities()
            .locomotion
            .drive_time(linear, angular, time_ms)
            .await
            .for_verb(args)
    }
}

/// `HEADING:heading,distance,ms[,reverse]` and `ARC:heading,radius,ms[,reverse]`
struct DriveCurve {
    arc: bool,
}

#[async_trait]
impl VerbHandler for DriveCurve {
    fn shape(&self) -> ArgShape {
        ArgShape::range(3, 4)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let heading = args.f64(0)?;
        let metres = args.f64(1)?;
        let time_ms = args.u64(2)?;
        let reverse = args.opt_bool(3)?.unwrap_or(false);
        let locomotion = &cx.performer.capabilities().locomotion;
        let result = if self.arc {
            locomotion.drive_arc(heading, metres, time_ms, reverse).await
        } else {
            locomotion.drive_heading(heading, metres, time_ms, reverse).await
        };
        result.for_verb(args)
    }
}

/// `TURN:degrees,ms`
struct Turn;

#[async_trait]
impl VerbHandler for Turn {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(2)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let (degrees, time_ms) = (args.f64(0)?, args.u64(1)?);
        cx.performer
            .capabilities()
            .locomotion
            .turn(degrees, time_ms)
            .await
            .for_verb(args)
    }
}

/// `STOP` decelerates, `HALT` cuts every motor.
struct StopDriving {
    halt: bool,
}

#[async_trait]
impl VerbHandler for StopDriving {
    fn shape(&self) -> ArgShape {
        ArgShape::NONE
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let locomotion = &cx.performer.capabilities().locomotion;
        let result = if self.halt {
            locomotion.halt().await
        } else {
            locomotion.stop().await
        };
        result.for_verb(args)
    }
}
