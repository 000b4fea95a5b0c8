//! LEDs, flashlight, camera and serial port.

use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::capability::{LedPattern, Rgb};
use crate::interpreter::args::{ArgShape, Args, unquote};
use crate::runtime::error::DispatchResult;
use async_trait::async_trait;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("LED", Led);
    dispatcher.register("LED-PATTERN", LedTransition);
    dispatcher.register("LIGHT", Flashlight);
    dispatcher.register("PICTURE", Picture);
    dispatcher.register("SERIAL", Serial);
}

fn rgb(args: &Args, from: usize) -> DispatchResult<Rgb> {
    Ok(Rgb {
        red: args.u8(from)?,
        green: args.u8(from + 1)?,
        blue: args.u8(from + 2)?,
    })
}

/// `LED:r,g,b`
struct Led;

#[async_trait]
impl VerbHandler for Led {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(3)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let color = rgb(args, 0)?;
        cx.performer
            .capabilities()
            .hardware
            .set_led(color)
            .await
            .for_verb(args)
    }
}

/// `LED-PATTERN:r1,g1,b1,r2,g2,b2,ms,pattern`
struct LedTransition;

#[async_trait]
impl VerbHandler for LedTransition {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(8)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let pattern = LedPattern {
            from: rgb(args, 0)?,
            to: rgb(args, 3)?,
            duration_ms: args.u64(6)?,
            pattern: unquote(args.text(7)?).to_ascii_lowercase(),
        };
        cx.performer
            .capabilities()
            .hardware
            .set_led_pattern(pattern)
            .await
            .for_verb(args)
    }
}

/// `LIGHT:on|off`
struct Flashlight;

#[async_trait]
impl VerbHandler for Flashlight {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let on = args.bool(0)?;
        cx.performer
            .capabilities()
            .hardware
            .set_flashlight(on)
            .await
            .for_verb(args)
    }
}

/// `PICTURE:name[,display]`
struct Picture;

#[async_trait]
impl VerbHandler for Picture {
    fn shape(&self) -> ArgShape {
        ArgShape::range(1, 2)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let name = unquote(args.text(0)?).to_string();
        let display = args.opt_bool(1)?.unwrap_or(false);
        cx.performer
            .capabilities()
            .hardware
            .take_picture(&name, display)
            .await
            .for_verb(args)
    }
}

/// `SERIAL:text`
struct Serial;

#[async_trait]
impl VerbHandler for Serial {
    fn shape(&self) -> ArgShape {
        ArgShape::text_after(0)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let message = args.text(0)?.to_string();
        cx.performer
            .capabilities()
            .hardware
            .write_serial(&message)
            .await
            .for_verb(args)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::Harness;
    use crate::capability::{CapabilityCall, LedPattern, Rgb};
    use crate::runtime::error::DispatchError;

    #[tokio::test]
    async fn led_and_pattern() {
        let mut harness = Harness::new();
        harness.run("LED:255,0,40").await.unwrap();
        harness
            .run("LED-PATTERN:255,0,0,0,0,255,800,Breathe")
            .await
            .unwrap();
        assert_eq!(
            harness.recorder.calls(),
            vec![
                CapabilityCall::Led(Rgb {
                    red: 255,
                    green: 0,
                    blue: 40,
                }),
                CapabilityCall::LedPattern(LedPattern {
                    from: Rgb {
                        red: 255,
                        green: 0,
                        blue: 0,
                    },
                    to: Rgb {
                        red: 0,
                        green: 0,
                        blue: 255,
                    },
                    duration_ms: 800,
                    pattern: "breathe".into(),
                }),
            ]
        );
    }

    #[tokio::test]
    async fn colour_channels_are_range_checked() {
        let mut harness = Harness::new();
        let err = harness.run("LED:256,0,0").await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidArgument { index: 0, .. }));
    }

    #[tokio::test]
    async fn picture_and_serial() {
        let mut harness = Harness::new();
        harness.run("PICTURE:selfie,true").await.unwrap();
        harness.run("SERIAL:mode=1,speed=2").await.unwrap();
        assert_eq!(
            harness.recorder.calls(),
            vec![
                CapabilityCall::Picture {
                    name: "selfie".into(),
                    display: true,
                },
                CapabilityCall::Serial {
                    message: "mode=1,speed=2".into(),
                },
            ]
        );
    }
}
