//! Audio playback, speech and listening.

use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::capability::{CaptureRequest, SpeechRequest};
use crate::interpreter::args::{ArgShape, Args, unquote};
use crate::runtime::error::{CapabilityError, DispatchError, DispatchResult};
use crate::runtime::triggers::{TriggerEvent, TriggerKind};
use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    dispatcher.register("AUDIO", PlayAudio);
    dispatcher.register("VOLUME", SetVolume);
    dispatcher.register("SPEAK", Speak { listen: false });
    dispatcher.register("SPEAK-AND-LISTEN", Speak { listen: true });
    dispatcher.register("LISTEN", Listen);
}

fn effective_volume(cx: &VerbContext<'_>) -> u8 {
    cx.animation
        .volume
        .unwrap_or_else(|| cx.performer.volume())
        .min(100)
}

/// `AUDIO:file[,volume]`
struct PlayAudio;

#[async_trait]
impl VerbHandler for PlayAudio {
    fn shape(&self) -> ArgShape {
        ArgShape::range(1, 2)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let file = unquote(args.text(0)?).to_string();
        let volume = match args.str(1) {
            Some(text) if !text.is_empty() => args.u8(1)?.min(100),
            _ => effective_volume(cx),
        };
        cx.performer
            .capabilities()
            .audio
            .play_audio_file(&file, volume)
            .await
            .for_verb(args)
    }
}

/// `VOLUME:0..100`
struct SetVolume;

#[async_trait]
impl VerbHandler for SetVolume {
    fn shape(&self) -> ArgShape {
        ArgShape::exact(1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let volume = args.u64(0)?.min(100) as u8;
        cx.performer.set_volume(volume);
        Ok(())
    }
}

/// `SPEAK:text` and `SPEAK-AND-LISTEN:text`
struct Speak {
    listen: bool,
}

#[async_trait]
impl VerbHandler for Speak {
    fn shape(&self) -> ArgShape {
        ArgShape::text_after(0)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let authored = unquote(args.text(0)?);
        let personalized = cx.performer.capabilities().personalization.substitute(
            authored,
            cx.animation,
            cx.interaction,
        );
        if personalized.changed {
            debug!(text = %personalized.text, "speech personalized");
        }

        cx.animation.spoken_text = Some(personalized.text.clone());
        if self.listen {
            cx.interaction.listen_after_speech = true;
        }

        let file_name = cx
            .animation
            .speech_file
            .clone()
            .unwrap_or_else(|| format!("choreo-{}", Uuid::new_v4()));
        let request = SpeechRequest {
            text: personalized.text,
            file_name,
            volume: effective_volume(cx),
            use_ssml: cx.animation.use_ssml,
            trim_silence_ms: cx.animation.trim_silence_ms,
            voice: cx.animation.voice.clone(),
            speech_rate: cx.animation.speech_rate,
        };

        let accepted = cx
            .performer
            .capabilities()
            .audio
            .speak(request)
            .await
            .for_verb(args)?;
        if !accepted {
            return Err(DispatchError::Capability {
                verb: args.verb().to_string(),
                source: CapabilityError::Rejected {
                    capability: "audio.speak",
                    detail: "utterance was not accepted".to_string(),
                },
            });
        }
        Ok(())
    }
}

/// `LISTEN[:engine]`. The capture runs in the background so the script keeps
/// going; the transcript is published as a `SpeechHeard` trigger event and on
/// [`Performer::last_transcript`](crate::runtime::Performer::last_transcript).
struct Listen;

#[async_trait]
impl VerbHandler for Listen {
    fn shape(&self) -> ArgShape {
        ArgShape::range(0, 1)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let engine = args
            .unquoted(0)
            .filter(|engine| !engine.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| cx.interaction.speech_engine.clone());
        let request = CaptureRequest {
            engine,
            listen_timeout_ms: cx.interaction.listen_timeout_ms,
            silence_timeout_ms: cx.interaction.silence_timeout_ms,
        };

        let audio = cx.performer.capabilities().audio.clone();
        let heard = cx.performer.transcript_slot();
        let board = cx.performer.triggers();
        let cancel = cx.performer.begin_listening(cx.cancel);
        debug!(engine = %request.engine, "listening in the background");

        tokio::spawn(async move {
            let result = tokio::select! {
                result = audio.capture_speech(request) => result,
                _ = cancel.cancelled() => {
                    debug!("speech capture abandoned");
                    return;
                }
            };
            match result {
                Ok(Some(text)) => {
                    info!(transcript = %text, "speech captured");
                    *heard.lock() = Some(text.clone());
                    if let Some(board) = board {
                        board.deliver(TriggerEvent::new(TriggerKind::SpeechHeard, text));
                    }
                }
                Ok(None) => debug!("no speech captured"),
                Err(err) => warn!(error = %err, "speech capture failed"),
            }
        });
        Ok(())
    }
}
