//! Screen verbs. Each content kind draws on its own configured layer; a layer
//! is made visible the first time the run shows something on it.

use super::{Dispatcher, ForVerb, VerbContext, VerbHandler};
use crate::capability::{DisplayContent, LayerSettings};
use crate::interpreter::args::{ArgShape, Args, unquote};
use crate::runtime::LayerNames;
use crate::runtime::error::DispatchResult;
use async_trait::async_trait;
use tracing::debug;

pub(super) fn register(dispatcher: &mut Dispatcher) {
    for kind in [
        ContentKind::Text,
        ContentKind::Image,
        ContentKind::ImageUrl,
        ContentKind::Video,
        ContentKind::WebPage,
    ] {
        dispatcher.register(kind.verb(), ShowContent { kind });
    }
    for kind in [
        ContentKind::Text,
        ContentKind::Image,
        ContentKind::Video,
        ContentKind::WebPage,
    ] {
        dispatcher.register(kind.clear_verb(), ClearContent { kind });
    }
    dispatcher.register("LAYER", Layer);
    dispatcher.register("RESET-LAYERS", ResetLayers);
}

/// What a display verb shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// `TEXT`
    Text,
    /// `IMAGE`
    Image,
    /// `IMAGE-URL`
    ImageUrl,
    /// `VIDEO`
    Video,
    /// `WEB`
    WebPage,
}

impl ContentKind {
    fn verb(self) -> &'static str {
        match self {
            ContentKind::Text => "TEXT",
            ContentKind::Image => "IMAGE",
            ContentKind::ImageUrl => "IMAGE-URL",
            ContentKind::Video => "VIDEO",
            ContentKind::WebPage => "WEB",
        }
    }

    fn clear_verb(self) -> &'static str {
        match self {
            ContentKind::Text => "CLEAR-TEXT",
            ContentKind::Image | ContentKind::ImageUrl => "CLEAR-IMAGE",
            ContentKind::Video => "CLEAR-VIDEO",
            ContentKind::WebPage => "CLEAR-WEB",
        }
    }

    /// Layer id this kind draws on.
    pub fn layer(self, layers: &LayerNames) -> &str {
        match self {
            ContentKind::Text => &layers.text,
            ContentKind::Image | ContentKind::ImageUrl => &layers.image,
            ContentKind::Video => &layers.video,
            ContentKind::WebPage => &layers.web,
        }
    }

    fn content(self, value: String) -> DisplayContent {
        match self {
            ContentKind::Text => DisplayContent::Text(value),
            ContentKind::Image => DisplayContent::Image(value),
            ContentKind::ImageUrl => DisplayContent::ImageUrl(value),
            ContentKind::Video => DisplayContent::Video(value),
            ContentKind::WebPage => DisplayContent::WebPage(value),
        }
    }
}

struct ShowContent {
    kind: ContentKind,
}

#[async_trait]
impl VerbHandler for ShowContent {
    fn shape(&self) -> ArgShape {
        ArgShape::text_after(0)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let value = unquote(args.text(0)?).to_string();
        let layer = self.kind.layer(&cx.performer.config().layers);
        let display = &cx.performer.capabilities().display;

        if cx.performer.layers().mark_shown(layer) {
            display
                .set_layer_settings(LayerSettings {
                    layer: layer.to_string(),
                    visible: true,
                    placement: None,
                })
                .await
                .for_verb(args)?;
        }
        display
            .show(layer, self.kind.content(value))
            .await
            .for_verb(args)
    }
}

struct ClearContent {
    kind: ContentKind,
}

#[async_trait]
impl VerbHandler for ClearContent {
    fn shape(&self) -> ArgShape {
        ArgShape::NONE
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let layer = self.kind.layer(&cx.performer.config().layers);
        cx.performer.layers().forget(layer);
        cx.performer
            .capabilities()
            .display
            .clear_layer(layer)
            .await
            .for_verb(args)
    }
}

/// `LAYER:id,visible[,placement]`
struct Layer;

#[async_trait]
impl VerbHandler for Layer {
    fn shape(&self) -> ArgShape {
        ArgShape::range(2, 3)
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let layer = unquote(args.text(0)?).to_string();
        let visible = args.bool(1)?;
        let placement = args
            .unquoted(2)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        if visible {
            cx.performer.layers().mark_shown(&layer);
        } else {
            cx.performer.layers().forget(&layer);
        }
        cx.performer
            .capabilities()
            .display
            .set_layer_settings(LayerSettings {
                layer,
                visible,
                placement,
            })
            .await
            .for_verb(args)
    }
}

/// Clears and hides every layer shown during the run.
struct ResetLayers;

#[async_trait]
impl VerbHandler for ResetLayers {
    fn shape(&self) -> ArgShape {
        ArgShape::NONE
    }

    async fn invoke(&self, cx: &mut VerbContext<'_>, args: &Args) -> DispatchResult<()> {
        let display = &cx.performer.capabilities().display;
        for layer in cx.performer.layers().take_all() {
            debug!(layer = %layer, "resetting display layer");
            display.clear_layer(&layer).await.for_verb(args)?;
            display
                .set_layer_settings(LayerSettings {
                    layer,
                    visible: false,
                    placement: None,
                })
                .await
                .for_verb(args)?;
        }
        Ok(())
    }
}
