//! Nested tooltip stack
//!
//! Up to three popup levels. Clicking an annotated word outside any popup
//! opens level 0; clicking inside level k opens level k + 1. Opening a level
//! tears down that level and everything above it first, so a visible level
//! always has every lower level visible too.

use crate::render::{escape_html, to_html, Fragment};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_LEVELS: usize = 3;

/// Gap between a popup and its anchor, and minimum distance to the
/// viewport edges.
pub const MARGIN: f64 = 8.0;

/// Horizontal indent per nesting level.
pub const LEVEL_INDENT: f64 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// What a popup shows: headword, its translation if any, and the rendered
/// meaning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopupContent {
    pub headword: String,
    pub translation: Option<String>,
    pub body: Vec<Fragment>,
}

impl PopupContent {
    pub fn to_html(&self) -> String {
        let mut out = format!(
            "<div class=\"tooltip-headword\">{}</div>",
            escape_html(&self.headword)
        );
        if let Some(translation) = &self.translation {
            out.push_str(&format!(
                "<div class=\"tooltip-translation\">{}</div>",
                escape_html(translation)
            ));
        }
        out.push_str(&format!("<div class=\"tooltip-body\">{}</div>", to_html(&self.body)));
        out
    }

    fn text_len(&self) -> usize {
        let body: usize = self
            .body
            .iter()
            .map(|f| match f {
                Fragment::Text { html } | Fragment::Whitespace { html } => html.chars().count(),
                Fragment::Annotated { surface, .. } => surface.chars().count(),
            })
            .sum();
        body + self.headword.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub level: usize,
    pub anchor: Rect,
    pub headword: String,
    pub content: PopupContent,
    pub rect: Rect,
}

/// Sizes a popup before it is placed.
pub trait Measure {
    fn measure(&self, content: &PopupContent, viewport: Viewport) -> Size;
}

pub struct FixedSize(pub Size);

impl Measure for FixedSize {
    fn measure(&self, _content: &PopupContent, _viewport: Viewport) -> Size {
        self.0
    }
}

/// Estimates popup size from character counts, wrapping at `max_width`.
#[derive(Debug, Clone, Copy)]
pub struct TextMetrics {
    pub char_width: f64,
    pub line_height: f64,
    pub max_width: f64,
    pub padding: f64,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            char_width: 7.5,
            line_height: 20.0,
            max_width: 360.0,
            padding: 12.0,
        }
    }
}

impl Measure for TextMetrics {
    fn measure(&self, content: &PopupContent, viewport: Viewport) -> Size {
        let max_width = self.max_width.min(viewport.width - 2.0 * MARGIN).max(self.char_width);
        let text_width = content.text_len() as f64 * self.char_width;
        let width = text_width.min(max_width);
        let body_lines = (text_width / max_width).ceil().max(1.0);
        let header_lines = if content.translation.is_some() { 2.0 } else { 1.0 };
        Size {
            width: width + 2.0 * self.padding,
            height: (body_lines + header_lines) * self.line_height + 2.0 * self.padding,
        }
    }
}

/// Where a clicked annotated word lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "in", content = "level", rename_all = "snake_case")]
pub enum ClickOrigin {
    /// The table, outside every popup.
    Table,
    /// Inside the popup at the given level.
    Layer(usize),
}

impl ClickOrigin {
    pub fn target_level(self) -> usize {
        match self {
            ClickOrigin::Table => 0,
            ClickOrigin::Layer(k) => k + 1,
        }
    }
}

/// Target of a pointer interaction that is not a word click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", content = "level", rename_all = "snake_case")]
pub enum PointerTarget {
    Popup(usize),
    AnnotatedUnit,
    Elsewhere,
}

#[derive(Debug, Clone, Default)]
pub struct TooltipStack {
    layers: [Option<Popup>; MAX_LEVELS],
    viewport: Viewport,
}

impl TooltipStack {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            layers: Default::default(),
            viewport,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn layer(&self, level: usize) -> Option<&Popup> {
        self.layers.get(level).and_then(Option::as_ref)
    }

    pub fn is_visible(&self, level: usize) -> bool {
        self.layer(level).is_some()
    }

    pub fn visible(&self) -> impl Iterator<Item = &Popup> {
        self.layers.iter().flatten()
    }

    pub fn depth(&self) -> usize {
        self.layers.iter().take_while(|l| l.is_some()).count()
    }

    pub fn close_from(&mut self, level: usize) {
        for layer in self.layers.iter_mut().skip(level) {
            *layer = None;
        }
    }

    /// Opens `headword` at `level`, anchored to `anchor`. Returns the level
    /// actually opened.
    ///
    /// Levels past the stack are ignored. A level whose parent is not
    /// visible opens at level 0 instead. The target level and everything
    /// above it are closed first, so an unknown headword (`content`
    /// returns `None`) only tears down.
    pub fn open<F, M>(
        &mut self,
        level: usize,
        anchor: Rect,
        headword: &str,
        content: F,
        measure: &M,
    ) -> Option<usize>
    where
        F: FnOnce(&str) -> Option<PopupContent>,
        M: Measure + ?Sized,
    {
        if level >= MAX_LEVELS {
            return None;
        }
        let level = if level > 0 && !self.is_visible(level - 1) {
            debug!("Tooltip level {} has no parent, opening at level 0", level);
            0
        } else {
            level
        };

        self.close_from(level);
        let content = content(headword)?;
        let size = measure.measure(&content, self.viewport);
        let rect = self.place(level, anchor, size);

        self.layers[level] = Some(Popup {
            level,
            anchor,
            headword: headword.to_string(),
            content,
            rect,
        });
        Some(level)
    }

    /// Handles a click on an annotated word (or a backlink chip).
    pub fn click<F, M>(
        &mut self,
        origin: ClickOrigin,
        anchor: Rect,
        headword: &str,
        content: F,
        measure: &M,
    ) -> Option<usize>
    where
        F: FnOnce(&str) -> Option<PopupContent>,
        M: Measure + ?Sized,
    {
        self.open(origin.target_level(), anchor, headword, content, measure)
    }

    /// Pointer interaction anywhere else: outside every popup and every
    /// annotated word collapses the stack.
    pub fn pointer(&mut self, target: PointerTarget) {
        if target == PointerTarget::Elsewhere {
            self.close_from(0);
        }
    }

    fn place(&self, level: usize, anchor: Rect, size: Size) -> Rect {
        let (x, y) = match level.checked_sub(1).and_then(|p| self.layer(p)) {
            Some(parent) => (
                parent.rect.left + LEVEL_INDENT * level as f64,
                parent.rect.bottom() + MARGIN,
            ),
            None => (anchor.left, anchor.bottom() + MARGIN),
        };
        let (x, y) = clamp_to_viewport(x, y, size, self.viewport);
        Rect::new(x, y, size.width, size.height)
    }
}

fn clamp_to_viewport(mut x: f64, mut y: f64, size: Size, viewport: Viewport) -> (f64, f64) {
    if x + size.width > viewport.width - MARGIN {
        x = viewport.width - size.width - MARGIN;
    }
    if x < MARGIN {
        x = MARGIN;
    }
    if y + size.height > viewport.height - MARGIN {
        y = viewport.height - size.height - MARGIN;
        if y < MARGIN {
            y = MARGIN;
        }
    }
    (x, y)
}
