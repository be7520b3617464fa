//! Glossa - glossary viewer backend
//!
//! Parses a headword/meaning dataset, links definitions to the headwords
//! they mention, stores personal translations and renders annotated
//! meanings for nested tooltips.

// Tokenization comes first as indexing, rendering and filtering build on it
pub mod tokens;
pub mod entries;
pub mod index;
pub mod translations;
pub mod storage;
pub mod render;
pub mod tooltip;
pub mod filter;
pub mod debounce;
pub mod cache;
pub mod search;
pub mod config;
pub mod error;
pub mod state;

pub use cache::RenderCache;
pub use config::Config;
pub use entries::{Entry, EntryId, EntryStore};
pub use error::GlossaError;
pub use filter::{FilterState, FilterWord, TranslationMode};
pub use render::Fragment;
pub use state::{AppState, EntryRow};
pub use storage::{MemoryStore, SqliteStore, Tier};
pub use tooltip::{ClickOrigin, PointerTarget, Popup, PopupContent, Rect, TooltipStack, Viewport};
pub use translations::{KeyValueStore, SaveOutcome, TranslationStore, Translations};
