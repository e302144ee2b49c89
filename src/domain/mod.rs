//! Domain types for signdeck.
//!
//! This module contains the core data structures:
//! - Catalog: categories and signs read from the remote catalog
//! - Media: local media files and target encodings
//! - Note: notes, decks and the shared note model

pub mod catalog;
pub mod media;
pub mod note;

// Re-export commonly used types
pub use catalog::{CatalogId, Category, Sign, SignRecord};
pub use media::{LocalMediaAsset, MediaKind, TargetFormat};
pub use note::{media_markup, CardTemplate, Deck, Note, NoteModel, MEDIA_FIELD, NOTE_FIELDS};
