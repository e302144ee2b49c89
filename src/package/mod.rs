//! Package output: card templates, the media manifest, and the `.apkg` writer.

pub mod apkg;
pub mod collection;
pub mod manifest;
pub mod templates;

use std::path::Path;

use anyhow::Result;

use crate::domain::{Deck, NoteModel};

pub use manifest::MediaManifest;
pub use templates::TemplateSet;

/// Everything that goes into one archive
#[derive(Debug, Clone)]
pub struct Package {
    pub model: NoteModel,
    pub decks: Vec<Deck>,
    pub manifest: MediaManifest,
}

impl Package {
    pub fn note_count(&self) -> usize {
        self.decks.iter().map(|d| d.notes.len()).sum()
    }

    pub fn deck(&self, name: &str) -> Option<&Deck> {
        self.decks.iter().find(|d| d.name == name)
    }

    /// Write the package as an `.apkg` archive at `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        apkg::write_apkg(path, &self.model, &self.decks, &self.manifest)
    }
}
