//! Assembly of crawled signs and their media into a package.
//!
//! One note model per package. Decks are created lazily, one per distinct
//! category title, in first-seen order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

use crate::config::BuildConfig;
use crate::domain::{Deck, LocalMediaAsset, Note, NoteModel, Sign};
use crate::package::{MediaManifest, Package, TemplateSet};

const ID_RANGE: std::ops::Range<i64> = (1 << 30)..(1 << 31);

/// Hands out random ids that are unique within one package
struct IdAllocator {
    rng: StdRng,
    used: HashSet<i64>,
}

impl IdAllocator {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            used: HashSet::new(),
        }
    }

    fn next(&mut self) -> i64 {
        loop {
            let id = self.rng.gen_range(ID_RANGE);
            if self.used.insert(id) {
                return id;
            }
        }
    }
}

/// Builds a [`Package`] from signs and their resolved media
pub struct PackageAssembler {
    config: Arc<BuildConfig>,
    templates: TemplateSet,
    seed: Option<u64>,
}

impl PackageAssembler {
    pub fn new(config: Arc<BuildConfig>, templates: TemplateSet) -> Self {
        Self {
            config,
            templates,
            seed: None,
        }
    }

    /// Use a fixed seed for model and deck ids
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn deck_name(&self, title: &str) -> String {
        format!("{}::{}", self.config.deck_prefix, title)
    }

    /// Group `signs` into decks and collect their media.
    ///
    /// `media` is index-aligned with `signs`; `None` means the sign has no
    /// local media and its note gets an empty media field.
    #[instrument(skip_all, fields(signs = signs.len()))]
    pub fn assemble(&self, signs: &[Sign], media: &[Option<LocalMediaAsset>]) -> Result<Package> {
        ensure!(
            signs.len() == media.len(),
            "Media list has {} entries for {} signs",
            media.len(),
            signs.len()
        );

        let mut ids = IdAllocator::new(self.seed);
        let model = NoteModel::new(
            ids.next(),
            self.config.model_name.clone(),
            self.templates.templates.clone(),
            self.templates.css.clone(),
        );

        let mut decks: Vec<Deck> = Vec::new();
        let mut deck_index: HashMap<String, usize> = HashMap::new();
        let mut manifest = MediaManifest::new();

        for (sign, asset) in signs.iter().zip(media) {
            let media_file = asset.as_ref().and_then(|a| a.file_name());
            if let Some(asset) = asset {
                manifest.insert(&asset.path);
            }

            let page_url = sign.page_url(
                &self.config.base_url,
                &self.config.language,
                &self.config.sign_language,
            );
            let note = Note::from_sign(sign, media_file, page_url);

            let idx = match deck_index.get(note.deck_title()) {
                Some(&idx) => idx,
                None => {
                    let deck = Deck::new(ids.next(), self.deck_name(note.deck_title()));
                    debug!(deck = %deck.name, id = deck.id, "New deck");
                    decks.push(deck);
                    deck_index.insert(note.deck_title().to_string(), decks.len() - 1);
                    decks.len() - 1
                }
            };
            decks[idx].notes.push(note);
        }

        Ok(Package {
            model,
            decks,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Directions;
    use crate::domain::{CatalogId, Category, MediaKind, SignRecord, TargetFormat, MEDIA_FIELD};
    use std::path::Path;
    use tempfile::TempDir;

    fn sign(id: &str, category: &Category) -> Sign {
        SignRecord {
            id: CatalogId::new(id),
            definition: format!("語{}", id),
            pos: "名詞".to_string(),
            video_url: format!("https://cdn.example/{}.mp4", id),
        }
        .place_in(category)
    }

    fn assembler() -> PackageAssembler {
        let config = Arc::new(BuildConfig::with_root(Path::new("/work")));
        let templates = TemplateSet::load(None, &Directions::both()).unwrap();
        PackageAssembler::new(config, templates).with_seed(7)
    }

    #[test]
    fn test_id_allocator_is_unique_and_in_range() {
        let mut ids = IdAllocator::new(Some(1));
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = ids.next();
            assert!(ID_RANGE.contains(&id));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_decks_grouped_by_title() {
        let a = Category::new("1", "A");
        let b = Category::new("2", "B");
        // Same title under a different id still lands in deck A
        let a2 = Category::new("3", "A");
        let signs = vec![sign("1", &a), sign("2", &b), sign("3", &a2), sign("4", &b)];
        let media = vec![None; signs.len()];

        let package = assembler().assemble(&signs, &media).unwrap();

        assert_eq!(package.decks.len(), 2);
        let deck_a = package.deck("手話タウンハンドブック::A").unwrap();
        let deck_b = package.deck("手話タウンハンドブック::B").unwrap();
        assert_eq!(deck_a.notes.len(), 2);
        assert_eq!(deck_b.notes.len(), 2);
        assert_ne!(deck_a.id, deck_b.id);
        assert_ne!(deck_a.id, package.model.id);
        assert_eq!(package.model.templates.len(), 2);
    }

    #[test]
    fn test_media_resolution_and_manifest() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("1.avif");
        std::fs::write(&present, b"x").unwrap();

        let cat = Category::new("1", "A");
        let signs = vec![sign("1", &cat), sign("2", &cat), sign("3", &cat)];
        let media = vec![
            Some(LocalMediaAsset::new(
                CatalogId::new("1"),
                MediaKind::Transcoded(TargetFormat::Avif),
                &present,
            )),
            None,
            Some(LocalMediaAsset::new(
                CatalogId::new("3"),
                MediaKind::Transcoded(TargetFormat::Avif),
                temp.path().join("3.avif"),
            )),
        ];

        let package = assembler().assemble(&signs, &media).unwrap();
        let notes = &package.decks[0].notes;

        assert_eq!(notes[0].fields()[MEDIA_FIELD], "<img src=\"1.avif\">");
        assert_eq!(notes[1].fields()[MEDIA_FIELD], "");
        // Missing on disk: excluded from the manifest, reference kept
        assert_eq!(notes[2].fields()[MEDIA_FIELD], "<img src=\"3.avif\">");
        assert_eq!(package.manifest.len(), 1);
        assert!(package.manifest.contains_name("1.avif"));
    }

    #[test]
    fn test_page_url_field() {
        let cat = Category::new("1", "A");
        let package = assembler().assemble(&[sign("12", &cat)], &[None]).unwrap();

        assert_eq!(
            package.decks[0].notes[0].fields()[5],
            "https://handbook.sign.town/ja/signs/12?sl=JSL"
        );
    }

    #[test]
    fn test_misaligned_media_rejected() {
        let cat = Category::new("1", "A");
        assert!(assembler().assemble(&[sign("1", &cat)], &[]).is_err());
    }
}
