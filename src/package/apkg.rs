//! `.apkg` archive writer.
//!
//! Layout: `collection.anki2`, a `media` JSON map from archive entry name
//! (`"0"`, `"1"`, ...) to the original file name, and the media files stored
//! under those index names. The archive is written beside its final path and
//! renamed into place, so a failed build never leaves a truncated package.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::collection::write_collection;
use super::manifest::MediaManifest;
use crate::domain::media::file_name_of;
use crate::domain::{Deck, NoteModel};

pub const COLLECTION_ENTRY: &str = "collection.anki2";
pub const MEDIA_MAP_ENTRY: &str = "media";

/// Build the `media` entry: index name to original file name
pub fn media_map(manifest: &MediaManifest) -> BTreeMap<String, String> {
    manifest
        .files()
        .iter()
        .enumerate()
        .filter_map(|(idx, path)| file_name_of(path).map(|name| (idx.to_string(), name.to_string())))
        .collect()
}

/// Write the full archive to `output`
pub fn write_apkg(
    output: &Path,
    model: &NoteModel,
    decks: &[Deck],
    manifest: &MediaManifest,
) -> Result<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;

    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let collection_path = scratch.path().join(COLLECTION_ENTRY);
    write_collection(&collection_path, model, decks, Utc::now())?;

    let staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to stage archive in {}", parent.display()))?;

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    // Encoded video does not compress further
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut zip = ZipWriter::new(staged.reopen().context("Failed to open staged archive")?);

    zip.start_file(COLLECTION_ENTRY, deflated)?;
    let mut collection = File::open(&collection_path)
        .with_context(|| format!("Failed to read {}", collection_path.display()))?;
    io::copy(&mut collection, &mut zip).context("Failed to add collection to archive")?;

    let map = media_map(manifest);
    zip.start_file(MEDIA_MAP_ENTRY, deflated)?;
    zip.write_all(serde_json::to_string(&map)?.as_bytes())?;

    for (idx, path) in manifest.files().iter().enumerate() {
        zip.start_file(idx.to_string(), stored)?;
        let mut media = File::open(path)
            .with_context(|| format!("Failed to read media file: {}", path.display()))?;
        io::copy(&mut media, &mut zip)
            .with_context(|| format!("Failed to add media file: {}", path.display()))?;
        debug!(entry = idx, path = %path.display(), "Bundled media");
    }

    zip.finish().context("Failed to finalize archive")?;

    staged
        .persist(output)
        .with_context(|| format!("Failed to write archive: {}", output.display()))?;

    info!(
        path = %output.display(),
        decks = decks.len(),
        media = manifest.len(),
        "Wrote package"
    );
    Ok(())
}
