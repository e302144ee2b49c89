//! Notes, decks and the shared note model.
//!
//! A [`Note`] is a fixed-size array in [`NOTE_FIELDS`] order, so every note
//! agrees with the model's field layout by construction.

use serde::Serialize;

use super::catalog::Sign;

/// Field names of the note model, in storage order
pub const NOTE_FIELDS: [&str; 7] = [
    "id",
    "def",
    "pos",
    "video",
    "video_url",
    "page_url",
    "category",
];

/// Index of the media field within [`NOTE_FIELDS`]
pub const MEDIA_FIELD: usize = 3;

/// Markup the card renderer expects for embedded media
pub fn media_markup(file_name: &str) -> String {
    format!("<img src=\"{}\">", file_name)
}

/// One flattened record in a deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    fields: [String; NOTE_FIELDS.len()],
    #[serde(skip)]
    media_file: Option<String>,
    #[serde(skip)]
    deck_title: String,
    #[serde(skip)]
    category_id: String,
}

impl Note {
    /// Build a note from a sign and the file name of its resolved media, if any.
    ///
    /// The media field receives `<img>` markup here and nowhere else.
    pub fn from_sign(sign: &Sign, media_file: Option<&str>, page_url: String) -> Self {
        let media_file = media_file.filter(|f| !f.is_empty()).map(str::to_string);
        let video = media_file.as_deref().map(media_markup).unwrap_or_default();

        Self {
            fields: [
                sign.id.to_string(),
                sign.definition.clone(),
                sign.pos.clone(),
                video,
                sign.video_url.clone(),
                page_url,
                sign.category_title().to_string(),
            ],
            media_file,
            deck_title: sign.category_title().to_string(),
            category_id: sign.category_id().to_string(),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Sort field (the first field)
    pub fn sort_field(&self) -> &str {
        &self.fields[0]
    }

    /// Local media file name referenced by this note
    pub fn media_file(&self) -> Option<&str> {
        self.media_file.as_deref()
    }

    /// Category title that decides which deck the note lands in
    pub fn deck_title(&self) -> &str {
        &self.deck_title
    }

    /// Id of the category the sign was listed under
    pub fn category_id(&self) -> &str {
        &self.category_id
    }
}

/// A named group of notes for one category
#[derive(Debug, Clone)]
pub struct Deck {
    pub id: i64,
    pub name: String,
    pub notes: Vec<Note>,
}

impl Deck {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            notes: Vec::new(),
        }
    }
}

/// One card direction: front and back templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardTemplate {
    pub name: String,
    pub front: String,
    pub back: String,
}

/// The note model shared by every deck in a package
#[derive(Debug, Clone)]
pub struct NoteModel {
    pub id: i64,
    pub name: String,
    pub fields: Vec<String>,
    pub templates: Vec<CardTemplate>,
    pub css: String,
}

impl NoteModel {
    pub fn new(id: i64, name: impl Into<String>, templates: Vec<CardTemplate>, css: String) -> Self {
        Self {
            id,
            name: name.into(),
            fields: NOTE_FIELDS.iter().map(|f| f.to_string()).collect(),
            templates,
            css,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, CatalogId, SignRecord};

    fn sign() -> Sign {
        SignRecord {
            id: CatalogId::new("12"),
            definition: "ありがとう".to_string(),
            pos: "感動詞".to_string(),
            video_url: "https://cdn.example/12.mp4".to_string(),
        }
        .place_in(&Category::new("3", "あいさつ"))
    }

    #[test]
    fn test_note_field_order() {
        let note = Note::from_sign(&sign(), Some("12.avif"), "https://p/12".to_string());
        let fields = note.fields();

        assert_eq!(fields.len(), NOTE_FIELDS.len());
        assert_eq!(fields[0], "12");
        assert_eq!(fields[1], "ありがとう");
        assert_eq!(fields[2], "感動詞");
        assert_eq!(fields[MEDIA_FIELD], "<img src=\"12.avif\">");
        assert_eq!(fields[4], "https://cdn.example/12.mp4");
        assert_eq!(fields[5], "https://p/12");
        assert_eq!(fields[6], "あいさつ");
        assert_eq!(note.media_file(), Some("12.avif"));
    }

    #[test]
    fn test_note_without_media_has_empty_field() {
        let note = Note::from_sign(&sign(), None, String::new());
        assert_eq!(note.fields()[MEDIA_FIELD], "");
        assert!(note.media_file().is_none());

        let note = Note::from_sign(&sign(), Some(""), String::new());
        assert!(note.media_file().is_none());
    }

    #[test]
    fn test_model_fields_match_note_fields() {
        let model = NoteModel::new(1, "JSL", Vec::new(), String::new());
        assert_eq!(model.fields, NOTE_FIELDS);
    }
}
