//! Anki collection database (schema version 11).
//!
//! Writes a fresh `collection.anki2` SQLite file holding one note model,
//! the decks, their notes, and one new card per template per note.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::{json, Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::domain::{Deck, Note, NoteModel};

/// Field separator inside `notes.flds`
pub const FIELD_SEPARATOR: &str = "\x1f";

const SCHEMA_VERSION: i64 = 11;
const DEFAULT_DECK_ID: i64 = 1;
const DEFAULT_CONF_ID: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE col (
    id integer primary key,
    crt integer not null,
    mod integer not null,
    scm integer not null,
    ver integer not null,
    dty integer not null,
    usn integer not null,
    ls integer not null,
    conf text not null,
    models text not null,
    decks text not null,
    dconf text not null,
    tags text not null
);
CREATE TABLE notes (
    id integer primary key,
    guid text not null,
    mid integer not null,
    mod integer not null,
    usn integer not null,
    tags text not null,
    flds text not null,
    sfld integer not null,
    csum integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE cards (
    id integer primary key,
    nid integer not null,
    did integer not null,
    ord integer not null,
    mod integer not null,
    usn integer not null,
    type integer not null,
    queue integer not null,
    due integer not null,
    ivl integer not null,
    factor integer not null,
    reps integer not null,
    lapses integer not null,
    left integer not null,
    odue integer not null,
    odid integer not null,
    flags integer not null,
    data text not null
);
CREATE TABLE revlog (
    id integer primary key,
    cid integer not null,
    usn integer not null,
    ease integer not null,
    ivl integer not null,
    lastIvl integer not null,
    factor integer not null,
    time integer not null,
    type integer not null
);
CREATE TABLE graves (
    usn integer not null,
    oid integer not null,
    type integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

/// Stable note guid: the first 10 hex digits of SHA-256 over the sign id
/// and its category id.
///
/// A sign listed under two categories yields two distinct notes.
pub fn note_guid(note: &Note) -> String {
    let mut hasher = Sha256::new();
    hasher.update(note.sort_field().as_bytes());
    hasher.update(FIELD_SEPARATOR.as_bytes());
    hasher.update(note.category_id().as_bytes());
    let mut guid = hex::encode(hasher.finalize());
    guid.truncate(10);
    guid
}

/// Duplicate-check checksum: first 32 bits of SHA-1 of the first field
pub fn field_checksum(field: &str) -> i64 {
    let digest = Sha1::digest(strip_html(field).as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Field ordinals referenced by a front template, for card generation
fn required_fields(model: &NoteModel, front: &str) -> Vec<usize> {
    let referenced: Vec<usize> = model
        .fields
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            front.contains(&format!("{{{{{}}}}}", name)) || front.contains(&format!("{{{{#{}}}}}", name))
        })
        .map(|(ord, _)| ord)
        .collect();

    if referenced.is_empty() {
        vec![0]
    } else {
        referenced
    }
}

fn model_json(model: &NoteModel, default_deck: i64, now: i64) -> Value {
    let fields: Vec<Value> = model
        .fields
        .iter()
        .enumerate()
        .map(|(ord, name)| {
            json!({
                "name": name,
                "ord": ord,
                "font": "Liberation Sans",
                "media": [],
                "rtl": false,
                "size": 20,
                "sticky": false
            })
        })
        .collect();

    let templates: Vec<Value> = model
        .templates
        .iter()
        .enumerate()
        .map(|(ord, t)| {
            json!({
                "name": t.name,
                "ord": ord,
                "qfmt": t.front,
                "afmt": t.back,
                "bqfmt": "",
                "bafmt": "",
                "did": null
            })
        })
        .collect();

    let req: Vec<Value> = model
        .templates
        .iter()
        .enumerate()
        .map(|(ord, t)| json!([ord, "any", required_fields(model, &t.front)]))
        .collect();

    json!({
        "id": model.id,
        "name": model.name,
        "type": 0,
        "mod": now,
        "usn": -1,
        "sortf": 0,
        "did": default_deck,
        "tmpls": templates,
        "flds": fields,
        "css": model.css,
        "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
        "latexPost": "\\end{document}",
        "req": req,
        "tags": [],
        "vers": []
    })
}

fn deck_json(id: i64, name: &str, now: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "mod": now,
        "usn": -1,
        "collapsed": false,
        "conf": DEFAULT_CONF_ID,
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "lrnToday": [0, 0],
        "newToday": [0, 0],
        "revToday": [0, 0],
        "timeToday": [0, 0]
    })
}

fn deck_conf_json() -> Value {
    json!({
        DEFAULT_CONF_ID.to_string(): {
            "id": DEFAULT_CONF_ID,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}

fn col_conf_json(model_id: i64) -> Value {
    json!({
        "activeDecks": [DEFAULT_DECK_ID],
        "curDeck": DEFAULT_DECK_ID,
        "curModel": model_id.to_string(),
        "addToCur": true,
        "collapseTime": 1200,
        "dueCounts": true,
        "estTimes": true,
        "newBury": true,
        "newSpread": 0,
        "nextPos": 1,
        "sortBackwards": false,
        "sortType": "noteFld",
        "timeLim": 0
    })
}

/// Write a complete collection database to `path`
pub fn write_collection(
    path: &Path,
    model: &NoteModel,
    decks: &[Deck],
    now: DateTime<Utc>,
) -> Result<()> {
    let secs = now.timestamp();
    let millis = now.timestamp_millis();

    let mut conn = Connection::open(path)
        .with_context(|| format!("Failed to create collection: {}", path.display()))?;
    conn.execute_batch(SCHEMA)
        .context("Failed to create collection schema")?;

    let default_deck = decks.first().map(|d| d.id).unwrap_or(DEFAULT_DECK_ID);

    let mut models = Map::new();
    models.insert(model.id.to_string(), model_json(model, default_deck, secs));

    let mut deck_map = Map::new();
    deck_map.insert(
        DEFAULT_DECK_ID.to_string(),
        deck_json(DEFAULT_DECK_ID, "Default", secs),
    );
    for deck in decks {
        deck_map.insert(deck.id.to_string(), deck_json(deck.id, &deck.name, secs));
    }

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO col VALUES (NULL, ?1, ?2, ?3, ?4, 0, 0, 0, ?5, ?6, ?7, ?8, '{}')",
        params![
            secs - secs.rem_euclid(86_400),
            millis,
            millis,
            SCHEMA_VERSION,
            col_conf_json(model.id).to_string(),
            Value::Object(models).to_string(),
            Value::Object(deck_map).to_string(),
            deck_conf_json().to_string(),
        ],
    )
    .context("Failed to write collection header")?;

    {
        let mut insert_note = tx.prepare(
            "INSERT INTO notes VALUES (?1, ?2, ?3, ?4, -1, '', ?5, ?6, ?7, 0, '')",
        )?;
        let mut insert_card = tx.prepare(
            "INSERT INTO cards VALUES (?1, ?2, ?3, ?4, ?5, -1, 0, 0, ?6, 0, 0, 0, 0, 0, 0, 0, 0, '')",
        )?;

        let mut position: i64 = 0;
        let mut card_id = millis;

        for deck in decks {
            for note in &deck.notes {
                let note_id = millis + position;
                let fields = note.fields().join(FIELD_SEPARATOR);

                insert_note
                    .execute(params![
                        note_id,
                        note_guid(note),
                        model.id,
                        secs,
                        fields,
                        note.sort_field(),
                        field_checksum(note.sort_field()),
                    ])
                    .with_context(|| format!("Failed to write note {}", note.sort_field()))?;

                for ord in 0..model.templates.len() {
                    insert_card.execute(params![card_id, note_id, deck.id, ord as i64, secs, position])?;
                    card_id += 1;
                }

                position += 1;
            }
        }
    }

    tx.commit().context("Failed to commit collection")?;
    Ok(())
}
