//! Card templates and stylesheet.
//!
//! Built-in templates are compiled into the binary. A configured templates
//! directory replaces the whole set: the stylesheet and every template file
//! the selected directions need are read from it, with no fallback to the
//! built-ins, and any one of them missing stops the build.

use std::path::Path;

use crate::config::{Direction, Directions};
use crate::core::PipelineError;
use crate::domain::CardTemplate;

const STYLE_FILE: &str = "style.css";

const BUILTIN: &[(&str, &str)] = &[
    (STYLE_FILE, include_str!("../../templates/style.css")),
    (
        "ja2jsl_front.template.anki",
        include_str!("../../templates/ja2jsl_front.template.anki"),
    ),
    (
        "ja2jsl_back.template.anki",
        include_str!("../../templates/ja2jsl_back.template.anki"),
    ),
    (
        "jsl2ja_front.template.anki",
        include_str!("../../templates/jsl2ja_front.template.anki"),
    ),
    (
        "jsl2ja_back.template.anki",
        include_str!("../../templates/jsl2ja_back.template.anki"),
    ),
];

/// Card templates for the selected directions plus the shared stylesheet
#[derive(Debug, Clone)]
pub struct TemplateSet {
    pub templates: Vec<CardTemplate>,
    pub css: String,
}

impl TemplateSet {
    /// Load templates for `directions`, from `dir` if given, else built-in
    pub fn load(dir: Option<&Path>, directions: &Directions) -> Result<Self, PipelineError> {
        let read = |name: &str| -> Result<String, PipelineError> {
            match dir {
                Some(dir) => {
                    let path = dir.join(name);
                    std::fs::read_to_string(&path).map_err(|e| PipelineError::TemplateUnreadable {
                        path,
                        reason: e.to_string(),
                    })
                }
                None => builtin(name).map(str::to_string).ok_or_else(|| {
                    PipelineError::TemplateUnreadable {
                        path: name.into(),
                        reason: "no built-in template with this name".to_string(),
                    }
                }),
            }
        };

        let templates = directions
            .iter()
            .map(|direction| {
                Ok(CardTemplate {
                    name: direction.card_name().to_string(),
                    front: read(&template_file(*direction, "front"))?,
                    back: read(&template_file(*direction, "back"))?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        Ok(Self {
            templates,
            css: read(STYLE_FILE)?,
        })
    }
}

fn template_file(direction: Direction, side: &str) -> String {
    format!("{}_{}.template.anki", direction.template_stem(), side)
}

fn builtin(name: &str) -> Option<&'static str> {
    BUILTIN
        .iter()
        .find(|(file, _)| *file == name)
        .map(|(_, content)| *content)
}
