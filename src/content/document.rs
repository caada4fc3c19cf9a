//! Markdown-with-front-matter and YAML data documents.

use serde_yaml::{Mapping, Value};

use super::config::{BODY_FIELD, ContentFormat};
use crate::errors::ContentError;

/// A parsed content file: YAML mapping plus (for Markdown) the body text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub front_matter: Mapping,
    pub body: String,
}

/// Split `---` fenced front matter off the start of a Markdown file.
/// Returns `None` when the file has no complete front matter block.
fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let marker = line.trim_end_matches(['\r', '\n']);
        if marker == "---" || marker == "..." {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_mapping(yaml: &str, path: &str) -> Result<Mapping, ContentError> {
    let value: Value = serde_yaml::from_str(yaml).map_err(|source| ContentError::FrontMatter {
        path: path.to_string(),
        source,
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(m) => Ok(m),
        _ => Err(ContentError::NotAMapping {
            path: path.to_string(),
        }),
    }
}

impl Document {
    /// Parse raw file text. `path` is only used in error messages.
    pub fn parse(raw: &str, format: ContentFormat, path: &str) -> Result<Self, ContentError> {
        let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        match format {
            ContentFormat::Markdown => match split_front_matter(text) {
                Some((yaml, body)) => Ok(Self {
                    front_matter: parse_mapping(yaml, path)?,
                    body: body.to_string(),
                }),
                None => Ok(Self {
                    front_matter: Mapping::new(),
                    body: text.to_string(),
                }),
            },
            ContentFormat::Yaml => Ok(Self {
                front_matter: parse_mapping(text, path)?,
                body: String::new(),
            }),
        }
    }

    /// Serialize back to file text. Output always ends with a newline.
    pub fn render(&self, format: ContentFormat) -> Result<String, ContentError> {
        let mut out = match format {
            ContentFormat::Markdown if self.front_matter.is_empty() => self.body.clone(),
            ContentFormat::Markdown => {
                let yaml = serde_yaml::to_string(&self.front_matter).map_err(ContentError::Render)?;
                format!("---\n{}---\n{}", yaml, self.body)
            }
            ContentFormat::Yaml => {
                serde_yaml::to_string(&self.front_matter).map_err(ContentError::Render)?
            }
        };
        if !out.ends_with('\n') {
            out.push('\n');
        }
        Ok(out)
    }

    /// Form view: front matter, plus the Markdown body under `body`.
    pub fn values(&self, format: ContentFormat) -> Mapping {
        let mut values = self.front_matter.clone();
        if format == ContentFormat::Markdown {
            values.insert(
                Value::String(BODY_FIELD.to_string()),
                Value::String(self.body.clone()),
            );
        }
        values
    }

    /// Inverse of [`Document::values`].
    pub fn from_values(mut values: Mapping, format: ContentFormat) -> Self {
        let body = match format {
            ContentFormat::Markdown => match values.shift_remove(BODY_FIELD) {
                Some(Value::String(s)) => s,
                _ => String::new(),
            },
            ContentFormat::Yaml => String::new(),
        };
        Self {
            front_matter: values,
            body,
        }
    }
}
