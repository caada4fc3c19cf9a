//! Content config: the YAML document in a repository that declares which
//! files are editable.
//!
//! ```yaml
//! branch: main
//! collections:
//!   - name: posts
//!     label: Blog posts
//!     path: content/posts
//!     format: markdown
//!     filename: "{{year}}-{{month}}-{{day}}-{{slug}}"
//!     fields:
//!       - { name: title, widget: string, required: true }
//!       - { name: date, widget: date }
//! singletons:
//!   - name: site
//!     path: data/site.yml
//!     fields:
//!       - { name: title, required: true }
//! ```
//!
//! A *collection* is a directory whose files (with the collection's
//! extension) are entries of the same shape. A *singleton* is one file.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::fields::{Field, Widget};
use crate::errors::ContentError;

/// Key under which the Markdown body travels in form values.
pub const BODY_FIELD: &str = "body";

const DEFAULT_FILENAME: &str = "{{slug}}";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Markdown body with optional YAML front matter
    #[default]
    Markdown,
    /// Plain YAML data file
    Yaml,
}

impl ContentFormat {
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Yaml => "yml",
        }
    }

    /// Infer the format from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" | "mdx" => Some(Self::Markdown),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Directory holding the entries, relative to the repository root
    pub path: String,
    #[serde(default)]
    pub format: ContentFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Filename template without extension, e.g. `{{year}}-{{slug}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Collection {
    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .unwrap_or_else(|| self.format.default_extension())
    }

    /// True when `path` is an entry of this collection (direct child, matching extension).
    pub fn contains(&self, path: &str) -> bool {
        let Some((dir, file)) = path.rsplit_once('/') else {
            return false;
        };
        dir == self.path
            && file
                .rsplit_once('.')
                .is_some_and(|(stem, ext)| !stem.is_empty() && ext == self.extension())
    }

    /// Build the repository path of a new entry from its values.
    ///
    /// Placeholders: `{{slug}}` (from `slug`, else `title`), `{{year}}`,
    /// `{{month}}`, `{{day}}` (from a `date` value, else `now`), and any
    /// other value name, slugified.
    pub fn entry_path(&self, values: &Mapping, now: DateTime<Utc>) -> Result<String, ContentError> {
        let template = self.filename.as_deref().unwrap_or(DEFAULT_FILENAME);
        let date = values
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_date)
            .unwrap_or_else(|| now.date_naive());

        let mut missing = Vec::new();
        let stem = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            let rendered = match key {
                "year" => Some(format!("{:04}", date.year())),
                "month" => Some(format!("{:02}", date.month())),
                "day" => Some(format!("{:02}", date.day())),
                "slug" => ["slug", "title"]
                    .iter()
                    .find_map(|k| values.get(*k).and_then(scalar_text))
                    .map(|s| slugify(&s)),
                other => values.get(other).and_then(scalar_text).map(|s| slugify(&s)),
            };
            match rendered {
                Some(s) if !s.is_empty() => s,
                _ => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        });

        if !missing.is_empty() {
            return Err(ContentError::InvalidSubmission(format!(
                "filename placeholder(s) without a value: {}",
                missing.join(", ")
            )));
        }
        Ok(format!("{}/{}.{}", self.path, stem, self.extension()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Singleton {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// File path relative to the repository root
    pub path: String,
    /// Inferred from the extension when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ContentFormat>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Singleton {
    pub fn format(&self) -> Option<ContentFormat> {
        self.format.or_else(|| {
            self.path
                .rsplit_once('.')
                .and_then(|(_, ext)| ContentFormat::from_extension(ext))
        })
    }
}

/// The collection or singleton a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContentTarget<'a> {
    Collection(&'a Collection),
    Singleton(&'a Singleton),
}

/// Serializable summary of a [`ContentTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetInfo {
    pub kind: &'static str,
    pub name: String,
    pub format: ContentFormat,
}

impl ContentTarget<'_> {
    pub fn name(&self) -> &str {
        match self {
            Self::Collection(c) => &c.name,
            Self::Singleton(s) => &s.name,
        }
    }

    pub fn format(&self) -> ContentFormat {
        match self {
            Self::Collection(c) => c.format,
            Self::Singleton(s) => s.format().unwrap_or_default(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        match self {
            Self::Collection(c) => &c.fields,
            Self::Singleton(s) => &s.fields,
        }
    }

    pub fn info(&self) -> TargetInfo {
        TargetInfo {
            kind: match self {
                Self::Collection(_) => "collection",
                Self::Singleton(_) => "singleton",
            },
            name: self.name().to_string(),
            format: self.format(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Preferred branch to read from and submit against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub singletons: Vec<Singleton>,
}

impl ContentConfig {
    /// Parse and validate a content config document.
    pub fn parse(yaml: &str) -> Result<Self, ContentError> {
        let mut config: ContentConfig = if yaml.trim().is_empty() {
            ContentConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(ContentError::ConfigParse)?
        };
        config.normalize();

        let problems = config.validate();
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(ContentError::ConfigInvalid(problems))
        }
    }

    fn normalize(&mut self) {
        for c in &mut self.collections {
            c.path = c.path.trim().trim_end_matches('/').to_string();
        }
        for s in &mut self.singletons {
            s.path = s.path.trim().to_string();
        }
    }

    /// Return every problem found; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut names = HashSet::new();

        for c in &self.collections {
            let what = format!("collection '{}'", c.name);
            check_name(&c.name, &mut names, &mut problems);
            check_path(&what, &c.path, &mut problems);
            if c.extension().is_empty() || c.extension().contains('/') {
                problems.push(format!("{}: invalid extension '{}'", what, c.extension()));
            }
            if let Some(ref template) = c.filename
                && (template.contains('/') || template.trim().is_empty())
            {
                problems.push(format!(
                    "{}: filename template must be a non-empty file name",
                    what
                ));
            }
            check_fields(&what, &c.fields, c.format, &mut problems);
        }

        for s in &self.singletons {
            let what = format!("singleton '{}'", s.name);
            check_name(&s.name, &mut names, &mut problems);
            check_path(&what, &s.path, &mut problems);
            if !has_extension(&s.path) {
                problems.push(format!(
                    "{}: path '{}' must name a file with an extension",
                    what, s.path
                ));
            }
            match s.format() {
                Some(format) => check_fields(&what, &s.fields, format, &mut problems),
                None => problems.push(format!(
                    "{}: cannot infer format from '{}'; set `format`",
                    what, s.path
                )),
            }
        }

        let mut paths = HashSet::new();
        for s in &self.singletons {
            if !paths.insert(s.path.as_str()) {
                problems.push(format!("path '{}' is declared by more than one singleton", s.path));
            }
        }

        problems
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn singleton(&self, name: &str) -> Option<&Singleton> {
        self.singletons.iter().find(|s| s.name == name)
    }

    /// Find the collection or singleton a repository path belongs to.
    pub fn resolve(&self, path: &str) -> Option<ContentTarget<'_>> {
        let path = path.trim_start_matches('/');
        if let Some(s) = self.singletons.iter().find(|s| s.path == path) {
            return Some(ContentTarget::Singleton(s));
        }
        self.collections
            .iter()
            .find(|c| c.contains(path))
            .map(ContentTarget::Collection)
    }
}

fn check_name<'a>(name: &'a str, seen: &mut HashSet<&'a str>, problems: &mut Vec<String>) {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !valid {
        problems.push(format!(
            "name '{}' must be lowercase letters, digits, '-' or '_'",
            name
        ));
    }
    if !seen.insert(name) {
        problems.push(format!("name '{}' is declared more than once", name));
    }
}

fn check_path(what: &str, path: &str, problems: &mut Vec<String>) {
    if path.is_empty() {
        problems.push(format!("{}: path is empty", what));
        return;
    }
    if path.starts_with('/') {
        problems.push(format!("{}: path '{}' must be relative", what, path));
    }
    if path.ends_with('/') {
        problems.push(format!("{}: path '{}' must name a file", what, path));
    }
    if path
        .trim_start_matches('/')
        .trim_end_matches('/')
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        problems.push(format!("{}: path '{}' has an invalid segment", what, path));
    }
}

fn check_fields(what: &str, fields: &[Field], format: ContentFormat, problems: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            problems.push(format!("{}: field with empty name", what));
            continue;
        }
        if !seen.insert(field.name.as_str()) {
            problems.push(format!("{}: field '{}' is declared more than once", what, field.name));
        }
        if field.widget == Widget::Select && field.options.is_empty() {
            problems.push(format!("{}: select field '{}' has no options", what, field.name));
        }
        if field.name == BODY_FIELD && format != ContentFormat::Markdown {
            problems.push(format!(
                "{}: field '{}' is reserved for markdown bodies",
                what, BODY_FIELD
            ));
        }
    }
}

/// Last path segment is `stem.ext` with both parts non-empty.
fn has_extension(path: &str) -> bool {
    let file = path.rsplit('/').next().unwrap_or(path);
    matches!(file.rsplit_once('.'), Some((stem, ext)) if !stem.is_empty() && !ext.is_empty())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lowercase ASCII slug: alphanumerics kept, everything else collapses to `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE: &str = r#"
branch: main
collections:
  - name: posts
    label: Blog posts
    path: content/posts/
    filename: "{{year}}-{{month}}-{{day}}-{{slug}}"
    fields:
      - { name: title, widget: string, required: true }
      - { name: date, widget: date }
      - { name: body, widget: markdown }
  - name: authors
    path: data/authors
    format: yaml
    fields:
      - { name: name, required: true }
singletons:
  - name: site
    label: Site settings
    path: data/site.yml
    fields:
      - { name: title, required: true }
  - name: about
    path: content/about.md
"#;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_sample_config() {
        let config = ContentConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.branch.as_deref(), Some("main"));
        assert_eq!(config.collections.len(), 2);
        assert_eq!(config.singletons.len(), 2);
        // Trailing slash normalized away
        assert_eq!(config.collections[0].path, "content/posts");
        assert_eq!(config.collections[1].extension(), "yml");
        assert_eq!(
            config.singleton("site").unwrap().format(),
            Some(ContentFormat::Yaml)
        );
        assert_eq!(
            config.singleton("about").unwrap().format(),
            Some(ContentFormat::Markdown)
        );
    }

    #[test]
    fn empty_document_is_an_empty_config() {
        let config = ContentConfig::parse("  \n").unwrap();
        assert!(config.collections.is_empty());
        assert!(config.singletons.is_empty());
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let err = ContentConfig::parse("collections: [").unwrap_err();
        assert!(matches!(err, ContentError::ConfigParse(_)));
    }

    #[test]
    fn validation_collects_every_problem() {
        let yaml = r#"
collections:
  - name: Posts
    path: /content/posts
    fields:
      - { name: kind, widget: select }
      - { name: kind }
  - name: notes
    path: ../outside
    format: yaml
    fields:
      - { name: body }
singletons:
  - name: notes
    path: data/site.conf
  - name: about
    path: data/about
    format: yaml
"#;
        let Err(ContentError::ConfigInvalid(problems)) = ContentConfig::parse(yaml) else {
            panic!("expected ConfigInvalid");
        };
        let joined = problems.join("\n");
        assert!(joined.contains("name 'Posts' must be lowercase"));
        assert!(joined.contains("path '/content/posts' must be relative"));
        assert!(joined.contains("select field 'kind' has no options"));
        assert!(joined.contains("field 'kind' is declared more than once"));
        assert!(joined.contains("path '../outside' has an invalid segment"));
        assert!(joined.contains("reserved for markdown bodies"));
        assert!(joined.contains("name 'notes' is declared more than once"));
        assert!(joined.contains("cannot infer format"));
        assert!(joined.contains("singleton 'about': path 'data/about' must name a file with an extension"));
        assert!(!joined.contains("'data/site.conf' must name a file"));
    }

    #[test]
    fn resolves_singletons_and_collection_entries() {
        let config = ContentConfig::parse(SAMPLE).unwrap();

        let target = config.resolve("data/site.yml").unwrap();
        assert_eq!(target.info().kind, "singleton");
        assert_eq!(target.name(), "site");

        let target = config.resolve("/content/posts/2024-01-01-hello.md").unwrap();
        assert_eq!(target.name(), "posts");
        assert_eq!(target.format(), ContentFormat::Markdown);
        assert_eq!(target.fields().len(), 3);

        assert_eq!(config.resolve("data/authors/jane.yml").unwrap().name(), "authors");
    }

    #[test]
    fn resolve_rejects_nested_wrong_extension_and_unknown() {
        let config = ContentConfig::parse(SAMPLE).unwrap();
        assert!(config.resolve("content/posts/drafts/a.md").is_none());
        assert!(config.resolve("content/posts/image.png").is_none());
        assert!(config.resolve("content/posts/.md").is_none());
        assert!(config.resolve("README.md").is_none());
    }

    #[test]
    fn entry_path_uses_date_value_and_title_slug() {
        let config = ContentConfig::parse(SAMPLE).unwrap();
        let posts = config.collection("posts").unwrap();
        let path = posts
            .entry_path(&mapping("title: Hello, World!\ndate: 2024-12-31"), now())
            .unwrap();
        assert_eq!(path, "content/posts/2024-12-31-hello-world.md");
    }

    #[test]
    fn entry_path_falls_back_to_now_and_prefers_slug() {
        let config = ContentConfig::parse(SAMPLE).unwrap();
        let posts = config.collection("posts").unwrap();
        let path = posts
            .entry_path(&mapping("title: Ignored\nslug: Custom Slug"), now())
            .unwrap();
        assert_eq!(path, "content/posts/2025-03-07-custom-slug.md");
    }

    #[test]
    fn entry_path_default_template_and_missing_values() {
        let config = ContentConfig::parse(SAMPLE).unwrap();
        let authors = config.collection("authors").unwrap();
        let err = authors.entry_path(&mapping("name: Jane"), now()).unwrap_err();
        assert!(err.to_string().contains("slug"));

        let path = authors.entry_path(&mapping("slug: jane-doe"), now()).unwrap();
        assert_eq!(path, "data/authors/jane-doe.yml");
    }

    #[test]
    fn entry_path_renders_arbitrary_fields() {
        let collection = Collection {
            name: "docs".into(),
            label: None,
            path: "docs".into(),
            format: ContentFormat::Markdown,
            extension: Some(".mdx".into()),
            filename: Some("{{ section }}-{{slug}}".into()),
            fields: vec![],
        };
        let path = collection
            .entry_path(&mapping("section: Getting Started\ntitle: Install"), now())
            .unwrap();
        assert_eq!(path, "docs/getting-started-install.mdx");
    }

    #[test]
    fn slugify_collapses_and_trims() {
        assert_eq!(slugify("  Hello,   World!  "), "hello-world");
        assert_eq!(slugify("Rust 2024 edition"), "rust-2024-edition");
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
        assert_eq!(slugify("---"), "");
    }
}
