//! Content model: what in a repository is editable, and how files look.
//!
//! | Module     | Responsibility                                              |
//! |------------|-------------------------------------------------------------|
//! | `config`   | `ContentConfig` YAML: collections, singletons, path resolve |
//! | `fields`   | `Field`/`Widget` declarations and value validation          |
//! | `document` | Markdown front matter and YAML data files                   |

pub mod config;
pub mod document;
pub mod fields;

pub use config::{Collection, ContentConfig, ContentFormat, ContentTarget, Singleton, slugify};
pub use document::Document;
pub use fields::{Field, FieldError, Widget, apply_defaults, validate_values};
