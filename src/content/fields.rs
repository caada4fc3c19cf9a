use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Form widget for a field. Determines which YAML value types are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Widget {
    #[default]
    String,
    Text,
    Markdown,
    Number,
    Boolean,
    Date,
    List,
    Select,
    Object,
}

impl Widget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::List => "list",
            Self::Select => "select",
            Self::Object => "object",
        }
    }

    fn is_textual(&self) -> bool {
        matches!(self, Self::String | Self::Text | Self::Markdown)
    }
}

/// One editable field of a collection entry or singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values for `select` widgets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A single problem with a submitted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Sequence(seq)) => seq.is_empty(),
        _ => false,
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
fn is_date(s: &str) -> bool {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

fn check_type(field: &Field, value: &Value) -> Option<String> {
    let ok = match field.widget {
        w if w.is_textual() => value.is_string(),
        Widget::Number => value.is_number(),
        Widget::Boolean => value.is_bool(),
        Widget::Date => value.as_str().is_some_and(is_date),
        Widget::List => value.is_sequence(),
        Widget::Object => value.is_mapping(),
        Widget::Select => {
            return match value.as_str() {
                Some(s) if field.options.iter().any(|o| o == s) => None,
                Some(s) => Some(format!(
                    "'{}' is not one of: {}",
                    s,
                    field.options.join(", ")
                )),
                None => Some("expected one of the listed options".to_string()),
            };
        }
        _ => true,
    };
    if ok {
        None
    } else if field.widget == Widget::Date {
        Some("expected a date (YYYY-MM-DD or RFC 3339)".to_string())
    } else {
        Some(format!("expected a {} value", field.widget.as_str()))
    }
}

/// Check `values` against the declared fields. Keys without a declaration are
/// left alone so unknown front matter survives an edit.
pub fn validate_values(fields: &[Field], values: &Mapping) -> Vec<FieldError> {
    let mut errors = Vec::new();
    for field in fields {
        let value = values.get(field.name.as_str());
        if is_blank(value) {
            if field.required {
                errors.push(FieldError::new(&field.name, "is required"));
            }
            continue;
        }
        if let Some(value) = value
            && let Some(message) = check_type(field, value)
        {
            errors.push(FieldError::new(&field.name, message));
        }
    }
    errors
}

/// Fill missing values from field defaults.
pub fn apply_defaults(fields: &[Field], values: &mut Mapping) {
    for field in fields {
        if let Some(ref default) = field.default
            && values.get(field.name.as_str()).is_none()
        {
            values.insert(Value::String(field.name.clone()), default.clone());
        }
    }
}
