use serde_json::Value;

pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsQuery {
    pub country: String,
    pub category: String,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// Result of reading the model's extraction reply. `warning` is set when the
/// reply had a JSON-looking object that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub query: NewsQuery,
    pub warning: Option<String>,
}

impl Extraction {
    pub fn defaulted(error: impl std::fmt::Display) -> Self {
        Self {
            query: NewsQuery::default(),
            warning: Some(defaulting_warning(error)),
        }
    }
}

pub fn defaulting_warning(error: impl std::fmt::Display) -> String {
    format!("Defaulting to US/general. Error: {error}")
}

/// Shortest `{ ... }` span starting at the first `{`. Nested objects are cut at
/// their first closing brace and then fail to parse.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text[start..].find('}')?;
    Some(&text[start..=start + end])
}

pub fn parse_news_query(reply: &str) -> Extraction {
    let Some(candidate) = first_json_object(reply) else {
        return Extraction {
            query: NewsQuery::default(),
            warning: None,
        };
    };
    let parsed = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(err) => return Extraction::defaulted(err),
    };
    Extraction {
        query: NewsQuery {
            country: field_or(&parsed, "country", DEFAULT_COUNTRY),
            category: field_or(&parsed, "category", DEFAULT_CATEGORY),
        },
        warning: None,
    }
}

fn field_or(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| default.to_string())
}
