use serde_json::Value;

/// Only the first five articles of a response are considered.
pub const MAX_HEADLINES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlineResult {
    Headlines(Vec<String>),
    /// The provider answered with an error envelope; carries its message.
    ApiError(String),
}

impl HeadlineResult {
    /// Text handed to the summary prompt and shown to the user. An empty
    /// article list renders as an empty string.
    pub fn render(&self) -> String {
        match self {
            Self::Headlines(titles) => titles
                .iter()
                .map(|title| format!("- {title}"))
                .collect::<Vec<String>>()
                .join("\n"),
            Self::ApiError(message) => format!("API Error: {message}"),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Headlines(_))
    }
}

/// Reads a `top-headlines` response body. Articles past the fifth are ignored
/// before title-less entries are dropped, so fewer than five lines may remain.
pub fn parse_headline_envelope(payload: &Value) -> HeadlineResult {
    if payload.get("status").and_then(Value::as_str) != Some("ok") {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .unwrap_or("Unknown error");
        return HeadlineResult::ApiError(message.to_string());
    }
    let titles = payload
        .get("articles")
        .and_then(Value::as_array)
        .map(|articles| {
            articles
                .iter()
                .take(MAX_HEADLINES)
                .filter_map(|article| article.get("title").and_then(Value::as_str))
                .filter(|title| !title.is_empty())
                .map(str::to_string)
                .collect::<Vec<String>>()
        })
        .unwrap_or_default();
    HeadlineResult::Headlines(titles)
}

/// Rendering used when the request itself failed (transport, decoding).
pub fn headline_failure_text(error: impl std::fmt::Display) -> String {
    format!("Error occurred: {error}")
}
