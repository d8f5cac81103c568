mod extraction;
mod headlines;

pub use extraction::{
    defaulting_warning, first_json_object, parse_news_query, Extraction, NewsQuery,
    DEFAULT_CATEGORY, DEFAULT_COUNTRY,
};
pub use headlines::{headline_failure_text, parse_headline_envelope, HeadlineResult, MAX_HEADLINES};
