//! Offline stand-ins for the generation and headline APIs. Deterministic, so
//! they double as fixtures.

use anyhow::Result;
use chatdesk_contracts::news::{HeadlineResult, DEFAULT_CATEGORY, DEFAULT_COUNTRY};
use serde_json::json;

use crate::{GenerateRequest, HeadlineSource, TextProvider, TextStream};

const COUNTRY_HINTS: &[(&str, &str)] = &[
    ("germany", "de"),
    ("france", "fr"),
    ("japan", "jp"),
    ("india", "in"),
    ("canada", "ca"),
    ("australia", "au"),
    ("britain", "gb"),
    ("united kingdom", "gb"),
    ("uk", "gb"),
    ("italy", "it"),
    ("brazil", "br"),
];

const CATEGORIES: &[&str] = &[
    "business",
    "entertainment",
    "health",
    "science",
    "sports",
    "technology",
];

pub struct DryrunProvider;

impl DryrunProvider {
    fn reply_for(&self, request: &GenerateRequest) -> String {
        let prompt = request.prompt.as_str();
        if prompt.starts_with("Extract the country and category") {
            let user_request = prompt
                .rsplit_once("User Request:")
                .map(|(_, tail)| tail)
                .unwrap_or(prompt);
            return dryrun_extraction(user_request);
        }
        if prompt.starts_with("Break the user's latest request") {
            return "1. Restate the request.\n2. Answer it directly.".to_string();
        }
        if prompt.starts_with("The user asked for news") {
            let count = prompt.lines().filter(|line| line.starts_with("- ")).count();
            return format!("[dryrun:{}] Summary of {count} headline(s).", request.model);
        }
        let last_user = prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("User: "))
            .unwrap_or(prompt)
            .trim();
        let image_note = if request.image.is_some() {
            " (with image)"
        } else {
            ""
        };
        format!("[dryrun:{}] You said: {last_user}{image_note}", request.model)
    }
}

impl TextProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<String> {
        Ok(self.reply_for(request))
    }

    fn generate_stream(&self, request: &GenerateRequest) -> Result<TextStream> {
        let fragments = self
            .reply_for(request)
            .split_inclusive(' ')
            .map(|fragment| Ok(fragment.to_string()))
            .collect::<Vec<Result<String>>>();
        Ok(Box::new(fragments.into_iter()))
    }
}

fn dryrun_extraction(user_request: &str) -> String {
    let lowered = user_request.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let country = COUNTRY_HINTS
        .iter()
        .find(|(name, _)| {
            if name.contains(' ') {
                lowered.contains(name)
            } else {
                words.contains(name)
            }
        })
        .map(|(_, code)| *code)
        .unwrap_or(DEFAULT_COUNTRY);
    let category = CATEGORIES
        .iter()
        .find(|category| words.iter().any(|word| word.starts_with(*category)))
        .copied()
        .unwrap_or(DEFAULT_CATEGORY);
    json!({ "country": country, "category": category }).to_string()
}

pub struct DryrunHeadlines;

impl HeadlineSource for DryrunHeadlines {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn fetch(&self, country: &str, category: &str) -> Result<HeadlineResult> {
        let country = country.to_uppercase();
        Ok(HeadlineResult::Headlines(
            (1..=3)
                .map(|idx| format!("Sample {category} headline {idx} ({country})"))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chatdesk_contracts::chat::prompts::news_extraction_prompt;
    use chatdesk_contracts::news::parse_news_query;

    use super::{DryrunHeadlines, DryrunProvider};
    use crate::{GenerateRequest, HeadlineSource, TextProvider};

    fn request(prompt: String) -> GenerateRequest {
        GenerateRequest {
            model: "dryrun-text-1".to_string(),
            prompt,
            image: None,
            temperature: 0.7,
            max_output_tokens: 512,
        }
    }

    #[test]
    fn extraction_reply_is_parseable() -> anyhow::Result<()> {
        let reply = DryrunProvider.generate(&request(news_extraction_prompt(
            "Tell me today's top headlines for Germany, sports",
        )))?;
        let extraction = parse_news_query(&reply);
        assert_eq!(extraction.query.country, "de");
        assert_eq!(extraction.query.category, "sports");
        Ok(())
    }

    #[test]
    fn stream_concatenates_to_full_reply() -> anyhow::Result<()> {
        let req = request("User: hello there\nAssistant:".to_string());
        let full = DryrunProvider.generate(&req)?;
        let streamed = DryrunProvider
            .generate_stream(&req)?
            .collect::<anyhow::Result<Vec<String>>>()?;
        assert!(streamed.len() > 1);
        assert_eq!(streamed.concat(), full);
        assert_eq!(full, "[dryrun:dryrun-text-1] You said: hello there");
        Ok(())
    }

    #[test]
    fn dryrun_headlines_echo_query() -> anyhow::Result<()> {
        let result = DryrunHeadlines.fetch("fr", "science")?;
        assert_eq!(
            result.render().lines().next(),
            Some("- Sample science headline 1 (FR)")
        );
        Ok(())
    }
}
