//! LLM-backed collaborators
//!
//! [`LlmSummarizer`] and [`LlmClusterer`] adapt a raw completion client to the
//! pipeline's [`Summarizer`] and [`TopicClusterer`] seams. Any [`LlmClient`]
//! works, which keeps prompt handling testable without a network.

mod client;

pub use client::HttpLlmClient;

use crate::aggregate::{BatchEntry, TopicAssignment, TopicClusterer};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::summarize::{truncate_chars, Summarizer};
use crate::types::{Period, Topic};
use serde::Deserialize;

const SUMMARIZE_PROMPT: &str = "You summarize personal notes for a weekly progress log. Reply with two or three plain sentences describing what the note is about and what changed. No preamble, no Markdown headings.";

const CLUSTER_PROMPT: &str = "You group note summaries into recurring themes. Return strict JSON of the form {\"topics\":[{\"label\":\"short theme name\",\"members\":[\"note identity\", ...]}]}. Use the identities exactly as given. Put every identity in exactly one topic.";

const RENDER_PROMPT: &str = "You write a concise weekly progress report in Markdown from grouped note summaries. Start with a short overview paragraph, then one bullet per topic describing progress. Do not invent work that is not in the summaries.";

/// Raw completion interface.
pub trait LlmClient: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Create the default HTTP-backed client.
pub fn create_client(llm: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    Ok(Box::new(HttpLlmClient::new(llm)?))
}

/// Summarizer that asks the LLM for a short prose summary.
pub struct LlmSummarizer {
    client: Box<dyn LlmClient>,
}

impl LlmSummarizer {
    pub fn new(client: Box<dyn LlmClient>) -> Self {
        Self { client }
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize(&self, text: &str, context: Option<&str>) -> Result<String> {
        let prompt = match context {
            Some(context) => format!("Note: {context}\n\n{text}"),
            None => text.to_string(),
        };
        self.client.complete(SUMMARIZE_PROMPT, &prompt)
    }
}

/// Topic clustering and report narration through the LLM.
pub struct LlmClusterer {
    client: Box<dyn LlmClient>,
    /// Upper bound on the render prompt body
    max_prompt_chars: usize,
}

impl LlmClusterer {
    pub fn new(client: Box<dyn LlmClient>, max_prompt_chars: usize) -> Self {
        Self {
            client,
            max_prompt_chars,
        }
    }
}

impl TopicClusterer for LlmClusterer {
    fn aggregate_topics(&self, batch: &[BatchEntry]) -> Result<Vec<TopicAssignment>> {
        let mut prompt = String::from("Summaries (identity | timestamp | summary):\n");
        for entry in batch {
            prompt.push_str(&entry.to_line());
            prompt.push('\n');
        }
        let raw = self.client.complete(CLUSTER_PROMPT, &prompt)?;
        parse_topics(&raw)
    }

    fn render_report(&self, topics: &[Topic], period: &Period) -> Result<String> {
        let mut body = String::new();
        for topic in topics {
            body.push_str(&format!("## {}\n", topic.label));
            for record in &topic.records {
                body.push_str(&format!(
                    "- {} ({}): {}\n",
                    record.identity,
                    record.created_at.format("%Y-%m-%d"),
                    record.summary.replace('\n', " ")
                ));
            }
            body.push('\n');
        }
        let body = truncate_chars(&body, self.max_prompt_chars);
        let prompt = format!("Report period: {period}\n\n{body}");
        self.client.complete(RENDER_PROMPT, &prompt)
    }
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    topics: Vec<TopicAssignment>,
}

/// Parse the clustering response, tolerating prose or code fences around the JSON.
fn parse_topics(raw: &str) -> Result<Vec<TopicAssignment>> {
    let parsed = match serde_json::from_str::<TopicsResponse>(raw) {
        Ok(value) => value,
        Err(_) => {
            let extracted = extract_json_object(raw)?;
            serde_json::from_str::<TopicsResponse>(&extracted)
                .map_err(|e| Error::Llm(format!("topic response is not valid JSON: {e}")))?
        }
    };
    Ok(parsed.topics)
}

fn extract_json_object(raw: &str) -> Result<String> {
    let start = raw
        .find('{')
        .ok_or_else(|| Error::Llm("topic response did not contain JSON object".to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| Error::Llm("topic response did not contain JSON object".to_string()))?;
    if end <= start {
        return Err(Error::Llm(
            "topic response JSON bounds are invalid".to_string(),
        ));
    }
    Ok(raw[start..=end].to_string())
}
