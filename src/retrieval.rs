/*
 * @file retrieval.rs
 * @brief Web lookup for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Web lookup for questions the model cannot answer from static knowledge.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Passed to the model when the lookup found nothing usable.
pub const NOTHING_FOUND: &str = "Nenhuma informação útil foi encontrada na web.";

/// Default instant-answer endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://api.duckduckgo.com/";

/// Longest snippet handed to the model, in characters.
const MAX_SNIPPET_CHARS: usize = 600;

/// Words that suggest the answer depends on current events.
const TOPICAL_KEYWORDS: &[&str] = &[
    "hoje",
    "agora",
    "atual",
    "atualmente",
    "notícia",
    "notícias",
    "previsão",
    "today",
    "now",
    "news",
    "forecast",
];

/// Topicality heuristic: does `utterance` ask about something time-sensitive?
///
/// Matches whole words, so "know" does not trigger on "now".
pub fn needs_retrieval(utterance: &str) -> bool {
    utterance
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| TOPICAL_KEYWORDS.contains(&word))
}

/// Source of short context snippets.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns a snippet for `query`, or `None` when nothing useful was found.
    async fn lookup(&self, query: &str) -> Option<String>;
}

/// Runs `retriever`, substituting [`NOTHING_FOUND`] for an empty result.
pub async fn retrieve_or_sentinel(retriever: &dyn Retriever, query: &str) -> String {
    match retriever.lookup(query).await {
        Some(snippet) => snippet,
        None => NOTHING_FOUND.to_string(),
    }
}

/// [`Retriever`] backed by the DuckDuckGo instant-answer API.
pub struct WebRetriever {
    client: reqwest::Client,
    endpoint: String,
}

impl WebRetriever {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch(&self, query: &str) -> Result<Value> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;
        // The API labels JSON as javascript; decode the bytes ourselves.
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Retriever for WebRetriever {
    async fn lookup(&self, query: &str) -> Option<String> {
        match self.fetch(query).await {
            Ok(body) => {
                let snippet = best_snippet(&body);
                if snippet.is_none() {
                    tracing::debug!(query, "web lookup found nothing");
                }
                snippet
            }
            Err(err) => {
                tracing::warn!(error = %err, "web lookup failed");
                None
            }
        }
    }
}

/// Picks the most direct non-empty text from an instant-answer payload.
fn best_snippet(body: &Value) -> Option<String> {
    let related = body["RelatedTopics"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|topic| topic["Text"].as_str());
    [body["AbstractText"].as_str(), body["Answer"].as_str()]
        .into_iter()
        .flatten()
        .chain(related)
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(|text| text.chars().take(MAX_SNIPPET_CHARS).collect())
}
