use std::time::{Duration, Instant};

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use super::{Expert, ExpertProfile, ExpertQuery};
use crate::config::ExpertEndpoint;
use crate::domain::expert::{heuristic_confidence, ExpertResponse, TokenUsage};
use crate::error::ExpertError;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

const STALL_TIMEOUT: Duration = Duration::from_secs(60);
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(60);
const HEADERS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

enum ParsedChunk {
    Text(String),
    Done,
    Skip,
}

fn parse_event(data: &str) -> ParsedChunk {
    if data.trim() == "[DONE]" {
        return ParsedChunk::Done;
    }
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return ParsedChunk::Skip;
    };
    let Some(choice) = chunk.choices.first() else {
        return ParsedChunk::Skip;
    };
    match &choice.delta.content {
        Some(text) if !text.is_empty() => ParsedChunk::Text(text.clone()),
        _ => ParsedChunk::Skip,
    }
}

/// One expert (or the moderator's backing call), speaking an OpenAI-compatible
/// chat-completions SSE protocol against a fixed endpoint (spec §4.1).
///
/// Generalizes `squall::dispatch::http::HttpDispatch`: same deadline-race /
/// stall-timeout / capped-body shape, narrowed to a single API format since
/// every expert here is OpenAI-compatible.
pub struct HttpExpert {
    client: Client,
    endpoint: ExpertEndpoint,
    profile: ExpertProfile,
    confidence_floor: f64,
    confidence_ceiling: f64,
}

impl HttpExpert {
    pub fn new(client: Client, endpoint: ExpertEndpoint, confidence_floor: f64, confidence_ceiling: f64) -> Self {
        let profile = ExpertProfile {
            name: endpoint.name,
            specialty: endpoint.provider.clone(),
            persona_blurb: endpoint.persona_blurb.clone(),
        };
        Self {
            client,
            endpoint,
            profile,
            confidence_floor,
            confidence_ceiling,
        }
    }

    fn build_prompt(&self, query: &ExpertQuery) -> String {
        let mut prompt = String::new();
        if !query.issue_context.is_empty() {
            prompt.push_str(&format!("Known issue context: {}\n\n", query.issue_context));
        }
        if !query.retrieved_snippets.is_empty() {
            prompt.push_str("Relevant reference material:\n");
            for snippet in &query.retrieved_snippets {
                prompt.push_str(&format!("- {snippet}\n"));
            }
            prompt.push('\n');
        }
        if let Some(digest) = &query.history_digest {
            prompt.push_str(&format!("Conversation so far: {digest}\n\n"));
        }
        prompt.push_str(&query.question);
        prompt
    }

    async fn stream_body_capped(
        response: &mut reqwest::Response,
        max_bytes: usize,
    ) -> Vec<u8> {
        let mut body = Vec::with_capacity(max_bytes.min(64 * 1024));
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let remaining = (max_bytes + 1).saturating_sub(body.len());
                    let to_copy = chunk.len().min(remaining);
                    body.extend_from_slice(&chunk[..to_copy]);
                    if body.len() > max_bytes {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        body
    }
}

#[async_trait::async_trait]
impl Expert for HttpExpert {
    fn profile(&self) -> &ExpertProfile {
        &self.profile
    }

    async fn answer(&self, query: ExpertQuery) -> Result<ExpertResponse, ExpertError> {
        let start = Instant::now();
        let provider = self.endpoint.provider.clone();

        let remaining = query
            .deadline
            .checked_duration_since(Instant::now())
            .filter(|d| *d > Duration::from_millis(100))
            .ok_or_else(|| ExpertError::Timeout {
                provider: provider.clone(),
            })?;

        let prompt = self.build_prompt(&query);
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.endpoint.persona_prompt,
        })];
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.endpoint.model_id,
            "messages": messages,
            "stream": true,
            "temperature": self.endpoint.temperature,
            "max_tokens": self.endpoint.max_tokens,
        });

        let headers_timeout = remaining.min(HEADERS_TIMEOUT);
        let send_future = self
            .client
            .post(&self.endpoint.base_url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send();

        let mut response = tokio::time::timeout(headers_timeout, send_future)
            .await
            .map_err(|_| ExpertError::Timeout {
                provider: provider.clone(),
            })?
            .map_err(|e| ExpertError::TransportError {
                provider: provider.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ExpertError::RateLimit { provider });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ExpertError::AuthError {
                provider,
                message: format!("{status}"),
            });
        }
        if !status.is_success() {
            let body_timeout = query
                .deadline
                .checked_duration_since(Instant::now())
                .unwrap_or(Duration::from_secs(5))
                .min(Duration::from_secs(5));
            let error_body = tokio::time::timeout(
                body_timeout,
                Self::stream_body_capped(&mut response, MAX_RESPONSE_BYTES),
            )
            .await
            .unwrap_or_default();
            let text = String::from_utf8_lossy(&error_body);
            let truncated: String = text.chars().take(300).collect();
            return Err(ExpertError::BadRequest {
                provider,
                message: format!("{status}: {truncated}"),
            });
        }

        let text = self
            .read_stream(response, &query, &provider, remaining)
            .await?;

        if text.is_empty() {
            return Err(ExpertError::EmptyResponse { provider });
        }

        let confidence = heuristic_confidence(
            self.endpoint.base_confidence,
            text.len(),
            self.confidence_floor,
            self.confidence_ceiling,
        );
        Ok(ExpertResponse {
            name: self.endpoint.name,
            specialty: self.profile.specialty.clone(),
            reply: text,
            confidence,
            usage: TokenUsage::default(),
            elapsed: start.elapsed(),
            model_id: self.endpoint.model_id.clone(),
        })
    }
}

impl HttpExpert {
    /// Consumes the SSE stream, racing generation deadline, stall timeout,
    /// first-byte timeout, and cooperative cancellation (spec §4.5,
    /// `squall::dispatch::http::read_sse_stream`).
    async fn read_stream(
        &self,
        response: reqwest::Response,
        query: &ExpertQuery,
        provider: &str,
        remaining: Duration,
    ) -> Result<String, ExpertError> {
        let mut stream = response.bytes_stream().eventsource();
        let mut accumulated = String::new();

        let generation_deadline = tokio::time::Instant::now() + remaining;
        let first_byte_deadline = tokio::time::Instant::now() + FIRST_BYTE_TIMEOUT.min(remaining);

        let cancel = query.cancellation_token.clone();
        let cancel_fut = async {
            match &cancel {
                Some(t) => t.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancel_fut);

        let mut received_first = false;
        let mut last_chunk_at = tokio::time::Instant::now();
        let initial_deadline = generation_deadline.min(first_byte_deadline);
        let deadline_sleep = tokio::time::sleep_until(initial_deadline);
        tokio::pin!(deadline_sleep);

        loop {
            let effective_deadline = if received_first {
                generation_deadline.min(last_chunk_at + STALL_TIMEOUT)
            } else {
                generation_deadline.min(first_byte_deadline)
            };
            deadline_sleep.as_mut().reset(effective_deadline);

            tokio::select! {
                _ = &mut cancel_fut => {
                    if accumulated.is_empty() {
                        return Err(ExpertError::Timeout { provider: provider.to_string() });
                    }
                    return Ok(accumulated);
                }
                _ = &mut deadline_sleep => {
                    if accumulated.is_empty() {
                        return Err(ExpertError::Timeout { provider: provider.to_string() });
                    }
                    return Ok(accumulated);
                }
                event = stream.next() => match event {
                    Some(Ok(ev)) => match parse_event(&ev.data) {
                        ParsedChunk::Done => break,
                        ParsedChunk::Text(text) => {
                            received_first = true;
                            last_chunk_at = tokio::time::Instant::now();
                            if accumulated.len() + text.len() > MAX_RESPONSE_BYTES {
                                return Err(ExpertError::TransportError {
                                    provider: provider.to_string(),
                                    message: "response exceeded size cap".to_string(),
                                });
                            }
                            accumulated.push_str(&text);
                        }
                        ParsedChunk::Skip => {
                            received_first = true;
                            last_chunk_at = tokio::time::Instant::now();
                        }
                    },
                    Some(Err(_)) => {
                        if accumulated.is_empty() {
                            return Err(ExpertError::TransportError {
                                provider: provider.to_string(),
                                message: "SSE stream error".to_string(),
                            });
                        }
                        return Ok(accumulated);
                    }
                    None => break,
                },
            }
        }

        Ok(accumulated)
    }
}
