//! Gemini `generateContent` client used as the summarization service.

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::models::{Confidence, MeetingRef, ThemeFinding};
use crate::ports::{QuestionService, SummarizationService};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Instructions wrapped around every batch of notes.
const THEME_PROMPT: &str = r#"You are an assistant analyzing meeting notes for recurring workplace themes.

Identify the topics, concerns, initiatives, decisions and blockers that come up
in the meetings below. Prefer themes that appear in more than one meeting.

For each theme, output one JSON object on its own line in exactly this format:
{"theme": "Short theme label", "confidence": "low|medium|high", "meetings": [{"title": "Meeting title", "date": "YYYY-MM-DD"}]}

Use the meeting titles and dates exactly as given in the MEETING and DATE lines.
Only output JSON, no other text."#;

const QUESTION_PROMPT: &str = r#"You are an assistant answering questions about the user's meeting notes.

Answer the question using the meeting notes below. Be specific and cite the
meetings (title and date) your answer draws on. If the notes cannot fully
answer the question, say what information is missing."#;

pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_seconds: u64,
    profile: Option<String>,
}

impl GeminiClient {
    /// Build a client from validated model settings.
    pub fn new(config: &ModelConfig, profile: Option<String>) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(crate::error::ConfigError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.name.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
            profile,
        })
    }

    fn push_context(&self, prompt: &mut String, notes: &str) {
        if let Some(ref profile) = self.profile {
            prompt.push_str("\n\n=== CONTEXT ABOUT THE USER ===\n");
            prompt.push_str(profile.trim());
        }
        prompt.push_str("\n\n=== MEETING NOTES ===\n\n");
        prompt.push_str(notes);
        prompt.push_str("\n=== END OF NOTES ===\n\n");
    }

    fn build_prompt(&self, notes: &str) -> String {
        let mut prompt = String::from(THEME_PROMPT);
        self.push_context(&mut prompt, notes);
        prompt.push_str("Now output the themes as JSON (one per line):");
        prompt
    }

    fn build_question_prompt(&self, question: &str, notes: &str) -> String {
        let mut prompt = String::from(QUESTION_PROMPT);
        self.push_context(&mut prompt, notes);
        prompt.push_str("QUESTION: ");
        prompt.push_str(question.trim());
        prompt
    }

    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens,
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::AnalysisUnavailable(format!(
                        "Request timed out after {}s",
                        self.timeout_seconds
                    ))
                } else if e.is_connect() {
                    AppError::AnalysisUnavailable(format!(
                        "Cannot connect to Gemini at {}",
                        self.api_base
                    ))
                } else {
                    AppError::AnalysisUnavailable(format!("Failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AnalysisUnavailable(format!(
                "Gemini API error {}: {}",
                status, body
            )));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            AppError::AnalysisUnavailable(format!("Failed to parse Gemini response: {}", e))
        })?;

        body.text().ok_or_else(|| {
            let reason = body
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates returned".to_string());
            AppError::AnalysisUnavailable(format!("Gemini returned no text: {}", reason))
        })
    }
}

#[async_trait]
impl SummarizationService for GeminiClient {
    async fn summarize(&self, text: &str, max_output_tokens: u32) -> Result<Vec<ThemeFinding>> {
        let prompt = self.build_prompt(text);
        debug!("Sending {} chars to {}", prompt.len(), self.model);

        let output = self.generate(&prompt, max_output_tokens).await?;
        parse_findings(&output).map_err(AppError::AnalysisUnavailable)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl QuestionService for GeminiClient {
    async fn answer(&self, question: &str, text: &str, max_output_tokens: u32) -> Result<String> {
        let prompt = self.build_question_prompt(question, text);
        debug!("Asking {} over {} chars", self.model, prompt.len());

        let output = self.generate(&prompt, max_output_tokens).await?;
        Ok(output.trim().to_string())
    }
}

/// Parse model output: JSON lines or a single JSON array, optionally inside
/// a code fence. Lines that aren't findings are skipped; output with no
/// findings at all is malformed unless it is an explicit empty array.
pub fn parse_findings(output: &str) -> std::result::Result<Vec<ThemeFinding>, String> {
    let trimmed = strip_code_fence(output.trim());

    if trimmed.starts_with('[') {
        let raw: Vec<RawFinding> = serde_json::from_str(trimmed)
            .map_err(|e| format!("malformed theme array: {}", e))?;
        return Ok(raw.into_iter().map(RawFinding::into_finding).collect());
    }

    let findings: Vec<ThemeFinding> = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<RawFinding>(line) {
            Ok(raw) => Some(raw.into_finding()),
            Err(e) => {
                debug!("Skipping unparseable line: {}", e);
                None
            }
        })
        .collect();

    if findings.is_empty() {
        return Err("model output contained no theme findings".to_string());
    }
    Ok(findings)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(alias = "label", alias = "theme_label")]
    theme: String,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    meetings: Vec<RawMeeting>,
}

#[derive(Debug, Deserialize)]
struct RawMeeting {
    title: String,
    date: String,
}

impl RawFinding {
    fn into_finding(self) -> ThemeFinding {
        let supporting_meetings = self
            .meetings
            .into_iter()
            .filter_map(|m| {
                let date = NaiveDate::parse_from_str(m.date.trim(), "%Y-%m-%d").ok()?;
                Some(MeetingRef {
                    date,
                    title: m.title,
                })
            })
            .collect();

        ThemeFinding {
            theme_label: self.theme,
            supporting_meetings,
            confidence: self
                .confidence
                .as_deref()
                .map(Confidence::from)
                .unwrap_or(Confidence::Medium),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}
