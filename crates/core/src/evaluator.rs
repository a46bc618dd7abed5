//! Evaluation Service
//!
//! Builds the evaluation prompt from a transcript and asks a chat model for a
//! report in the fixed section format the parser understands.

use crate::{
    evaluation::{EvaluationRecord, parse_evaluation},
    transcript::{Role, Turn},
};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// The template shipped with the repository, for callers that do not load a
/// prompts directory.
pub const DEFAULT_EVALUATION_TEMPLATE: &str = include_str!("../../../prompts/evaluation.md");

/// Key of the evaluation template in a prompts map.
pub const EVALUATION_PROMPT_KEY: &str = "evaluation";

const EVALUATION_TEMPERATURE: f32 = 0.7;

/// Fills the evaluation template with the transcript.
///
/// Student turns are labelled `학생`, assistant turns `AI 선생님`; system turns
/// are not part of the discussion and are left out.
pub fn build_evaluation_prompt(template: &str, turns: &[Turn]) -> String {
    let conversation = turns
        .iter()
        .filter_map(|turn| match turn.role {
            Role::User => Some(format!("학생: {}", turn.content)),
            Role::Assistant => Some(format!("AI 선생님: {}", turn.content)),
            Role::System => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    let student_count = turns.iter().filter(|t| t.role == Role::User).count();
    let teacher_count = turns.iter().filter(|t| t.role == Role::Assistant).count();

    template
        .replace("{student_count}", &student_count.to_string())
        .replace("{teacher_count}", &teacher_count.to_string())
        .replace("{conversation}", &conversation)
}

/// A raw report together with its parsed form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub raw: String,
    pub record: EvaluationRecord,
}

/// Defines the contract for any service that can write an evaluation report.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvaluationService: Send + Sync {
    /// Returns the free-text report for the given conversation.
    async fn evaluate(&self, turns: &[Turn]) -> Result<String>;
}

/// Requests a report and parses it.
pub async fn run_evaluation(service: &dyn EvaluationService, turns: &[Turn]) -> Result<Evaluation> {
    let raw = service.evaluate(turns).await?;
    let record = parse_evaluation(&raw);
    info!(
        categories = record.entries.len(),
        average = ?record.average_score(),
        "Evaluation parsed"
    );
    Ok(Evaluation { raw, record })
}

/// An `EvaluationService` backed by an OpenAI-compatible chat completion API.
pub struct LLMEvaluationService {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: HashMap<String, String>,
}

impl LLMEvaluationService {
    /// # Arguments
    ///
    /// * `config` - OpenAI API configuration (API key, base URL, etc.).
    /// * `model` - Model identifier to use for the report (e.g., "gpt-4o").
    /// * `prompts` - A map of template strings, which must include a key
    ///   for `"evaluation"`.
    pub fn new(config: OpenAIConfig, model: String, prompts: HashMap<String, String>) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            prompts,
        }
    }
}

#[async_trait]
impl EvaluationService for LLMEvaluationService {
    async fn evaluate(&self, turns: &[Turn]) -> Result<String> {
        let template = self
            .prompts
            .get(EVALUATION_PROMPT_KEY)
            .context("Missing prompt template: 'evaluation'")?;
        let prompt = build_evaluation_prompt(template, turns);
        debug!(%prompt, "Evaluation prompt built");

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(EVALUATION_TEMPERATURE)
            .messages(vec![
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let report = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;
        Ok(report)
    }
}

/// Returns the same well-formed report for every conversation.
///
/// Useful for running the front-ends without spending model calls.
pub struct StaticEvaluationService;

pub const STATIC_REPORT: &str = "\
1. 독해력 (텍스트 이해도, 핵심 내용 파악 능력)
점수: 7
평가:
이야기의 흐름을 이해하고 있습니다.
개선점:
인물의 마음을 더 자세히 살펴보세요.

2. 논리적 사고 (추론 능력, 분석력)
점수: 6
평가:
자신의 생각에 이유를 붙였습니다.
개선점:
다른 관점도 비교해 보세요.

3. 창의적 표현 (독창성, 표현력)
점수: 7
평가:
자신만의 표현을 사용했습니다.
개선점:
비유를 활용해 보세요.

4. 참여도 (적극성, 열정)
점수: 8
평가:
대화에 꾸준히 참여했습니다.
개선점:
궁금한 점을 먼저 질문해 보세요.

종합 평가:
차분하게 토론에 참여했습니다. 다음에는 자신의 경험과 연결해 보세요.";

#[async_trait]
impl EvaluationService for StaticEvaluationService {
    async fn evaluate(&self, _turns: &[Turn]) -> Result<String> {
        Ok(STATIC_REPORT.to_string())
    }
}
