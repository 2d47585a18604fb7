//! Axum route handlers for the interview API.
//!
//! Streaming endpoints validate first, then hand the turn to the SSE relay.
//! Anything rejected before the relay starts is a plain JSON error.

use axum::{extract::State, response::Response, Json};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::interview::models::{
    ConversationMessage, ExtractedProfile, ExtractionRequest, InterviewStage, InterviewTurnRequest,
    OpeningRequest, PromptRequest, PromptResponse, RawProfile, Role,
};
use crate::interview::position::{EvaluationDimension, PositionType};
use crate::interview::prompts::{
    extraction_prompt, interviewer_system_prompt, opening_prompt, project_experience_prompt,
    summary_prompt, system_design_prompt, technical_question_prompt,
};
use crate::llm_client::{collect_json, ChatRequest};
use crate::relay::sse::{spawn_turn, TurnOptions};
use crate::retrieval::{build_retrieval_context, Retriever};
use crate::state::AppState;

const QUESTION_ERROR: &str = "生成面试问题时出错，请重试";
const EXTRACTION_ERROR: &str = "提取面试者信息时出错，请重试";
const OPENING_ERROR: &str = "生成开场白时出错，请重试";

const RETRIEVAL_TOP_K: usize = 5;
const DEFAULT_DESIGN_LEVEL: &str = "Mid";
const DEFAULT_OPENING_MESSAGE: &str = "你好，我准备好了。";

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api
pub async fn handle_api_root() -> Json<Value> {
    Json(json!({ "message": "API is running" }))
}

/// POST /api/question/stream
///
/// Streams the next interview question, grounded in the question bank when
/// retrieval is available.
pub async fn handle_question_stream(
    State(state): State<AppState>,
    Json(request): Json<InterviewTurnRequest>,
) -> Result<Response, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let retrieval_context = retrieve_context(state.retriever.as_ref(), &request.message).await;

    let mut history = request.conversation_history;
    history.push(ConversationMessage {
        role: Role::Candidate,
        content: request.message,
    });

    let chat = ChatRequest {
        model: state.config.chat_model.clone(),
        system: Some(interviewer_system_prompt(request.position_type)),
        user: technical_question_prompt(
            request.position_type,
            &request.project_keywords,
            &request.skill_gaps,
            &retrieval_context,
            &history,
        ),
        temperature: 0.5,
        max_tokens: 500,
        disable_thinking: false,
    };

    Ok(spawn_turn(
        state.llm.clone(),
        chat,
        TurnOptions {
            kind: "question",
            error_message: QUESTION_ERROR,
            idle_timeout: state.config.chat_idle_timeout,
        },
    ))
}

/// POST /api/extracting/info
///
/// Streams the model's JSON answer as-is; the browser concatenates and parses it.
pub async fn handle_extracting_info(
    State(state): State<AppState>,
    Json(request): Json<ExtractionRequest>,
) -> Result<Response, AppError> {
    validate_extraction(&request)?;

    Ok(spawn_turn(
        state.llm.clone(),
        extraction_chat(&state, &request),
        TurnOptions {
            kind: "extraction",
            error_message: EXTRACTION_ERROR,
            idle_timeout: state.config.chat_idle_timeout,
        },
    ))
}

/// POST /api/extracting/profile
///
/// Same extraction, collected server-side and returned as a validated profile.
pub async fn handle_extracting_profile(
    State(state): State<AppState>,
    Json(request): Json<ExtractionRequest>,
) -> Result<Json<ExtractedProfile>, AppError> {
    validate_extraction(&request)?;

    let fragments = state
        .llm
        .stream_chat(extraction_chat(&state, &request))
        .await
        .map_err(|e| AppError::Llm(format!("Extraction request failed: {e}")))?;

    let raw: RawProfile = collect_json(fragments)
        .await
        .map_err(|e| AppError::Llm(format!("Failed to parse extracted profile: {e}")))?;

    Ok(Json(raw.into_profile(&request.job_title)))
}

/// POST /api/smallchat/stream
///
/// Streams the interviewer's opening line.
pub async fn handle_smallchat_stream(
    State(state): State<AppState>,
    Json(request): Json<OpeningRequest>,
) -> Result<Response, AppError> {
    let user = if request.message.trim().is_empty() {
        DEFAULT_OPENING_MESSAGE.to_string()
    } else {
        request.message
    };

    let chat = ChatRequest {
        model: state.config.chat_model.clone(),
        system: Some(opening_prompt(
            request.position_type,
            request.candidate_name.as_deref(),
        )),
        user,
        temperature: 0.7,
        max_tokens: 800,
        disable_thinking: false,
    };

    Ok(spawn_turn(
        state.llm.clone(),
        chat,
        TurnOptions {
            kind: "opening",
            error_message: OPENING_ERROR,
            idle_timeout: state.config.chat_idle_timeout,
        },
    ))
}

/// POST /api/interview/prompt
///
/// Renders the prompt for one interview stage without calling the model.
pub async fn handle_interview_prompt(
    State(state): State<AppState>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<PromptResponse>, AppError> {
    let position_type = match (request.position_type, request.job_title.as_deref()) {
        (Some(position), _) => position,
        (None, Some(title)) if !title.trim().is_empty() => PositionType::from_job_title(title),
        (None, _) => {
            return Err(AppError::Validation(
                "positionType or jobTitle is required".to_string(),
            ))
        }
    };

    let prompt = match request.stage {
        InterviewStage::Technical => {
            let retrieval_context = match request.project_keywords.first() {
                Some(keyword) => retrieve_context(state.retriever.as_ref(), keyword).await,
                None => String::new(),
            };
            technical_question_prompt(
                position_type,
                &request.project_keywords,
                &request.skill_gaps,
                &retrieval_context,
                &[],
            )
        }
        InterviewStage::Project => project_experience_prompt(&request.project_keywords),
        InterviewStage::Design => system_design_prompt(
            position_type,
            request.level.as_deref().unwrap_or(DEFAULT_DESIGN_LEVEL),
        ),
        InterviewStage::Summary => summary_prompt(
            request
                .dimensions
                .as_deref()
                .filter(|d| !d.is_empty())
                .unwrap_or(&EvaluationDimension::SUMMARY_DEFAULT),
        ),
        InterviewStage::Opening => {
            opening_prompt(position_type, request.candidate_name.as_deref())
        }
    };

    Ok(Json(PromptResponse {
        success: true,
        prompt,
        stage: request.stage,
        position_type,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn validate_extraction(request: &ExtractionRequest) -> Result<(), AppError> {
    if request.job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "jobDescription cannot be empty".to_string(),
        ));
    }
    if request.resume.trim().is_empty() {
        return Err(AppError::Validation("resume cannot be empty".to_string()));
    }
    Ok(())
}

fn extraction_chat(state: &AppState, request: &ExtractionRequest) -> ChatRequest {
    ChatRequest {
        model: state.config.extraction_model.clone(),
        system: None,
        user: extraction_prompt(request),
        temperature: 0.3,
        max_tokens: 300,
        disable_thinking: true,
    }
}

/// Searches the question bank. Failures only cost the turn its context.
async fn retrieve_context(retriever: &dyn Retriever, query: &str) -> String {
    if !retriever.is_available() {
        return String::new();
    }
    match retriever.search(query, RETRIEVAL_TOP_K).await {
        Ok(documents) => {
            debug!("Retrieved {} documents", documents.len());
            build_retrieval_context(&documents)
        }
        Err(e) => {
            warn!("Retrieval failed, continuing without context: {e}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{DisabledRetriever, RetrievalError, ScoredDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedRetriever {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        fn is_available(&self) -> bool {
            true
        }

        async fn search(
            &self,
            query: &str,
            top_k: usize,
        ) -> Result<Vec<ScoredDocument>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(top_k, RETRIEVAL_TOP_K);
            if self.fail {
                return Err(RetrievalError::Search("timeout".into()));
            }
            Ok(vec![ScoredDocument {
                content: format!("关于{query}的题目"),
                source: "bank.pdf".into(),
                page: 1,
                score: 0.9,
            }])
        }
    }

    #[tokio::test]
    async fn test_retrieve_context_uses_available_retriever() {
        let retriever = FixedRetriever {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let context = retrieve_context(&retriever, "React").await;
        assert!(context.starts_with("[1] 关于React的题目"));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retrieve_context_swallows_failures() {
        let retriever = FixedRetriever {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        assert_eq!(retrieve_context(&retriever, "React").await, "");
        assert_eq!(retrieve_context(&DisabledRetriever, "React").await, "");
    }

    #[test]
    fn test_validate_extraction() {
        let mut request = ExtractionRequest {
            job_title: "前端".into(),
            job_description: "React".into(),
            resume: "Vue".into(),
            company_name: None,
            company_description: None,
        };
        assert!(validate_extraction(&request).is_ok());

        request.resume = " ".into();
        assert!(matches!(
            validate_extraction(&request),
            Err(AppError::Validation(_))
        ));
    }
}
