use serde::{Deserialize, Serialize};

use crate::interview::position::{EvaluationDimension, PositionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(alias = "type")]
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/question/stream`. Consumed once by the prompt assembler.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewTurnRequest {
    pub position_type: PositionType,
    #[serde(default)]
    pub project_keywords: Vec<String>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
}

/// Body of the extraction endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub job_title: String,
    pub job_description: String,
    pub resume: String,
    pub company_name: Option<String>,
    pub company_description: Option<String>,
}

/// Body of `POST /api/smallchat/stream`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpeningRequest {
    pub position_type: PositionType,
    pub candidate_name: Option<String>,
    /// The browser's greeting. Optional.
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewStage {
    #[default]
    Technical,
    Project,
    Design,
    Summary,
    #[serde(other)]
    Opening,
}

/// Body of `POST /api/interview/prompt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    pub position_type: Option<PositionType>,
    /// Used to infer the track when `positionType` is absent.
    pub job_title: Option<String>,
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub project_keywords: Vec<String>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
    #[serde(default)]
    pub stage: InterviewStage,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub dimensions: Option<Vec<EvaluationDimension>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub success: bool,
    pub prompt: String,
    pub stage: InterviewStage,
    pub position_type: PositionType,
}

/// Interview parameters extracted from a job description and résumé.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProfile {
    pub position_type: PositionType,
    pub project_keywords: Vec<String>,
    pub skill_gaps: Vec<String>,
}

/// The model's answer before the track label is validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProfile {
    #[serde(default)]
    pub position_type: String,
    #[serde(default)]
    pub project_keywords: Vec<String>,
    #[serde(default)]
    pub skill_gaps: Vec<String>,
}

impl RawProfile {
    /// Validates the track label, falling back to classifying the job title.
    pub fn into_profile(self, job_title: &str) -> ExtractedProfile {
        let position_type = PositionType::from_label(&self.position_type)
            .unwrap_or_else(|| PositionType::from_job_title(job_title));
        ExtractedProfile {
            position_type,
            project_keywords: self.project_keywords,
            skill_gaps: self.skill_gaps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_request_deserializes() {
        let json = r#"{
            "positionType": "前端",
            "projectKeywords": ["React"],
            "skillGaps": ["TypeScript"],
            "message": "我做过电商项目",
            "conversationHistory": [
                {"role": "interviewer", "content": "请介绍一下你自己"},
                {"type": "candidate", "content": "我是前端工程师"}
            ]
        }"#;
        let req: InterviewTurnRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.position_type, PositionType::Frontend);
        assert_eq!(req.conversation_history.len(), 2);
        assert_eq!(req.conversation_history[1].role, Role::Candidate);
    }

    #[test]
    fn test_turn_request_optional_lists_default_empty() {
        let req: InterviewTurnRequest =
            serde_json::from_str(r#"{"positionType": "后端", "message": "hi"}"#).unwrap();
        assert!(req.project_keywords.is_empty());
        assert!(req.conversation_history.is_empty());
    }

    #[test]
    fn test_stage_parsing_unknown_is_opening() {
        let stage: InterviewStage = serde_json::from_str("\"design\"").unwrap();
        assert_eq!(stage, InterviewStage::Design);
        let stage: InterviewStage = serde_json::from_str("\"warmup\"").unwrap();
        assert_eq!(stage, InterviewStage::Opening);
        assert_eq!(InterviewStage::default(), InterviewStage::Technical);
    }

    #[test]
    fn test_raw_profile_valid_label() {
        let raw: RawProfile = serde_json::from_str(
            r#"{"positionType": "数据", "projectKeywords": ["Flink"], "skillGaps": ["Hive"]}"#,
        )
        .unwrap();
        let profile = raw.into_profile("前端开发");
        assert_eq!(profile.position_type, PositionType::Data);
        assert_eq!(profile.project_keywords, vec!["Flink".to_string()]);
    }

    #[test]
    fn test_raw_profile_unknown_label_falls_back_to_title() {
        let raw: RawProfile =
            serde_json::from_str(r#"{"positionType": "前端|后端", "projectKeywords": []}"#).unwrap();
        let profile = raw.into_profile("Java 后端开发");
        assert_eq!(profile.position_type, PositionType::Backend);
        assert!(profile.skill_gaps.is_empty());
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let profile = ExtractedProfile {
            position_type: PositionType::Testing,
            project_keywords: vec![],
            skill_gaps: vec!["JMeter".into()],
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["positionType"], "测试");
        assert_eq!(value["skillGaps"][0], "JMeter");
    }
}
