use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use redline_core::clause::Clause;

use crate::error::SessionError;

/// Replies shorter than this are treated as refusals or chit-chat, not as
/// replacement clause text.
pub const MIN_DRAFT_LEN: usize = 40;

const BALANCED_DRAFT_INSTRUCTION: &str = "Rewrite the following clause so it is balanced \
for both parties. Reply with the replacement clause text only, no commentary.";

/// Request shape of the external assistant endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantRequest {
    pub message: String,
    pub contract_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clause_category: Option<String>,
    /// Flow identifier, e.g. "discussion" or "balanced_draft".
    pub context: String,
}

impl AssistantRequest {
    pub fn discussion(contract_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            contract_id,
            clause_id: None,
            clause_name: None,
            clause_category: None,
            context: "discussion".to_string(),
        }
    }
}

/// The endpoint answers with either `response` or `message` depending on
/// the flow; both carry the reply text.
#[derive(Debug, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AssistantReply {
    pub fn text(self) -> Option<String> {
        self.response.or(self.message)
    }
}

/// External drafting/discussion engine. Used for free-form discussion and
/// for the balanced-draft flow.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn chat(&self, request: AssistantRequest) -> Result<String, SessionError>;
}

/// Ask the assistant for a balanced redraft of a clause. The reply is raw
/// replacement text; it is accepted only when long enough to plausibly be
/// a draft, otherwise the caller keeps its current text.
pub async fn generate_balanced_draft(
    assistant: &dyn Assistant,
    clause: &Clause,
) -> Result<String, SessionError> {
    let current = clause.effective_text().ok_or_else(|| {
        SessionError::validation("clause has no text to redraft", Some("clause_id"))
    })?;

    let request = AssistantRequest {
        message: format!("{BALANCED_DRAFT_INSTRUCTION}\n\n{current}"),
        contract_id: clause.contract_id,
        clause_id: Some(clause.id),
        clause_name: Some(clause.name.clone()),
        clause_category: Some(clause.category.clone()),
        context: "balanced_draft".to_string(),
    };

    let reply = assistant.chat(request).await?;
    let draft = reply.trim();
    if draft.len() < MIN_DRAFT_LEN {
        return Err(SessionError::Assistant(format!(
            "reply too short to be a replacement draft ({} chars)",
            draft.len()
        )));
    }
    Ok(draft.to_string())
}

/// HTTP assistant endpoint.
pub struct HttpAssistant {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAssistant {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint from `REDLINE_ASSISTANT_URL`.
    pub fn from_env() -> Option<Self> {
        std::env::var("REDLINE_ASSISTANT_URL").ok().map(Self::new)
    }
}

#[async_trait]
impl Assistant for HttpAssistant {
    async fn chat(&self, request: AssistantRequest) -> Result<String, SessionError> {
        let reply: AssistantReply = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SessionError::Assistant(e.to_string()))?
            .error_for_status()
            .map_err(|e| SessionError::Assistant(e.to_string()))?
            .json()
            .await
            .map_err(|e| SessionError::Assistant(e.to_string()))?;

        reply
            .text()
            .ok_or_else(|| SessionError::Assistant("empty reply".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use redline_core::clause::ProcessingStatus;

    use super::*;

    struct CannedAssistant(String);

    #[async_trait]
    impl Assistant for CannedAssistant {
        async fn chat(&self, _request: AssistantRequest) -> Result<String, SessionError> {
            Ok(self.0.clone())
        }
    }

    fn clause() -> Clause {
        Clause {
            id: Uuid::now_v7(),
            contract_id: Uuid::now_v7(),
            name: "3.1 Liability cap".to_string(),
            category: "liability".to_string(),
            display_order: 0,
            parent_id: None,
            clause_level: 1,
            is_header: false,
            processing_status: ProcessingStatus::Certified,
            original_text: Some("Supplier's liability is unlimited.".to_string()),
            draft_text: None,
            draft_modified: false,
            certification: None,
            extracted_value: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn short_reply_is_rejected_as_draft() {
        let assistant = CannedAssistant("I can't help with that.".to_string());
        let err = generate_balanced_draft(&assistant, &clause())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Assistant(_)));
    }

    #[tokio::test]
    async fn long_reply_is_accepted_and_trimmed() {
        let text = "  Each party's aggregate liability is capped at the fees paid in the \
                    twelve months preceding the claim.  ";
        let assistant = CannedAssistant(text.to_string());
        let draft = generate_balanced_draft(&assistant, &clause()).await.unwrap();
        assert!(draft.starts_with("Each party's"));
        assert!(draft.len() >= MIN_DRAFT_LEN);
    }
}
