use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lower bound of the recommended-position scale.
pub const POSITION_MIN: i32 = 1;
/// Upper bound of the recommended-position scale.
pub const POSITION_MAX: i32 = 10;

/// Certification lifecycle of a clause. Transitions are driven by the
/// external certifier; this crate only reads and reconciles them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Certified,
    Failed,
}

impl ProcessingStatus {
    /// True once the certifier will not touch this clause again.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Certified | Self::Failed)
    }
}

/// Which side of the negotiation a party is on. The initiator is the party
/// that uploaded the original document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartyRole {
    Initiator,
    Respondent,
}

/// Fairness verdict assigned by the certifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FairnessVerdict {
    Balanced,
    FavorsInitiator,
    FavorsRespondent,
}

/// Output bundle of the external certification process for one clause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Certification {
    /// Recommended position on the closed scale [POSITION_MIN, POSITION_MAX].
    pub position: i32,
    pub verdict: FairnessVerdict,
    /// One-line summary shown in the clause list.
    pub summary: String,
    /// Longer assessment text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<String>,
    /// Free-form flags raised during analysis (e.g. "unusual_term").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Certifier-suggested replacement wording, when it produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revised_text: Option<String>,
}

/// Value extracted from the original document text (e.g. "30 days notice").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

/// One negotiable unit of a contract. Created by the upstream extraction
/// pipeline in `pending`; certification fields are mutated only by
/// reconciliation against the authoritative store, `draft_text` only by the
/// draft override store. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub id: Uuid,
    pub contract_id: Uuid,
    /// Display name, e.g. "7.2 Termination for convenience".
    pub name: String,
    pub category: String,
    /// Position within the document; rendering preserves this order.
    pub display_order: i32,
    /// Parent clause. None means top-level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub clause_level: i32,
    /// True when the clause has at least one child; headers are never
    /// actionable themselves.
    pub is_header: bool,
    pub processing_status: ProcessingStatus,
    /// Immutable text as extracted from the original document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    /// Party-authored override of the original text. None = no override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_text: Option<String>,
    /// Whether draft_text currently diverges from the original.
    #[serde(default)]
    pub draft_modified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<Certification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_value: Option<ExtractedValue>,
    pub created_at: DateTime<Utc>,
}

impl Clause {
    /// A clause can be agreed or queried only once certified, and never
    /// when it is a section header.
    pub fn is_actionable(&self) -> bool {
        !self.is_header && self.processing_status == ProcessingStatus::Certified
    }

    /// True when the certifier still owes this clause a result.
    pub fn awaiting_certification(&self) -> bool {
        !self.is_header && !self.processing_status.is_settled()
    }

    /// Text an edit buffer should start from: the party's draft if one
    /// exists, then the original wording, then the certifier's suggestion.
    pub fn effective_text(&self) -> Option<&str> {
        self.draft_text
            .as_deref()
            .or(self.original_text.as_deref())
            .or_else(|| {
                self.certification
                    .as_ref()
                    .and_then(|c| c.revised_text.as_deref())
            })
    }
}

/// The subset of clause fields the certifier can change, fetched by the
/// reconciliation poll and merged into local state by clause id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClausePatch {
    pub id: Uuid,
    pub processing_status: ProcessingStatus,
    pub is_header: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<Certification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_value: Option<ExtractedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}
