//! Core data model: memory records, relationships, states, and consolidation metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque record identifier (UUID v4, textual).
pub type MemoryId = String;

/// Classification of a distilled memory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Essential,
    Contextual,
    Conversational,
    Reference,
    Personal,
    ConsciousInfo,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Essential => "ESSENTIAL",
            Classification::Contextual => "CONTEXTUAL",
            Classification::Conversational => "CONVERSATIONAL",
            Classification::Reference => "REFERENCE",
            Classification::Personal => "PERSONAL",
            Classification::ConsciousInfo => "CONSCIOUS_INFO",
        }
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "essential" => Ok(Classification::Essential),
            "contextual" => Ok(Classification::Contextual),
            "conversational" => Ok(Classification::Conversational),
            "reference" => Ok(Classification::Reference),
            "personal" => Ok(Classification::Personal),
            "conscious_info" => Ok(Classification::ConsciousInfo),
            other => Err(format!("unknown classification: {other}")),
        }
    }
}

/// Coarse importance tier. Maps to a numeric score via [`Importance::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Importance {
    Low,
    Medium,
    High,
    Critical,
}

impl Importance {
    /// Fixed importance -> score table from the data model.
    pub fn score(&self) -> f64 {
        match self {
            Importance::Critical => 0.9,
            Importance::High => 0.7,
            Importance::Medium => 0.5,
            Importance::Low => 0.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Critical => "CRITICAL",
            Importance::High => "HIGH",
            Importance::Medium => "MEDIUM",
            Importance::Low => "LOW",
        }
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Importance::Critical),
            "high" => Ok(Importance::High),
            "medium" => Ok(Importance::Medium),
            "low" => Ok(Importance::Low),
            other => Err(format!("unknown importance: {other}")),
        }
    }
}

/// Type of a typed, directional relationship between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Continuation,
    Reference,
    Related,
    Supersedes,
    Contradiction,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Continuation => "CONTINUATION",
            RelationshipType::Reference => "REFERENCE",
            RelationshipType::Related => "RELATED",
            RelationshipType::Supersedes => "SUPERSEDES",
            RelationshipType::Contradiction => "CONTRADICTION",
        }
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continuation" => Ok(RelationshipType::Continuation),
            "reference" => Ok(RelationshipType::Reference),
            "related" => Ok(RelationshipType::Related),
            "supersedes" => Ok(RelationshipType::Supersedes),
            "contradiction" => Ok(RelationshipType::Contradiction),
            other => Err(format!("unknown relationship type: {other}")),
        }
    }
}

/// A typed, directional relationship from one record to another.
///
/// Stored denormalized on the *origin* record; the graph has no separate
/// edge table (see §4.4 and §9 of the design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    pub target_memory_id: MemoryId,
    pub confidence: f64,
    pub strength: f64,
    pub reason: String,
    pub context: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl Relationship {
    /// Validate structural invariants named in §3: field length floors and
    /// the `strength <= confidence + 0.3` derived invariant. Does not check
    /// that the target exists (that is namespace/store-dependent, see
    /// [`crate::relationships`]).
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err("confidence must be in [0,1]".into());
        }
        if !(0.0..=1.0).contains(&self.strength) {
            return Err("strength must be in [0,1]".into());
        }
        if self.reason.chars().count() < 10 {
            return Err("reason must be at least 10 characters".into());
        }
        if self.context.chars().count() < 5 {
            return Err("context must be at least 5 characters".into());
        }
        if self.strength > self.confidence + 0.3 {
            return Err("strength must not exceed confidence + 0.3".into());
        }
        Ok(())
    }

    /// Identity key used for merge/dedup: `(type, target)`.
    pub fn key(&self) -> (RelationshipType, &str) {
        (self.relationship_type, self.target_memory_id.as_str())
    }
}

/// Per-record finite-state workflow states (§3 lifecycles).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryState {
    Pending,
    Processing,
    Processed,
    ConsciousPending,
    ConsciousProcessing,
    ConsciousProcessed,
    DuplicateCheckPending,
    DuplicateCheckProcessing,
    ConsolidationPending,
    ConsolidationProcessing,
    Consolidated,
    CleanupPending,
    CleanupProcessing,
    Cleaned,
    Failed,
}

impl MemoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryState::Pending => "PENDING",
            MemoryState::Processing => "PROCESSING",
            MemoryState::Processed => "PROCESSED",
            MemoryState::ConsciousPending => "CONSCIOUS_PENDING",
            MemoryState::ConsciousProcessing => "CONSCIOUS_PROCESSING",
            MemoryState::ConsciousProcessed => "CONSCIOUS_PROCESSED",
            MemoryState::DuplicateCheckPending => "DUPLICATE_CHECK_PENDING",
            MemoryState::DuplicateCheckProcessing => "DUPLICATE_CHECK_PROCESSING",
            MemoryState::ConsolidationPending => "CONSOLIDATION_PENDING",
            MemoryState::ConsolidationProcessing => "CONSOLIDATION_PROCESSING",
            MemoryState::Consolidated => "CONSOLIDATED",
            MemoryState::CleanupPending => "CLEANUP_PENDING",
            MemoryState::CleanupProcessing => "CLEANUP_PROCESSING",
            MemoryState::Cleaned => "CLEANED",
            MemoryState::Failed => "FAILED",
        }
    }

    pub const ALL: [MemoryState; 15] = [
        MemoryState::Pending,
        MemoryState::Processing,
        MemoryState::Processed,
        MemoryState::ConsciousPending,
        MemoryState::ConsciousProcessing,
        MemoryState::ConsciousProcessed,
        MemoryState::DuplicateCheckPending,
        MemoryState::DuplicateCheckProcessing,
        MemoryState::ConsolidationPending,
        MemoryState::ConsolidationProcessing,
        MemoryState::Consolidated,
        MemoryState::CleanupPending,
        MemoryState::CleanupProcessing,
        MemoryState::Cleaned,
        MemoryState::Failed,
    ];
}

impl std::str::FromStr for MemoryState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown state: {s}"))
    }
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Consolidation bookkeeping embedded on a record. Present once a record has
/// ever been touched by the consolidation engine (as primary or duplicate).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationMetadata {
    #[serde(default)]
    pub is_duplicate: bool,
    pub duplicate_of: Option<MemoryId>,
    #[serde(default)]
    pub is_consolidated: bool,
    pub consolidated_into: Option<MemoryId>,
    #[serde(default)]
    pub consolidated_from: Vec<MemoryId>,
    pub consolidated_at: Option<DateTime<Utc>>,
    pub consolidation_reason: Option<String>,
    pub original_data_hash: Option<String>,
    pub rollback_token: Option<String>,
}

/// The unit of storage: a distilled, classified memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub namespace: String,
    pub content: String,
    pub summary: String,
    pub classification: Classification,
    pub importance: Importance,
    pub topic: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub confidence_score: f64,
    pub classification_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub extraction_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub supersedes: Vec<Relationship>,
    #[serde(default)]
    pub conscious_processed: bool,
    #[serde(default)]
    pub consolidation: Option<ConsolidationMetadata>,
}

impl MemoryRecord {
    /// `importanceScore` derived from the coarse `importance` tier.
    pub fn importance_score(&self) -> f64 {
        self.importance.score()
    }

    /// All outgoing relationships, general and SUPERSEDES combined.
    pub fn all_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().chain(self.supersedes.iter())
    }

    pub fn is_duplicate(&self) -> bool {
        self.consolidation.as_ref().is_some_and(|c| c.is_duplicate)
    }

    pub fn is_consolidated(&self) -> bool {
        self.consolidation
            .as_ref()
            .is_some_and(|c| c.is_consolidated)
    }
}

/// A single row in a record's state transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: String,
    pub memory_id: MemoryId,
    pub from_state: MemoryState,
    pub to_state: MemoryState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub agent_id: Option<String>,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
}

/// Search result envelope common to every strategy in [`crate::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: MemoryId,
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f64,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
}
