//! Audit Records

use std::fmt::{Display, Formatter, Result as FmtResult};

use hanko_promotions::{ids::TypedUuid, promotions::PromotionId};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Audit Entry UUID
pub type AuditEntryUuid = TypedUuid<AuditEntry>;

/// Who performed an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    #[default]
    Staff,
    Customer,
    System,
}

impl ActorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Customer => "customer",
            Self::System => "system",
        }
    }
}

/// An already-authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub reference: String,
    pub kind: ActorKind,
}

impl Actor {
    pub fn staff(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ActorKind::Staff,
        }
    }

    pub fn customer(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            kind: ActorKind::Customer,
        }
    }

    #[must_use]
    pub fn system() -> Self {
        Self {
            reference: "system".to_string(),
            kind: ActorKind::System,
        }
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.kind.as_str(), self.reference)
    }
}

/// Audit Entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub uuid: AuditEntryUuid,
    pub actor: String,
    pub actor_type: ActorKind,
    pub action: String,
    pub target_ref: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action: impl Into<String>,
        target_ref: impl Into<String>,
        metadata: serde_json::Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            uuid: AuditEntryUuid::new(),
            actor: actor.reference.clone(),
            actor_type: actor.kind,
            action: action.into(),
            target_ref: target_ref.into(),
            metadata,
            created_at,
        }
    }
}

/// Audit target reference of a promotion.
pub fn promotion_ref(id: PromotionId) -> String {
    format!("/promotions/{id}")
}
