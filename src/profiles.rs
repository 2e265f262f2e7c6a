//! Profile provisioning: validate a create-user request and forward a single
//! insert into the hosted `profiles` table with the service credential.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::rest::{BackendError, RestClient};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileInputError {
    #[error("Invalid JSON body")]
    InvalidJson,
    #[error("user_id is required")]
    MissingUserId,
}

/// Row inserted into `profiles`. Optional fields are omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileInsert {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Scalars become trimmed text; null, false, zero, empty strings, arrays and
/// objects count as absent.
fn scalar_text(v: Option<&Value>) -> Option<String> {
    let text = match v? {
        Value::String(s) => s.clone(),
        Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
        Value::Bool(true) => "true".to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

pub fn parse_create_user(body: &[u8]) -> Result<ProfileInsert, ProfileInputError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| ProfileInputError::InvalidJson)?;
    if is_falsy(&value) {
        return Err(ProfileInputError::InvalidJson);
    }
    // any other non-object body simply has no user_id
    let obj = value.as_object().ok_or(ProfileInputError::MissingUserId)?;
    let user_id = scalar_text(obj.get("user_id")).ok_or(ProfileInputError::MissingUserId)?;
    Ok(ProfileInsert {
        user_id,
        email: scalar_text(obj.get("email")),
        full_name: scalar_text(obj.get("full_name")),
        avatar_url: scalar_text(obj.get("avatar_url")),
    })
}

#[async_trait]
pub trait ProfileSink: Send + Sync {
    /// Insert one profile and return the created representation.
    async fn insert_profile(&self, profile: &ProfileInsert) -> Result<Value, BackendError>;
}

#[async_trait]
impl ProfileSink for RestClient {
    async fn insert_profile(&self, profile: &ProfileInsert) -> Result<Value, BackendError> {
        self.insert("profiles", profile).await
    }
}
