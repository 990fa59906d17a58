use rusqlite::Connection;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request, Session};
use crate::roles::Capability;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

pub fn require_session<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Session, serde_json::Value> {
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_session", "sign in first", None))
}

pub fn require_capability<'a>(
    state: &'a AppState,
    req: &Request,
    capability: Capability,
) -> Result<&'a Session, serde_json::Value> {
    let session = require_session(state, req)?;
    if !session.role.can(capability) {
        return Err(err(
            &req.id,
            "forbidden",
            format!("role {} lacks {}", session.role.as_str(), capability.as_str()),
            None,
        ));
    }
    Ok(session)
}

// Brand users act on their own brand; platform users name one with brandId.
pub fn effective_brand_id(state: &AppState, req: &Request) -> Result<String, serde_json::Value> {
    let session = require_session(state, req)?;
    match &session.brand_id {
        Some(brand_id) => Ok(brand_id.clone()),
        None => required_str(req, "brandId"),
    }
}
