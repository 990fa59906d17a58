use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_ts, required_str};
use crate::ipc::types::{AppState, Request};
use crate::roles::Role;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

use super::brands::{theme_for_brand, validate_color};

// Post-checkout company signup: creates the brand and its owner account in one
// transaction. Payment happened at the external processor, and there is no
// session yet; a fresh workspace takes on its first tenant this way.
fn handle_register_company(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let brand_name = match required_str(req, "brandName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let owner_email = match required_str(req, "ownerEmail") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    if !owner_email.contains('@') {
        return err(&req.id, "bad_params", "ownerEmail must be an email address", None);
    }
    let owner_name = match required_str(req, "ownerName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let primary_color = match req.params.get("primaryColor") {
        Some(v) => match validate_color(v, "primaryColor") {
            Ok(c) => c,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => None,
    };
    let accent_color = match req.params.get("accentColor") {
        Some(v) => match validate_color(v, "accentColor") {
            Ok(c) => c,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => None,
    };

    let name_taken = match conn
        .query_row("SELECT 1 FROM brands WHERE name = ?", [&brand_name], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if name_taken {
        return err(&req.id, "name_in_use", "a brand with that name already exists", None);
    }
    let email_used = match conn
        .query_row("SELECT 1 FROM users WHERE email = ?", [&owner_email], |_r| Ok(()))
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if email_used {
        return err(&req.id, "email_in_use", "an account with that email already exists", None);
    }

    let brand_id = Uuid::new_v4().to_string();
    let owner_user_id = Uuid::new_v4().to_string();
    let ts = now_ts();

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = tx.execute(
        "INSERT INTO brands(id, name, primary_color, accent_color, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        rusqlite::params![brand_id, brand_name, primary_color, accent_color, ts, ts],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "brands" })),
        );
    }
    if let Err(e) = tx.execute(
        "INSERT INTO users(id, brand_id, email, display_name, role, active, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?, ?)",
        rusqlite::params![owner_user_id, brand_id, owner_email, owner_name, Role::Owner.as_str(), ts, ts],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    let theme = match theme_for_brand(conn, Some(&brand_id)) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    tracing::info!("registered company {}", brand_name);
    ok(
        &req.id,
        json!({
            "brandId": brand_id,
            "ownerUserId": owner_user_id,
            "theme": theme,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "onboarding.registerCompany" => Some(handle_register_company(state, req)),
        _ => None,
    }
}
