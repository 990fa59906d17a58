use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, require_capability};
use crate::ipc::types::{AppState, Request};
use crate::roles::{Capability, Role};
use crate::theme;
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Branding,
    Curriculum,
    Users,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "branding" => Some(Self::Branding),
            "curriculum" => Some(Self::Curriculum),
            "users" => Some(Self::Users),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Branding => "setup.branding",
            Self::Curriculum => "setup.curriculum",
            Self::Users => "setup.users",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Branding => json!({
            "platformName": "CourseLoft",
            "defaultPrimaryColor": theme::DEFAULT_PRIMARY_HEX,
            "defaultAccentColor": theme::DEFAULT_ACCENT_HEX
        }),
        SetupSection::Curriculum => json!({
            "defaultModuleTitlePrefix": "Module",
            "showEmptyModules": false,
            "confirmRemoves": true
        }),
        SetupSection::Users => json!({
            "defaultInviteRole": "staff",
            "inviteExpiryDays": 14
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_hex(v: &Value, key: &str) -> Result<String, String> {
    let s = parse_string_max(v, key, 16)?;
    if theme::parse_hex_color(&s).is_none() {
        return Err(format!("{} must be a hex color like #rrggbb", key));
    }
    Ok(s)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Branding => match k.as_str() {
                "platformName" => {
                    let s = parse_string_max(v, k, 80)?;
                    if s.is_empty() {
                        return Err("platformName must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "defaultPrimaryColor" | "defaultAccentColor" => {
                    obj.insert(k.clone(), Value::String(parse_hex(v, k)?));
                }
                _ => return Err(format!("unknown branding field: {}", k)),
            },
            SetupSection::Curriculum => match k.as_str() {
                "defaultModuleTitlePrefix" => {
                    let s = parse_string_max(v, k, 32)?;
                    if s.is_empty() {
                        return Err("defaultModuleTitlePrefix must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "showEmptyModules" | "confirmRemoves" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown curriculum field: {}", k)),
            },
            SetupSection::Users => match k.as_str() {
                "defaultInviteRole" => {
                    let s = parse_string_max(v, k, 24)?;
                    let role = Role::parse(&s);
                    if !matches!(role, Some(Role::Manager) | Some(Role::Staff)) {
                        return Err("defaultInviteRole must be one of: manager, staff".into());
                    }
                    obj.insert(
                        k.clone(),
                        Value::String(role.map(Role::as_str).unwrap_or("staff").to_string()),
                    );
                }
                "inviteExpiryDays" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 90)?));
                }
                _ => return Err(format!("unknown users field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block setup UI.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ManageBrands) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let branding = match load_section(conn, SetupSection::Branding) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let curriculum = match load_section(conn, SetupSection::Curriculum) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let users = match load_section(conn, SetupSection::Users) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "branding": branding,
            "curriculum": curriculum,
            "users": users
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_capability(state, req, Capability::ManageBrands) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
