use crate::backend::{AuthService, NewAccount};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, workspace_parts};
use crate::ipc::types::{AppState, Request};
use crate::profile;
use crate::role::Role;
use serde_json::json;
use std::time::Instant;

fn auth_sign_up(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, _) = workspace_parts(state)?;
    let email = get_required_str(&req.params, "email")?;
    let password = get_required_str(&req.params, "password")?;
    let role = match get_optional_str(&req.params, "role")? {
        Some(raw) => {
            Some(Role::parse(&raw).ok_or_else(|| HandlerErr::bad_params("unknown role"))?)
        }
        None => None,
    };

    let email = email.trim().to_string();
    let mut fields = serde_json::Map::new();
    if !email.contains('@') {
        fields.insert("email".into(), json!("Please enter a valid email address"));
    }
    if let Some(msg) = profile::validate_password(&password) {
        fields.insert("password".into(), json!(msg));
    }
    if !fields.is_empty() {
        return Err(
            HandlerErr::new("validation_failed", "Please fix the validation errors")
                .with_details(json!({ "fields": fields })),
        );
    }

    let identity = backend
        .sign_up(&NewAccount {
            email,
            password,
            first_name: get_optional_str(&req.params, "firstName")?,
            last_name: get_optional_str(&req.params, "lastName")?,
            role,
        })
        .map_err(HandlerErr::update)?;
    Ok(json!({ "userId": identity.id, "email": identity.email }))
}

fn auth_sign_in(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let email = get_required_str(&req.params, "email")?;
    let password = get_required_str(&req.params, "password")?;

    let Some(identity) = backend.sign_in(&email, &password).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::new("invalid_credentials", "Invalid email or password"));
    };
    if session.identity().map(|i| i.id != identity.id).unwrap_or(false) {
        session.flush_autosave(Instant::now(), backend);
    }
    let role = session.sync_identity(Some(identity.clone()), backend);
    Ok(json!({
        "identity": identity,
        "role": role,
        "roleState": session.roles.state().name()
    }))
}

fn auth_sign_out(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    session.flush_autosave(Instant::now(), backend);
    backend.sign_out().map_err(HandlerErr::update)?;
    let role = session.sync_identity(None, backend);
    Ok(json!({ "ok": true, "role": role }))
}

fn auth_session(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(json!({
        "identity": session.identity(),
        "role": session.role(),
        "roleState": session.roles.state().name()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signUp" => Some(respond(&req.id, auth_sign_up(state, req))),
        "auth.signIn" => Some(respond(&req.id, auth_sign_in(state, req))),
        "auth.signOut" => Some(respond(&req.id, auth_sign_out(state))),
        "auth.session" => Some(respond(&req.id, auth_session(state))),
        _ => None,
    }
}
