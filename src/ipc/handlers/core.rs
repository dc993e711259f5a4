use crate::backend::{AuthService, SqliteBackend};
use crate::config::{self, SessionConfig};
use crate::db;
use crate::ipc::error::{err, ok, respond, HandlerErr};
use crate::ipc::helpers::workspace_parts;
use crate::ipc::types::{AppState, Request};
use crate::session::Session;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    // Pending edits belong to the workspace being left.
    state.shutdown();

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let mut session = match Session::open(&path, &conn) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };
    let backend = SqliteBackend::new(conn, session.config().public_url_base.clone());

    // A session stored by an earlier run is picked up like a page reload.
    let identity = match backend.current_identity() {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "could not read stored auth session");
            None
        }
    };
    let role = session.sync_identity(identity, &backend);
    tracing::info!(workspace = %path.display(), role = role.as_str(), "workspace opened");

    state.workspace = Some(path.clone());
    state.backend = Some(backend);
    state.session = Some(session);
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "signedIn": state.session.as_ref().and_then(|s| s.identity()).is_some(),
            "role": role
        }),
    )
}

fn setup_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(json!({ "session": session.config().to_json() }))
}

fn setup_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let section = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing section"))?;
    if section != "session" {
        return Err(HandlerErr::bad_params("unknown section"));
    }
    let patch = req
        .params
        .get("patch")
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;

    let mut next: SessionConfig = session.config().clone();
    next.apply_patch(patch).map_err(HandlerErr::bad_params)?;
    config::save_session_config(backend.conn(), &next).map_err(HandlerErr::update)?;
    let public_url_base = next.public_url_base.clone();
    session.apply_config(next);
    if let Some(backend) = state.backend.as_mut() {
        backend.set_public_url_base(public_url_base);
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "setup.get" => Some(respond(&req.id, setup_get(state))),
        "setup.update" => Some(respond(&req.id, setup_update(state, req))),
        _ => None,
    }
}
