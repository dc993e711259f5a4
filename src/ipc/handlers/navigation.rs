use crate::backend::AuthService;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_str_or_empty, workspace_parts};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Re-reads the auth session and resolves the role, the way every render
/// does. An unchanged identity is served from the cache.
fn session_role(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = backend.current_identity().map_err(HandlerErr::query)?;
    let role = session.sync_identity(identity, backend);
    Ok(json!({
        "userId": session.identity().map(|i| i.id.clone()),
        "role": role,
        "roleState": session.roles.state().name()
    }))
}

fn nav_items(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    let mut path = get_str_or_empty(&req.params, "path")?;
    if path.is_empty() {
        path = "/".to_string();
    }
    Ok(json!({
        "role": session.role(),
        "items": session.nav_items(&path)
    }))
}

fn sidebar_json(collapsed: bool) -> serde_json::Value {
    json!({ "collapsed": collapsed })
}

fn sidebar_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(sidebar_json(session.sidebar.collapsed()))
}

fn sidebar_toggle(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(sidebar_json(session.sidebar.toggle()))
}

fn sidebar_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    let collapsed = req
        .params
        .get("collapsed")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::bad_params("collapsed must be a boolean"))?;
    session.sidebar.set(collapsed);
    Ok(sidebar_json(session.sidebar.collapsed()))
}

fn layout_viewport(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    let width = req
        .params
        .get("width")
        .and_then(|v| v.as_u64())
        .and_then(|w| u32::try_from(w).ok())
        .ok_or_else(|| HandlerErr::bad_params("width must be a non-negative integer"))?;
    let changed = session.viewport_changed(width).is_some();
    Ok(json!({
        "isDesktop": session.layout.matches(),
        "presentation": session.layout.presentation(),
        "changed": changed
    }))
}

fn layout_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(json!({
        "query": session.layout.query(),
        "isDesktop": session.layout.matches(),
        "presentation": session.layout.presentation(),
        "viewportKnown": session.viewport_known(),
        "sidebarCollapsed": session.sidebar.collapsed()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.role" => Some(respond(&req.id, session_role(state))),
        "nav.items" => Some(respond(&req.id, nav_items(state, req))),
        "sidebar.get" => Some(respond(&req.id, sidebar_get(state))),
        "sidebar.toggle" => Some(respond(&req.id, sidebar_toggle(state))),
        "sidebar.set" => Some(respond(&req.id, sidebar_set(state, req))),
        "layout.viewport" => Some(respond(&req.id, layout_viewport(state, req))),
        "layout.get" => Some(respond(&req.id, layout_get(state))),
        _ => None,
    }
}
