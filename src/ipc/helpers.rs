use crate::backend::SqliteBackend;
use crate::ipc::error::HandlerErr;
use crate::ipc::types::AppState;
use crate::session::Session;

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Missing and null both read as an empty string.
pub fn get_str_or_empty(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None => Ok(String::new()),
        Some(v) if v.is_null() => Ok(String::new()),
        Some(v) => v
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

pub fn get_optional_str(
    params: &serde_json::Value,
    key: &str,
) -> Result<Option<String>, HandlerErr> {
    let s = get_str_or_empty(params, key)?;
    let t = s.trim();
    if t.is_empty() {
        Ok(None)
    } else {
        Ok(Some(t.to_string()))
    }
}

pub fn workspace_parts(state: &mut AppState) -> Result<(&SqliteBackend, &mut Session), HandlerErr> {
    match (state.backend.as_ref(), state.session.as_mut()) {
        (Some(backend), Some(session)) => Ok((backend, session)),
        _ => Err(HandlerErr::no_workspace()),
    }
}
