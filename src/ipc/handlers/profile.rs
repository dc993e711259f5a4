use crate::backend::{DataService, Identity, SqliteBackend};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::helpers::{get_required_str, get_str_or_empty, workspace_parts};
use crate::ipc::types::{AppState, Request};
use crate::profile::{self, AvatarPolicy, AvatarUpload, PasswordChange, ProfileDraft, ProfileError};
use crate::session::Session;
use crate::stats;
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::time::Instant;

fn signed_in(session: &Session) -> Result<Identity, HandlerErr> {
    session.identity().cloned().ok_or_else(HandlerErr::not_authenticated)
}

fn profile_error(e: ProfileError) -> HandlerErr {
    let err = HandlerErr::new(e.code(), e.message());
    match e {
        ProfileError::Validation(fields) => err.with_details(json!({ "fields": fields })),
        _ => err,
    }
}

fn draft_from_params(params: &serde_json::Value) -> Result<ProfileDraft, HandlerErr> {
    Ok(ProfileDraft {
        first_name: get_str_or_empty(params, "firstName")?,
        last_name: get_str_or_empty(params, "lastName")?,
        phone: get_str_or_empty(params, "phone")?,
    })
}

fn read_avatar(params: &serde_json::Value) -> Result<Option<AvatarUpload>, HandlerErr> {
    let Some(avatar) = params.get("avatar").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let path = get_required_str(avatar, "path")?;
    let content_type = get_required_str(avatar, "contentType")?;
    let file_name = Path::new(&path)
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params("avatar.path has no file name"))?;
    let bytes = std::fs::read(&path).map_err(|e| {
        HandlerErr::bad_params(format!("cannot read avatar file: {}", e))
            .with_details(json!({ "path": path }))
    })?;
    Ok(Some(AvatarUpload {
        file_name,
        content_type,
        bytes,
    }))
}

fn profile_get(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    let row = backend
        .fetch_profile(&identity.id)
        .map_err(|e| HandlerErr::new("not_found", format!("{e:#}")))?;
    Ok(json!({
        "profile": row,
        "displayName": stats::display_name(Some(&row), Some(&identity)),
        "role": session.role()
    }))
}

fn profile_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    let draft = draft_from_params(&req.params)?;
    let avatar = read_avatar(&req.params)?;
    let policy = AvatarPolicy {
        bucket: session.config().avatar_bucket.clone(),
        max_bytes: session.config().avatar_max_bytes,
    };

    let update = submit(backend, &identity, &draft, avatar.as_ref(), &policy)?;
    // The explicit save supersedes anything auto-save was holding.
    session.cancel_autosave();
    Ok(json!({
        "firstName": update.first_name,
        "lastName": update.last_name,
        "phone": update.phone,
        "avatarUrl": update.avatar_url,
        "updatedAt": update.updated_at
    }))
}

fn submit(
    backend: &SqliteBackend,
    identity: &Identity,
    draft: &ProfileDraft,
    avatar: Option<&AvatarUpload>,
    policy: &AvatarPolicy,
) -> Result<crate::backend::ProfileUpdate, HandlerErr> {
    profile::submit_profile(backend, backend, identity, draft, avatar, policy, Utc::now()).map_err(
        |e| {
            if let ProfileError::Backend(inner) = &e {
                tracing::error!(user_id = %identity.id, error = %format!("{inner:#}"), "error updating profile");
            }
            profile_error(e)
        },
    )
}

fn profile_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    signed_in(session)?;
    let draft = draft_from_params(&req.params)?;
    let errors = draft.validate();
    session
        .queue_profile_edit(Instant::now(), draft)
        .map_err(|_| HandlerErr::not_authenticated())?;
    Ok(json!({
        "scheduled": session.autosave_pending(),
        "delayMs": session.config().autosave_delay_ms,
        "fields": errors
    }))
}

fn autosave_status_json(session: &Session, now: Instant) -> serde_json::Value {
    json!({
        "status": session.autosave_status(now),
        "pending": session.autosave_pending(),
        "lastError": session.autosave_error(),
        "lastSavedAt": session.last_saved().map(|u| u.updated_at.clone())
    })
}

fn profile_flush(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let now = Instant::now();
    let written = session.flush_autosave(now, backend).is_some();
    let mut out = autosave_status_json(session, now);
    out["written"] = json!(written);
    Ok(out)
}

fn profile_autosave_status(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let (_, session) = workspace_parts(state)?;
    Ok(autosave_status_json(session, Instant::now()))
}

fn profile_change_password(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let (backend, session) = workspace_parts(state)?;
    let identity = signed_in(session)?;
    let change = PasswordChange {
        current: get_str_or_empty(&req.params, "currentPassword")?,
        new: get_str_or_empty(&req.params, "newPassword")?,
        confirm: get_str_or_empty(&req.params, "confirmPassword")?,
    };
    profile::change_password(backend, &identity, &change).map_err(|e| {
        if let ProfileError::Backend(inner) = &e {
            tracing::error!(user_id = %identity.id, error = %format!("{inner:#}"), "error updating password");
        }
        profile_error(e)
    })?;
    Ok(json!({ "ok": true }))
}

fn profile_password_strength(req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let password = get_str_or_empty(&req.params, "password")?;
    Ok(json!({
        "strength": profile::password_strength(&password),
        "message": profile::validate_password(&password)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(respond(&req.id, profile_get(state))),
        "profile.update" => Some(respond(&req.id, profile_update(state, req))),
        "profile.edit" => Some(respond(&req.id, profile_edit(state, req))),
        "profile.flush" => Some(respond(&req.id, profile_flush(state))),
        "profile.autoSaveStatus" => Some(respond(&req.id, profile_autosave_status(state))),
        "profile.changePassword" => Some(respond(&req.id, profile_change_password(state, req))),
        "profile.passwordStrength" => Some(respond(&req.id, profile_password_strength(req))),
        _ => None,
    }
}
