//! Profile form rules: field validation, avatar upload, password change and
//! the write performed by auto-save.

use crate::backend::{AuthService, DataService, FileStorage, Identity, ProfileUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const PASSWORD_MIN_CHARS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_password: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn validate_name(label: &str, value: &str) -> Option<String> {
    let t = value.trim();
    let n = t.chars().count();
    if n == 0 {
        return Some(format!("{} is required", label));
    }
    if n < NAME_MIN_CHARS {
        return Some(format!("{} must be at least {} characters", label, NAME_MIN_CHARS));
    }
    if n > NAME_MAX_CHARS {
        return Some(format!("{} must be less than {} characters", label, NAME_MAX_CHARS));
    }
    None
}

pub fn validate_first_name(value: &str) -> Option<String> {
    validate_name("First name", value)
}

pub fn validate_last_name(value: &str) -> Option<String> {
    validate_name("Last name", value)
}

/// Optional; when present it must look like `+?[1-9][0-9]{0,15}` once
/// whitespace is removed.
pub fn validate_phone(value: &str) -> Option<String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    let mut chars = digits.chars();
    let ok = matches!(chars.next(), Some('1'..='9'))
        && digits.len() <= 16
        && chars.all(|c| c.is_ascii_digit());
    if ok {
        None
    } else {
        Some("Please enter a valid phone number".to_string())
    }
}

pub fn validate_password(password: &str) -> Option<String> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Some(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_CHARS
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Some("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Some("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Some("Password must contain at least one number".to_string());
    }
    None
}

/// 0..=100 in steps of 25: length, lowercase, uppercase, digit.
pub fn password_strength(password: &str) -> u8 {
    let checks = [
        password.chars().count() >= PASSWORD_MIN_CHARS,
        password.chars().any(|c| c.is_ascii_lowercase()),
        password.chars().any(|c| c.is_ascii_uppercase()),
        password.chars().any(|c| c.is_ascii_digit()),
    ];
    checks.iter().filter(|c| **c).count() as u8 * 25
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

impl ProfileDraft {
    pub fn validate(&self) -> FieldErrors {
        FieldErrors {
            first_name: validate_first_name(&self.first_name),
            last_name: validate_last_name(&self.last_name),
            phone: validate_phone(&self.phone),
            ..Default::default()
        }
    }

    /// Auto-save ignores a draft with every field blank.
    pub fn is_blank(&self) -> bool {
        self.first_name.is_empty() && self.last_name.is_empty() && self.phone.is_empty()
    }

    fn to_update(&self, avatar_url: Option<String>, now: DateTime<Utc>) -> ProfileUpdate {
        ProfileUpdate {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            avatar_url,
            updated_at: now.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AvatarPolicy {
    pub bucket: String,
    pub max_bytes: u64,
}

pub fn validate_avatar(upload: &AvatarUpload, policy: &AvatarPolicy) -> Option<String> {
    if upload.bytes.len() as u64 > policy.max_bytes {
        return Some(format!(
            "Image size must be less than {}MB",
            policy.max_bytes / (1024 * 1024)
        ));
    }
    if !upload.content_type.starts_with("image/") {
        return Some("Please select a valid image file".to_string());
    }
    None
}

/// `avatars/{userId}-{millis}.{ext}`; the extension is whatever follows the
/// last dot of the original file name.
pub fn avatar_object_path(user_id: &str, file_name: &str, now: DateTime<Utc>) -> String {
    let ext = file_name.rsplit('.').next().unwrap_or(file_name);
    format!("avatars/{}-{}.{}", user_id, now.timestamp_millis(), ext)
}

#[derive(Debug)]
pub enum ProfileError {
    Validation(FieldErrors),
    InvalidCredentials,
    SamePassword,
    Backend(anyhow::Error),
}

impl ProfileError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::SamePassword => "validation_failed",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Backend(_) => "db_update_failed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Validation(_) => "Please fix the validation errors".to_string(),
            Self::InvalidCredentials => "Current password is incorrect".to_string(),
            Self::SamePassword => {
                "New password must be different from current password".to_string()
            }
            Self::Backend(e) => format!("{e:#}"),
        }
    }
}

impl From<anyhow::Error> for ProfileError {
    fn from(e: anyhow::Error) -> Self {
        Self::Backend(e)
    }
}

/// Validates everything up front and writes nothing unless all fields pass.
pub fn submit_profile(
    data: &dyn DataService,
    storage: &dyn FileStorage,
    identity: &Identity,
    draft: &ProfileDraft,
    avatar: Option<&AvatarUpload>,
    policy: &AvatarPolicy,
    now: DateTime<Utc>,
) -> Result<ProfileUpdate, ProfileError> {
    let mut errors = draft.validate();
    if let Some(upload) = avatar {
        errors.avatar = validate_avatar(upload, policy);
    }
    if !errors.is_empty() {
        return Err(ProfileError::Validation(errors));
    }

    let avatar_url = match avatar {
        Some(upload) => {
            let path = avatar_object_path(&identity.id, &upload.file_name, now);
            storage.upload(&policy.bucket, &path, &upload.content_type, &upload.bytes)?;
            Some(storage.public_url(&policy.bucket, &path))
        }
        None => None,
    };

    let update = draft.to_update(avatar_url, now);
    data.update_profile(&identity.id, &update)?;
    Ok(update)
}

/// Write performed when the auto-save window closes.
pub fn autosave_profile(
    data: &dyn DataService,
    identity: &Identity,
    draft: &ProfileDraft,
    now: DateTime<Utc>,
) -> Result<ProfileUpdate, ProfileError> {
    let errors = draft.validate();
    if !errors.is_empty() {
        return Err(ProfileError::Validation(errors));
    }
    let update = draft.to_update(None, now);
    data.update_profile(&identity.id, &update)?;
    Ok(update)
}

#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    pub current: String,
    pub new: String,
    pub confirm: String,
}

impl PasswordChange {
    pub fn validate(&self) -> FieldErrors {
        FieldErrors {
            current_password: self
                .current
                .is_empty()
                .then(|| "Current password is required".to_string()),
            new_password: validate_password(&self.new),
            confirm_password: (self.new != self.confirm)
                .then(|| "Passwords do not match".to_string()),
            ..Default::default()
        }
    }
}

pub fn change_password(
    auth: &dyn AuthService,
    identity: &Identity,
    change: &PasswordChange,
) -> Result<(), ProfileError> {
    let errors = change.validate();
    if !errors.is_empty() {
        return Err(ProfileError::Validation(errors));
    }
    if change.new == change.current {
        return Err(ProfileError::SamePassword);
    }
    if auth.sign_in(&identity.email, &change.current)?.is_none() {
        return Err(ProfileError::InvalidCredentials);
    }
    auth.update_password(&change.new)?;
    Ok(())
}
