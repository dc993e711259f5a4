//! Role cache and role resolution for the signed-in identity.
//!
//! The resolver is an owned service: the daemon keeps exactly one per
//! workspace and hands it to whoever needs the current role. It keeps an
//! in-memory mirror of the `(userRole, userId)` pair next to the persistent
//! copy so repeated lookups never touch storage.

use crate::backend::{DataService, Identity};
use crate::kv::{PersistentCache, KEY_USER_ID, KEY_USER_ROLE};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Instructor,
    #[default]
    User,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "admin" => Some(Self::Admin),
            "instructor" => Some(Self::Instructor),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Instructor => "instructor",
            Self::User => "user",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Instructor => "Instructor",
            Self::User => "User",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Uninitialized,
    Cached(Role),
    Fetching { user_id: String, generation: u64 },
    Resolved(Role),
    Fallback(Role),
}

impl ResolutionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Cached(_) => "cached",
            Self::Fetching { .. } => "fetching",
            Self::Resolved(_) => "resolved",
            Self::Fallback(_) => "fallback",
        }
    }
}

/// Proof that a lookup was started for one identity transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub user_id: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The role is known without a lookup.
    Ready(Role),
    /// A lookup for this identity is already in flight.
    Pending,
    /// The caller must look the profile up and hand the result to `complete`.
    Fetch(FetchTicket),
}

/// Why a profile lookup did not yield a role.
#[derive(Debug)]
pub enum LookupFailure {
    Backend(anyhow::Error),
    MalformedRole(String),
}

impl std::fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backend(e) => write!(f, "{e:#}"),
            Self::MalformedRole(raw) => write!(f, "unknown role value {:?}", raw),
        }
    }
}

pub struct RoleResolver {
    cache: PersistentCache,
    mirror: Option<RoleRecord>,
    state: ResolutionState,
    /// `None` until the first transition; `Some(None)` after a signed-out one.
    last_identity: Option<Option<String>>,
    generation: u64,
    persist_fallback: bool,
}

impl RoleResolver {
    pub fn new(cache: PersistentCache) -> Self {
        let mirror = match (cache.get(KEY_USER_ROLE), cache.get(KEY_USER_ID)) {
            (Some(role), Some(user_id)) => Role::parse(&role).map(|role| RoleRecord { user_id, role }),
            _ => None,
        };
        Self {
            cache,
            mirror,
            state: ResolutionState::Uninitialized,
            last_identity: None,
            generation: 0,
            persist_fallback: true,
        }
    }

    pub fn with_persist_fallback(mut self, persist: bool) -> Self {
        self.persist_fallback = persist;
        self
    }

    pub fn set_persist_fallback(&mut self, persist: bool) {
        self.persist_fallback = persist;
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    #[cfg(test)]
    pub fn cached_record(&self) -> Option<&RoleRecord> {
        self.mirror.as_ref()
    }

    /// Role to show right now. While a lookup is in flight this is the safe
    /// default, never the previous identity's role.
    pub fn current_role(&self) -> Role {
        match &self.state {
            ResolutionState::Cached(r)
            | ResolutionState::Resolved(r)
            | ResolutionState::Fallback(r) => *r,
            ResolutionState::Uninitialized | ResolutionState::Fetching { .. } => Role::User,
        }
    }

    /// Cached role for `identity`, if the stored pair belongs to it.
    pub fn cached_role_for(&self, identity: &Identity) -> Option<Role> {
        self.mirror
            .as_ref()
            .filter(|rec| rec.user_id == identity.id)
            .map(|rec| rec.role)
    }

    /// Starts resolution for an identity transition. Repeated calls for the
    /// identity that was seen last do not start another lookup.
    pub fn begin(&mut self, identity: Option<&Identity>) -> Resolution {
        let incoming = identity.map(|i| i.id.clone());
        if self.last_identity.as_ref() == Some(&incoming) {
            return match &self.state {
                ResolutionState::Fetching { .. } => Resolution::Pending,
                _ => Resolution::Ready(self.current_role()),
            };
        }
        self.last_identity = Some(incoming);
        self.generation += 1;

        let Some(identity) = identity else {
            self.write_fallback(None);
            return Resolution::Ready(Role::User);
        };

        if let Some(role) = self.cached_role_for(identity) {
            tracing::debug!(user_id = %identity.id, role = role.as_str(), "role cache hit");
            self.state = ResolutionState::Cached(role);
            return Resolution::Ready(role);
        }

        self.state = ResolutionState::Fetching {
            user_id: identity.id.clone(),
            generation: self.generation,
        };
        Resolution::Fetch(FetchTicket {
            user_id: identity.id.clone(),
            generation: self.generation,
        })
    }

    /// Applies a lookup result. Results for an identity that is no longer
    /// current are dropped and `None` is returned.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        lookup: Result<Option<String>, LookupFailure>,
    ) -> Option<Role> {
        let current = matches!(
            &self.state,
            ResolutionState::Fetching { user_id, generation }
                if *generation == ticket.generation && *user_id == ticket.user_id
        );
        if !current {
            tracing::debug!(user_id = %ticket.user_id, "discarding stale role lookup");
            return None;
        }

        let parsed = lookup.and_then(|raw| match raw {
            None => Ok(Role::User),
            Some(s) if s.trim().is_empty() => Ok(Role::User),
            Some(s) => Role::parse(&s).ok_or(LookupFailure::MalformedRole(s)),
        });

        match parsed {
            Ok(role) => {
                self.write_record(RoleRecord {
                    user_id: ticket.user_id,
                    role,
                });
                self.state = ResolutionState::Resolved(role);
                Some(role)
            }
            Err(failure) => {
                tracing::error!(user_id = %ticket.user_id, error = %failure, "error fetching user role");
                self.write_fallback(Some(ticket.user_id));
                Some(Role::User)
            }
        }
    }

    /// `begin` plus a synchronous lookup against `data`.
    pub fn resolve(&mut self, identity: Option<&Identity>, data: &dyn DataService) -> Role {
        match self.begin(identity) {
            Resolution::Ready(role) => role,
            Resolution::Pending => self.current_role(),
            Resolution::Fetch(ticket) => {
                let lookup = data
                    .fetch_profile(&ticket.user_id)
                    .map(|row| row.role)
                    .map_err(LookupFailure::Backend);
                self.complete(ticket, lookup).unwrap_or_else(|| self.current_role())
            }
        }
    }

    /// Forgets the pair in memory and in storage (sign-out).
    pub fn clear(&mut self) {
        self.mirror = None;
        self.cache.clear(&[KEY_USER_ROLE, KEY_USER_ID]);
    }

    /// Drops the cached pair for `user_id` so the next transition refetches.
    pub fn invalidate(&mut self, user_id: &str) {
        if self.mirror.as_ref().map(|r| r.user_id == user_id).unwrap_or(false) {
            self.clear();
            self.last_identity = None;
            self.state = ResolutionState::Uninitialized;
        }
    }

    fn write_record(&mut self, record: RoleRecord) {
        // Mirror first so readers never see storage ahead of memory.
        self.mirror = Some(record.clone());
        self.cache.set(KEY_USER_ROLE, record.role.as_str());
        self.cache.set(KEY_USER_ID, &record.user_id);
    }

    fn write_fallback(&mut self, user_id: Option<String>) {
        self.state = ResolutionState::Fallback(Role::User);
        match user_id {
            Some(user_id) => {
                let record = RoleRecord {
                    user_id,
                    role: Role::User,
                };
                if self.persist_fallback {
                    self.write_record(record);
                } else {
                    self.mirror = Some(record);
                    self.cache.clear(&[KEY_USER_ROLE, KEY_USER_ID]);
                }
            }
            None => self.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        AttendanceStatus, NewAttendance, NewStudent, ProfileRow, ProfileUpdate, StudentRow,
    };
    use chrono::NaiveDate;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeProfiles {
        roles: RefCell<HashMap<String, Option<String>>>,
        calls: Cell<usize>,
        fail: Cell<bool>,
    }

    impl FakeProfiles {
        fn with(entries: &[(&str, Option<&str>)]) -> Self {
            let f = Self::default();
            for (id, role) in entries {
                f.roles
                    .borrow_mut()
                    .insert(id.to_string(), role.map(|s| s.to_string()));
            }
            f
        }
    }

    impl DataService for FakeProfiles {
        fn fetch_profile(&self, user_id: &str) -> anyhow::Result<ProfileRow> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                anyhow::bail!("network down");
            }
            let roles = self.roles.borrow();
            let Some(role) = roles.get(user_id) else {
                anyhow::bail!("not found");
            };
            Ok(ProfileRow {
                id: user_id.to_string(),
                role: role.clone(),
                ..Default::default()
            })
        }
        fn update_profile(&self, _: &str, _: &ProfileUpdate) -> anyhow::Result<()> {
            unimplemented!()
        }
        fn set_role(&self, _: &str, _: Role) -> anyhow::Result<()> {
            unimplemented!()
        }
        fn count_students(&self) -> anyhow::Result<i64> {
            unimplemented!()
        }
        fn insert_student(&self, _: &NewStudent) -> anyhow::Result<StudentRow> {
            unimplemented!()
        }
        fn list_students(&self) -> anyhow::Result<Vec<StudentRow>> {
            unimplemented!()
        }
        fn insert_attendance(&self, _: &NewAttendance) -> anyhow::Result<()> {
            unimplemented!()
        }
        fn attendance_between(
            &self,
            _: NaiveDate,
            _: NaiveDate,
        ) -> anyhow::Result<Vec<(NaiveDate, AttendanceStatus)>> {
            unimplemented!()
        }
    }

    fn ident(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            email: format!("{id}@example.com"),
        }
    }

    #[test]
    fn resolves_once_per_identity() {
        let data = FakeProfiles::with(&[("a", Some("admin"))]);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        let a = ident("a");
        assert_eq!(r.resolve(Some(&a), &data), Role::Admin);
        assert_eq!(r.resolve(Some(&a), &data), Role::Admin);
        assert_eq!(data.calls.get(), 1);
        assert_eq!(r.state(), &ResolutionState::Resolved(Role::Admin));
    }

    #[test]
    fn cached_pair_survives_a_new_resolver() {
        let data = FakeProfiles::with(&[("a", Some("instructor"))]);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        r.resolve(Some(&ident("a")), &data);
        let RoleResolver { cache, .. } = r;

        let mut reloaded = RoleResolver::new(cache);
        assert_eq!(reloaded.resolve(Some(&ident("a")), &data), Role::Instructor);
        assert_eq!(reloaded.state(), &ResolutionState::Cached(Role::Instructor));
        assert_eq!(data.calls.get(), 1);
    }

    #[test]
    fn switching_identity_never_leaks_previous_role() {
        let data = FakeProfiles::with(&[("a", Some("admin")), ("b", None)]);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        assert_eq!(r.resolve(Some(&ident("a")), &data), Role::Admin);

        let ticket = match r.begin(Some(&ident("b"))) {
            Resolution::Fetch(t) => t,
            other => panic!("expected fetch, got {other:?}"),
        };
        assert_eq!(r.current_role(), Role::User);
        assert_eq!(r.complete(ticket, Ok(None)), Some(Role::User));
        assert_eq!(r.cached_record().map(|c| c.user_id.as_str()), Some("b"));
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        let ticket_a = match r.begin(Some(&ident("a"))) {
            Resolution::Fetch(t) => t,
            other => panic!("expected fetch, got {other:?}"),
        };
        // Signed out before the lookup returned.
        assert_eq!(r.begin(None), Resolution::Ready(Role::User));
        assert_eq!(r.complete(ticket_a, Ok(Some("admin".into()))), None);
        assert_eq!(r.current_role(), Role::User);
        assert!(r.cached_record().is_none());
    }

    #[test]
    fn in_flight_lookup_is_not_duplicated() {
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        let a = ident("a");
        assert!(matches!(r.begin(Some(&a)), Resolution::Fetch(_)));
        assert_eq!(r.begin(Some(&a)), Resolution::Pending);
    }

    #[test]
    fn lookup_failure_falls_back_and_persists_pair() {
        let data = FakeProfiles::default();
        data.fail.set(true);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        assert_eq!(r.resolve(Some(&ident("a")), &data), Role::User);
        assert_eq!(data.calls.get(), 1);
        assert_eq!(r.state(), &ResolutionState::Fallback(Role::User));
        assert_eq!(r.cache.get(KEY_USER_ID).as_deref(), Some("a"));
        assert_eq!(r.cache.get(KEY_USER_ROLE).as_deref(), Some("user"));
    }

    #[test]
    fn fallback_can_stay_out_of_storage() {
        let data = FakeProfiles::default();
        data.fail.set(true);
        let mut r = RoleResolver::new(PersistentCache::in_memory()).with_persist_fallback(false);
        assert_eq!(r.resolve(Some(&ident("a")), &data), Role::User);
        assert_eq!(r.cache.get(KEY_USER_ID), None);
        assert_eq!(r.cached_role_for(&ident("a")), Some(Role::User));
    }

    #[test]
    fn malformed_role_is_a_lookup_failure() {
        let data = FakeProfiles::with(&[("a", Some("superuser"))]);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        assert_eq!(r.resolve(Some(&ident("a")), &data), Role::User);
        assert_eq!(r.state(), &ResolutionState::Fallback(Role::User));
    }

    #[test]
    fn sign_out_clears_cache() {
        let data = FakeProfiles::with(&[("a", Some("admin"))]);
        let mut r = RoleResolver::new(PersistentCache::in_memory());
        r.resolve(Some(&ident("a")), &data);
        assert_eq!(r.resolve(None, &data), Role::User);
        assert!(r.cached_record().is_none());
        assert_eq!(r.cache.get(KEY_USER_ROLE), None);
    }

    #[test]
    fn mismatched_stored_pair_is_a_miss() {
        let mut cache = PersistentCache::in_memory();
        cache.set(KEY_USER_ROLE, "admin");
        cache.set(KEY_USER_ID, "someone-else");
        let data = FakeProfiles::with(&[("b", Some("instructor"))]);
        let mut r = RoleResolver::new(cache);
        assert_eq!(r.resolve(Some(&ident("b")), &data), Role::Instructor);
        assert_eq!(data.calls.get(), 1);
    }
}
