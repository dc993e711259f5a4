use crate::kv::{PersistentCache, KEY_SIDEBAR_COLLAPSED};

/// Collapsed/expanded flag of the navigation sidebar. Independent of the
/// signed-in identity; it survives sign-out.
pub struct CollapseState {
    cache: PersistentCache,
    collapsed: bool,
}

impl CollapseState {
    pub fn load(cache: PersistentCache) -> Self {
        let collapsed = cache
            .get(KEY_SIDEBAR_COLLAPSED)
            .and_then(|raw| serde_json::from_str::<bool>(&raw).ok())
            .unwrap_or(false);
        Self { cache, collapsed }
    }

    pub fn collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn toggle(&mut self) -> bool {
        self.set(!self.collapsed);
        self.collapsed
    }

    pub fn set(&mut self, value: bool) {
        self.collapsed = value;
        let raw = if value { "true" } else { "false" };
        self.cache.set(KEY_SIDEBAR_COLLAPSED, raw);
    }
}
