//! Viewport classification against a media-width breakpoint.

use serde::Serialize;
use std::sync::mpsc::Sender;
#[cfg(test)]
use std::sync::mpsc::{channel, Receiver};

pub const DESKTOP_QUERY: &str = "(min-width: 768px)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthQuery {
    MinWidth(u32),
    MaxWidth(u32),
}

impl WidthQuery {
    /// Parses `(min-width: 768px)` / `(max-width: 767px)`; anything else is
    /// unsupported.
    pub fn parse(query: &str) -> Option<Self> {
        let compact = compact(query);
        let inner = compact.strip_prefix('(')?.strip_suffix(')')?;
        let (feature, value) = inner.split_once(':')?;
        let px = value.strip_suffix("px")?.parse::<u32>().ok()?;
        match feature {
            "min-width" => Some(Self::MinWidth(px)),
            "max-width" => Some(Self::MaxWidth(px)),
            _ => None,
        }
    }

    pub fn matches(self, width: u32) -> bool {
        match self {
            Self::MinWidth(px) => width >= px,
            Self::MaxWidth(px) => width <= px,
        }
    }
}

fn compact(query: &str) -> String {
    query
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Value used when no viewport can be consulted: desktop for a
/// `min-width: 768px` query, otherwise false.
pub fn assumed_without_viewport(query: &str) -> bool {
    compact(query).contains("min-width:768px")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presentation {
    FixedSidebar,
    Drawer,
}

impl Presentation {
    pub fn for_desktop(is_desktop: bool) -> Self {
        if is_desktop {
            Self::FixedSidebar
        } else {
            Self::Drawer
        }
    }
}

/// Holds the current match state of one query and fans changes out to
/// subscribers. A subscriber unsubscribes by dropping its receiver.
pub struct MediaQueryMediator {
    query: String,
    parsed: Option<WidthQuery>,
    matches: bool,
    subscribers: Vec<Sender<bool>>,
}

impl MediaQueryMediator {
    /// The initial value is decided here, never patched up later.
    pub fn observe(query: &str, viewport_width: Option<u32>) -> Self {
        let parsed = WidthQuery::parse(query);
        let matches = match (parsed, viewport_width) {
            (Some(q), Some(w)) => q.matches(w),
            _ => assumed_without_viewport(query),
        };
        Self {
            query: query.to_string(),
            parsed,
            matches,
            subscribers: Vec::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self) -> bool {
        self.matches
    }

    pub fn presentation(&self) -> Presentation {
        Presentation::for_desktop(self.matches)
    }

    #[cfg(test)]
    pub fn subscribe(&mut self) -> Receiver<bool> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Re-evaluates after a viewport change. Returns the new value when it
    /// flipped.
    pub fn viewport_changed(&mut self, width: u32) -> Option<bool> {
        let next = match self.parsed {
            Some(q) => q.matches(width),
            None => return None,
        };
        if next == self.matches {
            return None;
        }
        self.matches = next;
        self.subscribers.retain(|tx| tx.send(next).is_ok());
        Some(next)
    }
}
