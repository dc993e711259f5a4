use crate::role::Role;
use serde::Serialize;

pub struct NavigationEntry {
    pub icon: &'static str,
    pub label: &'static str,
    pub path: &'static str,
    /// Overrides exact path equality for the active check.
    pub is_active: Option<fn(&str) -> bool>,
    pub role_restricted: bool,
}

impl NavigationEntry {
    pub fn active_for(&self, current_path: &str) -> bool {
        match self.is_active {
            Some(pred) => pred(current_path),
            None => current_path == self.path,
        }
    }
}

fn take_attendance_active(path: &str) -> bool {
    path == "/take-attendance" || path.starts_with("/take-attendance/")
}

fn schedule_active(path: &str) -> bool {
    path == "/schedule" || path.starts_with("/sessions/")
}

pub static NAV_ENTRIES: &[NavigationEntry] = &[
    NavigationEntry {
        icon: "layout-dashboard",
        label: "Dashboard",
        path: "/",
        is_active: None,
        role_restricted: false,
    },
    NavigationEntry {
        icon: "user-check",
        label: "Take Attendance",
        path: "/take-attendance",
        is_active: Some(take_attendance_active),
        role_restricted: false,
    },
    NavigationEntry {
        icon: "calendar",
        label: "Schedule",
        path: "/schedule",
        is_active: Some(schedule_active),
        role_restricted: false,
    },
    NavigationEntry {
        icon: "users",
        label: "Students",
        path: "/students",
        is_active: None,
        role_restricted: false,
    },
    NavigationEntry {
        icon: "file-text",
        label: "Records",
        path: "/records",
        is_active: None,
        role_restricted: false,
    },
    NavigationEntry {
        icon: "clipboard-check",
        label: "Excuse Application",
        path: "/excuse-application",
        is_active: None,
        role_restricted: false,
    },
    NavigationEntry {
        icon: "calendar-range",
        label: "Academic Year",
        path: "/academic-year",
        is_active: None,
        role_restricted: false,
    },
    NavigationEntry {
        icon: "user-cog",
        label: "Accounts",
        path: "/accounts",
        is_active: None,
        role_restricted: true,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavItem {
    pub icon: &'static str,
    pub label: &'static str,
    pub path: &'static str,
    pub active: bool,
}

pub fn visible_items(role: Role, current_path: &str) -> Vec<NavItem> {
    NAV_ENTRIES
        .iter()
        .filter(|e| !e.role_restricted || role == Role::Admin)
        .map(|e| NavItem {
            icon: e.icon,
            label: e.label,
            path: e.path,
            active: e.active_for(current_path),
        })
        .collect()
}
