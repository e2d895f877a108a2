//! Side-effect surfaces the session manager drives but does not own:
//! navigation and user-visible notifications.

#[cfg(test)]
use std::sync::Mutex;

use tracing::{info, warn};

/// Screen shown to a signed-in user after login or signup.
pub const HOME_PATH: &str = "/home";
/// Anonymous landing screen shown after logout.
pub const LANDING_PATH: &str = "/";

pub const MSG_LOGIN_OK: &str = "Login successful!";
pub const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const MSG_LOGIN_FAILED: &str = "Login failed. Please try again.";
pub const MSG_SIGNUP_OK: &str = "Account created successfully!";
pub const MSG_SIGNUP_FAILED: &str = "Could not create your account. Please try again.";
pub const MSG_LOGOUT_OK: &str = "Logged out successfully";

/// External router. The manager only requests transitions.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// External toast/alert mechanism.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Headless navigator for the server: there is no router, so requests are logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, path: &str) {
        info!("Navigate to {path}");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn success(&self, message: &str) {
        info!("Notify: {message}");
    }

    fn error(&self, message: &str) {
        warn!("Notify: {message}");
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Keeps every requested path and notice, in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct Recorder {
    paths: Mutex<Vec<String>>,
    notices: Mutex<Vec<Notice>>,
}

#[cfg(test)]
impl Recorder {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.notices().pop()
    }

    fn push_notice(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

#[cfg(test)]
impl Navigator for Recorder {
    fn navigate(&self, path: &str) {
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path.to_string());
        }
    }
}

#[cfg(test)]
impl Notifier for Recorder {
    fn success(&self, message: &str) {
        self.push_notice(Notice::Success(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push_notice(Notice::Error(message.to_string()));
    }
}
