//! Remote method names and common result shapes
//!
//! Each remote method takes a JSON object as input and answers with a
//! [`MethodOutput`] envelope. A method that ran but could not do what was
//! asked reports `success: false` together with a message.

use serde::{Deserialize, Serialize};

/// Run a query against a document
pub const QUERY_DOCUMENT: &str = "documents.query";

/// Find downloads
pub const FIND_DOWNLOADS: &str = "downloads.find";
/// Get one download
pub const GET_DOWNLOAD: &str = "downloads.get";
/// Start a download
pub const CREATE_DOWNLOAD: &str = "downloads.create";
/// Pause a download
pub const PAUSE_DOWNLOAD: &str = "downloads.pause";
/// Resume a download
pub const RESUME_DOWNLOAD: &str = "downloads.resume";
/// Cancel a download
pub const CANCEL_DOWNLOAD: &str = "downloads.cancel";
/// Remove a download from history
pub const REMOVE_DOWNLOAD: &str = "downloads.remove";

/// Describe the browser
pub const GET_BROWSER_INFO: &str = "info.get_browser";
/// Describe the platform the browser runs on
pub const GET_PLATFORM_INFO: &str = "info.get_platform";

/// Check that the server answers
pub const PING: &str = "ping";

/// Find tabs
pub const FIND_TABS: &str = "tabs.find";
/// Get one tab
pub const GET_TAB: &str = "tabs.get";
/// Get the current tab
pub const GET_CURRENT_TAB: &str = "tabs.get_current";
/// Open a tab
pub const CREATE_TAB: &str = "tabs.create";
/// Load a URL into a tab
pub const LOAD_TAB: &str = "tabs.load";
/// Reload a tab
pub const RELOAD_TAB: &str = "tabs.reload";
/// Activate a tab
pub const ACTIVATE_TAB: &str = "tabs.activate";
/// Deactivate a tab
pub const DEACTIVATE_TAB: &str = "tabs.deactivate";
/// Mute a tab
pub const MUTE_TAB: &str = "tabs.mute";
/// Unmute a tab
pub const UNMUTE_TAB: &str = "tabs.unmute";
/// Pin a tab
pub const PIN_TAB: &str = "tabs.pin";
/// Unpin a tab
pub const UNPIN_TAB: &str = "tabs.unpin";
/// Move a tab
pub const MOVE_TAB: &str = "tabs.move";
/// Discard a tab
pub const DISCARD_TAB: &str = "tabs.discard";
/// Close a tab
pub const REMOVE_TAB: &str = "tabs.remove";

/// Find windows
pub const FIND_WINDOWS: &str = "windows.find";
/// Get one window
pub const GET_WINDOW: &str = "windows.get";
/// Get the current window
pub const GET_CURRENT_WINDOW: &str = "windows.get_current";
/// Open a window
pub const CREATE_WINDOW: &str = "windows.create";
/// Move a window
pub const MOVE_WINDOW: &str = "windows.move";
/// Resize a window
pub const RESIZE_WINDOW: &str = "windows.resize";
/// Minimize a window
pub const MINIMIZE_WINDOW: &str = "windows.minimize";
/// Maximize a window
pub const MAXIMIZE_WINDOW: &str = "windows.maximize";
/// Make a window fullscreen
pub const FULLSCREEN_WINDOW: &str = "windows.fullscreen";
/// Restore a window
pub const RESTORE_WINDOW: &str = "windows.restore";
/// Focus a window
pub const FOCUS_WINDOW: &str = "windows.focus";
/// Unfocus a window
pub const UNFOCUS_WINDOW: &str = "windows.unfocus";
/// Close a window
pub const REMOVE_WINDOW: &str = "windows.remove";

/// Every method name the server recognizes
pub const ALL_METHODS: &[&str] = &[
    QUERY_DOCUMENT,
    FIND_DOWNLOADS,
    GET_DOWNLOAD,
    CREATE_DOWNLOAD,
    PAUSE_DOWNLOAD,
    RESUME_DOWNLOAD,
    CANCEL_DOWNLOAD,
    REMOVE_DOWNLOAD,
    GET_BROWSER_INFO,
    GET_PLATFORM_INFO,
    PING,
    FIND_TABS,
    GET_TAB,
    GET_CURRENT_TAB,
    CREATE_TAB,
    LOAD_TAB,
    RELOAD_TAB,
    ACTIVATE_TAB,
    DEACTIVATE_TAB,
    MUTE_TAB,
    UNMUTE_TAB,
    PIN_TAB,
    UNPIN_TAB,
    MOVE_TAB,
    DISCARD_TAB,
    REMOVE_TAB,
    FIND_WINDOWS,
    GET_WINDOW,
    GET_CURRENT_WINDOW,
    CREATE_WINDOW,
    MOVE_WINDOW,
    RESIZE_WINDOW,
    MINIMIZE_WINDOW,
    MAXIMIZE_WINDOW,
    FULLSCREEN_WINDOW,
    RESTORE_WINDOW,
    FOCUS_WINDOW,
    UNFOCUS_WINDOW,
    REMOVE_WINDOW,
];

/// Input for methods that take no arguments; encodes as `{}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoInput {}

/// Result envelope shared by all methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct MethodOutput<T> {
    /// Whether the method did what was asked
    #[serde(default)]
    pub success: bool,
    /// Failure description, empty on success
    #[serde(default)]
    pub message: String,
    /// Method result, defaulted when absent
    #[serde(default)]
    pub result: T,
}

impl<T> MethodOutput<T> {
    /// Split the envelope into the result or the failure message
    pub fn into_result(self) -> Result<T, String> {
        if self.success {
            Ok(self.result)
        } else {
            Err(self.message)
        }
    }
}

/// Browser running the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserInfo {
    /// Browser name
    pub name: String,
    /// Browser version
    pub version: String,
}

/// Platform the browser runs on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Operating system
    pub os: String,
    /// Processor architecture
    pub arch: String,
}
