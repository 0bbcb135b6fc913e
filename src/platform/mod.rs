pub mod telegram;

/// A greeting command received from any platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreetingEvent {
    /// Platform-assigned user ID
    pub user_id: u64,
    /// The user's handle, if they have one
    pub username: Option<String>,
}
