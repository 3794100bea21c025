use uuid::Uuid;

/// Identity of one browser tab in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub room_id: String,
    /// This client's identifier; peers compare against it for roles.
    pub attendee_id: String,
    /// Secret token guarding the room slot; only ever sent with `discover`.
    pub session_id: String,
}

impl SessionConfig {
    /// Fresh identity. An empty `room_id` starts a new room.
    pub fn new(room_id: &str) -> Self {
        let room_id = if room_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            room_id.to_string()
        };
        Self {
            room_id,
            attendee_id: Uuid::new_v4().to_string(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_ids(room_id: impl Into<String>, attendee_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            attendee_id: attendee_id.into(),
            session_id: session_id.into(),
        }
    }
}
