use uuid::Uuid;

pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Opaque share code handed to a household for linking chat users.
pub fn new_share_code() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
