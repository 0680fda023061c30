/// A row from `sz_message_queue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message_id: i64,
    pub message_text: String,
    pub lease_id: Option<String>,
    pub lease_expiration: Option<i64>,
}
