/// Projects are identified by random v4 UUIDs, immutable after creation.
pub type ProjectId = uuid::Uuid;

/// Identifier of a single dispatched task (one run or continuation).
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
