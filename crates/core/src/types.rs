/// Jobs, keys, and owners are all identified by opaque UUIDs, generated
/// at creation and immutable thereafter.
pub type JobId = uuid::Uuid;

/// Identifier of an [`EncryptionKey`](crate::vault) record in the vault.
pub type KeyId = uuid::Uuid;

/// Identity of a submitting principal. Optional on jobs and keys.
pub type OwnerId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
