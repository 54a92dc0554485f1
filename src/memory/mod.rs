//! 记忆层：单次 attempt 的对话历史，跨进程的断点与产物文件

pub mod checkpoint;
pub mod conversation;

pub use checkpoint::{write_json_atomic, CheckpointRecord, CheckpointStore, StagedCheckpoint, CHECKPOINT_SUFFIX};
pub use conversation::{Message, MessageHistory, Role};
