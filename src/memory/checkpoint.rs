//! 断点存储与原子写入
//!
//! 断点文件位于 `<输出路径>.checkpoint.json`，内容为 `{"ideas": [...], "gen_idx": N}`：
//! 已归档的产物与下一个尚未尝试的 attempt 序号。写入分两步：先写同目录临时文件并 fsync（stage），
//! 再原子 rename 到目标路径（commit）。rename 之前进程被杀，旧断点（或无断点）保持不变。

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::core::AgentError;

pub const CHECKPOINT_SUFFIX: &str = ".checkpoint.json";

/// 恢复编排所需的最小状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    #[serde(rename = "ideas")]
    pub archive: Vec<Value>,
    #[serde(rename = "gen_idx")]
    pub next_attempt_index: usize,
}

/// 已写入临时文件、尚未生效的断点
#[derive(Debug)]
pub struct StagedCheckpoint {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedCheckpoint {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// 原子 rename 到目标路径；这是唯一改变磁盘上断点状态的一步
    pub fn commit(self) -> Result<(), AgentError> {
        self.temp
            .persist(&self.target)
            .map_err(|e| AgentError::Io(e.error))?;
        Ok(())
    }
}

/// 把内容写入与 target 同目录的临时文件并 fsync
fn stage_bytes(target: &Path, bytes: &[u8]) -> Result<NamedTempFile, AgentError> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// 以带缩进的 JSON 原子写入文件（UTF-8，末尾换行）
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AgentError> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    stage_bytes(path, text.as_bytes())?
        .persist(path)
        .map_err(|e| AgentError::Io(e.error))?;
    Ok(())
}

/// 断点存储
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// 与输出文件并列的断点文件
    pub fn for_output(output_path: &Path) -> Self {
        let mut name = output_path.as_os_str().to_owned();
        name.push(CHECKPOINT_SUFFIX);
        Self {
            path: PathBuf::from(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取断点；不存在返回 None，损坏时告警并返回 None
    pub fn load(&self) -> Option<CheckpointRecord> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read checkpoint");
                return None;
            }
        };
        match serde_json::from_str::<CheckpointRecord>(&data) {
            Ok(record) => {
                tracing::info!(
                    path = %self.path.display(),
                    archived = record.archive.len(),
                    next_attempt = record.next_attempt_index,
                    "Loaded checkpoint"
                );
                Some(record)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt checkpoint file ignored");
                None
            }
        }
    }

    /// 写入临时文件但不生效
    pub fn stage(&self, record: &CheckpointRecord) -> Result<StagedCheckpoint, AgentError> {
        let text = serde_json::to_string_pretty(record)?;
        Ok(StagedCheckpoint {
            temp: stage_bytes(&self.path, text.as_bytes())?,
            target: self.path.clone(),
        })
    }

    pub fn save(&self, record: &CheckpointRecord) -> Result<(), AgentError> {
        self.stage(record)?.commit()?;
        tracing::debug!(
            path = %self.path.display(),
            archived = record.archive.len(),
            next_attempt = record.next_attempt_index,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// 运行成功结束后删除断点
    pub fn clear(&self) -> Result<(), AgentError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Removed checkpoint file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(n: usize) -> CheckpointRecord {
        CheckpointRecord {
            archive: (0..n).map(|i| json!({"Name": format!("idea_{i}")})).collect(),
            next_attempt_index: n,
        }
    }

    #[test]
    fn test_path_next_to_output() {
        let store = CheckpointStore::for_output(Path::new("out/topic.json"));
        assert_eq!(store.path(), Path::new("out/topic.json.checkpoint.json"));
    }

    #[test]
    fn test_save_load_and_wire_format() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::for_output(&dir.path().join("ideas.json"));
        assert_eq!(store.load(), None);

        store.save(&record(2)).unwrap();
        assert_eq!(store.load(), Some(record(2)));

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["gen_idx"], 2);
        assert_eq!(raw["ideas"][1]["Name"], "idea_1");

        store.clear().unwrap();
        assert!(!store.path().exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_uncommitted_stage_leaves_previous_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::for_output(&dir.path().join("ideas.json"));
        store.save(&record(1)).unwrap();

        let staged = store.stage(&record(3)).unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        assert!(temp_path.exists());
        assert_ne!(temp_path, store.path());
        // 模拟 rename 前被中断
        assert_eq!(store.load(), Some(record(1)));
        drop(staged);
        assert!(!temp_path.exists());
        assert_eq!(store.load(), Some(record(1)));

        store.stage(&record(3)).unwrap().commit().unwrap();
        assert_eq!(store.load(), Some(record(3)));
    }

    #[test]
    fn test_corrupt_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::for_output(&dir.path().join("ideas.json"));
        fs::write(store.path(), "{\"ideas\": [").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_write_json_atomic_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json_atomic(&path, &json!({"b": 1, "a": [1, 2]})).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("}\n"));
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["a"][1], 2);
    }
}
