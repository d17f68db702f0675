//! 已下载图片 ID 清单：纯文本，每行一个 ID，只追加。

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

/// 读取清单。文件不存在视为空集；空行忽略，行首尾空白去掉。
pub fn load(path: &Path) -> io::Result<HashSet<String>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// 创建父目录与空文件（已存在则不动）。
pub fn ensure(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

pub fn append(path: &Path, id: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{id}")?;
    Ok(())
}

/// 运行期间的清单视图：内存集合与文件同步增长。`path` 为空表示禁用。
#[derive(Debug, Default)]
pub struct Manifest {
    path: Option<PathBuf>,
    entries: HashSet<String>,
}

impl Manifest {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn open(path: PathBuf) -> io::Result<Self> {
        ensure(&path)?;
        let entries = load(&path)?;
        debug!("清单 {} 已有 {} 条", path.display(), entries.len());
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// 未记录过才写入；返回是否新写入。禁用时什么都不做。
    pub fn record(&mut self, id: &str) -> io::Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        if self.entries.contains(id) {
            return Ok(false);
        }
        append(path, id)?;
        self.entries.insert(id.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.txt")).unwrap().is_empty());
    }

    #[test]
    fn append_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("manifest.txt");
        ensure(&path).unwrap();
        assert!(path.exists());

        append(&path, "12345").unwrap();
        let set = load(&path).unwrap();
        assert!(set.contains("12345"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn load_ignores_blank_lines_and_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        fs::write(&path, "  1 \n\n2\r\n   \n").unwrap();
        let set = load(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("1") && set.contains("2"));
    }

    #[test]
    fn record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        let mut manifest = Manifest::open(path.clone()).unwrap();
        assert!(manifest.record("7").unwrap());
        assert!(!manifest.record("7").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "7\n");
        assert!(manifest.contains("7"));
    }

    #[test]
    fn disabled_manifest_records_nothing() {
        let mut manifest = Manifest::disabled();
        assert!(!manifest.is_enabled());
        assert!(!manifest.record("1").unwrap());
        assert!(!manifest.contains("1"));
    }
}
