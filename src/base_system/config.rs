//! YAML 配置文件的读取、缺省合并与带注释生成。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

/// 字段名与写入配置文件时附带的注释。
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    fn fields() -> &'static [FieldMeta];

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// 读取配置；文件不存在时按默认值生成带注释的文件。
///
/// 路径优先级：`config_path` > `base_dir/FILE_NAME` > `./FILE_NAME`。
/// 用户文件缺少的键用默认值补齐，并回写文件，方便用户发现新增选项。
/// 不在这里调用 `validate`：调用方叠加命令行参数后再校验。
pub fn load_or_create<T: ConfigSpec>(
    config_path: Option<&Path>,
    base_dir: Option<&Path>,
) -> Result<T, ConfigError> {
    let path = match (config_path, base_dir) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(base)) => base.join(T::FILE_NAME),
        (None, None) => PathBuf::from(T::FILE_NAME),
    };

    if !path.exists() {
        let config = T::default();
        write_with_comments(&config, &path)?;
        return Ok(config);
    }

    let user = read_yaml(&path)?;
    let missing = missing_fields::<T>(&user);

    let mut merged =
        serde_yaml::to_value(T::default()).map_err(|e| ConfigError::Validation(e.to_string()))?;
    merge_values(&mut merged, user);
    let config: T =
        serde_yaml::from_value(merged).map_err(|e| ConfigError::Validation(e.to_string()))?;

    if !missing.is_empty() {
        tracing::debug!("配置文件缺少字段 {:?}，已用默认值补齐", missing);
        write_with_comments(&config, &path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = render_with_comments(config)?;
    fs::write(path, text).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// 按 `fields()` 的顺序输出，每个键前面写一行 `# 注释`。
pub fn render_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(map) =
        serde_yaml::to_value(config).map_err(|e| ConfigError::Validation(e.to_string()))?
    else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        for line in field.description.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        let key = Value::String(field.name.to_string());
        let value = map.get(&key).cloned().unwrap_or(Value::Null);
        let single = Mapping::from_iter([(key, value)]);
        let rendered = serde_yaml::to_string(&single)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        out.push_str(rendered.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn missing_fields<T: ConfigSpec>(user: &Value) -> Vec<&'static str> {
    let Value::Mapping(map) = user else {
        return T::fields().iter().map(|f| f.name).collect();
    };
    T::fields()
        .iter()
        .filter(|f| !map.contains_key(Value::String(f.name.to_string())))
        .map(|f| f.name)
        .collect()
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        // 用户写了 `key:` 但没给值时保留默认值
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        count: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "demo".to_string(),
                count: 3,
            }
        }
    }

    impl ConfigSpec for Sample {
        const FILE_NAME: &'static str = "sample.yml";

        fn fields() -> &'static [FieldMeta] {
            static FIELDS: [FieldMeta; 2] = [
                FieldMeta {
                    name: "name",
                    description: "名称",
                },
                FieldMeta {
                    name: "count",
                    description: "数量",
                },
            ];
            &FIELDS
        }

        fn validate(&self) -> Result<(), ConfigError> {
            if self.count == 0 {
                return Err(ConfigError::Validation("count must be >= 1".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn creates_commented_file_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Sample = load_or_create(None, Some(dir.path())).unwrap();
        assert_eq!(cfg, Sample::default());

        let text = fs::read_to_string(dir.path().join("sample.yml")).unwrap();
        assert!(text.contains("# 名称\nname: demo"));
        assert!(text.contains("# 数量\ncount: 3"));
    }

    #[test]
    fn fills_missing_keys_and_keeps_user_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yml");
        fs::write(&path, "count: 9\n").unwrap();

        let cfg: Sample = load_or_create(Some(&path), None).unwrap();
        assert_eq!(cfg.count, 9);
        assert_eq!(cfg.name, "demo");

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("name: demo"));
        assert!(text.contains("count: 9"));
    }

    #[test]
    fn broken_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "name: [unclosed\n").unwrap();

        let err = load_or_create::<Sample>(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_values_load_and_are_left_to_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yml");
        fs::write(&path, "name: x\ncount: 0\n").unwrap();

        let mut cfg: Sample = load_or_create(Some(&path), None).unwrap();
        assert_eq!(cfg.count, 0);
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        cfg.count = 2;
        assert!(cfg.validate().is_ok());
    }
}
