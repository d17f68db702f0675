//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `kidplan-downloader.yml` 的字段元信息。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::config::{ConfigError, ConfigSpec, FieldMeta};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 站点配置
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_album_url")]
    pub album_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // 网络配置
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    // 保存配置
    #[serde(default = "default_out_dir")]
    pub out_dir: String,
    #[serde(default)]
    pub limit_per_album: usize,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    #[serde(default = "default_true")]
    pub dedupe_urls: bool,
    #[serde(default = "default_false")]
    pub fast_skip: bool,
    #[serde(default = "default_false")]
    pub dry_run: bool,

    // 解析配置
    #[serde(default = "default_true")]
    pub inline_url_recovery: bool,

    // 调试
    #[serde(default = "default_false")]
    pub debug_html: bool,
    #[serde(default = "default_false")]
    pub verbose: bool,

    // 账号配置
    #[serde(default = "default_env_file")]
    pub env_file: String,
    #[serde(default = "default_username_key")]
    pub username_key: String,
    #[serde(default = "default_password_key")]
    pub password_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            album_url: default_album_url(),
            user_agent: default_user_agent(),
            delay_secs: default_delay_secs(),
            page_size: default_page_size(),
            download_timeout_secs: default_download_timeout_secs(),
            out_dir: default_out_dir(),
            limit_per_album: 0,
            manifest_path: default_manifest_path(),
            dedupe_urls: default_true(),
            fast_skip: default_false(),
            dry_run: default_false(),
            inline_url_recovery: default_true(),
            debug_html: default_false(),
            verbose: default_false(),
            env_file: default_env_file(),
            username_key: default_username_key(),
            password_key: default_password_key(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "kidplan-downloader.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 18] = [
            FieldMeta {
                name: "base_url",
                description: "Kidplan 站点根地址（账号查询与登录接口都基于它）",
            },
            FieldMeta {
                name: "album_url",
                description: "相册列表页地址",
            },
            FieldMeta {
                name: "user_agent",
                description: "所有请求使用的 User-Agent",
            },
            FieldMeta {
                name: "delay_secs",
                description: "每次请求前的固定间隔（秒），可为小数",
            },
            FieldMeta {
                name: "page_size",
                description: "JSON 相册接口每页数量",
            },
            FieldMeta {
                name: "download_timeout_secs",
                description: "单张图片下载的超时时间（秒）",
            },
            FieldMeta {
                name: "out_dir",
                description: "图片保存目录，每个相册一个子目录",
            },
            FieldMeta {
                name: "limit_per_album",
                description: "每个相册最多下载的图片数，0 表示不限制",
            },
            FieldMeta {
                name: "manifest_path",
                description: "已下载图片 ID 清单文件，留空则不记录",
            },
            FieldMeta {
                name: "dedupe_urls",
                description: "本次运行内跨相册按 URL 去重",
            },
            FieldMeta {
                name: "fast_skip",
                description: "目标文件存在即跳过，不校验大小",
            },
            FieldMeta {
                name: "dry_run",
                description: "只打印将要下载的内容，不实际下载",
            },
            FieldMeta {
                name: "inline_url_recovery",
                description: "额外用正则从脚本/JSON 文本中找回图片地址（可能误报）",
            },
            FieldMeta {
                name: "debug_html",
                description: "找不到相册时把列表页 HTML 保存到输出目录",
            },
            FieldMeta {
                name: "verbose",
                description: "打印每个请求和下载动作",
            },
            FieldMeta {
                name: "env_file",
                description: ".env 文件路径（环境变量中没有账号密码时读取）",
            },
            FieldMeta {
                name: "username_key",
                description: "环境变量 / .env 中用户名的键",
            },
            FieldMeta {
                name: "password_key",
                description: "环境变量 / .env 中密码的键",
            },
        ];
        &FIELDS
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Validation("page_size must be >= 1".to_string()));
        }
        if self.delay_secs < 0.0 || Duration::try_from_secs_f64(self.delay_secs).is_err() {
            return Err(ConfigError::Validation(format!(
                "delay_secs must be a non-negative number of seconds, got {}",
                self.delay_secs
            )));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "download_timeout_secs must be >= 1".to_string(),
            ));
        }
        for (name, raw) in [("base_url", &self.base_url), ("album_url", &self.album_url)] {
            Url::parse(raw)
                .map_err(|e| ConfigError::Validation(format!("{name} '{raw}' is not a url: {e}")))?;
        }
        Ok(())
    }
}

impl Config {
    pub fn out_dir(&self) -> PathBuf {
        PathBuf::from(&self.out_dir)
    }

    /// 清单路径；配置为空字符串时不使用清单。
    pub fn manifest_path(&self) -> Option<PathBuf> {
        let trimmed = self.manifest_path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    }

    /// 未经 `validate` 的超大值饱和为 `Duration::MAX`。
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// 把任意标题转成只含 ASCII 字母数字和 `-` 的目录名。
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "album".to_string()
    } else {
        slug.to_string()
    }
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://app.kidplan.com".to_string()
}

fn default_album_url() -> String {
    "https://app.kidplan.com/bilder/album".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_delay_secs() -> f64 {
    0.2
}

fn default_page_size() -> usize {
    50
}

fn default_download_timeout_secs() -> u64 {
    60
}

fn default_out_dir() -> String {
    "kidplan-albums".to_string()
}

fn default_manifest_path() -> String {
    "kidplan-manifest.txt".to_string()
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_username_key() -> String {
    "KIDPLAN_USER".to_string()
}

fn default_password_key() -> String {
    "KIDPLAN_PASS".to_string()
}
