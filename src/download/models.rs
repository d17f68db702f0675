//! 下载相关的数据模型定义。

use serde_json::Value;

use crate::base_system::json_extract::{JsonMap, pick_string};

/// 待处理的相册：地址总是绝对地址，标题可能要等打开相册页后才知道。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub url: String,
    pub title: Option<String>,
}

/// JSON 相册接口返回的一项（字段可能缺失，Id 可能是数字）。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlbumRecord {
    pub album_id: Option<String>,
    pub album_url: Option<String>,
    pub title: Option<String>,
}

impl AlbumRecord {
    pub fn from_json(map: &JsonMap) -> Self {
        Self {
            album_id: pick_string(map, &["AlbumId", "albumId", "Id"]),
            album_url: pick_string(map, &["AlbumUrl", "albumUrl", "Url"]),
            title: pick_string(map, &["Title", "title", "Name"]),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_json).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded,
    /// 目标文件大小与服务端声明一致，未重新下载
    Exists,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Exists => "exists",
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub albums: usize,
    pub downloaded: usize,
    pub existing: usize,
    pub skipped: usize,
    pub failed: usize,
}
