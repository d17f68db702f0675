//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（AlbumItem / AlbumRecord / DownloadResult）
//! - `auth`：账号查询与表单登录
//! - `album_list`：相册发现（HTML 列表页 + JSON 分页兜底）
//! - `manifest`：已下载图片 ID 清单
//! - `downloader`：相册/图片下载主流程编排

pub mod album_list;
pub mod auth;
pub mod downloader;
pub mod manifest;
pub mod models;

#[cfg(test)]
pub(crate) mod test_support;
