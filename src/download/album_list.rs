//! 相册发现：先解析相册列表页，拿不到再退回 JSON 分页接口。

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

use super::models::{AlbumItem, AlbumRecord};
use crate::album_parser::extract::{extract_album_links, is_login_page};
use crate::album_parser::url_utils::normalize;
use crate::base_system::json_extract::non_empty_array;
use crate::network_parser::transport::{FetchError, Transport};

pub const ALBUMS_JSON_PATH: &str = "/bilder/GetAlbumsAsJson";
pub const DEBUG_HTML_FILE: &str = "album-list.html";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No albums found. If you have multiple kindergartens, pass --kid or --kid-name.")]
    NoAlbums,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid album url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy)]
pub struct JsonPaging {
    pub page_size: usize,
    /// 每页之间的等待
    pub delay: Duration,
}

fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// 分页拉取 JSON 相册列表，按首次出现顺序返回。
///
/// 停止条件：响应不是非空数组、本页没有新相册、本页条数少于 `page_size`。
/// 以 AlbumId 去重，所以服务端反复返回同一页时也能终止。
pub fn fetch_albums_json(
    transport: &dyn Transport,
    album_url: &Url,
    paging: JsonPaging,
) -> Result<Vec<AlbumRecord>, DiscoveryError> {
    let endpoint = album_url.join(ALBUMS_JSON_PATH)?;
    let page_size = paging.page_size.max(1);

    let mut albums = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut skip = 0usize;

    loop {
        let value = transport.get_json(
            endpoint.as_str(),
            &[
                ("take", page_size.to_string()),
                ("skip", skip.to_string()),
                ("noCache", now_millis().to_string()),
            ],
        )?;
        let Some(items) = non_empty_array(&value) else {
            debug!("skip={} 返回空页，停止翻页", skip);
            break;
        };

        let mut fresh = 0usize;
        for item in items {
            let record = AlbumRecord::from_value(item);
            // 缺少 AlbumId 的项共享同一个空键，只保留第一条
            let key = record.album_id.clone().unwrap_or_default();
            if !seen.insert(key) {
                continue;
            }
            albums.push(record);
            fresh += 1;
        }
        debug!("skip={} 收到 {} 项，新增 {} 项", skip, items.len(), fresh);

        if fresh == 0 || items.len() < page_size {
            break;
        }
        skip += items.len();
        if !paging.delay.is_zero() {
            thread::sleep(paging.delay);
        }
    }

    Ok(albums)
}

/// 一种相册发现方式。
pub trait AlbumSource {
    fn name(&self) -> &'static str;

    fn discover(&self, transport: &dyn Transport) -> Result<Vec<AlbumItem>, DiscoveryError>;
}

/// 解析相册列表页里的 `/bilder/albumet/` 链接。
#[derive(Debug, Clone)]
pub struct HtmlAlbumList {
    pub album_url: Url,
    /// 设置后，列表页解析不到相册时把页面写到这个目录
    pub debug_dump_dir: Option<PathBuf>,
}

impl AlbumSource for HtmlAlbumList {
    fn name(&self) -> &'static str {
        "html"
    }

    fn discover(&self, transport: &dyn Transport) -> Result<Vec<AlbumItem>, DiscoveryError> {
        let html = transport.get_text(self.album_url.as_str())?;
        let links = extract_album_links(&html, &self.album_url);
        if !links.is_empty() {
            return Ok(links
                .into_iter()
                .map(|url| AlbumItem { url, title: None })
                .collect());
        }

        if let Some(dir) = &self.debug_dump_dir {
            let path = dir.join(DEBUG_HTML_FILE);
            match fs::create_dir_all(dir).and_then(|_| fs::write(&path, &html)) {
                Ok(()) => println!("Saved album list HTML to {}", path.display()),
                Err(e) => warn!("写入调试页面失败 {}: {}", path.display(), e),
            }
        }
        if is_login_page(&html) {
            println!(
                "Album list looks like a login page. Cookies or credentials may be missing or expired."
            );
        }
        println!("No albums found in HTML, falling back to JSON album list.");
        Ok(Vec::new())
    }
}

/// JSON 分页接口；`AlbumUrl` 相对相册列表页解析，无法解析的项丢弃。
#[derive(Debug, Clone)]
pub struct JsonAlbumList {
    pub album_url: Url,
    pub paging: JsonPaging,
}

impl AlbumSource for JsonAlbumList {
    fn name(&self) -> &'static str {
        "json"
    }

    fn discover(&self, transport: &dyn Transport) -> Result<Vec<AlbumItem>, DiscoveryError> {
        let records = fetch_albums_json(transport, &self.album_url, self.paging)?;
        Ok(records
            .into_iter()
            .filter_map(|rec| {
                let url = normalize(rec.album_url.as_deref()?, &self.album_url)?;
                Some(AlbumItem {
                    url: url.into(),
                    title: rec.title,
                })
            })
            .collect())
    }
}

/// 依次尝试各个来源，第一个给出非空结果的胜出。全部为空时报错。
pub fn discover_albums(
    sources: &[Box<dyn AlbumSource>],
    transport: &dyn Transport,
) -> Result<Vec<AlbumItem>, DiscoveryError> {
    for source in sources {
        let albums = source.discover(transport)?;
        if !albums.is_empty() {
            info!("通过 {} 找到 {} 个相册", source.name(), albums.len());
            return Ok(albums);
        }
        debug!("{} 没有找到相册", source.name());
    }
    Err(DiscoveryError::NoAlbums)
}
