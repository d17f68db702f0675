use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};
use url::Url;

use super::manifest::Manifest;
use super::models::{AlbumItem, DownloadResult, DownloadStatus};
use crate::album_parser::extract::{extract_image_urls, extract_title};
use crate::album_parser::url_utils::{canonicalize_image_url, extract_image_id};
use crate::base_system::context::{Config, slugify};
use crate::network_parser::transport::{FetchError, Transport};

const CHUNK_SIZE: usize = 256 * 1024;
const FALLBACK_EXT: &str = ".jpg";

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub out_dir: PathBuf,
    /// 每个相册页请求、每张未跳过的图片之前都会等待
    pub delay: Duration,
    /// 每个相册最多处理的图片数，0 表示不限
    pub limit: usize,
    pub dedupe_urls: bool,
    pub fast_skip: bool,
    pub dry_run: bool,
    pub inline_url_recovery: bool,
    pub verbose: bool,
}

impl DownloadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            out_dir: config.out_dir(),
            delay: config.delay(),
            limit: config.limit_per_album,
            dedupe_urls: config.dedupe_urls,
            fast_skip: config.fast_skip,
            dry_run: config.dry_run,
            inline_url_recovery: config.inline_url_recovery,
            verbose: config.verbose,
        }
    }
}

/// 一次运行的可变状态：清单、本次已见过的图片地址、计数。
#[derive(Debug, Default)]
pub struct RunContext {
    pub manifest: Manifest,
    pub seen_urls: HashSet<String>,
    pub result: DownloadResult,
}

impl RunContext {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            ..Self::default()
        }
    }
}

/// 流式下载到 `dest`。
///
/// 服务端给出 content-length 且本地同名文件大小一致时直接返回 `Exists`，否则覆盖写入。
pub fn download_file(
    transport: &dyn Transport,
    url: &str,
    dest: &Path,
) -> Result<DownloadStatus, FetchError> {
    let mut body = transport.open_stream(url)?;
    if let Some(total) = body.content_length
        && fs::metadata(dest).is_ok_and(|m| m.is_file() && m.len() == total)
    {
        return Ok(DownloadStatus::Exists);
    }

    let mut file = File::create(dest)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = body.reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
    }
    file.flush()?;
    Ok(DownloadStatus::Downloaded)
}

/// 地址没有可用文件名时的兜底：`image-<序号>-<sha1 前 10 位>.jpg`。
pub fn fallback_filename(url: &str, index: usize) -> String {
    let digest = hex::encode(Sha1::digest(url.as_bytes()));
    format!("image-{index:04}-{}{FALLBACK_EXT}", &digest[..10])
}

/// 取路径最后一段作为文件名；没有扩展名补 `.jpg`，为空则用兜底名。
pub fn guess_filename(url: &str, fallback: &str) -> String {
    let name = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .unwrap_or_default();
    if name.is_empty() {
        fallback.to_string()
    } else if !name.contains('.') {
        format!("{name}{FALLBACK_EXT}")
    } else {
        name
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// 相册下载编排：严格串行，单张图片失败只记录不中断，相册页失败直接返回错误。
pub struct AlbumDownloader<'a> {
    transport: &'a dyn Transport,
    options: DownloadOptions,
    ctx: RunContext,
}

impl<'a> AlbumDownloader<'a> {
    pub fn new(transport: &'a dyn Transport, options: DownloadOptions, ctx: RunContext) -> Self {
        Self {
            transport,
            options,
            ctx,
        }
    }

    pub fn run(&mut self, albums: &[AlbumItem]) -> Result<DownloadResult, FetchError> {
        let total = albums.len();
        for (idx, album) in albums.iter().enumerate() {
            self.process_album(idx + 1, total, album)?;
            self.ctx.result.albums += 1;
        }
        let r = self.ctx.result;
        info!(
            "完成: 相册 {}，下载 {}，已存在 {}，跳过 {}，失败 {}",
            r.albums, r.downloaded, r.existing, r.skipped, r.failed
        );
        Ok(r)
    }

    fn process_album(
        &mut self,
        idx: usize,
        total: usize,
        album: &AlbumItem,
    ) -> Result<(), FetchError> {
        println!("[{idx}/{total}] {}", album.url);
        pause(self.options.delay);
        if self.options.verbose {
            println!("  fetch album page: {}", album.url);
        }
        let html = self.transport.get_text(&album.url)?;

        let title = extract_title(&html)
            .or_else(|| album.title.clone())
            .unwrap_or_else(|| format!("album-{idx}"));
        let album_dir = self.options.out_dir.join(slugify(&title));
        fs::create_dir_all(&album_dir)?;

        let base = Url::parse(&album.url)?;
        let mut image_urls = extract_image_urls(&html, &base, self.options.inline_url_recovery);
        if self.options.verbose {
            println!("  extracted {} image urls", image_urls.len());
        }
        if self.options.limit > 0 && image_urls.len() > self.options.limit {
            image_urls.truncate(self.options.limit);
        }
        println!("  {title}: {} images", image_urls.len());
        debug!("相册目录: {}", album_dir.display());

        let count = image_urls.len();
        for (i, raw) in image_urls.iter().enumerate() {
            self.process_image(&album_dir, i + 1, count, raw)?;
        }
        Ok(())
    }

    /// 只有清单写入失败会向上返回，下载本身的错误就地报告。
    fn process_image(
        &mut self,
        album_dir: &Path,
        index: usize,
        count: usize,
        raw_url: &str,
    ) -> Result<(), FetchError> {
        let url = canonicalize_image_url(raw_url);
        let image_id = extract_image_id(&url);

        if self.options.dedupe_urls && !self.ctx.seen_urls.insert(url.clone()) {
            println!("  skipped duplicate url: {url}");
            self.ctx.result.skipped += 1;
            return Ok(());
        }
        if let Some(id) = &image_id
            && self.ctx.manifest.contains(id)
        {
            if self.options.verbose {
                println!("  skipped manifest url: {url}");
            }
            self.ctx.result.skipped += 1;
            return Ok(());
        }

        pause(self.options.delay);
        let filename = guess_filename(&url, &fallback_filename(&url, index));
        let dest = album_dir.join(&filename);

        // 快速跳过不校验文件完整性，截断的文件也会被当成已完成
        if self.options.fast_skip || (self.ctx.manifest.is_enabled() && dest.exists()) {
            if self.options.verbose {
                println!("  fast-skip exists: {filename}");
            }
            if let Some(id) = &image_id {
                self.ctx.manifest.record(id)?;
            }
            self.ctx.result.skipped += 1;
            return Ok(());
        }

        if self.options.dry_run {
            println!("  DRY RUN {url} -> {}", dest.display());
            self.ctx.result.skipped += 1;
            return Ok(());
        }

        if self.options.verbose {
            println!("  download {index}/{count}: {url}");
        }
        match download_file(self.transport, &url, &dest) {
            Ok(status) => {
                println!("  {}: {filename}", status.as_str());
                match status {
                    DownloadStatus::Downloaded => {
                        self.ctx.result.downloaded += 1;
                        if let Some(id) = &image_id
                            && let Err(e) = self.ctx.manifest.record(id)
                        {
                            warn!("写入清单失败 {}: {}", id, e);
                        }
                        self.ctx.seen_urls.insert(url);
                    }
                    DownloadStatus::Exists => self.ctx.result.existing += 1,
                }
            }
            Err(e) => {
                println!("  failed: {url} ({e})");
                warn!(status = ?e.status_code(), "下载失败 {}: {}", url, e);
                self.ctx.result.failed += 1;
            }
        }
        Ok(())
    }
}
