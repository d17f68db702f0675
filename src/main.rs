//! Kidplan 相册批量下载器。
//!
//! 本 crate 负责：登录（cookie 文件或账号密码）、发现相册、提取原图地址、按清单去重下载。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/账号来源等基础设施
//! - `network_parser`：请求抽象与 reqwest 会话、cookie 文件
//! - `album_parser`：相册列表页与详情页的解析、URL 规范化
//! - `download`：登录、相册发现、清单、下载流程编排

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, info};
use url::Url;

mod album_parser;
mod base_system;
mod download;
mod network_parser;

use base_system::config::{ConfigSpec, load_or_create};
use base_system::context::Config;
use base_system::credentials::{CredentialSource, resolve_credentials};
use base_system::logging::{LogOptions, LogSystem};
use download::album_list::{
    AlbumSource, DiscoveryError, HtmlAlbumList, JsonAlbumList, JsonPaging, discover_albums,
};
use download::auth::{AccountSelector, login};
use download::downloader::{AlbumDownloader, DownloadOptions, RunContext};
use download::manifest::Manifest;
use network_parser::network::{KidplanSession, SessionConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "kidplan-album-downloader", version)]
#[command(about = "Bulk download Kidplan album images using cookies or env-based login.")]
struct Cli {
    /// Netscape 格式的 cookie 文件（浏览器导出）
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// 相册列表页地址
    #[arg(long)]
    album_url: Option<String>,

    /// 输出目录
    #[arg(long)]
    out_dir: Option<String>,

    /// 请求间隔（秒）
    #[arg(long)]
    delay: Option<f64>,

    /// 每个相册最多下载的图片数（0 = 不限）
    #[arg(long)]
    limit: Option<usize>,

    /// 只打印将要下载的内容
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// 列表页找不到相册时保存页面 HTML
    #[arg(long, default_value_t = false)]
    debug_html: bool,

    /// 关闭跨相册的图片地址去重
    #[arg(long, default_value_t = false)]
    no_dedupe: bool,

    /// 打印每个请求与下载动作
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// 目标文件存在即跳过，不校验大小
    #[arg(long, default_value_t = false)]
    fast_skip: bool,

    /// 清单文件路径（传空字符串关闭清单）
    #[arg(long)]
    manifest: Option<String>,

    /// 存放用户名的环境变量名
    #[arg(long)]
    username_env: Option<String>,

    /// 存放密码的环境变量名
    #[arg(long)]
    password_env: Option<String>,

    /// 有多个幼儿园时指定 id
    #[arg(long)]
    kid: Option<String>,

    /// 有多个幼儿园时指定名称（不区分大小写）
    #[arg(long)]
    kid_name: Option<String>,

    /// .env 文件路径
    #[arg(long)]
    env_file: Option<String>,

    /// 环境变量 / .env 中用户名的键
    #[arg(long)]
    username_key: Option<String>,

    /// 环境变量 / .env 中密码的键
    #[arg(long)]
    password_key: Option<String>,

    /// 不从脚本/内联 JSON 中找回图片地址
    #[arg(long, default_value_t = false)]
    no_inline_urls: bool,

    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,

    /// 数据目录路径（用于存放配置文件和 logs）
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 启用调试日志输出
    #[arg(long, default_value_t = false)]
    debug: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件。
    fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.album_url {
            config.album_url = v.clone();
        }
        if let Some(v) = &self.out_dir {
            config.out_dir = v.clone();
        }
        if let Some(v) = self.delay {
            config.delay_secs = v;
        }
        if let Some(v) = self.limit {
            config.limit_per_album = v;
        }
        if let Some(v) = &self.manifest {
            config.manifest_path = v.clone();
        }
        if let Some(v) = &self.env_file {
            config.env_file = v.clone();
        }
        if let Some(v) = &self.username_key {
            config.username_key = v.clone();
        }
        if let Some(v) = &self.password_key {
            config.password_key = v.clone();
        }
        config.dry_run |= self.dry_run;
        config.debug_html |= self.debug_html;
        config.verbose |= self.verbose;
        config.fast_skip |= self.fast_skip;
        if self.no_dedupe {
            config.dedupe_urls = false;
        }
        if self.no_inline_urls {
            config.inline_url_recovery = false;
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log = init_logging(&cli)?;
    info!(target: "startup", "当前版本: v{}", VERSION);
    info!(target: "startup", "日志目录: {}", log.logs_dir().display());

    run(&cli).inspect_err(|e| error!("运行失败: {e:#}"))
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let mut config = load_or_create::<Config>(cli.config.as_deref(), cli.data_dir.as_deref())
        .context("加载配置失败")?;
    cli.apply(&mut config);
    config.validate().context("配置无效")?;

    let base_url = Url::parse(&config.base_url)?;
    let album_url = Url::parse(&config.album_url)?;

    let session = KidplanSession::new(SessionConfig {
        user_agent: config.user_agent.clone(),
        download_timeout: Duration::from_secs(config.download_timeout_secs),
    })?;
    if let Some(path) = &cli.cookie_file {
        session
            .load_cookie_file(path)
            .with_context(|| format!("读取 cookie 文件失败: {}", path.display()))?;
    }

    let env_file = (!config.env_file.trim().is_empty()).then(|| Path::new(config.env_file.trim()));
    let credentials = resolve_credentials(&CredentialSource {
        username_env: cli.username_env.as_deref(),
        password_env: cli.password_env.as_deref(),
        username_key: &config.username_key,
        password_key: &config.password_key,
        env_file,
    })?;
    match &credentials {
        Some(creds) => {
            login(
                &session,
                &base_url,
                creds,
                AccountSelector {
                    kid_id: cli.kid.as_deref(),
                    kid_name: cli.kid_name.as_deref(),
                },
                Some(album_url.as_str()),
            )?;
        }
        None => info!("未提供账号密码，仅使用现有 cookie 会话"),
    }

    let out_dir = config.out_dir();
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("创建输出目录失败: {}", out_dir.display()))?;

    println!("Fetching album list: {album_url}");
    let sources: Vec<Box<dyn AlbumSource>> = vec![
        Box::new(HtmlAlbumList {
            album_url: album_url.clone(),
            debug_dump_dir: config.debug_html.then(|| out_dir.clone()),
        }),
        Box::new(JsonAlbumList {
            album_url: album_url.clone(),
            paging: JsonPaging {
                page_size: config.page_size,
                delay: config.delay(),
            },
        }),
    ];
    let albums = match discover_albums(&sources, &session) {
        Ok(albums) => albums,
        Err(DiscoveryError::NoAlbums) => {
            println!("{}", DiscoveryError::NoAlbums);
            return Ok(ExitCode::from(1));
        }
        Err(e) => return Err(anyhow!(e)),
    };
    println!("Found {} albums", albums.len());

    let manifest = match config.manifest_path() {
        Some(path) => Manifest::open(path.clone())
            .with_context(|| format!("打开清单失败: {}", path.display()))?,
        None => Manifest::disabled(),
    };
    if config.verbose && !manifest.is_empty() {
        println!("Loaded {} manifest entries", manifest.len());
    }

    let mut downloader = AlbumDownloader::new(
        &session,
        DownloadOptions::from_config(&config),
        RunContext::new(manifest),
    );
    let result = downloader.run(&albums)?;

    println!(
        "Done: {} albums, {} downloaded, {} existing, {} skipped, {} failed",
        result.albums, result.downloaded, result.existing, result.skipped, result.failed
    );
    Ok(ExitCode::SUCCESS)
}

fn init_logging(cli: &Cli) -> Result<LogSystem> {
    let opts = LogOptions {
        debug: cli.debug,
        verbose: cli.verbose,
        use_color: true,
        base_dir: cli.data_dir.clone(),
    };
    LogSystem::init(opts).map_err(|e| anyhow!(e))
}
