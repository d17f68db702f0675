//! 网络请求抽象。下载流程只依赖这个 trait，测试里可以换成内存实现。

use std::io::{self, Read};

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// 任何非 200 响应
    #[error("request failed {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid json from {url}: {message}")]
    Json { url: String, message: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 流式响应体：服务端声明的长度 + 读取器。
pub struct RemoteBody {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read>,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// 整个运行期间共享的会话。所有调用严格串行。
pub trait Transport {
    fn get_text(&self, url: &str) -> Result<String, FetchError>;

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError>;

    fn post_form(
        &self,
        url: &str,
        query: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> Result<(), FetchError>;

    fn open_stream(&self, url: &str) -> Result<RemoteBody, FetchError>;
}
