use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::cookie::Jar;
use reqwest::header::{ACCEPT_ENCODING, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info};

use super::cookies;
use super::transport::{FetchError, RemoteBody, Transport};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub user_agent: String,
    /// 仅对图片下载生效的超时
    pub download_timeout: Duration,
}

/// 带 Cookie Jar 与固定 UA 的阻塞式会话。
pub struct KidplanSession {
    client: Client,
    jar: Arc<Jar>,
    config: SessionConfig,
}

impl KidplanSession {
    pub fn new(config: SessionConfig) -> anyhow::Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        // 未启用 gzip 解码，要求服务端返回原始字节
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .default_headers(default_headers)
            .cookie_provider(Arc::clone(&jar))
            .redirect(reqwest::redirect::Policy::limited(10))
            // 页面与接口请求不设超时，只有下载单独限制
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self {
            client,
            jar,
            config,
        })
    }

    /// 读取 Netscape cookie 文件，返回写入的 cookie 数量。
    pub fn load_cookie_file(&self, path: &Path) -> std::io::Result<usize> {
        let count = cookies::load_into_jar(path, &self.jar)?;
        info!("已从 {} 载入 {} 个 cookie", path.display(), count);
        Ok(count)
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, FetchError> {
        let resp = request.send().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        debug!("{} -> {}", url, resp.status().as_u16());
        if resp.status() != StatusCode::OK {
            return Err(FetchError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

impl Transport for KidplanSession {
    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.send(url, self.client.get(url))?;
        resp.text().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }

    fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let resp = self.send(url, self.client.get(url).query(query))?;
        let text = resp.text().map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| FetchError::Json {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn post_form(
        &self,
        url: &str,
        query: &[(&str, String)],
        form: &[(&str, &str)],
    ) -> Result<(), FetchError> {
        self.send(url, self.client.post(url).query(query).form(form))?;
        Ok(())
    }

    fn open_stream(&self, url: &str) -> Result<RemoteBody, FetchError> {
        let resp = self.send(
            url,
            self.client.get(url).timeout(self.config.download_timeout),
        )?;
        Ok(RemoteBody {
            content_length: resp.content_length(),
            reader: Box::new(resp),
        })
    }
}
