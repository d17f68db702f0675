//! Netscape 格式 cookie 文件（浏览器插件导出的 cookies.txt）。
//!
//! 每行 7 列，以 tab 分隔：domain, include_subdomains, path, secure, expires, name, value。
//! 过期时间与 discard 标记一律忽略。

use std::fs;
use std::io;
use std::path::Path;

use reqwest::cookie::Jar;
use tracing::{debug, warn};
use url::Url;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetscapeCookie {
    pub domain: String,
    /// 第 2 列；为 FALSE 时只发给 `domain` 本身，不发给子域名
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub name: String,
    pub value: String,
}

impl NetscapeCookie {
    /// 用于写入 Jar 的来源地址
    fn origin(&self) -> Option<Url> {
        let host = self.domain.trim_start_matches('.');
        let path = if self.path.starts_with('/') {
            self.path.as_str()
        } else {
            "/"
        };
        Url::parse(&format!("https://{host}{path}")).ok()
    }

    fn set_cookie_header(&self) -> String {
        let mut header = format!("{}={}; Path={}", self.name, self.value, self.path);
        if self.include_subdomains {
            header.push_str("; Domain=");
            header.push_str(self.domain.trim_start_matches('.'));
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}

pub fn parse_netscape(text: &str) -> Vec<NetscapeCookie> {
    let mut cookies = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches(['\r', '\n']);
        let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => rest,
            None if line.trim().is_empty() || line.starts_with('#') => continue,
            None => line,
        };
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            debug!("跳过格式不正确的 cookie 行 {}", lineno + 1);
            continue;
        }
        cookies.push(NetscapeCookie {
            domain: fields[0].trim().to_string(),
            include_subdomains: fields[1].trim().eq_ignore_ascii_case("TRUE"),
            path: fields[2].trim().to_string(),
            secure: fields[3].trim().eq_ignore_ascii_case("TRUE"),
            name: fields[5].to_string(),
            value: fields[6..].join("\t"),
        });
    }
    cookies
}

/// 读取 cookie 文件并写入 Jar，返回写入数量。
pub fn load_into_jar(path: &Path, jar: &Jar) -> io::Result<usize> {
    let text = fs::read_to_string(path)?;
    let mut loaded = 0usize;
    for cookie in parse_netscape(&text) {
        match cookie.origin() {
            Some(origin) => {
                jar.add_cookie_str(&cookie.set_cookie_header(), &origin);
                loaded += 1;
            }
            None => warn!("cookie 域名无效，已忽略: {}", cookie.domain),
        }
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    const SAMPLE: &str = "# Netscape HTTP Cookie File\n\
        \n\
        .kidplan.com\tTRUE\t/\tTRUE\t0\t.ASPXAUTH\tabc123\n\
        #HttpOnly_app.kidplan.com\tFALSE\t/\tFALSE\t1700000000\tASP.NET_SessionId\txyz\n\
        broken line\n";

    #[test]
    fn parses_regular_and_http_only_lines() {
        let cookies = parse_netscape(SAMPLE);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].domain, ".kidplan.com");
        assert_eq!(cookies[0].name, ".ASPXAUTH");
        assert!(cookies[0].secure);
        assert!(cookies[0].include_subdomains);
        assert!(!cookies[1].include_subdomains);
        assert_eq!(cookies[1].domain, "app.kidplan.com");
        assert_eq!(cookies[1].value, "xyz");
    }

    #[test]
    fn loads_cookies_into_jar_ignoring_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        fs::write(&path, SAMPLE).unwrap();

        let jar = Jar::default();
        assert_eq!(load_into_jar(&path, &jar).unwrap(), 2);

        let url = Url::parse("https://app.kidplan.com/bilder/album").unwrap();
        let header = jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains(".ASPXAUTH=abc123"));
        assert!(header.contains("ASP.NET_SessionId=xyz"));
    }

    #[test]
    fn host_only_cookies_stay_on_their_host() {
        let cookies = parse_netscape(SAMPLE);
        assert!(cookies[0].set_cookie_header().contains("; Domain=kidplan.com"));
        assert!(!cookies[1].set_cookie_header().contains("Domain="));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        fs::write(&path, SAMPLE).unwrap();
        let jar = Jar::default();
        load_into_jar(&path, &jar).unwrap();

        let sub = Url::parse("https://img.app.kidplan.com/albumpicture/a.jpg").unwrap();
        let header = jar.cookies(&sub).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains(".ASPXAUTH=abc123"));
        assert!(!header.contains("ASP.NET_SessionId"));
    }
}
