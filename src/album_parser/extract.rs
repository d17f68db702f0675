//! 相册列表页 / 相册详情页的信息提取。
//!
//! - `scan_page`：解析文档，收集相册链接和标签属性里的图片地址
//! - `extract_image_urls`：标签属性 + 正则兜底，合并后规范化并排序
//! - `extract_title` / `is_login_page`：标题与登录页识别

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::url_utils::{
    ALBUM_DETAIL_SEGMENT, canonicalize_image_url, is_image_cdn_url, looks_like_image, normalize,
    strip_fragment,
};

const IMAGE_ATTRS: [&str; 6] = [
    "src",
    "data-src",
    "data-original",
    "data-full",
    "data-large",
    "data-url",
];

const LOGIN_TITLE_MARKER: &str = "log in kidplan";
const LOGIN_FORM_MARKERS: [&str; 2] = ["id=\"loginform\"", "id='loginform'"];

// 编译一次复用的正则缓存
fn re_inline_url() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r#"https?://[^"'\s>]+"#).unwrap())
}

fn re_all_tags() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
}

fn re_headings() -> &'static [Regex; 4] {
    static R: OnceLock<[Regex; 4]> = OnceLock::new();
    R.get_or_init(|| {
        ["h1", "h2", "h3", "h4"].map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}\s*>")).unwrap()
        })
    })
}

fn sel_anchors() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("a[href]").unwrap())
}

fn sel_images() -> &'static Selector {
    static S: OnceLock<Selector> = OnceLock::new();
    S.get_or_init(|| Selector::parse("img, source").unwrap())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageLinks {
    /// 排序、去重后的相册详情页地址
    pub album_links: Vec<String>,
    /// 标签属性中找到的 CDN 图片地址（已规范化，未去 size）
    pub image_urls: BTreeSet<String>,
}

fn keep_image(url: &Url) -> bool {
    let s = url.as_str();
    looks_like_image(s) && is_image_cdn_url(s)
}

/// 收集 `<a href>` 里的相册链接，以及 `<a>`、`<img>`、`<source>` 属性里的图片地址。
///
/// 属性值由解析器完成实体解码；注释和 `<script>` 内容不会被当成标签。
pub fn scan_page(html: &str, base: &Url) -> PageLinks {
    let document = Html::parse_document(html);
    let mut album_links = BTreeSet::new();
    let mut image_urls = BTreeSet::new();

    for el in document.select(sel_anchors()) {
        let Some(href) = el.value().attr("href").and_then(|h| normalize(h, base)) else {
            continue;
        };
        if href.as_str().contains(ALBUM_DETAIL_SEGMENT) {
            album_links.insert(href.to_string());
        }
        // 有些模板把原图放在 <a href> 上
        if keep_image(&href) {
            image_urls.insert(href.into());
        }
    }

    for el in document.select(sel_images()) {
        collect_image_attrs(el, base, &mut image_urls);
    }

    PageLinks {
        album_links: album_links.into_iter().collect(),
        image_urls,
    }
}

fn collect_image_attrs(el: ElementRef<'_>, base: &Url, out: &mut BTreeSet<String>) {
    let attrs = el.value();
    for key in IMAGE_ATTRS {
        if let Some(url) = attrs.attr(key).and_then(|v| normalize(v, base))
            && keep_image(&url)
        {
            out.insert(url.into());
        }
    }
    if let Some(srcset) = attrs.attr("srcset") {
        for candidate in srcset_candidates(srcset) {
            if let Some(url) = normalize(candidate, base)
                && keep_image(&url)
            {
                out.insert(url.into());
            }
        }
    }
}

/// `srcset="a.jpg 1x, b.jpg 2x"` 中每一项取描述符之前的 URL。
fn srcset_candidates(srcset: &str) -> impl Iterator<Item = &str> {
    srcset
        .split(',')
        .filter_map(|part| part.split_whitespace().next())
}

pub fn extract_album_links(html: &str, base: &Url) -> Vec<String> {
    scan_page(html, base).album_links
}

/// 正则兜底：从脚本、内联 JSON 中找回标签扫描看不到的图片地址。
///
/// 这一步比较宽松，可能把无关脚本里的 CDN 地址也算进来，可以通过配置关闭。
pub fn recover_inline_image_urls(html: &str) -> BTreeSet<String> {
    re_inline_url()
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|raw| looks_like_image(raw) && is_image_cdn_url(raw))
        .map(|raw| strip_fragment(&html_escape::decode_html_entities(raw)))
        .collect()
}

/// 相册详情页中的全部图片地址：两路结果合并、去掉 size 参数、排序去重。
pub fn extract_image_urls(html: &str, base: &Url, inline_recovery: bool) -> Vec<String> {
    let mut urls: BTreeSet<String> = scan_page(html, base)
        .image_urls
        .iter()
        .map(|u| canonicalize_image_url(u))
        .collect();

    if inline_recovery {
        let before = urls.len();
        urls.extend(
            recover_inline_image_urls(html)
                .iter()
                .map(|u| canonicalize_image_url(u)),
        );
        debug!("正则兜底新增 {} 个图片地址", urls.len() - before);
    }

    urls.into_iter().collect()
}

/// 依次查找 h1..h4，取第一个命中的标题，去掉内部标签、反转义并压缩空白。
pub fn extract_title(html: &str) -> Option<String> {
    for re in re_headings() {
        let Some(caps) = re.captures(html) else {
            continue;
        };
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let stripped = re_all_tags().replace_all(inner, " ");
        let decoded = html_escape::decode_html_entities(&stripped);
        let title = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        return if title.is_empty() { None } else { Some(title) };
    }
    None
}

/// 判断页面是不是登录页（用于区分“认证失败”和“确实没有相册”）。
pub fn is_login_page(html: &str) -> bool {
    let lowered = html.to_lowercase();
    lowered.contains(LOGIN_TITLE_MARKER) || LOGIN_FORM_MARKERS.iter().any(|m| lowered.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://app.kidplan.com/bilder/album").unwrap()
    }

    const DETAIL_PAGE: &str = r#"
        <html><body>
        <H1 class="title">Tur til <b>skogen</b> &amp; fjæra</H1>
        <a href="/bilder/albumet/123">Tur</a>
        <a href="https://app.kidplan.com/bilder/albumet/123#comments">Tur igjen</a>
        <a href="/bilder/albumet/45">Fest</a>
        <a href="/profil">Profil</a>
        <img src="//img.kidplan.com/albumpicture/a.jpg?id=1&amp;size=thumb" alt="a">
        <picture>
          <source srcset="https://img.kidplan.com/albumpicture/b.jpg?id=2 1x, https://img.kidplan.com/albumpicture/c.jpg?id=3 2x">
        </picture>
        <img data-src="https://img.kidplan.com/avatar/me.jpg">
        <img src="https://other.example.com/albumpicture/x.jpg?id=99">
        <script>
          window.pics = [{"u":"https://img.kidplan.com/albumpicture/d.jpg?id=4&size=small"}];
        </script>
        </body></html>
    "#;

    #[test]
    fn scan_collects_album_links_sorted_and_deduped() {
        let links = extract_album_links(DETAIL_PAGE, &base());
        assert_eq!(
            links,
            vec![
                "https://app.kidplan.com/bilder/albumet/123".to_string(),
                "https://app.kidplan.com/bilder/albumet/45".to_string(),
            ]
        );
    }

    #[test]
    fn scan_collects_img_and_srcset_candidates() {
        let page = scan_page(DETAIL_PAGE, &base());
        assert!(
            page.image_urls
                .contains("https://img.kidplan.com/albumpicture/a.jpg?id=1&size=thumb")
        );
        assert!(
            page.image_urls
                .contains("https://img.kidplan.com/albumpicture/b.jpg?id=2")
        );
        assert!(
            page.image_urls
                .contains("https://img.kidplan.com/albumpicture/c.jpg?id=3")
        );
        // 非 CDN / 非相册路径被过滤，脚本里的地址标签扫描看不到
        assert_eq!(page.image_urls.len(), 3);
    }

    #[test]
    fn image_urls_union_both_passes_and_drop_size() {
        let urls = extract_image_urls(DETAIL_PAGE, &base(), true);
        assert_eq!(
            urls,
            vec![
                "https://img.kidplan.com/albumpicture/a.jpg?id=1".to_string(),
                "https://img.kidplan.com/albumpicture/b.jpg?id=2".to_string(),
                "https://img.kidplan.com/albumpicture/c.jpg?id=3".to_string(),
                "https://img.kidplan.com/albumpicture/d.jpg?id=4".to_string(),
            ]
        );
    }

    #[test]
    fn inline_recovery_can_be_disabled() {
        let urls = extract_image_urls(DETAIL_PAGE, &base(), false);
        assert_eq!(urls.len(), 3);
        assert!(!urls.iter().any(|u| u.contains("d.jpg")));
    }

    #[test]
    fn srcset_deduplicates_against_src() {
        let html = r#"<img src="https://img.kidplan.com/albumpicture/a.jpg?id=1"
                          srcset="https://img.kidplan.com/albumpicture/a.jpg?id=1 1x">"#;
        assert_eq!(extract_image_urls(html, &base(), true).len(), 1);
    }

    #[test]
    fn scan_tolerates_malformed_markup() {
        let html = r#"<!DOCTYPE html><!-- <img src="https://img.kidplan.com/albumpicture/z.jpg?id=9"> -->
            <p>1 < 2 <IMG SRC="https://img.kidplan.com/albumpicture/e.jpg?id=5" Data-Src=https://img.kidplan.com/albumpicture/f.jpg?id=6>
            <a HREF=/bilder/albumet/7><div>uten slutt
            <script>var s = "<img src='https://img.kidplan.com/albumpicture/s.jpg?id=8'>";</SCRIPT>
            <img src="https://img.kidplan.com/albumpicture/g.jpg?id=7"#;
        let page = scan_page(html, &base());
        assert_eq!(
            page.album_links,
            vec!["https://app.kidplan.com/bilder/albumet/7".to_string()]
        );
        assert_eq!(
            page.image_urls.into_iter().collect::<Vec<_>>(),
            vec![
                "https://img.kidplan.com/albumpicture/e.jpg?id=5".to_string(),
                "https://img.kidplan.com/albumpicture/f.jpg?id=6".to_string(),
            ]
        );
    }

    #[test]
    fn title_prefers_first_heading_level() {
        assert_eq!(
            extract_title(DETAIL_PAGE).as_deref(),
            Some("Tur til skogen & fjæra")
        );
        let html = "<h3>Tre</h3><h2>\n  To \n</h2>";
        assert_eq!(extract_title(html).as_deref(), Some("To"));
        assert_eq!(extract_title("<p>ingen</p>"), None);
    }

    #[test]
    fn login_page_detection() {
        assert!(is_login_page("<title>Log in Kidplan</title>"));
        assert!(is_login_page("<form ID='loginForm'>"));
        assert!(!is_login_page(DETAIL_PAGE));
    }
}
