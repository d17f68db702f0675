//! 图片/相册 URL 的规范化。
//!
//! 所有图片都来自 `*.img.kidplan.com/albumpicture/…`，`id` 查询参数是图片的稳定标识，
//! `size` 参数决定缩略尺寸，去掉后服务端返回原图。

use url::Url;

pub const IMAGE_CDN_SUFFIX: &str = "img.kidplan.com";
pub const ALBUM_PICTURE_PREFIX: &str = "/albumpicture/";
pub const ALBUM_DETAIL_SEGMENT: &str = "/bilder/albumet/";
pub const IMAGE_EXTS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// 反转义 HTML 实体、补全协议相对地址、基于 `base` 解析相对地址并去掉片段。
pub fn normalize(raw: &str, base: &Url) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let decoded = html_escape::decode_html_entities(trimmed);
    let candidate = if decoded.starts_with("//") {
        format!("https:{decoded}")
    } else {
        decoded.into_owned()
    };
    let mut url = base.join(&candidate).ok()?;
    url.set_fragment(None);
    Some(url)
}

/// 去掉片段，解析失败时原样返回。
pub fn strip_fragment(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.into()
        }
        Err(_) => raw.split('#').next().unwrap_or(raw).to_string(),
    }
}

fn is_image_cdn(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| host.ends_with(IMAGE_CDN_SUFFIX))
        && url.path().starts_with(ALBUM_PICTURE_PREFIX)
}

pub fn is_image_cdn_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| is_image_cdn(&url))
}

/// 子串匹配而不是后缀匹配：`…/x.jpg?id=1` 这类地址也要算图片。
pub fn looks_like_image(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    IMAGE_EXTS.iter().any(|ext| lower.contains(ext))
}

/// 去掉 CDN 地址里的 `size` 参数，其它参数顺序不变；非 CDN 地址原样返回。
pub fn canonicalize_image_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };
    if !is_image_cdn(&url) || !url.query_pairs().any(|(k, _)| k == "size") {
        return raw.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "size")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.into()
}

/// 清单去重用的图片 ID，只对 CDN 地址有效。
pub fn extract_image_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !is_image_cdn(&url) {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
}
