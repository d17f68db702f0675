//! 页面解析模块入口。
//!
//! 负责从相册列表页 / 详情页中找出相册链接与图片地址，并把图片地址规范成原图地址。

pub mod extract;
pub mod url_utils;
