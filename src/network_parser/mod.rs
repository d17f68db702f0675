//! 网络层：请求抽象、reqwest 会话实现、cookie 文件载入。

pub mod cookies;
pub mod network;
pub mod transport;
