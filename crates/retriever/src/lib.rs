//! 历史 K 线检索：按交易所单请求上限分块抓取，带重试与块间限速。

pub mod chunk;
pub mod historical;
pub mod retry;
pub mod sync;
pub mod transform;
