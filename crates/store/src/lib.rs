//! K 线持久化适配器：SQLite 写即读存储与本地文件导出。

pub mod candle;
pub mod file;
