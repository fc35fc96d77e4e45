//! 交易所行情接口适配器。

pub mod coinbase;
