//! cohida 的领域核心：值对象、校验规则、端口（trait）与配置结构，不包含任何 I/O。

pub mod common;
pub mod config;
pub mod market;
pub mod store;
