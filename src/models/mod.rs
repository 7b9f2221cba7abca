//! 数据模型模块
//! 许可证、活跃播放会话与审计日志的领域模型

pub mod audit;
pub mod license;
pub mod stream;
