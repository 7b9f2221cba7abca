//! 流媒体许可与并发会话管理引擎
//! 提供共享类型和工具

pub mod concurrency;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
