//! # Sort Engine
//!
//! 分拣引擎编排：持有并连接全部组件。
//!
//! 触发链路 → 信号解释 → 分拣队列 → 执行器调度 → 链路池 → 结果上报。
//!
//! ## 使用示例
//!
//! ```ignore
//! use sort_engine::SortingEngine;
//!
//! let engine = SortingEngine::start(&blueprint, Arc::new(SystemConnector)).await?;
//! engine.enqueue(Package::new("SF123", 4, sort_engine::now()));
//! engine.shutdown().await;
//! ```

mod engine;
mod error;

pub use engine::{now, EngineStats, SortingEngine, TRIGGER_CHANNEL_CAPACITY};
pub use error::EngineError;

pub use dispatcher::{ActuationSnapshot, ShutdownSummary};
