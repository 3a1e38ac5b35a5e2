//! # Dispatcher
//!
//! 执行器调度与结果上报模块。
//!
//! 负责：
//! - 为每个到位包裹启动独立动作任务：延时、吸合、保持、释放
//! - 单个包裹失败只影响该包裹，不向上传播
//! - 关停时给在途动作有限的宽限期
//! - Fan-out 分拣报告到多个 sinks，隔离慢 sink

pub mod actuator;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod reporter;
pub mod sinks;

pub use actuator::{actuation_delay, ActuatorDispatcher, ShutdownSummary};
pub use contracts::{ReportSink, SortReport};
pub use error::DispatchError;
pub use handle::SinkHandle;
pub use metrics::{ActuationMetrics, ActuationSnapshot, FailureStage, MetricsSnapshot, SinkMetrics};
pub use reporter::{create_sink_handle, Reporter};
pub use sinks::{FileSink, LogSink, NetworkSink};
