//! # Sorting Queue
//!
//! 在途包裹跟踪（以脉冲计数为准）。
//!
//! 负责：
//! - 包裹接入：解析格口绑定，未绑定格口改投异常格口
//! - 按已过时间 / 节拍估计回填初始计数
//! - 每个脉冲事件推进全部包裹，并在同一临界区内批量取出到位包裹
//!
//! ## 使用示例
//!
//! ```ignore
//! use sorting_queue::SortingQueue;
//!
//! let queue = SortingQueue::new(blueprint.to_binding_table());
//! queue.enqueue(package, interval, now);
//!
//! for tracker in queue.on_pulse(&event) {
//!     dispatcher.dispatch(tracker, interval, event);
//! }
//! ```

mod queue;
mod tracker;

pub use contracts::{Admission, BindingTable, Package};
pub use queue::{QueueStats, SortingQueue};
pub use tracker::PackageTracker;
