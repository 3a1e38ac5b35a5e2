//! SorterBlueprint - Config Loader 输出
//!
//! 描述完整的分拣线配置：触发传感器、格口绑定、链路参数、输出路由。

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use validator::Validate;

use crate::{BindingTable, ChuteBinding, ChuteId, LinkAddress};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的分拣线配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SorterBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 触发传感器
    pub trigger: TriggerConfig,

    /// 节拍估计
    #[serde(default)]
    pub timing: TimingConfig,

    /// 链路参数 (所有链路共用)
    #[serde(default)]
    pub links: LinkConfig,

    /// 执行器调度
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// 异常格口：未绑定格口的包裹落入此处
    pub error_chute: ChuteId,

    /// 格口绑定列表
    #[serde(default)]
    pub chutes: Vec<ChuteConfig>,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// 包裹接入监听地址 (JSON lines over TCP, 可选)
    #[serde(default)]
    pub admission_listen: Option<String>,
}

/// 触发传感器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// 传感器链路地址
    pub address: LinkAddress,

    /// 光电通道号 (`+OCCH<channel>:…`)
    #[serde(default = "default_trigger_channel")]
    pub channel: u8,
}

fn default_trigger_channel() -> u8 {
    1
}

/// 节拍配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// 默认包裹间隔 (ms)，估计值的初值和采样上限的基准
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    500
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
        }
    }
}

/// 重连退避上限的最大值 (ms)
pub const MAX_BACKOFF_CAP_MS: u64 = 30_000;

/// 链路连接与重连参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// 单次连接超时 (ms)
    pub connect_timeout_ms: u64,

    /// 重连退避基数 (ms)
    pub backoff_base_ms: u64,

    /// 重连退避上限 (ms)
    pub backoff_cap_ms: u64,

    /// 最大重连次数
    pub max_reconnect_attempts: u32,

    /// 读缓冲大小 (bytes)
    pub read_buffer_size: usize,

    /// 读轮询超时 (ms)，超时视为“暂无数据”
    pub read_poll_ms: u64,

    /// 链路状态事件广播容量
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            backoff_base_ms: 500,
            backoff_cap_ms: 30_000,
            max_reconnect_attempts: 20,
            read_buffer_size: 1024,
            read_poll_ms: 100,
            event_capacity: 64,
        }
    }
}

impl LinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// 不超过 `MAX_BACKOFF_CAP_MS`
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms.min(MAX_BACKOFF_CAP_MS))
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}

/// 调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 关停时等待在途动作完成的时间 (ms)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    2_000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// 单个格口配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChuteConfig {
    /// 格口号
    pub chute: ChuteId,

    /// 翻板模块链路地址
    pub module: LinkAddress,

    /// 模块输出引脚
    pub pin: u16,

    /// 从接入点到格口的脉冲数，必须 >= 1
    #[validate(range(min = 1))]
    pub pulse_distance: u32,

    /// 延迟系数 ∈ [0, 1]
    #[validate(range(min = 0.0, max = 1.0))]
    pub delay_factor: f64,

    /// 电磁铁保持时间 (ms)，必须 > 0
    #[validate(range(min = 1))]
    pub magnet_hold_ms: u64,
}

impl ChuteConfig {
    pub fn to_binding(&self) -> ChuteBinding {
        ChuteBinding {
            chute: self.chute,
            module: self.module.clone(),
            pin: self.pin,
            pulse_distance: self.pulse_distance,
            delay_factor: self.delay_factor,
            magnet_hold: Duration::from_millis(self.magnet_hold_ms),
        }
    }
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出 (JSON lines)
    File,
    /// 网络输出 (UDP)
    Network,
}

impl SorterBlueprint {
    /// 构建路由表
    pub fn to_binding_table(&self) -> BindingTable {
        BindingTable::new(
            self.chutes.iter().map(ChuteConfig::to_binding),
            self.error_chute,
        )
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_millis(self.timing.default_interval_ms)
    }

    /// 所有翻板模块地址 (去重)
    pub fn module_addresses(&self) -> HashSet<LinkAddress> {
        self.chutes.iter().map(|c| c.module.clone()).collect()
    }
}
