//! 配置校验模块
//!
//! 校验规则：
//! - 格口号唯一，且异常格口不得绑定模块
//! - 同一模块上的引脚不得重复
//! - 格口数值范围 (validator derive)
//! - default_interval_ms > 0
//! - 链路超时与轮询 > 0，退避上限不超过 30 s
//! - 串口参数合法
//! - sink 名称非空且唯一

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{BindingTable, ContractError, LinkAddress, SorterBlueprint, MAX_BACKOFF_CAP_MS};

/// 校验 SorterBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    validate_chute_ids(blueprint)?;
    validate_chute_ranges(blueprint)?;
    validate_module_pins(blueprint)?;
    validate_timing(blueprint)?;
    validate_addresses(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验格口号唯一性
fn validate_chute_ids(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for chute in &blueprint.chutes {
        if chute.chute == blueprint.error_chute {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}]", chute.chute),
                "error chute must not be bound to a module",
            ));
        }
        if !seen.insert(chute.chute) {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}]", chute.chute),
                "duplicate chute",
            ));
        }
    }
    Ok(())
}

/// 校验格口数值范围
fn validate_chute_ranges(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    for chute in &blueprint.chutes {
        // NaN passes every range comparison
        if !chute.delay_factor.is_finite() {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}].delay_factor", chute.chute),
                format!("delay_factor must be a finite number, got {}", chute.delay_factor),
            ));
        }
        if let Err(errors) = chute.validate() {
            let field = errors
                .field_errors()
                .keys()
                .next()
                .map(|name| name.to_string())
                .unwrap_or_default();
            return Err(ContractError::config_validation(
                format!("chutes[chute={}].{field}", chute.chute),
                format!("value out of range: {errors}"),
            ));
        }
    }
    Ok(())
}

/// 校验 (模块, 引脚) 唯一性
fn validate_module_pins(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for chute in &blueprint.chutes {
        if !seen.insert((&chute.module, chute.pin)) {
            return Err(ContractError::config_validation(
                format!("chutes[chute={}].pin", chute.chute),
                format!("pin {} on {} is already bound", chute.pin, chute.module),
            ));
        }
    }
    Ok(())
}

/// 校验节拍配置
fn validate_timing(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    if blueprint.timing.default_interval_ms == 0 {
        return Err(ContractError::config_validation(
            "timing.default_interval_ms",
            "default_interval_ms must be > 0",
        ));
    }
    let links = &blueprint.links;
    if links.backoff_base_ms == 0 || links.backoff_base_ms > links.backoff_cap_ms {
        return Err(ContractError::config_validation(
            "links.backoff_base_ms",
            format!(
                "backoff_base_ms ({}) must be > 0 and <= backoff_cap_ms ({})",
                links.backoff_base_ms, links.backoff_cap_ms
            ),
        ));
    }
    if links.backoff_cap_ms > MAX_BACKOFF_CAP_MS {
        return Err(ContractError::config_validation(
            "links.backoff_cap_ms",
            format!(
                "backoff_cap_ms ({}) must be <= {MAX_BACKOFF_CAP_MS}",
                links.backoff_cap_ms
            ),
        ));
    }
    if links.connect_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "links.connect_timeout_ms",
            "connect_timeout_ms must be > 0",
        ));
    }
    if links.read_poll_ms == 0 {
        return Err(ContractError::config_validation(
            "links.read_poll_ms",
            "read_poll_ms must be > 0",
        ));
    }
    if links.read_buffer_size == 0 || links.event_capacity == 0 {
        return Err(ContractError::config_validation(
            "links",
            "read_buffer_size and event_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验链路地址
fn validate_addresses(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    validate_address("trigger.address", &blueprint.trigger.address)?;
    for chute in &blueprint.chutes {
        validate_address(&format!("chutes[chute={}].module", chute.chute), &chute.module)?;
    }
    if blueprint.chutes.iter().any(|c| c.module == blueprint.trigger.address) {
        return Err(ContractError::config_validation(
            "trigger.address",
            "trigger sensor cannot share a link with an actuator module",
        ));
    }
    Ok(())
}

fn validate_address(field: &str, address: &LinkAddress) -> Result<(), ContractError> {
    match address {
        LinkAddress::Tcp { host, port } => {
            if host.is_empty() || *port == 0 {
                return Err(ContractError::config_validation(
                    field,
                    format!("invalid tcp address {address}"),
                ));
            }
        }
        LinkAddress::Serial {
            port,
            baud_rate,
            data_bits,
            stop_bits,
            ..
        } => {
            if port.is_empty() || *baud_rate == 0 {
                return Err(ContractError::config_validation(
                    field,
                    format!("invalid serial port {address}"),
                ));
            }
            if !(5..=8).contains(data_bits) {
                return Err(ContractError::config_validation(
                    field,
                    format!("data_bits must be 5..=8, got {data_bits}"),
                ));
            }
            if !(1..=2).contains(stop_bits) {
                return Err(ContractError::config_validation(
                    field,
                    format!("stop_bits must be 1 or 2, got {stop_bits}"),
                ));
            }
        }
    }
    Ok(())
}

/// 校验运行时替换的路由表
///
/// 与蓝图中格口的规则相同：距离 >= 1，延迟系数 ∈ [0, 1]，保持时间 > 0，
/// 异常格口不绑定，同一模块引脚不重复。
pub fn validate_binding_table(table: &BindingTable) -> Result<(), ContractError> {
    let mut pins = HashSet::new();
    for binding in table.iter() {
        let field = format!("bindings[chute={}]", binding.chute);
        if binding.chute == table.error_chute() {
            return Err(ContractError::config_validation(
                field,
                "error chute must not be bound to a module",
            ));
        }
        if binding.pulse_distance == 0 {
            return Err(ContractError::config_validation(
                format!("{field}.pulse_distance"),
                "pulse_distance must be >= 1",
            ));
        }
        if !(0.0..=1.0).contains(&binding.delay_factor) {
            return Err(ContractError::config_validation(
                format!("{field}.delay_factor"),
                format!("delay_factor must be within [0, 1], got {}", binding.delay_factor),
            ));
        }
        if binding.magnet_hold.is_zero() {
            return Err(ContractError::config_validation(
                format!("{field}.magnet_hold"),
                "magnet_hold must be > 0",
            ));
        }
        validate_address(&format!("{field}.module"), &binding.module)?;
        if !pins.insert((&binding.module, binding.pin)) {
            return Err(ContractError::config_validation(
                format!("{field}.pin"),
                format!("pin {} on {} is already bound", binding.pin, binding.module),
            ));
        }
    }
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", idx),
                "queue_capacity must be > 0",
            ));
        }
    }
    Ok(())
}
