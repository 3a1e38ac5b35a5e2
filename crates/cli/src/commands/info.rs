//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    trigger: TriggerInfo,
    default_interval_ms: u64,
    error_chute: u32,
    modules: Vec<ModuleInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    chutes: Vec<ChuteInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admission_listen: Option<String>,
}

#[derive(Serialize)]
struct TriggerInfo {
    address: String,
    channel: u8,
}

#[derive(Serialize)]
struct ModuleInfo {
    address: String,
    chutes: Vec<u32>,
}

#[derive(Serialize)]
struct ChuteInfo {
    chute: u32,
    module: String,
    pin: u16,
    pulse_distance: u32,
    delay_factor: f64,
    magnet_hold_ms: u64,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

/// Chutes grouped by module address, sorted
fn modules(blueprint: &contracts::SorterBlueprint) -> Vec<ModuleInfo> {
    let mut grouped: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for chute in &blueprint.chutes {
        grouped
            .entry(chute.module.to_string())
            .or_default()
            .push(chute.chute);
    }
    grouped
        .into_iter()
        .map(|(address, mut chutes)| {
            chutes.sort_unstable();
            ModuleInfo { address, chutes }
        })
        .collect()
}

fn build_config_info(blueprint: &contracts::SorterBlueprint, args: &InfoArgs) -> ConfigInfo {
    let chutes = if args.chutes {
        blueprint
            .chutes
            .iter()
            .map(|c| ChuteInfo {
                chute: c.chute,
                module: c.module.to_string(),
                pin: c.pin,
                pulse_distance: c.pulse_distance,
                delay_factor: c.delay_factor,
                magnet_hold_ms: c.magnet_hold_ms,
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        trigger: TriggerInfo {
            address: blueprint.trigger.address.to_string(),
            channel: blueprint.trigger.channel,
        },
        default_interval_ms: blueprint.timing.default_interval_ms,
        error_chute: blueprint.error_chute,
        modules: modules(blueprint),
        chutes,
        sinks,
        admission_listen: blueprint.admission_listen.clone(),
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(blueprint: &contracts::SorterBlueprint, args: &InfoArgs) {
    println!("=== Sorter Configuration ===\n");

    println!("Line");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!(
        "   ├─ Trigger: {} (channel {})",
        blueprint.trigger.address, blueprint.trigger.channel
    );
    println!(
        "   ├─ Default interval: {} ms",
        blueprint.timing.default_interval_ms
    );
    println!("   ├─ Error chute: {}", blueprint.error_chute);
    match &blueprint.admission_listen {
        Some(listen) => println!("   └─ Admission: {}", listen),
        None => println!("   └─ Admission: (disabled)"),
    }

    let modules = modules(blueprint);
    println!("\nModules ({})", modules.len());
    for (i, module) in modules.iter().enumerate() {
        println!(
            "   {} {} -> chutes {:?}",
            tree_prefix(i, modules.len()),
            module.address,
            module.chutes
        );
    }

    if args.chutes && !blueprint.chutes.is_empty() {
        println!("\nChutes ({})", blueprint.chutes.len());
        for (i, c) in blueprint.chutes.iter().enumerate() {
            println!(
                "   {} {:>3}: pin {} on {}, distance {}, delay x{:.2}, hold {} ms",
                tree_prefix(i, blueprint.chutes.len()),
                c.chute,
                c.pin,
                c.module,
                c.pulse_distance,
                c.delay_factor,
                c.magnet_hold_ms
            );
        }
    }

    if args.sinks && !blueprint.sinks.is_empty() {
        println!("\nSinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            println!(
                "   {} {} ({:?}, queue {})",
                tree_prefix(i, blueprint.sinks.len()),
                sink.name,
                sink.sink_type,
                sink.queue_capacity
            );
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_loader::{ConfigFormat, ConfigLoader};

    const CONFIG: &str = r#"
error_chute = 99

[trigger]
address = { kind = "serial", port = "/dev/ttyUSB0", baud_rate = 115200 }

[[chutes]]
chute = 4
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 1
pulse_distance = 3
delay_factor = 0.5
magnet_hold_ms = 200

[[chutes]]
chute = 2
module = { kind = "tcp", host = "10.0.0.10", port = 4001 }
pin = 2
pulse_distance = 2
delay_factor = 0.5
magnet_hold_ms = 200
"#;

    #[test]
    fn test_modules_group_chutes() {
        let blueprint = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let info = build_config_info(
            &blueprint,
            &InfoArgs {
                config: "unused.toml".into(),
                json: true,
                chutes: false,
                sinks: false,
            },
        );

        assert_eq!(info.trigger.address, "serial:///dev/ttyUSB0@115200-8N1");
        assert_eq!(info.modules.len(), 1);
        assert_eq!(info.modules[0].chutes, vec![2, 4]);
        assert!(info.chutes.is_empty());

        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("chutes").is_none());
        assert_eq!(json["error_chute"], 99);
    }
}
