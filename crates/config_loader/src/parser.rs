//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, SorterBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<SorterBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(|e| ContractError::ConfigParse {
            message: format!("TOML parse error: {e}"),
            source: Some(Box::new(e)),
        }),
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
                message: format!("JSON parse error: {e}"),
                source: Some(Box::new(e)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{LinkAddress, Parity};

    #[test]
    fn test_parse_json_serial_module() {
        let content = r#"{
            "error_chute": 0,
            "trigger": { "address": { "kind": "serial", "port": "/dev/ttyS1", "baud_rate": 19200 } },
            "chutes": [{
                "chute": 4,
                "module": { "kind": "serial", "port": "/dev/ttyS2", "parity": "even" },
                "pin": 7,
                "pulse_distance": 2,
                "delay_factor": 0.0,
                "magnet_hold_ms": 100
            }]
        }"#;
        let bp = parse(content, ConfigFormat::Json).unwrap();
        assert_eq!(bp.trigger.address, LinkAddress::serial("/dev/ttyS1", 19200));
        match &bp.chutes[0].module {
            LinkAddress::Serial {
                baud_rate, parity, ..
            } => {
                assert_eq!(*baud_rate, 9600);
                assert_eq!(*parity, Parity::Even);
            }
            other => panic!("unexpected module address {other}"),
        }
        assert!(bp.sinks.is_empty());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let result = parse("invalid toml [[[", ConfigFormat::Toml);
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_parse_missing_trigger() {
        let result = parse("error_chute = 1\n", ConfigFormat::Toml);
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
