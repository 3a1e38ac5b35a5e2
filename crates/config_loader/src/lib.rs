//! # Config Loader
//!
//! 分拣线配置加载：TOML / JSON 文件 → 校验后的 `SorterBlueprint`。
//!
//! 校验覆盖槽口编号、脉冲距离、延迟系数、引脚冲突与错误槽口，
//! 引擎启动前以及 CLI 覆盖参数后都会再次运行。
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("sorter.toml")).unwrap();
//! let table = blueprint.to_binding_table();
//! println!("{} chutes, error chute {}", table.len(), table.error_chute());
//! ```

mod parser;
mod validator;

pub use contracts::SorterBlueprint;
pub use parser::ConfigFormat;

use contracts::{BindingTable, ContractError};
use std::path::Path;

/// Blueprint loader (stateless)
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a blueprint; `.toml` or `.json` decides the format
    pub fn load_from_path(path: &Path) -> Result<SorterBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Parse and validate a blueprint held in memory
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SorterBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        Self::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Validate a blueprint built or modified in code (e.g. after CLI overrides)
    pub fn validate(blueprint: &SorterBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    /// Validate a routing table swapped in at runtime
    pub fn validate_bindings(table: &BindingTable) -> Result<(), ContractError> {
        validator::validate_binding_table(table)
    }

    /// Serialize SorterBlueprint to TOML string
    pub fn to_toml(blueprint: &SorterBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SorterBlueprint to JSON string
    pub fn to_json(blueprint: &SorterBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }
}
