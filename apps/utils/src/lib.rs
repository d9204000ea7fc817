//! 命令行程序依赖的通用组件.

use std::env;
use std::path::PathBuf;

use liver_berry::config::PipelineConfig;
use liver_berry::SegResult;

const SEP: &str = "--------------------------------------------------------";

/// 结果根目录环境变量.
pub const OUTPUT_DIR_ENV: &str = "LIVER_SEG_OUTPUT_DIR";

/// 配置文件环境变量.
pub const CONFIG_ENV: &str = "LIVER_SEG_CONFIG";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 若环境变量 `$LIVER_SEG_OUTPUT_DIR` 非空, 则返回其值.
pub fn output_dir_from_env() -> Option<PathBuf> {
    env::var_os(OUTPUT_DIR_ENV)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
}

/// 获取配置文件路径.
///
/// 1. 若给出了 `explicit`, 则返回它;
/// 2. 若环境变量 `$LIVER_SEG_CONFIG` 非空, 则返回其值;
/// 3. 否则, 返回 `None`.
pub fn config_path_from_env(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    })
}

/// 加载配置. 没有配置文件时使用默认配置.
pub fn load_config(explicit: Option<PathBuf>) -> SegResult<PipelineConfig> {
    match config_path_from_env(explicit) {
        Some(p) => PipelineConfig::from_file(p),
        None => {
            log::debug!("未指定配置文件, 使用默认配置");
            Ok(PipelineConfig::default())
        }
    }
}
