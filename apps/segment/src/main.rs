//! 肝脏分割命令行程序.
//!
//! ```text
//! segment <INPUT> [--model weights.json] [--device cpu|cuda[:N]] [--output DIR] [--config FILE]
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use liver_berry::pipeline::{LiverSegmentation, Segmentation};
use liver_berry::predict::{create_predictor, Device};
use log::LevelFilter;
use simple_logger::SimpleLogger;

/// 对腹部 CT 扫描 (DICOM 文件或序列目录, NIfTI 文件) 执行肝脏分割.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// 输入文件或序列目录.
    input: PathBuf,

    /// 模型权重文件.
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// 计算设备: cpu, cuda 或 cuda:N.
    #[arg(short, long, default_value = "cuda")]
    device: Device,

    /// 结果根目录. 缺省时依次取 `$LIVER_SEG_OUTPUT_DIR` 与配置文件中的值.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TOML 配置文件. 缺省时取 `$LIVER_SEG_CONFIG`.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("初始化日志失败")?;
    let cli = Cli::parse();

    let mut cfg = utils::load_config(cli.config).context("加载配置失败")?;
    if let Some(dir) = cli.output.or_else(utils::output_dir_from_env) {
        cfg.output_dir = dir;
    }

    let predictor =
        create_predictor(cli.model.as_deref(), cli.device).context("加载预测器失败")?;
    let mut pipeline = LiverSegmentation::from_config(&cfg, predictor);
    let result = pipeline
        .segment_from_dicom(&cli.input, None)
        .with_context(|| format!("分割 {} 失败", cli.input.display()))?;
    report(&result);
    Ok(())
}

fn report(r: &Segmentation) {
    utils::sep();
    println!("结果 ID: {}", r.result_id);
    if r.metadata.synthetic {
        println!("注意: 影像后端不可用, 本结果基于合成数据!");
    }
    println!("推理耗时: {:.1} ms", r.inference_time_ms);
    println!("总耗时: {:.1} ms", r.total_time_ms);
    println!("含肝脏切片数: {}", r.slices.len());
    utils::sep();
    print!("{}", r.metrics);
    utils::sep();
    for (name, path) in r.output_paths.iter() {
        println!("{name}: {}", path.display());
    }
}
