use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{debug, error, info};
use vm_core::{Config, GuestArch, VmConfig};
use vm_engine_interpreter::Cpu;
use vm_frontend::{Architecture, LoongArch32r, Mips32, Riscv32, Riscv64, X86};

fn cli() -> Command {
    Command::new("vm-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Retargetable instruction-set emulator")
        .arg(
            Arg::new("arch")
                .short('a')
                .long("arch")
                .value_name("ARCH")
                .help("Guest architecture (riscv32, riscv64, mips32, loongarch32r, x86)")
                .value_parser(|s: &str| s.parse::<GuestArch>().map_err(|e| e.to_string())),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("image")
                .short('i')
                .long("image")
                .value_name("FILE")
                .help("Raw guest image, loaded at the reset vector [default: built-in image]")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("mem-size")
                .short('m')
                .long("mem-size")
                .value_name("SIZE")
                .help("Physical memory size (e.g. 64M, 0x800000)")
                .value_parser(parse_memory_size),
        )
        .arg(
            Arg::new("max-insts")
                .short('n')
                .long("max-insts")
                .value_name("NUM")
                .help("Stop after executing this many instructions")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log filter (error, warn, info, debug, trace)"),
        )
        .arg(
            Arg::new("random-mem")
                .long("random-mem")
                .help("Fill physical memory with random bytes before loading")
                .action(ArgAction::SetTrue),
        )
}

/// 解析内存大小，支持 K/M/G 后缀与 0x 前缀
fn parse_memory_size(s: &str) -> Result<usize, String> {
    let s = s.trim().to_uppercase();
    let (num, multiplier) = if let Some(n) = s.strip_suffix("GB").or(s.strip_suffix('G')) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB").or(s.strip_suffix('M')) {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("KB").or(s.strip_suffix('K')) {
        (n, 1024)
    } else {
        (s.as_str(), 1)
    };

    let value = match num.strip_prefix("0X") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => num.parse::<usize>(),
    }
    .map_err(|e| format!("invalid memory size '{s}': {e}"))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("memory size '{s}' is too large"))
}

/// 配置文件（或默认配置）叠加命令行参数
fn build_config(matches: &ArgMatches) -> Result<VmConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => VmConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => VmConfig::default(),
    };

    if let Some(arch) = matches.get_one::<GuestArch>("arch") {
        config.arch = *arch;
    }
    if let Some(size) = matches.get_one::<usize>("mem-size") {
        config.mem_size = *size;
    }
    if let Some(n) = matches.get_one::<u64>("max-insts") {
        config.max_instructions = Some(*n);
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if matches.get_flag("random-mem") {
        config.randomize_memory = true;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// 运行一个客户机，返回退出状态是否异常
fn run_guest<A: Architecture>(config: VmConfig, image: Option<&[u8]>) -> Result<bool> {
    info!("Welcome to {} emulator!", A::NAME);
    let budget = config.max_instructions.unwrap_or(u64::MAX);
    let mut cpu = Cpu::<A>::new(config)?;
    match image {
        Some(bytes) => cpu.load_image(bytes)?,
        None => cpu.load_builtin()?,
    };

    let state = cpu.run(budget)?;
    debug!("run finished in state {}", state);

    let bad = cpu.state().is_exit_status_bad();
    if bad {
        debug!("register file:\n{}", cpu.dump_regs());
    }
    Ok(bad)
}

fn run(matches: &ArgMatches) -> Result<bool> {
    let config = build_config(matches)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    )
    .init();

    let image = match matches.get_one::<PathBuf>("image") {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?,
        ),
        None => None,
    };
    let image = image.as_deref();

    match config.arch {
        GuestArch::Riscv32 => run_guest::<Riscv32>(config, image),
        GuestArch::Riscv64 => run_guest::<Riscv64>(config, image),
        GuestArch::Mips32 => run_guest::<Mips32>(config, image),
        GuestArch::LoongArch32r => run_guest::<LoongArch32r>(config, image),
        GuestArch::X86 => run_guest::<X86>(config, image),
    }
}

fn main() {
    let matches = cli().get_matches();
    match run(&matches) {
        Ok(bad) => process::exit(i32::from(bad)),
        Err(e) => {
            // 配置加载失败时日志尚未初始化
            let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error"))
                .try_init();
            error!("{:#}", e);
            process::exit(1);
        }
    }
}
