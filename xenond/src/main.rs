//! # Xenon Host Daemon
//!
//! Main entry point for the host runtime.

use std::env;
use std::path::PathBuf;
use std::process;
use xenond::config::{parse_assignment, parse_hex_u32};
use xenond::{
    logger, ExecutableConfig, HostCommand, HostCommandParser, HostRuntime, HostRuntimeConfig,
    MountConfig, MountKind, SymlinkConfig,
};

const DEFAULT_EXECUTABLE: &str = "default.xex";

/// Command-line settings, applied over the configuration file
#[derive(Debug, Default)]
struct CliOptions {
    config_path: Option<PathBuf>,
    log_level: Option<String>,
    mounts: Vec<MountConfig>,
    symlinks: Vec<SymlinkConfig>,
    executable: Option<String>,
    system_flags: Option<u32>,
    commands: Vec<HostCommand>,
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("xenond");

    let options = parse_args(&args).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        print_usage(program);
        process::exit(1);
    });

    let mut commands = options.commands.clone();
    let config = build_config(options).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });

    let level = config.log_level_filter().unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1);
    });
    if let Err(e) = logger::init(level) {
        eprintln!("Warning: logger not installed: {}", e);
    }

    let runtime = HostRuntime::new(config).unwrap_or_else(|e| {
        eprintln!("Failed to create runtime: {}", e);
        process::exit(1);
    });

    if commands.is_empty() {
        commands = vec![HostCommand::Mounts, HostCommand::Exports];
    }

    let mut failed = false;
    for command in &commands {
        match runtime.execute(command) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{:?}: {}", command, e);
                failed = true;
            }
        }
    }

    drop(runtime);
    if failed {
        process::exit(2);
    }
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_mount(arg: &str, kind: MountKind) -> Result<MountConfig, String> {
    let (prefix, host_path) = parse_assignment(arg).map_err(|e| e.to_string())?;
    Ok(MountConfig {
        prefix,
        kind,
        host_path: PathBuf::from(host_path),
    })
}

fn parse_args(args: &[String]) -> Result<CliOptions, String> {
    let mut options = CliOptions::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                options.config_path = Some(PathBuf::from(next_value(args, &mut i, "--config")?));
            }
            "--log-level" => {
                options.log_level = Some(next_value(args, &mut i, "--log-level")?.to_string());
            }
            "--mount-dir" => {
                let value = next_value(args, &mut i, "--mount-dir")?;
                options
                    .mounts
                    .push(parse_mount(value, MountKind::LocalDirectory)?);
            }
            "--mount-disc" => {
                let value = next_value(args, &mut i, "--mount-disc")?;
                options.mounts.push(parse_mount(value, MountKind::DiscImage)?);
            }
            "--symlink" => {
                let value = next_value(args, &mut i, "--symlink")?;
                let (source, target) = parse_assignment(value).map_err(|e| e.to_string())?;
                options.symlinks.push(SymlinkConfig { source, target });
            }
            "--executable" => {
                options.executable = Some(next_value(args, &mut i, "--executable")?.to_string());
            }
            "--system-flags" => {
                let value = next_value(args, &mut i, "--system-flags")?;
                options.system_flags = Some(parse_hex_u32(value).map_err(|e| e.to_string())?);
            }
            "--resolve" => {
                let path = next_value(args, &mut i, "--resolve")?;
                options.commands.push(HostCommand::Resolve {
                    path: path.to_string(),
                });
            }
            "--xconfig" => {
                let value = next_value(args, &mut i, "--xconfig")?;
                options
                    .commands
                    .push(HostCommandParser::parse_xconfig(value).map_err(|e| e.to_string())?);
            }
            "--privilege" => {
                let value = next_value(args, &mut i, "--privilege")?;
                options
                    .commands
                    .push(HostCommandParser::parse_privilege(value).map_err(|e| e.to_string())?);
            }
            "--module" => {
                let name = next_value(args, &mut i, "--module")?;
                options.commands.push(HostCommand::ModuleHandle {
                    name: name.to_string(),
                });
            }
            "--help" | "-h" => {
                print_usage(args.first().map(String::as_str).unwrap_or("xenond"));
                process::exit(0);
            }
            other => {
                return Err(format!("Unknown option: {}", other));
            }
        }
        i += 1;
    }

    Ok(options)
}

/// Loads the configuration file, if any, and layers the flags over it
fn build_config(options: CliOptions) -> Result<HostRuntimeConfig, String> {
    let mut config = match &options.config_path {
        Some(path) => HostRuntimeConfig::load(path).map_err(|e| e.to_string())?,
        None => HostRuntimeConfig::default(),
    };

    if let Some(level) = options.log_level {
        config.log_level = level;
    }
    config.mounts.extend(options.mounts);
    config.symlinks.extend(options.symlinks);

    if options.executable.is_some() || options.system_flags.is_some() {
        let executable = config.executable.get_or_insert_with(|| ExecutableConfig {
            name: DEFAULT_EXECUTABLE.to_string(),
            system_flags: 0,
        });
        if let Some(name) = options.executable {
            executable.name = name;
        }
        if let Some(flags) = options.system_flags {
            executable.system_flags = flags;
        }
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>        JSON configuration file");
    eprintln!("  --log-level <LEVEL>        off, error, warn, info, debug or trace");
    eprintln!("  --mount-dir <PREFIX=PATH>  Mount a host directory");
    eprintln!("  --mount-disc <PREFIX=PATH> Mount a GDFX disc image");
    eprintln!("  --symlink <SOURCE=TARGET>  Create a symbolic link");
    eprintln!("  --executable <NAME>        Executable module name (default: default.xex)");
    eprintln!("  --system-flags <HEX>       Executable system flags");
    eprintln!("  --resolve <PATH>           Resolve a guest path");
    eprintln!("  --xconfig <CAT:SET>        Query a configuration setting (hex)");
    eprintln!("  --privilege <BIT>          Check an executable privilege bit");
    eprintln!("  --module <NAME>            Look up a module handle");
    eprintln!("  -h, --help                 Show this help message");
    eprintln!();
    eprintln!("Symbolic links match whole paths: 'd:' is rewritten, 'd:\\x' is not.");
    eprintln!();
    eprintln!("Examples:");
    eprintln!(
        "  {} --mount-disc '\\Device\\Cdrom0\\=game.iso' --symlink 'd:=\\Device\\Cdrom0\\' \\",
        program
    );
    eprintln!("      --resolve 'd:' --resolve '\\Device\\Cdrom0\\default.xex'");
    eprintln!("  {} --system-flags 40 --privilege 6 --xconfig 3:A", program);
}
