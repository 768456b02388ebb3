//! Integration tests for xenond host runtime

use guest_abi::XStatus;
use guest_fs::{EntryKind, FsError};
use std::fs;
use xenond::{
    CommandOutput, ExecutableConfig, HostCommand, HostRuntime, HostRuntimeConfig,
    HostRuntimeError, MountConfig, MountKind, SymlinkConfig,
};

fn game_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("default.xex"), b"XEX2....").unwrap();
    fs::create_dir(dir.path().join("media")).unwrap();
    dir
}

fn config_for(dir: &tempfile::TempDir) -> HostRuntimeConfig {
    HostRuntimeConfig {
        strict_lifetimes: true,
        mounts: vec![MountConfig {
            prefix: "\\Device\\Harddisk0\\Partition1\\".to_string(),
            kind: MountKind::LocalDirectory,
            host_path: dir.path().to_path_buf(),
        }],
        symlinks: vec![SymlinkConfig {
            source: "game:".to_string(),
            target: "\\Device\\Harddisk0\\Partition1\\".to_string(),
        }],
        executable: Some(ExecutableConfig {
            name: "default.xex".to_string(),
            system_flags: 0x40,
        }),
        ..HostRuntimeConfig::default()
    }
}

#[test]
fn test_runtime_from_config() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();

    assert_eq!(runtime.file_system().mounts().len(), 1);
    assert_eq!(runtime.kernel().module_count(), 1);
    assert!(runtime.kernel().get_executable_module().is_some());
    assert_eq!(runtime.resolver().len(), 7);
}

#[test]
fn test_resolve_through_symlink() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();

    let output = runtime
        .execute(&HostCommand::Resolve {
            path: "\\Device\\Harddisk0\\Partition1\\default.xex".to_string(),
        })
        .unwrap();
    match output {
        CommandOutput::Entry(entry) => {
            assert_eq!(entry.kind, EntryKind::File);
            assert_eq!(entry.size, 8);
        }
        other => panic!("unexpected output: {:?}", other),
    }

    let output = runtime
        .execute(&HostCommand::Resolve {
            path: "game:".to_string(),
        })
        .unwrap();
    assert!(matches!(output, CommandOutput::Entry(entry) if entry.is_directory()));
}

#[test]
fn test_resolve_failures() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();

    let err = runtime
        .execute(&HostCommand::Resolve {
            path: "cache:\\x".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, HostRuntimeError::Fs(FsError::NoDevice(_))));
}

#[test]
fn test_xconfig_query() {
    let runtime = HostRuntime::new(HostRuntimeConfig::default()).unwrap();

    let output = runtime
        .execute(&HostCommand::XConfig {
            category: 0x0003,
            setting: 0x000A,
        })
        .unwrap();
    assert_eq!(
        output,
        CommandOutput::XConfig {
            status: XStatus::SUCCESS,
            required_size: 4,
            value: vec![0x00, 0x04, 0x00, 0x00],
        }
    );
    assert_eq!(
        output.to_string(),
        "STATUS_SUCCESS (0x00000000) required_size=4 value=00040000"
    );

    let output = runtime
        .execute(&HostCommand::XConfig {
            category: 0x0003,
            setting: 0x0099,
        })
        .unwrap();
    assert_eq!(
        output,
        CommandOutput::XConfig {
            status: XStatus::INVALID_PARAMETER_2,
            required_size: 0,
            value: Vec::new(),
        }
    );
}

#[test]
fn test_privilege_query() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();

    assert_eq!(
        runtime.execute(&HostCommand::Privilege { bit: 6 }).unwrap(),
        CommandOutput::Privilege {
            bit: 6,
            granted: true
        }
    );
    assert_eq!(
        runtime.execute(&HostCommand::Privilege { bit: 5 }).unwrap(),
        CommandOutput::Privilege {
            bit: 5,
            granted: false
        }
    );
}

#[test]
fn test_module_handle_query() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();
    let expected = runtime.executable_module().unwrap().handle();

    assert_eq!(
        runtime
            .execute(&HostCommand::ModuleHandle {
                name: "DEFAULT.XEX".to_string()
            })
            .unwrap(),
        CommandOutput::ModuleHandle {
            name: "DEFAULT.XEX".to_string(),
            handle: Some(expected),
        }
    );
    assert_eq!(runtime.executable_module().unwrap().ref_count(), 1);

    assert_eq!(
        runtime
            .execute(&HostCommand::ModuleHandle {
                name: "xam.xex".to_string()
            })
            .unwrap(),
        CommandOutput::ModuleHandle {
            name: "xam.xex".to_string(),
            handle: None,
        }
    );
}

#[test]
fn test_listings() {
    let dir = game_dir();
    let runtime = HostRuntime::new(config_for(&dir)).unwrap();

    let mounts = runtime.execute(&HostCommand::Mounts).unwrap();
    assert!(mounts.to_string().starts_with("\\Device\\Harddisk0\\Partition1\\ -> local directory"));

    match runtime.execute(&HostCommand::Exports).unwrap() {
        CommandOutput::Exports(keys) => assert_eq!(keys.len(), 7),
        other => panic!("unexpected output: {:?}", other),
    }
}

#[test]
fn test_invalid_config_rejected() {
    let config = HostRuntimeConfig {
        symlinks: vec![SymlinkConfig {
            source: String::new(),
            target: "/".to_string(),
        }],
        ..HostRuntimeConfig::default()
    };
    assert!(matches!(
        HostRuntime::new(config),
        Err(HostRuntimeError::Config(_))
    ));
}

#[test]
fn test_missing_mount_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = HostRuntimeConfig {
        mounts: vec![MountConfig {
            prefix: "/".to_string(),
            kind: MountKind::LocalDirectory,
            host_path: dir.path().join("missing"),
        }],
        ..HostRuntimeConfig::default()
    };
    assert!(matches!(
        HostRuntime::new(config),
        Err(HostRuntimeError::Fs(FsError::Io(_)))
    ));
}

#[test]
fn test_config_file_roundtrip() {
    let dir = game_dir();
    let config = config_for(&dir);
    let path = dir.path().join("xenond.json");
    fs::write(&path, config.to_json().unwrap()).unwrap();

    let loaded = HostRuntimeConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    assert!(HostRuntime::new(loaded).is_ok());
}

fn run_xenond(dir: &tempfile::TempDir, args: &[&str]) -> std::process::Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_xenond"))
        .current_dir(dir.path())
        .args(["--log-level", "off"])
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_usage_disc_example_runs() {
    let dir = tempfile::tempdir().unwrap();
    let image = tests_hle::GdfxImageBuilder::new()
        .file("default.xex", b"XEX2")
        .build();
    fs::write(dir.path().join("game.iso"), image).unwrap();

    let output = run_xenond(
        &dir,
        &[
            "--mount-disc",
            "\\Device\\Cdrom0\\=game.iso",
            "--symlink",
            "d:=\\Device\\Cdrom0\\",
            "--resolve",
            "d:",
            "--resolve",
            "\\Device\\Cdrom0\\default.xex",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Directory ''"));
    assert!(lines[1].starts_with("File 'default.xex' (4 bytes)"));
}

#[test]
fn test_usage_privilege_example_runs() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_xenond(
        &dir,
        &["--system-flags", "40", "--privilege", "6", "--xconfig", "3:A"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("privilege 6: granted"));
    assert!(stdout.contains("value=00040000"));
}

#[test]
fn test_drive_letter_prefix_is_not_aliased() {
    let dir = tempfile::tempdir().unwrap();
    let image = tests_hle::GdfxImageBuilder::new()
        .file("default.xex", b"XEX2")
        .build();
    fs::write(dir.path().join("game.iso"), image).unwrap();

    let output = run_xenond(
        &dir,
        &[
            "--mount-disc",
            "\\Device\\Cdrom0\\=game.iso",
            "--symlink",
            "d:=\\Device\\Cdrom0\\",
            "--resolve",
            "d:\\default.xex",
        ],
    );
    assert_eq!(output.status.code(), Some(2));
}
