use std::path::PathBuf;

use uuid::Uuid;

use droidpull::app::adb::backup::{create_backup, restore_backup};
use droidpull::app::adb::devices::{
    app_info, device_profile, installed_packages, list_devices, save_logcat, select_device,
};
use droidpull::app::adb::locator::{locate_adb, probe_adb};
use droidpull::app::adb::parse::curated_properties;
use droidpull::app::adb::runner::AdbRunner;
use droidpull::app::adb::transfer::pull;
use droidpull::app::config::{load_config, AppConfig};
use droidpull::app::diagnostics::export_diagnostics_bundle;
use droidpull::app::error::AppError;
use droidpull::app::logging::init_logging;
use droidpull::app::models::{BackupOptions, Device};
use droidpull::app::output::{save_json, timestamped_filename};
use droidpull::app::whatsapp::{
    backup_application_data, MediaSelection, WhatsappBackupRequest,
};

#[derive(Debug, Clone, Default)]
struct Args {
    command: String,
    positionals: Vec<String>,
    serial: Option<String>,
    out_dir: Option<PathBuf>,
    json: bool,
    adb: Option<String>,
    lines: Option<u32>,
    no_apk: bool,
    no_shared: bool,
    system: bool,
    no_all: bool,
    file: Option<String>,
    no_databases: bool,
    no_media: bool,
    skip_images: bool,
    skip_video: bool,
    skip_audio: bool,
    skip_documents: bool,
}

const USAGE: &str = "\
Usage: droidpull [--serial SERIAL] [--out DIR] [--json] [--adb PATH] <command> [args]

Commands:
  check                     probe the bridge tool and report its version
  devices                   list attached devices
  info                      dump device properties to a JSON artifact
  apps                      list installed packages to a JSON artifact
  app-info <package>        dump package details to a JSON artifact
  ls [path]                 list a device directory (default /sdcard)
  pull <remote> [local]     pull a file or directory from the device
  shell <command...>        run a shell command on the device
  logcat [--lines N]        save a logcat snapshot
  backup [--no-apk] [--no-shared] [--system] [--no-all] [--file NAME]
                            create a full device backup (confirm on phone)
  restore <file>            restore a backup archive (confirm on phone)
  whatsapp [--no-databases] [--no-media] [--skip-images] [--skip-video]
           [--skip-audio] [--skip-documents]
                            extract WhatsApp databases and media
  diagnostics               export a diagnostics bundle
";

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        serial: std::env::var("ANDROID_SERIAL")
            .ok()
            .filter(|s| !s.trim().is_empty()),
        ..Args::default()
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                args.serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if args.serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                args.out_dir = Some(PathBuf::from(value));
            }
            "--adb" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--adb requires a value".to_string())?;
                args.adb = Some(value);
            }
            "--lines" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--lines requires a value".to_string())?;
                args.lines = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| format!("--lines expects a number, got '{value}'"))?,
                );
            }
            "--file" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--file requires a value".to_string())?;
                args.file = Some(value);
            }
            "--json" => args.json = true,
            "--no-apk" => args.no_apk = true,
            "--no-shared" => args.no_shared = true,
            "--system" => args.system = true,
            "--no-all" => args.no_all = true,
            "--no-databases" => args.no_databases = true,
            "--no-media" => args.no_media = true,
            "--skip-images" => args.skip_images = true,
            "--skip-video" => args.skip_video = true,
            "--skip-audio" => args.skip_audio = true,
            "--skip-documents" => args.skip_documents = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with('-') => return Err(format!("Unknown flag: {other}")),
            other => {
                if args.command.is_empty() {
                    args.command = other.to_string();
                } else {
                    args.positionals.push(other.to_string());
                }
            }
        }
    }

    if args.command.is_empty() {
        return Err(USAGE.to_string());
    }
    Ok(args)
}

fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No devices attached.");
        return;
    }
    println!("{} device(s):", devices.len());
    for device in devices {
        let marker = if device.is_authorized() { " " } else { "!" };
        if device.detail.is_empty() {
            println!("{marker} {}  {}", device.serial, device.state.as_str());
        } else {
            println!(
                "{marker} {}  {}  {}",
                device.serial,
                device.state.as_str(),
                device.detail
            );
        }
    }
}

fn resolve_runner(args: &Args, config: &AppConfig, trace_id: &str) -> Result<AdbRunner, AppError> {
    let configured = args
        .adb
        .as_deref()
        .unwrap_or(config.adb.command_path.as_str());
    locate_adb(configured, trace_id)
}

fn pick_serial(
    runner: &AdbRunner,
    args: &Args,
    config: &AppConfig,
    trace_id: &str,
) -> Result<String, AppError> {
    let devices = list_devices(runner, &config.timeouts, trace_id)?;
    let device = select_device(&devices, args.serial.as_deref(), trace_id)?;
    Ok(device.serial.clone())
}

fn run(args: &Args, config: &AppConfig, trace_id: &str) -> Result<i32, AppError> {
    let out_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.output_dir));

    match args.command.as_str() {
        "check" => {
            let configured = args
                .adb
                .as_deref()
                .unwrap_or(config.adb.command_path.as_str());
            let info = probe_adb(configured, trace_id);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&info).unwrap_or_default());
            } else if info.available {
                println!("adb found: {}", info.command_path);
                print!("{}", info.version_output);
            } else {
                println!(
                    "adb not available: {}",
                    info.error.as_deref().unwrap_or("unknown error")
                );
            }
            Ok(if info.available { 0 } else { 1 })
        }
        "diagnostics" => {
            let bundle = export_diagnostics_bundle(config, &out_dir, trace_id)?;
            println!("Diagnostics bundle: {}", bundle.display());
            Ok(0)
        }
        "devices" => {
            let runner = resolve_runner(args, config, trace_id)?;
            let devices = list_devices(&runner, &config.timeouts, trace_id)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&devices).unwrap_or_default()
                );
            } else {
                print_devices(&devices);
            }
            Ok(0)
        }
        "info" => {
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let (profile, map) = device_profile(&runner, &serial, &config.timeouts, trace_id)?;
            let curated = curated_properties(&map);
            let path = out_dir.join(timestamped_filename("device_info", &serial, "json"));
            save_json(&curated, &path, trace_id)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&profile).unwrap_or_default()
                );
            } else {
                println!(
                    "{} {} (Android {}, SDK {})",
                    profile.brand.as_deref().unwrap_or("?"),
                    profile.model.as_deref().unwrap_or("?"),
                    profile.android_release.as_deref().unwrap_or("?"),
                    profile.sdk_level.as_deref().unwrap_or("?")
                );
                println!("Saved: {}", path.display());
            }
            Ok(0)
        }
        "apps" => {
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let packages = installed_packages(&runner, &serial, &config.timeouts, trace_id)?;
            let payload = serde_json::json!({ "apps": packages, "count": packages.len() });
            let path = out_dir.join(timestamped_filename("installed_apps", &serial, "json"));
            save_json(&payload, &path, trace_id)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
            } else {
                println!("{} package(s). Saved: {}", packages.len(), path.display());
            }
            Ok(0)
        }
        "app-info" => {
            let package = args
                .positionals
                .first()
                .ok_or_else(|| AppError::validation("app-info needs a package name", trace_id))?;
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let info = app_info(&runner, &serial, package, &config.timeouts, trace_id)?;
            let path = out_dir.join(timestamped_filename("app_info", package, "json"));
            save_json(&info, &path, trace_id)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&info).unwrap_or_default());
            } else if info.installed {
                println!(
                    "{package}: installed, version {}",
                    info.version_name.as_deref().unwrap_or("?")
                );
                println!("Saved: {}", path.display());
            } else {
                println!("{package}: not installed");
            }
            Ok(if info.installed { 0 } else { 1 })
        }
        "ls" => {
            let remote = args
                .positionals
                .first()
                .map(String::as_str)
                .unwrap_or("/sdcard");
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let command = format!("ls -la '{remote}'");
            let output = runner.shell(
                Some(&serial),
                &command,
                config.timeouts.shell(),
                trace_id,
            )?;
            if output.success() {
                print!("{}", output.stdout);
                Ok(0)
            } else {
                eprintln!("{}", output.stderr.trim());
                Ok(1)
            }
        }
        "pull" => {
            let remote = args
                .positionals
                .first()
                .ok_or_else(|| AppError::validation("pull needs a remote path", trace_id))?;
            let local = match args.positionals.get(1) {
                Some(local) => PathBuf::from(local),
                None => {
                    let name = remote.rsplit('/').next().filter(|n| !n.is_empty());
                    out_dir.join(name.unwrap_or("pulled"))
                }
            };
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let result = pull(
                &runner,
                Some(&serial),
                remote,
                &local,
                config.timeouts.pull(),
                trace_id,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else if result.success {
                println!("{} -> {} ({})", remote, result.local_path, result.message);
            } else {
                eprintln!("pull failed: {}", result.message);
            }
            Ok(if result.success { 0 } else { 1 })
        }
        "shell" => {
            if args.positionals.is_empty() {
                return Err(AppError::validation("shell needs a command", trace_id));
            }
            let command = args.positionals.join(" ");
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let output = runner.shell(
                Some(&serial),
                &command,
                config.timeouts.shell(),
                trace_id,
            )?;
            print!("{}", output.stdout);
            if !output.stderr.is_empty() {
                eprint!("{}", output.stderr);
            }
            Ok(if output.success() { 0 } else { 1 })
        }
        "logcat" => {
            let lines = args.lines.unwrap_or(config.logcat.default_lines);
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let result = save_logcat(
                &runner,
                &serial,
                lines,
                &out_dir,
                &config.timeouts,
                trace_id,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else {
                println!(
                    "Saved {} line(s) to {}",
                    result.line_count, result.output_path
                );
            }
            Ok(0)
        }
        "backup" => {
            let options = BackupOptions {
                include_apk: !args.no_apk,
                include_shared: !args.no_shared,
                include_system: args.system,
                include_all: !args.no_all,
            };
            let file_name = args
                .file
                .clone()
                .unwrap_or_else(|| timestamped_filename("backup", "device", "ab"));
            let output_path = out_dir.join(file_name);
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            println!("Confirm the backup on the device screen (a blank password is fine).");
            let result = create_backup(
                &runner,
                Some(&serial),
                &options,
                &output_path,
                config.timeouts.backup(),
                trace_id,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else if result.success {
                println!("Backup written: {} ({} bytes)", result.output_path, result.file_size.unwrap_or(0));
            } else {
                eprintln!("Backup failed: {}", result.message);
            }
            Ok(if result.success { 0 } else { 1 })
        }
        "restore" => {
            let file = args
                .positionals
                .first()
                .ok_or_else(|| AppError::validation("restore needs a backup file", trace_id))?;
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            println!("Confirm the restore on the device screen. Existing data may be replaced.");
            let result = restore_backup(
                &runner,
                Some(&serial),
                &PathBuf::from(file),
                config.timeouts.restore(),
                trace_id,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else if result.success {
                println!("{}", result.message);
            } else {
                eprintln!("Restore failed: {}", result.message);
            }
            Ok(if result.success { 0 } else { 1 })
        }
        "whatsapp" => {
            let media = if args.no_media {
                MediaSelection::none()
            } else {
                MediaSelection {
                    images: !args.skip_images,
                    video: !args.skip_video,
                    audio: !args.skip_audio,
                    documents: !args.skip_documents,
                }
            };
            let request = WhatsappBackupRequest {
                include_databases: !args.no_databases,
                media,
            };
            let runner = resolve_runner(args, config, trace_id)?;
            let serial = pick_serial(&runner, args, config, trace_id)?;
            let dest = out_dir.join("whatsapp_backup");
            let result = backup_application_data(
                &runner,
                &serial,
                &config.whatsapp.root_candidates,
                &request,
                &dest,
                &config.timeouts,
                trace_id,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
            } else if !result.paths.located() {
                println!(
                    "No WhatsApp storage found. Open the app and send a message once, \
                     then try again."
                );
            } else {
                println!(
                    "Databases: {}  Media files: {}",
                    result.database_files.len(),
                    result.media_file_count
                );
                for file in &result.database_files {
                    println!("  {file}");
                }
                if !result.errors.is_empty() {
                    eprintln!("{} item(s) failed:", result.errors.len());
                    for error in &result.errors {
                        eprintln!("  {error}");
                    }
                }
                if result.success {
                    println!("Saved under {}", dest.display());
                } else {
                    eprintln!("Nothing was transferred.");
                }
            }
            Ok(if result.success { 0 } else { 1 })
        }
        other => Err(AppError::validation(
            format!("Unknown command: {other}. Run with --help for usage."),
            trace_id,
        )),
    }
}

fn main() {
    init_logging();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load config: {err}");
            std::process::exit(1);
        }
    };

    match run(&args, &config, &trace_id) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}
