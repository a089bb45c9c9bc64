use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::adb::runner::AdbRunner;
use crate::app::adb::transfer::{local_file_count, pull};
use crate::app::config::TimeoutSettings;
use crate::app::dbcheck;
use crate::app::error::AppError;

/// Message-store artifacts worth pulling, matched by suffix. Encrypted
/// variants keep their crypt generation in the name.
pub const DATABASE_SUFFIXES: &[&str] = &[".db", ".db.crypt12", ".db.crypt14", ".db.crypt15"];

/// The four media sub-folders of the Media directory.
pub const MEDIA_FOLDERS: &[&str] = &[
    "WhatsApp Images",
    "WhatsApp Video",
    "WhatsApp Audio",
    "WhatsApp Documents",
];

/// Databases that only exist under the app's private data dir and need
/// elevated access to reach.
const PROTECTED_DATABASES: &[&str] = &["msgstore.db", "wa.db"];
const PROTECTED_SOURCE_DIR: &str = "/data/data/com.whatsapp/databases";
const STAGING_DIR: &str = "/sdcard/.droidpull_staging";
const PROTECTED_PREFIX: &str = "protected_";

/// Storage locations resolved on the device. Rebuilt on every probe: the
/// device state may have changed between calls, so nothing here is cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhatsappPaths {
    pub root: Option<String>,
    pub databases: Option<String>,
    pub media: Option<String>,
    pub backups: Option<String>,
    pub discovered_files: Vec<String>,
}

impl WhatsappPaths {
    pub fn located(&self) -> bool {
        self.root.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaSelection {
    pub images: bool,
    pub video: bool,
    pub audio: bool,
    pub documents: bool,
}

impl Default for MediaSelection {
    fn default() -> Self {
        Self {
            images: true,
            video: true,
            audio: true,
            documents: true,
        }
    }
}

impl MediaSelection {
    pub fn none() -> Self {
        Self {
            images: false,
            video: false,
            audio: false,
            documents: false,
        }
    }

    pub fn any(&self) -> bool {
        self.images || self.video || self.audio || self.documents
    }

    pub fn folders(&self) -> Vec<&'static str> {
        let toggles = [self.images, self.video, self.audio, self.documents];
        MEDIA_FOLDERS
            .iter()
            .zip(toggles)
            .filter_map(|(folder, enabled)| enabled.then_some(*folder))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhatsappBackupRequest {
    pub include_databases: bool,
    pub media: MediaSelection,
}

impl Default for WhatsappBackupRequest {
    fn default() -> Self {
        Self {
            include_databases: true,
            media: MediaSelection::default(),
        }
    }
}

/// Combined outcome. Partial success is success: one transferred artifact
/// is enough.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhatsappBackupResult {
    pub paths: WhatsappPaths,
    pub database_files: Vec<String>,
    pub media_file_count: u64,
    pub errors: Vec<String>,
    pub success: bool,
}

fn remote_dir_exists(
    runner: &AdbRunner,
    serial: &str,
    path: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<bool, AppError> {
    // Judged on stdout rather than the exit code: older bridge builds do not
    // propagate remote exit codes through `shell`.
    let command = format!("test -d '{path}' && echo exists || echo missing");
    let output = runner.shell(Some(serial), &command, timeout, trace_id)?;
    Ok(output.success() && output.stdout.contains("exists"))
}

fn list_dir(
    runner: &AdbRunner,
    serial: &str,
    path: &str,
    timeout: Duration,
    trace_id: &str,
) -> Result<Vec<String>, AppError> {
    let command = format!("ls -1 '{path}'");
    let output = runner.shell(Some(serial), &command, timeout, trace_id)?;
    if !output.success() {
        return Ok(Vec::new());
    }
    Ok(output
        .stdout
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Probes the candidate roots in priority order and stops at the first that
/// exists — the order encodes per-Android-version layout changes. A device
/// with no root at all is a normal outcome: the app may never have been
/// opened.
pub fn locate_paths(
    runner: &AdbRunner,
    serial: &str,
    candidates: &[String],
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<WhatsappPaths, AppError> {
    let mut paths = WhatsappPaths::default();

    for candidate in candidates {
        if remote_dir_exists(runner, serial, candidate, timeouts.shell(), trace_id)? {
            paths.root = Some(candidate.clone());
            break;
        }
        debug!(trace_id = %trace_id, candidate = %candidate, "storage root candidate absent");
    }

    let Some(root) = paths.root.clone() else {
        info!(trace_id = %trace_id, serial = %serial, "no storage root found on device");
        return Ok(paths);
    };

    let mut discovered = Vec::new();
    let mut resolve_sub = |name: &str| -> Result<Option<String>, AppError> {
        let sub_path = format!("{root}/{name}");
        if !remote_dir_exists(runner, serial, &sub_path, timeouts.shell(), trace_id)? {
            return Ok(None);
        }
        for entry in list_dir(runner, serial, &sub_path, timeouts.shell(), trace_id)? {
            discovered.push(format!("{sub_path}/{entry}"));
        }
        Ok(Some(sub_path))
    };

    paths.databases = resolve_sub("Databases")?;
    paths.media = resolve_sub("Media")?;
    paths.backups = resolve_sub("Backups")?;
    paths.discovered_files = discovered;

    Ok(paths)
}

pub fn matches_database_suffix(name: &str) -> bool {
    DATABASE_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Pulls every suffix-matched entry of the databases directory. Per-file
/// failures never abort the sweep.
fn sweep_databases(
    runner: &AdbRunner,
    serial: &str,
    databases_dir: &str,
    dest: &Path,
    timeouts: &TimeoutSettings,
    trace_id: &str,
    downloaded: &mut Vec<String>,
    errors: &mut Vec<String>,
) {
    let entries = match list_dir(runner, serial, databases_dir, timeouts.shell(), trace_id) {
        Ok(entries) => entries,
        Err(err) => {
            errors.push(format!("{databases_dir}: {}", err.error));
            return;
        }
    };

    for name in entries.iter().filter(|name| matches_database_suffix(name)) {
        let remote = format!("{databases_dir}/{name}");
        let local = dest.join(name);
        match pull(runner, Some(serial), &remote, &local, timeouts.pull(), trace_id) {
            Ok(result) if result.success => {
                verify_database(&local, errors);
                downloaded.push(result.local_path);
            }
            Ok(result) => errors.push(format!("{name}: {}", result.message)),
            Err(err) => errors.push(format!("{name}: {}", err.error)),
        }
    }
}

/// Elevated-access retrieval of the private message stores. Requires a
/// rooted device; the absence of root shows up as a failed `su` invocation
/// and is treated as a normal, silent condition. Staged copies on the
/// device are removed again whether or not the pull worked.
fn sweep_protected_databases(
    runner: &AdbRunner,
    serial: &str,
    dest: &Path,
    timeouts: &TimeoutSettings,
    trace_id: &str,
    downloaded: &mut Vec<String>,
    errors: &mut Vec<String>,
) {
    for db in PROTECTED_DATABASES {
        let staged = format!("{STAGING_DIR}/{db}");
        let copy_command = format!(
            "su -c 'mkdir -p {STAGING_DIR} && cp {PROTECTED_SOURCE_DIR}/{db} {staged}'"
        );
        let copied = match runner.shell(Some(serial), &copy_command, timeouts.shell(), trace_id) {
            Ok(output) => output.success(),
            Err(err) => {
                errors.push(format!("{db}: {}", err.error));
                false
            }
        };
        if !copied {
            debug!(trace_id = %trace_id, db = %db, "elevated copy unavailable, skipping");
            continue;
        }

        let local = dest.join(format!("{PROTECTED_PREFIX}{db}"));
        match pull(runner, Some(serial), &staged, &local, timeouts.pull(), trace_id) {
            Ok(result) if result.success => {
                verify_database(&local, errors);
                downloaded.push(result.local_path);
            }
            Ok(result) => errors.push(format!("{db}: {}", result.message)),
            Err(err) => errors.push(format!("{db}: {}", err.error)),
        }

        // Cleanup runs regardless of the pull outcome.
        let cleanup = format!("rm -f '{staged}'");
        if let Err(err) = runner.shell(Some(serial), &cleanup, timeouts.shell(), trace_id) {
            warn!(trace_id = %trace_id, db = %db, error = %err.error, "staged copy cleanup failed");
        }
    }
}

/// Plain sqlite files get an integrity check after landing; encrypted
/// `.crypt*` archives cannot be opened and are taken as-is.
fn verify_database(local: &Path, errors: &mut Vec<String>) {
    let name = local.file_name().map(|n| n.to_string_lossy().to_string());
    let is_plain_db = name
        .as_deref()
        .map(|n| n.ends_with(".db"))
        .unwrap_or(false);
    if !is_plain_db {
        return;
    }
    if let Err(reason) = dbcheck::quick_check(local) {
        errors.push(format!(
            "{}: integrity check failed: {reason}",
            local.display()
        ));
    }
}

/// Pulls each selected media sub-folder that exists, tallying transferred
/// files by walking the local tree. Per-folder failures never abort the
/// sweep.
fn sweep_media(
    runner: &AdbRunner,
    serial: &str,
    media_dir: &str,
    dest: &Path,
    selection: &MediaSelection,
    timeouts: &TimeoutSettings,
    trace_id: &str,
    count: &mut u64,
    errors: &mut Vec<String>,
) {
    for folder in selection.folders() {
        let remote = format!("{media_dir}/{folder}");
        match remote_dir_exists(runner, serial, &remote, timeouts.shell(), trace_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!(trace_id = %trace_id, folder = %folder, "media folder absent");
                continue;
            }
            Err(err) => {
                errors.push(format!("{folder}: {}", err.error));
                continue;
            }
        }

        let local = dest.join(folder);
        match pull(runner, Some(serial), &remote, &local, timeouts.pull(), trace_id) {
            Ok(result) if result.success => {
                *count += local_file_count(&local);
            }
            Ok(result) => errors.push(format!("{folder}: {}", result.message)),
            Err(err) => errors.push(format!("{folder}: {}", err.error)),
        }
    }
}

/// Full application-data backup: locate the storage roots, sweep databases
/// (including the elevated-access stores) into `<dest>/databases/`, sweep
/// the selected media folders into `<dest>/media/`. Overall success means
/// at least one concrete artifact was transferred.
pub fn backup_application_data(
    runner: &AdbRunner,
    serial: &str,
    candidates: &[String],
    request: &WhatsappBackupRequest,
    dest_dir: &Path,
    timeouts: &TimeoutSettings,
    trace_id: &str,
) -> Result<WhatsappBackupResult, AppError> {
    let paths = locate_paths(runner, serial, candidates, timeouts, trace_id)?;

    let mut database_files = Vec::new();
    let mut media_file_count = 0u64;
    let mut errors = Vec::new();

    if request.include_databases {
        let db_dest = dest_dir.join("databases");
        if let Some(databases_dir) = paths.databases.as_deref() {
            sweep_databases(
                runner,
                serial,
                databases_dir,
                &db_dest,
                timeouts,
                trace_id,
                &mut database_files,
                &mut errors,
            );
        }
        sweep_protected_databases(
            runner,
            serial,
            &db_dest,
            timeouts,
            trace_id,
            &mut database_files,
            &mut errors,
        );
    }

    if request.media.any() {
        if let Some(media_dir) = paths.media.as_deref() {
            sweep_media(
                runner,
                serial,
                media_dir,
                &dest_dir.join("media"),
                &request.media,
                timeouts,
                trace_id,
                &mut media_file_count,
                &mut errors,
            );
        }
    }

    let success = !database_files.is_empty() || media_file_count > 0;
    info!(
        trace_id = %trace_id,
        serial = %serial,
        databases = database_files.len(),
        media_files = media_file_count,
        errors = errors.len(),
        success,
        "application data backup finished"
    );

    Ok(WhatsappBackupResult {
        paths,
        database_files,
        media_file_count,
        errors,
        success,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_selection_maps_toggles_to_folders() {
        let selection = MediaSelection {
            images: true,
            video: false,
            audio: true,
            documents: false,
        };
        assert_eq!(selection.folders(), vec!["WhatsApp Images", "WhatsApp Audio"]);
        assert!(selection.any());
        assert!(!MediaSelection::none().any());
    }

    #[test]
    fn database_suffix_matching() {
        assert!(matches_database_suffix("msgstore.db"));
        assert!(matches_database_suffix("msgstore.db.crypt14"));
        assert!(matches_database_suffix("wa.db.crypt15"));
        assert!(!matches_database_suffix("chatsettings.xml"));
        assert!(!matches_database_suffix("msgstore.db.bak"));
    }

    #[cfg(unix)]
    mod with_stub {
        use super::super::*;
        use std::fs;
        use std::path::Path;
        use tempfile::TempDir;

        /// Writes an executable fake bridge tool. Every invocation is
        /// appended to `log`; behaviour is supplied as the case body over
        /// the full argument string.
        fn stub_runner(dir: &Path, log: &Path, case_body: &str) -> AdbRunner {
            use std::os::unix::fs::PermissionsExt;
            let path = dir.join("adb-stub.sh");
            let body = format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\ncase \"$*\" in\nversion) exit 0;;\n{case_body}\nesac\n",
                log.display()
            );
            fs::write(&path, body).expect("stub");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            AdbRunner::new(path.to_string_lossy().to_string(), "t").expect("runner")
        }

        fn candidates(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        fn logged(log: &Path) -> Vec<String> {
            fs::read_to_string(log)
                .unwrap_or_default()
                .lines()
                .map(|l| l.to_string())
                .collect()
        }

        #[test]
        fn probe_stops_at_first_existing_candidate() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            // Both /a and /b exist; /a must win because it is probed first.
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"test -d '/a'\"*|*\"test -d '/b'\"*) echo exists;;\n\
                 *\"test -d\"*) echo missing;;\n\
                 *\"ls -1\"*) exit 0;;",
            );

            let paths = locate_paths(
                &runner,
                "SER",
                &candidates(&["/a", "/b"]),
                &TimeoutSettings::default(),
                "t",
            )
            .expect("probe");

            assert_eq!(paths.root.as_deref(), Some("/a"));
            assert!(!logged(&log).iter().any(|l| l.contains("test -d '/b'")));
        }

        #[test]
        fn found_root_derives_the_three_sub_paths() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"test -d '/a'\"*) echo exists;;\n\
                 *\"test -d '/a/Databases'\"*) echo exists;;\n\
                 *\"test -d '/a/Media'\"*) echo exists;;\n\
                 *\"test -d '/a/Backups'\"*) echo exists;;\n\
                 *\"test -d\"*) echo missing;;\n\
                 *\"ls -1 '/a/Databases'\"*) echo 'msgstore.db.crypt14'; echo 'wa.db';;\n\
                 *\"ls -1\"*) exit 0;;",
            );

            let paths = locate_paths(
                &runner,
                "SER",
                &candidates(&["/a", "/b"]),
                &TimeoutSettings::default(),
                "t",
            )
            .expect("probe");

            assert_eq!(paths.root.as_deref(), Some("/a"));
            assert_eq!(paths.databases.as_deref(), Some("/a/Databases"));
            assert_eq!(paths.media.as_deref(), Some("/a/Media"));
            assert_eq!(paths.backups.as_deref(), Some("/a/Backups"));
            assert!(paths
                .discovered_files
                .contains(&"/a/Databases/msgstore.db.crypt14".to_string()));
            assert!(paths.discovered_files.contains(&"/a/Databases/wa.db".to_string()));
        }

        #[test]
        fn no_candidate_existing_is_a_normal_empty_result() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            let runner = stub_runner(dir.path(), &log, "*\"test -d\"*) echo missing;;");

            let paths = locate_paths(
                &runner,
                "SER",
                &candidates(&["/a", "/b"]),
                &TimeoutSettings::default(),
                "t",
            )
            .expect("probe");

            assert!(!paths.located());
            assert_eq!(paths.databases, None);
            assert!(paths.discovered_files.is_empty());
        }

        #[test]
        fn media_sweep_attempts_only_selected_folders() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            // Every media folder exists; pulls succeed but transfer nothing.
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"test -d\"*) echo exists;;\n\
                 *\" pull \"*) exit 0;;",
            );

            let selection = MediaSelection {
                images: true,
                video: false,
                audio: true,
                documents: false,
            };
            let mut count = 0u64;
            let mut errors = Vec::new();
            sweep_media(
                &runner,
                "SER",
                "/a/Media",
                &dir.path().join("media"),
                &selection,
                &TimeoutSettings::default(),
                "t",
                &mut count,
                &mut errors,
            );

            let pulls: Vec<String> = logged(&log)
                .into_iter()
                .filter(|line| line.contains(" pull "))
                .collect();
            assert_eq!(pulls.len(), 2, "expected exactly two pull attempts: {pulls:?}");
            assert!(pulls[0].contains("WhatsApp Images"));
            assert!(pulls[1].contains("WhatsApp Audio"));
        }

        #[test]
        fn database_sweep_filters_by_suffix_and_flags_bad_sqlite() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            // The pull stub writes garbage bytes into the destination, so the
            // plain .db file fails its integrity check while the encrypted
            // artifact is accepted untouched.
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"ls -1\"*) echo 'msgstore.db'; echo 'msgstore.db.crypt14'; echo 'chatsettings.xml';;\n\
                 *\" pull \"*) for last; do :; done; printf 'not sqlite' > \"$last\"; exit 0;;",
            );

            let dest = dir.path().join("databases");
            let mut downloaded = Vec::new();
            let mut errors = Vec::new();
            sweep_databases(
                &runner,
                "SER",
                "/a/Databases",
                &dest,
                &TimeoutSettings::default(),
                "t",
                &mut downloaded,
                &mut errors,
            );

            assert_eq!(downloaded.len(), 2);
            assert!(downloaded.iter().any(|p| p.ends_with("msgstore.db")));
            assert!(downloaded.iter().any(|p| p.ends_with("msgstore.db.crypt14")));
            assert!(!logged(&log).iter().any(|l| l.contains("chatsettings.xml")));
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("integrity check failed"));
        }

        #[test]
        fn missing_root_access_fails_closed_and_silent() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            let runner = stub_runner(dir.path(), &log, "*\"su -c\"*) exit 1;;");

            let mut downloaded = Vec::new();
            let mut errors = Vec::new();
            sweep_protected_databases(
                &runner,
                "SER",
                &dir.path().join("databases"),
                &TimeoutSettings::default(),
                "t",
                &mut downloaded,
                &mut errors,
            );

            assert!(downloaded.is_empty());
            assert!(errors.is_empty());
            assert!(!logged(&log).iter().any(|l| l.contains(" pull ")));
        }

        #[test]
        fn elevated_copies_are_prefixed_and_staging_is_cleaned() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"su -c\"*) exit 0;;\n\
                 *\" pull \"*) for last; do :; done; printf 'copy' > \"$last\"; exit 0;;\n\
                 *\"rm -f\"*) exit 0;;",
            );

            let dest = dir.path().join("databases");
            let mut downloaded = Vec::new();
            let mut errors = Vec::new();
            sweep_protected_databases(
                &runner,
                "SER",
                &dest,
                &TimeoutSettings::default(),
                "t",
                &mut downloaded,
                &mut errors,
            );

            assert_eq!(downloaded.len(), 2);
            assert!(downloaded.iter().all(|p| p.contains("protected_")));
            // Each staged copy is deleted regardless of the pull outcome.
            let cleanups = logged(&log)
                .into_iter()
                .filter(|l| l.contains("rm -f"))
                .count();
            assert_eq!(cleanups, 2);
            // The pulled garbage fails the sqlite check for the plain .db names.
            assert_eq!(errors.len(), 2);
        }

        #[test]
        fn zero_artifacts_means_overall_failure() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            // Root exists, sub-dirs exist, but nothing matches: empty
            // databases listing and media pulls that transfer no files.
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"test -d\"*) echo exists;;\n\
                 *\"su -c\"*) exit 1;;\n\
                 *\"ls -1\"*) exit 0;;\n\
                 *\" pull \"*) exit 0;;",
            );

            let result = backup_application_data(
                &runner,
                "SER",
                &candidates(&["/sdcard/WhatsApp"]),
                &WhatsappBackupRequest::default(),
                &dir.path().join("out"),
                &TimeoutSettings::default(),
                "t",
            )
            .expect("backup");

            assert!(!result.success);
            assert!(result.database_files.is_empty());
            assert_eq!(result.media_file_count, 0);
        }

        #[test]
        fn one_database_artifact_is_enough_for_success() {
            let dir = TempDir::new().expect("tmp");
            let log = dir.path().join("calls.log");
            let runner = stub_runner(
                dir.path(),
                &log,
                "*\"test -d\"*) echo exists;;\n\
                 *\"su -c\"*) exit 1;;\n\
                 *\"ls -1\"*) echo 'msgstore.db.crypt14';;\n\
                 *\" pull \"*) for last; do :; done; printf 'blob' > \"$last\"; exit 0;;",
            );

            let request = WhatsappBackupRequest {
                include_databases: true,
                media: MediaSelection::none(),
            };
            let result = backup_application_data(
                &runner,
                "SER",
                &candidates(&["/sdcard/WhatsApp"]),
                &request,
                &dir.path().join("out"),
                &TimeoutSettings::default(),
                "t",
            )
            .expect("backup");

            assert!(result.success);
            assert_eq!(result.database_files.len(), 1);
            assert!(result.database_files[0].ends_with("msgstore.db.crypt14"));
        }
    }
}
