use crate::error::Result;
use std::sync::Arc;

use super::r#trait::BackendKind;

/// A running process as seen by one enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Read-only view of the OS process table.
pub trait ProcessTable: Send + Sync {
    /// Processes whose executable name matches `pattern` (see `matches_process_name`).
    fn find_by_name(&self, pattern: &str) -> Result<Vec<ProcessEntry>>;

    /// Whether `pid` has exited since it was enumerated.
    fn has_exited(&self, pid: u32) -> Result<bool>;
}

/// Lowercase and strip an optional `.exe` suffix.
pub fn normalize_process_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Case-insensitive match with the `.exe` suffix optional on both sides.
pub fn matches_process_name(name: &str, pattern: &str) -> bool {
    let pattern = normalize_process_name(pattern);
    !pattern.is_empty() && normalize_process_name(name) == pattern
}

pub fn create_process_table(kind: BackendKind) -> Arc<dyn ProcessTable> {
    match kind {
        BackendKind::DryRun => Arc::new(super::dry_run::DryRunProcessTable::new()),
        _ => native_process_table(),
    }
}

#[cfg(target_os = "linux")]
fn native_process_table() -> Arc<dyn ProcessTable> {
    Arc::new(procfs::ProcfsProcessTable::new())
}

#[cfg(windows)]
fn native_process_table() -> Arc<dyn ProcessTable> {
    Arc::new(toolhelp::ToolhelpProcessTable)
}

#[cfg(not(any(target_os = "linux", windows)))]
fn native_process_table() -> Arc<dyn ProcessTable> {
    Arc::new(super::dry_run::DryRunProcessTable::new())
}

#[cfg(target_os = "linux")]
pub mod procfs {
    use super::{matches_process_name, ProcessEntry, ProcessTable};
    use crate::error::{GlanceError, Result};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tracing::trace;

    /// `/proc` walker.
    ///
    /// Matches against both `comm` (truncated to 15 bytes by the kernel) and
    /// the basename of `argv[0]`, which is where Wine puts `C:\...\game.exe`.
    pub struct ProcfsProcessTable {
        root: PathBuf,
    }

    impl Default for ProcfsProcessTable {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProcfsProcessTable {
        pub fn new() -> Self {
            Self::with_root("/proc")
        }

        pub fn with_root(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }

        fn candidate_names(dir: &Path) -> Vec<String> {
            let mut names = Vec::with_capacity(2);

            if let Ok(comm) = fs::read_to_string(dir.join("comm")) {
                names.push(comm.trim().to_string());
            }

            if let Ok(cmdline) = fs::read(dir.join("cmdline")) {
                let argv0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
                let argv0 = String::from_utf8_lossy(argv0);
                if let Some(base) = argv0.rsplit(['/', '\\']).next() {
                    if !base.is_empty() {
                        names.push(base.to_string());
                    }
                }
            }

            names
        }
    }

    impl ProcessTable for ProcfsProcessTable {
        fn find_by_name(&self, pattern: &str) -> Result<Vec<ProcessEntry>> {
            let mut found = Vec::new();

            for entry in fs::read_dir(&self.root)? {
                let Ok(entry) = entry else { continue };
                let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                    continue;
                };

                // Processes can exit mid-walk; unreadable entries are simply skipped.
                let names = Self::candidate_names(&entry.path());
                if let Some(name) = names.into_iter().find(|n| matches_process_name(n, pattern)) {
                    trace!("pid {} matches '{}' as '{}'", pid, pattern, name);
                    found.push(ProcessEntry { pid, name });
                }
            }

            found.sort_by_key(|p| p.pid);
            Ok(found)
        }

        fn has_exited(&self, pid: u32) -> Result<bool> {
            let stat_path = self.root.join(pid.to_string()).join("stat");
            let stat = match fs::read_to_string(&stat_path) {
                Ok(stat) => stat,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
                Err(e) => {
                    return Err(GlanceError::Enumeration {
                        pid,
                        reason: e.to_string(),
                    })
                }
            };

            // State follows the parenthesised comm, which may itself contain ')'.
            let state = stat
                .rfind(')')
                .and_then(|idx| stat[idx + 1..].split_whitespace().next())
                .unwrap_or("?");
            Ok(matches!(state, "Z" | "X" | "x"))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn fake_proc(root: &Path, pid: u32, comm: &str, argv0: &str, state: &str) {
            let dir = root.join(pid.to_string());
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("comm"), format!("{}\n", comm)).unwrap();
            fs::write(dir.join("cmdline"), format!("{}\0--flag\0", argv0)).unwrap();
            fs::write(dir.join("stat"), format!("{} ({}) {} 1 1 1", pid, comm, state)).unwrap();
        }

        fn temp_root(name: &str) -> PathBuf {
            let root = std::env::temp_dir().join(format!("eve-glance-{}-{}", name, std::process::id()));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(&root).unwrap();
            root
        }

        #[test]
        fn test_matches_wine_argv0_and_comm() {
            let root = temp_root("procfs-match");
            fake_proc(&root, 100, "exefile.exe", "C:\\Games\\EVE\\bin\\exefile.exe", "S");
            fake_proc(&root, 200, "game", "/usr/bin/game", "S");
            fake_proc(&root, 300, "bash", "/bin/bash", "S");
            fs::create_dir_all(root.join("self")).unwrap();

            let table = ProcfsProcessTable::with_root(&root);
            let eve = table.find_by_name("ExeFile").unwrap();
            assert_eq!(eve.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![100]);

            let game = table.find_by_name("game.exe").unwrap();
            assert_eq!(game, vec![ProcessEntry { pid: 200, name: "game".to_string() }]);

            let _ = fs::remove_dir_all(&root);
        }

        #[test]
        fn test_zombie_and_missing_count_as_exited() {
            let root = temp_root("procfs-exit");
            fake_proc(&root, 10, "game", "game", "S");
            fake_proc(&root, 11, "we(ird) name", "game", "Z");

            let table = ProcfsProcessTable::with_root(&root);
            assert!(!table.has_exited(10).unwrap());
            assert!(table.has_exited(11).unwrap());
            assert!(table.has_exited(12).unwrap());

            let _ = fs::remove_dir_all(&root);
        }
    }
}

#[cfg(windows)]
pub mod toolhelp {
    use super::{matches_process_name, ProcessEntry, ProcessTable};
    use crate::error::{GlanceError, Result};
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };

    const STILL_ACTIVE: u32 = 259;

    pub struct ToolhelpProcessTable;

    fn exe_name(entry: &PROCESSENTRY32W) -> String {
        let len = entry
            .szExeFile
            .iter()
            .position(|c| *c == 0)
            .unwrap_or(entry.szExeFile.len());
        String::from_utf16_lossy(&entry.szExeFile[..len])
    }

    impl ProcessTable for ToolhelpProcessTable {
        fn find_by_name(&self, pattern: &str) -> Result<Vec<ProcessEntry>> {
            let mut found = Vec::new();
            unsafe {
                let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)?;
                let mut entry = PROCESSENTRY32W {
                    dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                    ..Default::default()
                };

                let mut more = Process32FirstW(snapshot, &mut entry).is_ok();
                while more {
                    let name = exe_name(&entry);
                    if matches_process_name(&name, pattern) {
                        found.push(ProcessEntry {
                            pid: entry.th32ProcessID,
                            name,
                        });
                    }
                    more = Process32NextW(snapshot, &mut entry).is_ok();
                }

                let _ = CloseHandle(snapshot);
            }
            Ok(found)
        }

        fn has_exited(&self, pid: u32) -> Result<bool> {
            unsafe {
                let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).map_err(|e| {
                    GlanceError::Enumeration {
                        pid,
                        reason: e.to_string(),
                    }
                })?;
                let mut code = 0u32;
                let result = GetExitCodeProcess(handle, &mut code);
                let _ = CloseHandle(handle);
                result.map_err(|e| GlanceError::Enumeration {
                    pid,
                    reason: e.to_string(),
                })?;
                Ok(code != STILL_ACTIVE)
            }
        }
    }
}
