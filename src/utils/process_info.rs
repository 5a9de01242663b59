#[cfg(target_os = "linux")]
use std::fs;

/// A process as seen in `/proc/<pid>/stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStat {
    pub pid: u32,
    pub name: String,
    pub state: char,
}

impl ProcessStat {
    /// Zombies have exited and only wait to be reaped by their parent.
    pub fn is_zombie(&self) -> bool {
        self.state == 'Z' || self.state == 'X'
    }
}

/// Parse one `/proc/<pid>/stat` line. The name is enclosed in parentheses
/// and may itself contain spaces or parentheses, so it ends at the last `)`.
pub fn parse_stat_line(line: &str) -> Option<ProcessStat> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open {
        return None;
    }

    let pid = line[..open].trim().parse::<u32>().ok()?;
    let name = line[open + 1..close].to_string();

    let mut rest = line[close + 1..].split_whitespace();
    let state = rest.next()?.chars().next()?;

    Some(ProcessStat { pid, name, state })
}

/// Count live (non-zombie) processes whose name matches `name` exactly.
pub fn count_processes_named(name: &str) -> Result<usize, std::io::Error> {
    #[cfg(target_os = "linux")]
    {
        let pids: Vec<u32> = list_linux_processes()?
            .iter()
            .filter(|stat| stat.name == name && !stat.is_zombie())
            .map(|stat| stat.pid)
            .collect();
        tracing::trace!(name, ?pids, "live processes");
        Ok(pids.len())
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = name;
        Ok(0)
    }
}

#[cfg(target_os = "linux")]
fn list_linux_processes() -> Result<Vec<ProcessStat>, std::io::Error> {
    let mut processes = Vec::new();

    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(pid) = file_name.to_str() else {
            continue;
        };
        if !pid.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        // The process may exit between read_dir and read.
        let Ok(line) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };

        if let Some(stat) = parse_stat_line(&line) {
            processes.push(stat);
        }
    }

    Ok(processes)
}
