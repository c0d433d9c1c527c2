use std::time::Instant;

use parking_lot::Mutex;

use crate::protocol;

/// Node-wide stats source. Player counts come from the caller; memory and
/// cpu figures are read from procfs and degrade to zero elsewhere.
pub struct StatsCollector {
    started: Instant,
    cpu: Mutex<CpuSamples>,
}

#[derive(Default)]
struct CpuSamples {
    idle: u64,
    total: u64,
    process_ticks: u64,
    wall_ticks: u64,
}

/// USER_HZ is 100 on every Linux we ship to.
const USER_HZ: f64 = 100.0;

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cpu: Mutex::new(CpuSamples::default()),
        }
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn collect(&self, players: usize, playing_players: usize) -> protocol::Stats {
        let (used, total) = read_memory();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(1);
        let (system_load, process_load) = self.sample_cpu(cores);

        protocol::Stats {
            players: players as i32,
            playing_players: playing_players as i32,
            uptime: self.uptime_ms(),
            memory: protocol::Memory {
                free: total.saturating_sub(used),
                used,
                allocated: used,
                reservable: total,
            },
            cpu: protocol::Cpu {
                cores,
                system_load,
                process_load,
            },
        }
    }

    /// Loads are deltas against the previous call; the first call reports 0.
    fn sample_cpu(&self, cores: i32) -> (f64, f64) {
        let mut prev = self.cpu.lock();

        let system = read_system_ticks().map(|(idle, total)| {
            let load = ratio(
                total.saturating_sub(prev.total).saturating_sub(idle.saturating_sub(prev.idle)),
                total.saturating_sub(prev.total),
                prev.total,
            );
            prev.idle = idle;
            prev.total = total;
            load
        });

        let process = read_process_ticks().map(|(cpu, wall)| {
            let load = ratio(
                cpu.saturating_sub(prev.process_ticks),
                wall.saturating_sub(prev.wall_ticks),
                prev.wall_ticks,
            ) / cores.max(1) as f64;
            prev.process_ticks = cpu;
            prev.wall_ticks = wall;
            load
        });

        (
            system.unwrap_or(0.0),
            process.unwrap_or(0.0).clamp(0.0, 1.0),
        )
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn ratio(part: u64, whole: u64, baseline: u64) -> f64 {
    if baseline == 0 || whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}

/// `(resident bytes, total bytes)`.
fn read_memory() -> (u64, u64) {
    let kb_field = |text: &str, key: &str| -> Option<u64> {
        text.lines()
            .find(|l| l.starts_with(key))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse::<u64>().ok())
            .map(|kb| kb * 1024)
    };

    let rss = std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|s| kb_field(&s, "VmRSS:"))
        .unwrap_or(0);
    let total = std::fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|s| kb_field(&s, "MemTotal:"))
        .unwrap_or(0);
    (rss, total)
}

/// `(idle, total)` jiffies from the aggregate cpu line of `/proc/stat`.
fn read_system_ticks() -> Option<(u64, u64)> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let mut fields = stat.lines().next()?.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|v| v.parse().ok()).collect();
    let idle = *values.get(3)?;
    Some((idle, values.iter().sum()))
}

/// `(utime + stime, wall clock)` in ticks for this process.
fn read_process_ticks() -> Option<(u64, u64)> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // comm may contain spaces; fields restart after the closing paren
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;

    let uptime_secs: f64 = std::fs::read_to_string("/proc/uptime")
        .ok()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;

    Some((utime + stime, (uptime_secs * USER_HZ) as u64))
}
