//! 稽核流程各階段的耗時與記憶體監控

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[derive(Debug, Clone)]
pub struct PhaseStats {
    pub phase: String,
    pub phase_time: Duration,
    pub elapsed_time: Duration,
    pub memory_usage_mb: Option<u64>,
    pub peak_memory_mb: Option<u64>,
}

struct MonitorState {
    last_mark: Instant,
    peak_memory_mb: u64,
    phases: Vec<PhaseStats>,
    #[cfg(feature = "cli")]
    system: System,
}

pub struct PhaseMonitor {
    enabled: bool,
    start_time: Instant,
    #[cfg(feature = "cli")]
    pid: Option<Pid>,
    state: Mutex<MonitorState>,
}

impl PhaseMonitor {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            enabled,
            start_time: now,
            #[cfg(feature = "cli")]
            pid: sysinfo::get_current_pid().ok(),
            state: Mutex::new(MonitorState {
                last_mark: now,
                peak_memory_mb: 0,
                phases: Vec::new(),
                #[cfg(feature = "cli")]
                system: if enabled {
                    System::new_with_specifics(RefreshKind::everything())
                } else {
                    System::new()
                },
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[cfg(feature = "cli")]
    fn current_memory_mb(&self, state: &mut MonitorState) -> Option<u64> {
        let pid = self.pid?;
        state.system.refresh_all();
        state
            .system
            .process(pid)
            .map(|process| process.memory() / 1024 / 1024)
    }

    #[cfg(not(feature = "cli"))]
    fn current_memory_mb(&self, _state: &mut MonitorState) -> Option<u64> {
        None
    }

    /// 記錄一個階段結束；回傳該階段統計（未啟用時回傳 None）
    pub fn mark(&self, phase: &str) -> Option<PhaseStats> {
        if !self.enabled {
            return None;
        }

        let mut state = self.state.lock().ok()?;
        let now = Instant::now();
        let memory = self.current_memory_mb(&mut state);
        if let Some(mb) = memory {
            if mb > state.peak_memory_mb {
                state.peak_memory_mb = mb;
            }
        }

        let stats = PhaseStats {
            phase: phase.to_string(),
            phase_time: now.duration_since(state.last_mark),
            elapsed_time: now.duration_since(self.start_time),
            memory_usage_mb: memory,
            peak_memory_mb: memory.map(|_| state.peak_memory_mb),
        };
        state.last_mark = now;
        state.phases.push(stats.clone());

        match stats.memory_usage_mb {
            Some(mb) => tracing::info!(
                "📊 {} - took {:?}, Memory: {}MB, Peak: {}MB",
                phase,
                stats.phase_time,
                mb,
                stats.peak_memory_mb.unwrap_or(mb)
            ),
            None => tracing::info!("📊 {} - took {:?}", phase, stats.phase_time),
        }

        Some(stats)
    }

    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        if let Ok(state) = self.state.lock() {
            tracing::info!(
                "📊 Final Stats - {} phases, Total Time: {:?}, Peak Memory: {}MB",
                state.phases.len(),
                self.start_time.elapsed(),
                state.peak_memory_mb
            );
        }
    }
}

impl Default for PhaseMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}
