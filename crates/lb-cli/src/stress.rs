use std::rc::Rc;
use std::time::Instant;

use lb_core::background;
use lb_core::keys::blocked_page_key;
use lb_core::messages::{Ack, ScanReport};
use lb_core::store::MemoryStore;
use lb_core::types::{TabCounterEntry, TabId};

const STRESS_HOST: &str = "stress.test";

pub struct StressOptions {
    pub tabs: u32,
    pub senders: u32,
    pub messages: u64,
}

impl StressOptions {
    /// Count every tab should end with: each sender reports 1..=messages.
    pub fn expected_per_tab(&self) -> u64 {
        self.senders as u64 * self.messages * (self.messages + 1) / 2
    }

    pub fn total_messages(&self) -> u64 {
        self.tabs as u64 * self.senders as u64 * self.messages
    }
}

/// Per-tab outcome of a stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabResult {
    pub tab_id: TabId,
    pub expected: u64,
    pub actual: Option<u64>,
}

impl TabResult {
    pub fn is_ok(&self) -> bool {
        self.actual == Some(self.expected)
    }
}

pub fn run_stress(opts: StressOptions) -> Result<(), String> {
    if opts.tabs == 0 || opts.senders == 0 || opts.messages == 0 {
        return Err("tabs, senders and messages must be greater than 0".to_string());
    }

    let start = Instant::now();
    let results = stress(&opts)?;
    let elapsed = start.elapsed();

    let failures: Vec<_> = results.iter().filter(|r| !r.is_ok()).collect();

    println!("Stress run: {} tabs x {} senders x {} messages", opts.tabs, opts.senders, opts.messages);
    println!("  Messages:    {}", opts.total_messages());
    println!("  Expected:    {} per tab", opts.expected_per_tab());
    println!("  Time:        {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    for failure in &failures {
        println!("  Tab {}: expected {}, got {:?}", failure.tab_id, failure.expected, failure.actual);
    }

    if failures.is_empty() {
        println!("  Result:      no lost updates");
        Ok(())
    } else {
        Err(format!("{} of {} tabs lost updates", failures.len(), results.len()))
    }
}

/// Spawn every sender as its own task against one background over a store
/// that yields on each access, then read back the counters.
pub fn stress(opts: &StressOptions) -> Result<Vec<TabResult>, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    let local = tokio::task::LocalSet::new();

    let store = Rc::new(MemoryStore::default().yielding());
    let (background, handle) = background::channel(Rc::clone(&store));
    let tabs = opts.tabs as TabId;
    let messages = opts.messages;

    local.block_on(&runtime, async move {
        let worker = tokio::task::spawn_local(background.run());

        let mut senders = Vec::with_capacity(opts.senders as usize);
        for _ in 0..opts.senders {
            let handle = handle.clone();
            senders.push(tokio::task::spawn_local(async move {
                for delta in 1..=messages {
                    for tab_id in 0..tabs {
                        let report = ScanReport {
                            num_blocked: delta,
                            hostname: STRESS_HOST.to_string(),
                        };
                        let ack = handle
                            .send_message(Some(tab_id), report.to_message())
                            .await
                            .map_err(|e| e.to_string())?;
                        if ack != Ack::Handled {
                            return Err(format!("Unexpected reply '{}'", ack.as_str()));
                        }
                    }
                    tokio::task::yield_now().await;
                }
                Ok::<(), String>(())
            }));
        }
        drop(handle);

        for sender in senders {
            sender.await.map_err(|e| format!("Sender task failed: {}", e))??;
        }
        worker.await.map_err(|e| format!("Background task failed: {}", e))
    })?;

    let snapshot = store.snapshot();
    Ok((0..tabs)
        .map(|tab_id| TabResult {
            tab_id,
            expected: opts.expected_per_tab(),
            actual: snapshot
                .get(&blocked_page_key(tab_id))
                .and_then(TabCounterEntry::from_value)
                .map(|entry| entry.num_blocked),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_per_tab() {
        let opts = StressOptions {
            tabs: 2,
            senders: 3,
            messages: 4,
        };
        assert_eq!(opts.expected_per_tab(), 30);
        assert_eq!(opts.total_messages(), 24);
    }

    #[test]
    fn test_stress_loses_nothing() {
        let opts = StressOptions {
            tabs: 3,
            senders: 5,
            messages: 20,
        };
        let results = stress(&opts).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(TabResult::is_ok), "{:?}", results);
    }

    #[test]
    fn test_rejects_empty_run() {
        let opts = StressOptions {
            tabs: 0,
            senders: 1,
            messages: 1,
        };
        assert!(run_stress(opts).is_err());
    }
}
