use std::fs;
use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use lb_core::background::{self, BackgroundHandle, NavigationKind};
use lb_core::messages::ScanReport;
use lb_core::store::MemoryStore;
use lb_core::toggle::set_enabled;
use lb_core::types::{FrameId, Namespace, TabId, MAIN_FRAME_ID};

pub struct SimulateOptions {
    pub script: String,
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptNavigation {
    #[default]
    Completed,
    HistoryStateUpdated,
    ReferenceFragmentUpdated,
}

impl From<ScriptNavigation> for NavigationKind {
    fn from(kind: ScriptNavigation) -> Self {
        match kind {
            ScriptNavigation::Completed => Self::Completed,
            ScriptNavigation::HistoryStateUpdated => Self::HistoryStateUpdated,
            ScriptNavigation::ReferenceFragmentUpdated => Self::ReferenceFragmentUpdated,
        }
    }
}

fn main_frame() -> FrameId {
    MAIN_FRAME_ID
}

/// One line of a simulation script.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScriptEvent {
    /// A content script reporting a scan pass.
    Scan {
        tab: TabId,
        #[serde(rename = "numBlocked")]
        num_blocked: u64,
        hostname: String,
    },
    Navigate {
        tab: TabId,
        url: String,
        #[serde(default = "main_frame")]
        frame: FrameId,
        #[serde(default)]
        kind: ScriptNavigation,
    },
    Close {
        tab: TabId,
    },
    Toggle {
        enabled: bool,
    },
    /// An arbitrary runtime message.
    Message {
        tab: Option<TabId>,
        payload: Value,
    },
}

pub fn run_simulate(opts: SimulateOptions) -> Result<(), String> {
    let namespace = match &opts.config {
        Some(path) => crate::load_config(path)?.namespace,
        None => Namespace::Local,
    };
    let text = fs::read_to_string(&opts.script)
        .map_err(|e| format!("Failed to read '{}': {}", opts.script, e))?;
    let events: Vec<ScriptEvent> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid script '{}': {}", opts.script, e))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;

    let store = Rc::new(MemoryStore::new(namespace));
    let lines = runtime.block_on(replay(Rc::clone(&store), events))?;
    for line in &lines {
        println!("{}", line);
    }

    let snapshot = serde_json::to_string_pretty(&Value::Object(store.snapshot()))
        .map_err(|e| format!("Failed to serialize store: {}", e))?;
    println!("{}", snapshot);
    Ok(())
}

/// Run the background over `store` and feed it `events` in order.
/// Returns one output line per event.
pub async fn replay(store: Rc<MemoryStore>, events: Vec<ScriptEvent>) -> Result<Vec<String>, String> {
    let (background, handle) = background::channel(Rc::clone(&store));
    let script = async move {
        let mut lines = Vec::with_capacity(events.len());
        for (i, event) in events.into_iter().enumerate() {
            let line = apply(&handle, &store, event)
                .await
                .map_err(|e| format!("Event {}: {}", i, e))?;
            lines.push(format!("[{}] {}", i, line));
        }
        Ok::<_, String>(lines)
    };
    let ((), lines) = futures::join!(background.run(), script);
    lines
}

async fn apply(handle: &BackgroundHandle, store: &Rc<MemoryStore>, event: ScriptEvent) -> lb_core::Result<String> {
    match event {
        ScriptEvent::Scan {
            tab,
            num_blocked,
            hostname,
        } => {
            let report = ScanReport {
                num_blocked,
                hostname,
            };
            let ack = handle.send_message(Some(tab), report.to_message()).await?;
            Ok(format!("scan tab {} +{}: {}", tab, num_blocked, ack.as_str()))
        }
        ScriptEvent::Navigate { tab, url, frame, kind } => {
            let line = format!("navigate tab {} frame {}: {}", tab, frame, url);
            handle.navigation(tab, frame, url, kind.into())?;
            Ok(line)
        }
        ScriptEvent::Close { tab } => {
            handle.tab_removed(tab)?;
            Ok(format!("close tab {}", tab))
        }
        ScriptEvent::Toggle { enabled } => {
            set_enabled(store, enabled).await?;
            Ok(format!("toggle {}", if enabled { "on" } else { "off" }))
        }
        ScriptEvent::Message { tab, payload } => {
            let ack = handle.send_message(tab, payload).await?;
            Ok(format!("message: {}", ack.as_str()))
        }
    }
}
