// SPDX-License-Identifier: MPL-2.0

//! Line-based voice status source.
//!
//! Each line is `LABEL` or `LABEL|DEBUG`. Repeats of the previous label are
//! swallowed so the bridge only sees changes.

use std::{
    io::BufRead,
    thread::{self, JoinHandle},
};

use tracing::{debug, warn};

use crate::engine::StatusBridge;

/// One parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine<'a> {
    pub label: &'a str,
    pub debug: &'a str,
}

/// Split a line into label and debug text. Blank lines yield `None`.
#[must_use]
pub fn parse_line(line: &str) -> Option<StatusLine<'_>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (label, debug) = line.split_once('|').unwrap_or((line, ""));
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    Some(StatusLine {
        label,
        debug: debug.trim(),
    })
}

/// Drops consecutive repeats of the same label.
#[derive(Debug, Default)]
pub struct Dedup {
    last: Option<String>,
}

impl Dedup {
    /// Returns `true` if `label` differs from the previous one.
    pub fn is_change(&mut self, label: &str) -> bool {
        if self.last.as_deref() == Some(label) {
            return false;
        }
        self.last = Some(label.to_owned());
        true
    }
}

/// Read status lines from `reader` on a new thread until end of input.
pub fn spawn_line_monitor<R>(reader: R, bridge: StatusBridge) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("voicecam-monitor".into())
        .spawn(move || {
            let mut dedup = Dedup::default();
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(why) => {
                        warn!(?why, "status input unreadable, monitor stopping");
                        break;
                    }
                };

                let Some(status) = parse_line(&line) else {
                    continue;
                };

                if dedup.is_change(status.label) {
                    bridge.on_status_changed(status.label, status.debug);
                }
            }
            debug!("status input closed");
        })
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{engine::Engine, sink::MemorySink, status::VoiceStatus};

    #[test]
    fn parses_label_and_debug() {
        assert_eq!(
            parse_line("Говорит|rms=0.4\n"),
            Some(StatusLine {
                label: "Говорит",
                debug: "rms=0.4",
            })
        );
        assert_eq!(
            parse_line("  muted  "),
            Some(StatusLine {
                label: "muted",
                debug: "",
            })
        );
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("|only debug"), None);
    }

    #[test]
    fn debug_keeps_later_separators() {
        let line = parse_line("error|a|b").unwrap();
        assert_eq!(line.label, "error");
        assert_eq!(line.debug, "a|b");
    }

    #[test]
    fn dedup_passes_changes_only() {
        let mut dedup = Dedup::default();
        let seen: Vec<_> = ["silent", "silent", "speaking", "speaking", "silent"]
            .into_iter()
            .filter(|label| dedup.is_change(label))
            .collect();
        assert_eq!(seen, ["silent", "speaking", "silent"]);
    }

    #[test]
    fn monitor_forwards_changes_to_listener() {
        let engine = Engine::new("unused", Box::new(MemorySink::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        engine.set_status_listener(move |status, debug| {
            recorder.lock().unwrap().push((status, debug.to_owned()));
        });

        let input = Cursor::new("silent\nsilent\n\nspeaking|loud\nbogus\n");
        spawn_line_monitor(input, engine.bridge())
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            [
                (VoiceStatus::Silent, String::new()),
                (VoiceStatus::Speaking, "loud".to_owned()),
                (VoiceStatus::Error, "unknown status: bogus".to_owned()),
            ]
        );
    }
}
