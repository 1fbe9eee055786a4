use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{LazyLock, Mutex};

use regex::Regex;

static SGR_MOUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[<\d+;\d+;\d+[Mm]").expect("valid regex"));
static MODE_TOGGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[\?(?:1000|1002|1003|1005|1006|1015|2004)[hl]").expect("valid regex")
});
static PARTIAL_MOUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[<\d+;\d+;\d+[Mm]?").expect("valid regex"));

fn stable_hash(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Strip mouse-reporting and terminal-mode escape sequences that agent
/// CLIs leave behind in captured pane output (spec §4.4 step 2).
fn strip_mouse_sequences(raw: &str) -> String {
    let step1 = SGR_MOUSE.replace_all(raw, "");
    let step2 = MODE_TOGGLE.replace_all(&step1, "");
    PARTIAL_MOUSE.replace_all(&step2, "").into_owned()
}

#[derive(Debug, Default)]
struct Inner {
    lines: VecDeque<String>,
    raw_hash: Option<u64>,
    raw_len: usize,
    cleaned_hash: Option<u64>,
    cleaned_len: usize,
}

/// A bounded FIFO of output lines with fast change rejection (spec §4.4).
/// Exclusively owned by one writer (the poller for a given `Agent`);
/// readers take the internal mutex and receive copies.
#[derive(Debug)]
pub struct OutputBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Update the buffer with a fresh raw snapshot. Returns `true` if the
    /// content changed (and the buffer was mutated), `false` otherwise.
    pub fn update(&self, raw: &str) -> bool {
        let raw_hash = stable_hash(raw);
        let mut inner = self.inner.lock().unwrap();

        if inner.raw_hash == Some(raw_hash) && inner.raw_len == raw.len() {
            return false;
        }
        inner.raw_hash = Some(raw_hash);
        inner.raw_len = raw.len();

        let cleaned = strip_mouse_sequences(raw);
        let cleaned_hash = stable_hash(&cleaned);
        if inner.cleaned_hash == Some(cleaned_hash) && inner.cleaned_len == cleaned.len() {
            return false;
        }

        let trimmed = cleaned.strip_suffix('\n').unwrap_or(&cleaned);
        let mut lines: VecDeque<String> = trimmed.split('\n').map(String::from).collect();
        while lines.len() > self.capacity {
            lines.pop_front();
        }

        inner.cleaned_hash = Some(cleaned_hash);
        inner.cleaned_len = cleaned.len();
        inner.lines = lines;
        true
    }

    /// Number of buffered lines. Does not copy.
    pub fn line_count(&self) -> usize {
        self.inner.lock().unwrap().lines.len()
    }

    /// Defensive copy of `[start, end)`. Clamped to the buffer's bounds.
    pub fn lines_range(&self, start: usize, end: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let len = inner.lines.len();
        let start = start.min(len);
        let end = end.min(len).max(start);
        inner.lines.iter().skip(start).take(end - start).cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
