use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── TextSnapshot ────────────────────────────────────────────────────────────

/// Immutable snapshot of a buffer's text at a specific version.
///
/// Snapshots are cheap to clone (the text and line table are shared) and are
/// the unit handed to the parser for live-buffer parses. Line start offsets
/// are precomputed once so diagnostic spans can be mapped back to line/column
/// against the exact text that produced them.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    version: u64,
    text: Arc<str>,
    /// Byte offset of the start of every line (rebuilt once per snapshot).
    line_offsets: Arc<Vec<usize>>,
}

impl TextSnapshot {
    pub fn new(
        text: impl Into<Arc<str>>,
        version: u64,
    ) -> Self {
        let text = text.into();
        let line_offsets = Arc::new(compute_line_offsets(&text));
        Self {
            version,
            text,
            line_offsets,
        }
    }

    /// The buffer version this snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Full text of the snapshot.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of lines in the snapshot.
    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// Convert a byte offset to a 0-based `(line, column)` pair.
    ///
    /// Offsets past the end of the text clamp to the final position.
    pub fn position_of(
        &self,
        offset: usize,
    ) -> (u32, u32) {
        let offset = offset.min(self.text.len());
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(ins) => ins.saturating_sub(1),
        };
        let line_start = self.line_offsets[line];
        let column = self.text[line_start..offset].chars().count();
        (line as u32, column as u32)
    }
}

fn compute_line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0usize];
    for (i, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            offsets.push(i + 1);
        }
    }
    offsets
}

// ── TextContent ─────────────────────────────────────────────────────────────

/// Text handed to the parser for one parse round, tagged with its origin.
///
/// Live-buffer parses carry the triggering snapshot; background file parses
/// carry text read from disk. The origin decides the [`Cookie`] committed
/// alongside the resulting tree.
#[derive(Debug, Clone)]
pub enum TextContent {
    /// A snapshot of a live editor buffer.
    Snapshot {
        path: PathBuf,
        snapshot: TextSnapshot,
    },
    /// File contents read from disk (no live buffer).
    File {
        path: PathBuf,
        text: Arc<str>,
    },
}

impl TextContent {
    /// Stable identity of the file this content belongs to.
    pub fn path(&self) -> &Path {
        match self {
            TextContent::Snapshot {
                path, ..
            } => path,
            TextContent::File {
                path, ..
            } => path,
        }
    }

    /// The text to parse.
    pub fn text(&self) -> &str {
        match self {
            TextContent::Snapshot {
                snapshot, ..
            } => snapshot.text(),
            TextContent::File {
                text, ..
            } => text,
        }
    }

    /// The cookie a successful parse of this content commits with.
    pub fn cookie(&self) -> Cookie {
        match self {
            TextContent::Snapshot {
                snapshot, ..
            } => Cookie::Snapshot(snapshot.clone()),
            TextContent::File {
                path, ..
            } => Cookie::File {
                path: path.clone(),
            },
        }
    }
}

// ── Cookie ──────────────────────────────────────────────────────────────────

/// Opaque token correlating a committed parse tree to the text that produced
/// it.
///
/// Consumers that need to map positions in the committed tree back to
/// line/column use the snapshot carried here, never the (possibly newer)
/// live buffer.
#[derive(Debug, Clone)]
pub enum Cookie {
    /// The tree came from a live-buffer snapshot.
    Snapshot(TextSnapshot),
    /// The tree came from a file on disk.
    File {
        path: PathBuf,
    },
}

impl Cookie {
    /// The snapshot version, for snapshot-origin cookies.
    pub fn snapshot_version(&self) -> Option<u64> {
        match self {
            Cookie::Snapshot(snapshot) => Some(snapshot.version()),
            Cookie::File {
                ..
            } => None,
        }
    }

    /// The owning snapshot, for snapshot-origin cookies.
    pub fn snapshot(&self) -> Option<&TextSnapshot> {
        match self {
            Cookie::Snapshot(snapshot) => Some(snapshot),
            Cookie::File {
                ..
            } => None,
        }
    }
}

#[cfg(test)]
#[path = "../tests/src/content_tests.rs"]
mod tests;
