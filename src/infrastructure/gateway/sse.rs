#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Serialize;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionDeltaResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionChoiceResponse {
    #[serde(default)]
    delta: CompletionDeltaResponse,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionChunkResponse {
    #[serde(default)]
    choices: Vec<CompletionChoiceResponse>,
}

/// Byte-oriented line framing. Complete lines are handed out one at a time;
/// a trailing partial line stays buffered until its newline arrives. A line
/// that turns out to be incomplete can be pushed back and re-read once more
/// bytes show up. Working on bytes keeps multi-byte characters split across
/// chunk boundaries intact, since a newline never lands inside one.
#[derive(Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let idx = self.buf.iter().position(|b| return *b == b'\n')?;
        let mut line = self.buf.drain(..=idx).collect::<Vec<u8>>();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        return Some(String::from_utf8_lossy(&line).to_string());
    }

    pub fn push_back(&mut self, line: &str) {
        let mut restored = line.as_bytes().to_vec();
        restored.push(b'\n');
        restored.extend_from_slice(&self.buf);
        self.buf = restored;
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        return self.buf.is_empty();
    }
}

/// Decodes the gateway's `data: {...}` record stream into text fragments.
/// Each `feed` returns the fragments completed by those bytes; `is_done`
/// flips once the terminator record arrives, after which all further input
/// is ignored.
#[derive(Default)]
pub struct DeltaDecoder {
    lines: LineBuffer,
    done: bool,
}

impl DeltaDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut fragments: Vec<String> = vec![];
        if self.done {
            return fragments;
        }

        self.lines.push(chunk);

        while let Some(line) = self.lines.next_line() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            if !line.starts_with(DATA_PREFIX) {
                continue;
            }

            let payload = line[DATA_PREFIX.len()..].trim().to_string();
            if payload == DONE_SENTINEL {
                self.done = true;
                self.lines.clear();
                break;
            }

            let decoded = serde_json::from_str::<CompletionChunkResponse>(&payload);
            if decoded.is_err() {
                // The record was split across chunk boundaries. Put the line
                // back and wait for the rest of it.
                self.lines.push_back(&line);
                break;
            }

            let record = decoded.unwrap();
            tracing::debug!(body = ?record, "completion record");

            if let Some(choice) = record.choices.first() {
                if let Some(content) = &choice.delta.content {
                    fragments.push(content.to_string());
                }
            }
        }

        return fragments;
    }

    pub fn is_done(&self) -> bool {
        return self.done;
    }
}
