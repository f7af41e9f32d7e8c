use std::collections::VecDeque;

/// Sequenced ring of the child's most recent output lines.
#[derive(Debug)]
pub(crate) struct LogBuffer {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<(u64, String)>,
}

impl LogBuffer {
    pub(crate) fn new(max_lines: usize) -> Self {
        Self {
            next_seq: 1,
            max_lines: max_lines.max(1),
            lines: VecDeque::new(),
        }
    }

    pub(crate) fn push_line(&mut self, line: String) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.lines.push_back((seq, line));
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Lines after `cursor`, oldest first, and the cursor to resume from.
    pub(crate) fn tail_after(&self, cursor: u64, limit: usize) -> (Vec<String>, u64) {
        // cursor 0 means "latest page".
        if cursor == 0 {
            let start = self.lines.len().saturating_sub(limit);
            let mut out = Vec::new();
            let mut last = 0;
            for (seq, line) in self.lines.iter().skip(start) {
                out.push(line.clone());
                last = *seq;
            }
            return (out, last);
        }

        let mut out = Vec::new();
        let mut last = cursor;
        for (seq, line) in self.lines.iter() {
            if *seq > cursor {
                out.push(line.clone());
                last = *seq;
                if out.len() >= limit {
                    break;
                }
            }
        }
        (out, last)
    }
}
