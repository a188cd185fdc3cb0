//! Splitting long replies for the platform's message length limit.

/// Longest message, in characters, sent in one piece.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

/// Characters kept free in every chunk for its `[i/n]` label.
const LABEL_RESERVE: usize = 24;

/// Splits `text` into ordered pieces for delivery.
///
/// Text within `max_len` characters is returned as a single unlabelled
/// piece. Longer text is cut on line boundaries; a line that alone exceeds
/// the budget is hard-split at a character boundary. Every piece after
/// labelling is at most `max_len` characters, and concatenating the pieces
/// with their labels removed gives back `text`.
#[must_use]
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let pieces = split_lines(text, max_len.saturating_sub(LABEL_RESERVE).max(1));
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| label(&piece, i + 1, total))
        .collect()
}

/// Attaches the `[i/n]` label: after the first piece, before the others.
fn label(piece: &str, index: usize, total: usize) -> String {
    if index == 1 {
        format!("{piece}\n\n[{index}/{total}]")
    } else {
        format!("[{index}/{total}]\n\n{piece}")
    }
}

/// Removes a label added by [`chunk_message`], returning the raw piece.
#[must_use]
pub fn strip_label(chunk: &str) -> &str {
    if let Some((body, tail)) = chunk.rsplit_once("\n\n[") {
        if is_label_body(tail.strip_suffix(']')) {
            return body;
        }
    }
    if let Some(rest) = chunk.strip_prefix('[') {
        if let Some((head, body)) = rest.split_once("]\n\n") {
            if is_label_body(Some(head)) {
                return body;
            }
        }
    }
    chunk
}

fn is_label_body(label: Option<&str>) -> bool {
    label
        .and_then(|l| l.split_once('/'))
        .is_some_and(|(i, n)| {
            !i.is_empty()
                && !n.is_empty()
                && i.bytes().all(|b| b.is_ascii_digit())
                && n.bytes().all(|b| b.is_ascii_digit())
        })
}

fn split_lines(text: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len <= budget {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= budget {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let part: String = chars.by_ref().take(budget).collect();
            let part_len = part.chars().count();
            if part_len == budget {
                pieces.push(part);
            } else {
                current = part;
                current_len = part_len;
            }
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
