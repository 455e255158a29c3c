//! Line lookup in raw document text.
//!
//! Lookups work on the text alone so they also succeed on documents that no
//! longer parse. All lines are 0-based.

use std::ops::Range;

/// A `key: value` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyLine<'a> {
    line: usize,
    /// Column of the key, after any `- ` sequence markers.
    col: usize,
    /// Whether the key sits behind a `- ` marker.
    in_item: bool,
    key: &'a str,
    value: &'a str,
}

fn leading_ws(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

fn parse_key_line(line_no: usize, line: &str) -> Option<KeyLine<'_>> {
    let mut col = leading_ws(line);
    let mut content = &line[col..];
    let mut in_item = false;
    while let Some(rest) = content.strip_prefix('-') {
        if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
            break;
        }
        in_item = true;
        let ws = leading_ws(rest);
        col += 1 + ws;
        content = &rest[ws..];
    }
    if content.starts_with('#') {
        return None;
    }

    let colon = content.find(':')?;
    let after = &content[colon + 1..];
    if !(after.is_empty() || after.starts_with([' ', '\t'])) {
        return None;
    }
    let key = content[..colon].trim().trim_matches(|c| c == '"' || c == '\'');
    if key.is_empty() {
        return None;
    }
    Some(KeyLine {
        line: line_no,
        col,
        in_item,
        key,
        value: after.trim(),
    })
}

fn is_block_scalar(value: &str) -> bool {
    let value = value.split(" #").next().unwrap_or(value).trim();
    let mut chars = value.chars();
    matches!(chars.next(), Some('|' | '>'))
        && chars.all(|c| c == '-' || c == '+' || c.is_ascii_digit())
}

/// Key lines of `text`, skipping the contents of block scalars.
fn key_lines(text: &str) -> Vec<KeyLine<'_>> {
    let mut out = Vec::new();
    let mut block_key_col: Option<usize> = None;
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(col) = block_key_col {
            if leading_ws(line) > col {
                continue;
            }
            block_key_col = None;
        }
        if let Some(kl) = parse_key_line(i, line) {
            if is_block_scalar(kl.value) {
                block_key_col = Some(kl.col);
            }
            out.push(kl);
        }
    }
    out
}

/// First line declaring `field` at any depth.
pub fn find_field_line(text: &str, field: &str) -> Option<usize> {
    find_field_line_in(text, field, 0..usize::MAX)
}

/// First line within `lines` declaring `field`.
pub fn find_field_line_in(text: &str, field: &str, lines: Range<usize>) -> Option<usize> {
    if field.is_empty() {
        return None;
    }
    key_lines(text)
        .into_iter()
        .find(|kl| kl.key == field && lines.contains(&kl.line))
        .map(|kl| kl.line)
}

/// Line of a top-level key.
pub fn find_top_level_key_line(text: &str, key: &str) -> Option<usize> {
    key_lines(text)
        .into_iter()
        .find(|kl| kl.key == key && kl.col == 0 && !kl.in_item)
        .map(|kl| kl.line)
}

/// Whether the value declared on `line` is a block scalar (`|` or `>`), whose
/// content starts on the following line.
pub fn has_block_scalar_value(text: &str, line: usize) -> bool {
    text.lines()
        .nth(line)
        .and_then(|l| parse_key_line(line, l))
        .is_some_and(|kl| is_block_scalar(kl.value))
}

/// The first line of every entry of the top-level `chain` sequence.
pub fn chain_entry_lines(text: &str) -> Vec<usize> {
    let Some(chain_line) = find_top_level_key_line(text, "chain") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut item_indent: Option<usize> = None;
    for (i, line) in text.lines().enumerate().skip(chain_line + 1) {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = leading_ws(line);
        let is_item = trimmed == "-" || trimmed.starts_with("- ") || trimmed.starts_with("-\t");
        match item_indent {
            None if is_item => {
                item_indent = Some(indent);
                entries.push(i);
            }
            None => break,
            Some(expected) if is_item && indent == expected => entries.push(i),
            Some(expected) if indent <= expected && !is_item => break,
            Some(expected) if indent < expected => break,
            Some(_) => {}
        }
    }
    entries
}

/// Lines belonging to chain entry `index`, or `None` if there is no such entry.
pub fn chain_entry_range(text: &str, index: usize) -> Option<Range<usize>> {
    let entries = chain_entry_lines(text);
    let start = *entries.get(index)?;
    let end = entries.get(index + 1).copied().unwrap_or(usize::MAX);
    Some(start..end)
}

/// First line containing `needle`.
pub fn find_value_line(text: &str, needle: &str) -> Option<usize> {
    find_value_line_in(text, needle, 0..usize::MAX)
}

pub fn find_value_line_in(text: &str, needle: &str, lines: Range<usize>) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    text.lines()
        .enumerate()
        .skip(lines.start)
        .take_while(|(i, _)| *i < lines.end)
        .find(|(_, line)| line.contains(needle))
        .map(|(i, _)| i)
}

/// First line referencing environment variable `name` as `${name}` or `$name`,
/// ignoring chain references such as `$name.field`.
pub fn find_var_line(text: &str, name: &str) -> Option<usize> {
    let braced = format!("${{{name}}}");
    let bare = format!("${name}");
    text.lines().position(|line| {
        line.contains(&braced)
            || line.match_indices(&bare).any(|(idx, _)| {
                let next = line[idx + bare.len()..].chars().next();
                !matches!(next, Some(c) if c == '.' || c == '_' || c == '-' || c.is_ascii_alphanumeric())
            })
    })
}
