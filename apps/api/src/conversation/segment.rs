//! Reply text preparation for speech: glyph cleanup and sentence segmentation.

/// Removes characters a speech engine would read out literally or choke on:
/// pictographs and emoji, private-use glyphs, variation selectors, zero-width
/// joiners and markdown punctuation.
pub fn clean_for_speech(text: &str) -> String {
    let filtered: String = text.chars().filter(|c| !is_unspeakable(*c)).collect();
    filtered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_unspeakable(c: char) -> bool {
    matches!(c,
        '\u{2600}'..='\u{27BF}'
        | '\u{E000}'..='\u{F8FF}'
        | '\u{1F000}'..='\u{1FAFF}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{200D}'
        | '*' | '#' | '_' | '`')
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Sentence segments of a reply, in order.
///
/// Splits after `.`, `!` or `?` and at line breaks. A `.` only ends a
/// sentence when followed by whitespace or the end of the text, so `3.5`
/// and `v1.2` stay whole. Runs of terminators (`?!`, `...`) stay attached
/// to their sentence. Segments are trimmed and never empty.
pub struct Segments<'a> {
    rest: &'a str,
}

pub fn segments(text: &str) -> Segments<'_> {
    Segments { rest: text }
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            let rest = self.rest.trim_start();
            if rest.is_empty() {
                self.rest = rest;
                return None;
            }

            let (segment, remainder) = split_first_sentence(rest);
            self.rest = remainder;
            let segment = segment.trim();
            if !segment.is_empty() {
                return Some(segment);
            }
        }
    }
}

fn split_first_sentence(text: &str) -> (&str, &str) {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            return (&text[..i], &text[i + 1..]);
        }
        if !is_terminator(c) {
            continue;
        }
        let next = chars.peek().map(|&(_, n)| n);
        if c == '.' && next.is_some_and(|n| !n.is_whitespace() && !is_terminator(n)) {
            continue;
        }
        // Swallow trailing terminators so "Really?!" stays one sentence.
        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if !is_terminator(n) {
                break;
            }
            end = j + n.len_utf8();
            chars.next();
        }
        return (&text[..end], &text[end..]);
    }
    (text, "")
}
