//! Quote-aware field and record splitting

/// Automaton state while scanning a record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseState {
    /// Outside quotes: the delimiter ends a field
    Normal,
    /// Inside quotes: delimiters and line terminators are literal
    InQuotes,
}

/// Split one record into fields
///
/// Two-state automaton. In `Normal` the delimiter ends a field and the quote
/// character enters `InQuotes`. In `InQuotes` a doubled quote emits one literal
/// quote, a single quote returns to `Normal`, and everything else (delimiters
/// and line terminators included) is copied verbatim.
///
/// # Examples
///
/// ```
/// use tabula_export::csv::parse_line;
///
/// assert_eq!(parse_line(r#"a,"b,c","say ""hi""""#, ',', '"'), ["a", "b,c", r#"say "hi""#]);
/// ```
pub fn parse_line(line: &str, delimiter: char, quote_char: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut state = ParseState::Normal;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            ParseState::Normal => {
                if ch == delimiter {
                    fields.push(std::mem::take(&mut field));
                } else if ch == quote_char {
                    state = ParseState::InQuotes;
                } else {
                    field.push(ch);
                }
            }
            ParseState::InQuotes => {
                if ch == quote_char {
                    if chars.peek() == Some(&quote_char) {
                        chars.next();
                        field.push(quote_char);
                    } else {
                        state = ParseState::Normal;
                    }
                } else {
                    field.push(ch);
                }
            }
        }
    }

    if state == ParseState::InQuotes {
        tracing::debug!("record ended inside an open quote; keeping field as read");
    }

    fields.push(field);
    fields
}

/// Split text into records on line terminators that are outside quotes
///
/// `\r\n`, `\n` and `\r` all end a record. A trailing terminator does not
/// produce an empty final record.
pub fn split_records(text: &str, quote_char: char) -> Vec<&str> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch == quote_char {
            // A doubled quote toggles twice, leaving the state unchanged
            in_quotes = !in_quotes;
        } else if !in_quotes && (ch == '\n' || ch == '\r') {
            records.push(&text[start..idx]);
            let mut next = idx + ch.len_utf8();
            if ch == '\r' && matches!(chars.peek(), Some((_, '\n'))) {
                chars.next();
                next += 1;
            }
            start = next;
        }
    }

    if start < text.len() {
        records.push(&text[start..]);
    }
    records
}
