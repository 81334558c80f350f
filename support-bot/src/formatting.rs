//! Telegram HTML rendering: escaping and message entities to `parse_mode=HTML` markup.

use desk_core::MessageEntity;

/// Escapes `<`, `>`, `&` and `"` for Telegram HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[derive(Debug)]
struct Span {
    start: usize,
    end: usize,
    open: String,
    close: &'static str,
}

fn span_for(entity: &MessageEntity, len: usize) -> Option<Span> {
    let start = entity.offset.min(len);
    let end = entity.offset.saturating_add(entity.length).min(len);
    if end <= start {
        return None;
    }
    let (open, close) = match entity.kind.as_str() {
        "bold" => ("<b>".to_string(), "</b>"),
        "italic" => ("<i>".to_string(), "</i>"),
        "underline" => ("<u>".to_string(), "</u>"),
        "strikethrough" => ("<s>".to_string(), "</s>"),
        "spoiler" => ("<tg-spoiler>".to_string(), "</tg-spoiler>"),
        "code" => ("<code>".to_string(), "</code>"),
        "pre" => match entity.language.as_deref().filter(|l| !l.is_empty()) {
            Some(lang) => (
                format!("<pre><code class=\"language-{}\">", escape_html(lang)),
                "</code></pre>",
            ),
            None => ("<pre>".to_string(), "</pre>"),
        },
        "text_link" => {
            let url = entity.url.as_deref()?;
            (format!("<a href=\"{}\">", escape_html(url)), "</a>")
        }
        "blockquote" => ("<blockquote>".to_string(), "</blockquote>"),
        "expandable_blockquote" => ("<blockquote expandable>".to_string(), "</blockquote>"),
        "custom_emoji" => {
            let id = entity.custom_emoji_id.as_deref()?;
            (format!("<tg-emoji emoji-id=\"{}\">", escape_html(id)), "</tg-emoji>")
        }
        _ => return None,
    };
    Some(Span {
        start,
        end,
        open,
        close,
    })
}

/// Renders `text` with its entities as Telegram HTML. Offsets are UTF-16 code units.
///
/// Overlapping (non-nested) entities are closed and reopened so the output stays well formed.
/// Entity kinds without an HTML form (mentions, hashtags, plain URLs) stay plain text.
pub fn entities_to_html(text: &str, entities: &[MessageEntity]) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let len = units.len();

    let mut spans: Vec<Span> = entities.iter().filter_map(|e| span_for(e, len)).collect();
    if spans.is_empty() {
        return escape_html(text);
    }
    // Outer spans first at a shared start.
    spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

    let mut boundaries: Vec<usize> = spans.iter().flat_map(|s| [s.start, s.end]).collect();
    boundaries.push(0);
    boundaries.push(len);
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut out = String::with_capacity(text.len() + spans.len() * 8);
    let mut stack: Vec<usize> = Vec::new();
    let mut next_span = 0;

    for (i, &pos) in boundaries.iter().enumerate() {
        if stack.iter().any(|&idx| spans[idx].end <= pos) {
            let mut reopen = Vec::new();
            while let Some(idx) = stack.pop() {
                out.push_str(spans[idx].close);
                if spans[idx].end > pos {
                    reopen.push(idx);
                }
                if !stack.iter().any(|&open| spans[open].end <= pos) {
                    break;
                }
            }
            for idx in reopen.into_iter().rev() {
                out.push_str(&spans[idx].open);
                stack.push(idx);
            }
        }

        while next_span < spans.len() && spans[next_span].start == pos {
            out.push_str(&spans[next_span].open);
            stack.push(next_span);
            next_span += 1;
        }

        if let Some(&next) = boundaries.get(i + 1) {
            out.push_str(&escape_html(&String::from_utf16_lossy(&units[pos..next])));
        }
    }

    while let Some(idx) = stack.pop() {
        out.push_str(spans[idx].close);
    }
    out
}
