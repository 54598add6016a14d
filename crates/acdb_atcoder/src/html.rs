//! Case-insensitive scanning of server-rendered HTML.
//!
//! The archive pages are regular enough for a tag scanner; nothing here
//! builds a DOM.

/// Blocks from an opening pattern to the matching closing pattern.
pub(crate) struct Blocks<'a> {
    src: &'a str,
    lower: String,
    open: String,
    close: String,
    pos: usize,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = self.lower.get(self.pos..)?.find(&self.open)? + self.pos;
        let open_end = self.src[start..].find('>')? + start + 1;
        let end = self.lower[open_end..].find(&self.close)? + open_end + self.close.len();
        self.pos = end;
        Some(&self.src[start..end])
    }
}

/// Iterates over `open ... close` blocks of `s`, outer tags included.
pub(crate) fn blocks_ci<'a>(s: &'a str, open: &str, close: &str) -> Blocks<'a> {
    Blocks {
        src: s,
        // ASCII lowering keeps byte offsets aligned with `s`
        lower: s.to_ascii_lowercase(),
        open: open.to_ascii_lowercase(),
        close: close.to_ascii_lowercase(),
        pos: 0,
    }
}

/// Content between the first `open_pat` tag and the following `close_pat`.
pub(crate) fn slice_between_ci<'a>(s: &'a str, open_pat: &str, close_pat: &str) -> Option<&'a str> {
    let lc = s.to_ascii_lowercase();
    let o = lc.find(&open_pat.to_ascii_lowercase())?;
    let after = s[o..].find('>')? + o + 1;
    let cr = lc[after..].find(&close_pat.to_ascii_lowercase())?;
    Some(&s[after..after + cr])
}

/// Text between the end of the opening tag and the start of the last tag.
pub(crate) fn inner_after_open_tag(block: &str) -> &str {
    match (block.find('>'), block.rfind('<')) {
        (Some(oe), Some(cs)) if cs > oe => &block[oe + 1..cs],
        _ => "",
    }
}

/// The first `<name ...>` opening tag in `s`.
pub(crate) fn open_tag<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let lc = s.to_ascii_lowercase();
    let needle = format!("<{}", name.to_ascii_lowercase());
    let mut from = 0;
    while let Some(rel) = lc[from..].find(&needle) {
        let start = from + rel;
        let after = start + needle.len();
        from = after;
        if lc[after..].starts_with(|c: char| c.is_ascii_whitespace() || c == '>') {
            let end = s[start..].find('>')? + start + 1;
            return Some(&s[start..end]);
        }
    }
    None
}

/// Value of attribute `name` in an opening tag, entities decoded.
pub(crate) fn attr(tag: &str, name: &str) -> Option<String> {
    let lc = tag.to_ascii_lowercase();
    let needle = format!("{}=", name.to_ascii_lowercase());
    let mut from = 0;
    while let Some(rel) = lc[from..].find(&needle) {
        let at = from + rel;
        from = at + needle.len();
        if !lc[..at].ends_with(|c: char| c.is_ascii_whitespace()) {
            continue;
        }
        let rest = &tag[from..];
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let quoted = &rest[1..];
                &quoted[..quoted.find(q)?]
            }
            _ => rest
                .split(|c: char| c.is_ascii_whitespace() || c == '>')
                .next()
                .unwrap_or(""),
        };
        return Some(normalize_entities(value));
    }
    None
}

/// Drops tags, decodes entities and collapses whitespace.
pub(crate) fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

pub(crate) fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub(crate) fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}
