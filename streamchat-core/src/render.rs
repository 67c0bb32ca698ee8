//! Markup renderer for streamed replies.
//!
//! Contract:
//! - `render_markup` is a pure function of the full accumulated text; it is
//!   re-applied from scratch on every delta, so no stage may assume its input
//!   is complete markup (an unterminated code fence is ordinary text).
//! - The function is total: any string in, sanitized HTML out, empty in
//!   empty out.
//! - Stages run in a fixed order, each consuming the previous stage's
//!   output. Code content is lifted into protected slots before the text
//!   stages run, so no later stage can rewrite it.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(\w+)?\n([\s\S]*?)\n```").unwrap());
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6}) (.+)$").unwrap());
static STRONG_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static STRONG_UNDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
static EM_STAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static EM_UNDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_([^_]+)_").unwrap());
static ORDERED_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\d+\.\s+(.+)$").unwrap());
static UNORDERED_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[-*]\s+(.+)$").unwrap());
static BLOCKQUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^&gt; (.+)$").unwrap());
static SLOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{FFFC}([BI])([0-9]+)\u{FFFC}").unwrap());

/// Marker delimiting a protected slot. U+FFFC is the object replacement
/// character; it never survives into the output because `restore` swaps the
/// slots back in as the final step.
const SLOT_MARK: char = '\u{FFFC}';

/// Render untrusted reply text into sanitized structural markup.
pub fn render_markup(text: &str) -> String {
    let mut slots = SlotTable::default();
    let escaped = escape(text);
    let out = extract_code_blocks(&escaped, &mut slots);
    let out = extract_inline_code(&out, &mut slots);
    let out = headings(&out);
    let out = emphasis(&out);
    let out = ordered_lists(&out);
    let out = unordered_lists(&out);
    let out = blockquotes(&out);
    let out = paragraphs(&out);
    slots.restore(&out)
}

/// Escape the three HTML-significant characters. Runs first; `&` must be
/// replaced before the entities it introduces.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Reverse of [`escape`]. Entity order matters: `&lt;`/`&gt;` must be
/// resolved before `&amp;`, or escaped input would be unescaped twice.
fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Completed code blocks and inline code spans, lifted out of the text so
/// the remaining stages cannot touch their contents.
#[derive(Default)]
struct SlotTable {
    blocks: Vec<String>,
    inlines: Vec<String>,
}

impl SlotTable {
    fn stash_block(&mut self, html: String) -> String {
        self.blocks.push(html);
        format!("{SLOT_MARK}B{}{SLOT_MARK}", self.blocks.len() - 1)
    }

    fn stash_inline(&mut self, html: String) -> String {
        self.inlines.push(html);
        format!("{SLOT_MARK}I{}{SLOT_MARK}", self.inlines.len() - 1)
    }

    fn restore(&self, text: &str) -> String {
        SLOT_RE
            .replace_all(text, |caps: &Captures| {
                let table = if &caps[1] == "B" {
                    &self.blocks
                } else {
                    &self.inlines
                };
                match caps[2].parse::<usize>().ok().and_then(|i| table.get(i)) {
                    Some(html) => html.clone(),
                    // Not one of ours; leave the text as it came.
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Stage 2: fenced code blocks. The capture is unescaped back to the raw
/// content and escaped again, so the stage is safe on its own while every
/// original character still ends up escaped exactly once.
fn extract_code_blocks(text: &str, slots: &mut SlotTable) -> String {
    FENCE_RE
        .replace_all(text, |caps: &Captures| {
            let lang = caps.get(1).map_or("plain", |m| m.as_str());
            let code = escape(&unescape(caps[2].trim()));
            slots.stash_block(format!(
                "<pre><code class=\"language-{lang}\">{code}</code></pre>"
            ))
        })
        .into_owned()
}

/// Stage 3: inline code spans.
fn extract_inline_code(text: &str, slots: &mut SlotTable) -> String {
    INLINE_CODE_RE
        .replace_all(text, |caps: &Captures| {
            let code = escape(&unescape(&caps[1]));
            slots.stash_inline(format!("<code>{code}</code>"))
        })
        .into_owned()
}

/// Stage 4: headings. One anchored pattern; the level is the marker length,
/// so a line with one `#` can never be claimed by a longer rule or vice
/// versa.
fn headings(text: &str) -> String {
    HEADING_RE
        .replace_all(text, |caps: &Captures| {
            let level = caps[1].len();
            format!("<h{level}>{}</h{level}>", &caps[2])
        })
        .into_owned()
}

/// Stage 5: emphasis. Double markers before single markers, or `**` would be
/// consumed as two `*`.
fn emphasis(text: &str) -> String {
    let out = STRONG_STAR_RE.replace_all(text, "<strong>$1</strong>");
    let out = STRONG_UNDER_RE.replace_all(&out, "<strong>$1</strong>");
    let out = EM_STAR_RE.replace_all(&out, "<em>$1</em>");
    EM_UNDER_RE.replace_all(&out, "<em>$1</em>").into_owned()
}

/// Stage 6a: ordered lists.
fn ordered_lists(text: &str) -> String {
    let transformed = ORDERED_ITEM_RE.replace_all(text, "<li>$1</li>");
    wrap_item_runs(&transformed, "ol")
}

/// Stage 6b: unordered lists.
fn unordered_lists(text: &str) -> String {
    let transformed = UNORDERED_ITEM_RE.replace_all(text, "<li>$1</li>");
    wrap_item_runs(&transformed, "ul")
}

/// Wrap each contiguous run of bare `<li>` lines in one list container.
/// Run detection operates on the transformed item markers, not the original
/// lines; items already sitting inside a container are left alone.
fn wrap_item_runs(text: &str, tag: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    let mut depth = 0usize;
    let mut run_start: Option<usize> = None;
    for i in 0..=lines.len() {
        let bare = i < lines.len() && depth == 0 && lines[i].starts_with("<li>");
        if bare {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            lines[start].insert_str(0, &format!("<{tag}>"));
            lines[i - 1].push_str(&format!("</{tag}>"));
        }
        if i < lines.len() {
            if lines[i].contains("<ol>") || lines[i].contains("<ul>") {
                depth += 1;
            }
            if lines[i].contains("</ol>") || lines[i].contains("</ul>") {
                depth = depth.saturating_sub(1);
            }
        }
    }
    lines.join("\n")
}

/// Stage 7: blockquotes, matched against the escaped form of `> `.
fn blockquotes(text: &str) -> String {
    BLOCKQUOTE_RE
        .replace_all(text, "<blockquote>$1</blockquote>")
        .into_owned()
}

/// Stage 8: wrap remaining non-blank lines in paragraphs. Blank lines are
/// dropped; block-level lines pass through unwrapped.
fn paragraphs(text: &str) -> String {
    text.split('\n')
        .filter_map(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else if is_block_line(trimmed) {
                Some(line.to_string())
            } else {
                Some(format!("<p>{line}</p>"))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_block_line(line: &str) -> bool {
    // `<h` covers h1-h6, `<p` covers both <p> and <pre>. A line holding a
    // code-block slot is block-level; an inline-code slot is not.
    const BLOCK_PREFIXES: [&str; 6] = ["<h", "<p", "<blockquote", "<ol", "<ul", "<li"];
    if line.starts_with("\u{FFFC}B") {
        return true;
    }
    BLOCK_PREFIXES.iter().any(|p| line.starts_with(p))
}
