//! Markdown-lite rendering for message bubbles.
//!
//! Only a small dialect is supported: fenced code blocks, inline code, bold
//! and blank-line separated paragraphs. The input is HTML-escaped before any
//! substitution runs, so nothing a message contains can turn into live markup.

use regex::Regex;
use std::sync::OnceLock;

const CODE_OPEN: &str = "<pre><code>";
const CODE_CLOSE: &str = "</code></pre>";

static FENCE_RE: OnceLock<Regex> = OnceLock::new();
static INLINE_CODE_RE: OnceLock<Regex> = OnceLock::new();
static BOLD_RE: OnceLock<Regex> = OnceLock::new();

fn fence_re() -> &'static Regex {
    // The language tag only counts when a newline follows it, so ```ls -la```
    // keeps its content.
    FENCE_RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:[\w+#.-]*\n)?(.*?)```").expect("fence regex")
    })
}

fn inline_code_re() -> &'static Regex {
    INLINE_CODE_RE.get_or_init(|| Regex::new(r"`([^`\n]+)`").expect("inline code regex"))
}

fn bold_re() -> &'static Regex {
    BOLD_RE.get_or_init(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("bold regex"))
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Plain-text path used for user messages: escaped, newlines kept as `<br>`.
pub fn render_plain(text: &str) -> String {
    escape_html(text).replace('\n', "<br>")
}

/// Render assistant text to an HTML fragment.
///
/// Order is fixed: escape, fenced blocks, inline code, bold, paragraphs.
pub fn render_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let escaped = escape_html(text);
    let mut html = String::with_capacity(escaped.len() + 32);
    let mut last = 0;

    for caps in fence_re().captures_iter(&escaped) {
        let Some(whole) = caps.get(0) else { continue };
        html.push_str(&render_inline(&escaped[last..whole.start()]));

        let body = caps.get(1).map_or("", |m| m.as_str()).trim();
        // Blocks sit on their own lines so paragraph wrapping can see them
        html.push('\n');
        html.push_str(CODE_OPEN);
        html.push_str(body);
        html.push_str(CODE_CLOSE);
        html.push('\n');

        last = whole.end();
    }
    html.push_str(&render_inline(&escaped[last..]));

    wrap_paragraphs(&html)
}

/// Inline code first, then bold on whatever is left outside the code spans.
fn render_inline(prose: &str) -> String {
    let mut out = String::with_capacity(prose.len());
    let mut last = 0;

    for caps in inline_code_re().captures_iter(prose) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&apply_bold(&prose[last..whole.start()]));
        out.push_str("<code>");
        out.push_str(caps.get(1).map_or("", |m| m.as_str()));
        out.push_str("</code>");
        last = whole.end();
    }
    out.push_str(&apply_bold(&prose[last..]));
    out
}

fn apply_bold(text: &str) -> String {
    bold_re().replace_all(text, "<strong>$1</strong>").into_owned()
}

/// Group lines into `<p>` blocks. Lines inside a code block are copied
/// through untouched, blank ones included.
fn wrap_paragraphs(html: &str) -> String {
    let mut out = String::with_capacity(html.len() + 16);
    let mut paragraph: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in html.split('\n') {
        if in_fence {
            out.push('\n');
            out.push_str(line);
            if line.contains(CODE_CLOSE) {
                in_fence = false;
            }
            continue;
        }

        if line.starts_with(CODE_OPEN) {
            flush_paragraph(&mut out, &mut paragraph);
            out.push_str(line);
            in_fence = opens_unclosed_block(line);
            continue;
        }

        if line.trim().is_empty() {
            flush_paragraph(&mut out, &mut paragraph);
        } else {
            paragraph.push(line);
        }
    }
    flush_paragraph(&mut out, &mut paragraph);

    out
}

fn opens_unclosed_block(line: &str) -> bool {
    line.rfind(CODE_OPEN) > line.rfind(CODE_CLOSE)
}

fn flush_paragraph(out: &mut String, paragraph: &mut Vec<&str>) {
    if paragraph.is_empty() {
        return;
    }
    out.push_str("<p>");
    out.push_str(&paragraph.join("<br>"));
    out.push_str("</p>");
    paragraph.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn inline_code_and_bold() {
        assert_eq!(
            render_markdown("run `ls` then **done**"),
            "<p>run <code>ls</code> then <strong>done</strong></p>"
        );
    }

    #[test]
    fn script_tags_stay_text() {
        let html = render_markdown("<script>alert('x')</script>");
        assert_eq!(
            html,
            "<p>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;</p>"
        );
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn markup_inside_fence_is_not_transformed() {
        let html = render_markdown("```\n**not bold** and `not code`\n```");
        assert_eq!(html, "<pre><code>**not bold** and `not code`</code></pre>");
    }

    #[test]
    fn language_tag_is_dropped() {
        let html = render_markdown("```bash\nsystemctl status nginx\n```");
        assert_eq!(html, "<pre><code>systemctl status nginx</code></pre>");
    }

    #[test]
    fn single_line_fence_keeps_its_content() {
        assert_eq!(render_markdown("```ls -la```"), "<pre><code>ls -la</code></pre>");
    }

    #[test]
    fn no_paragraph_break_inside_fence() {
        let html = render_markdown("before\n\n```\nline one\n\nline two\n```\nafter");
        assert_eq!(
            html,
            "<p>before</p><pre><code>line one\n\nline two</code></pre><p>after</p>"
        );
    }

    #[test]
    fn paragraphs_and_line_breaks() {
        assert_eq!(
            render_markdown("first line\nsecond line\n\nnext paragraph"),
            "<p>first line<br>second line</p><p>next paragraph</p>"
        );
    }

    #[test]
    fn bold_is_not_applied_inside_inline_code() {
        assert_eq!(
            render_markdown("use `**kwargs` here"),
            "<p>use <code>**kwargs</code> here</p>"
        );
    }

    #[test]
    fn unclosed_fence_is_plain_text() {
        assert_eq!(render_markdown("```\nhalf"), "<p>```<br>half</p>");
    }

    #[test]
    fn empty_input() {
        assert_eq!(render_markdown(""), "");
    }

    #[test]
    fn plain_path_escapes_and_breaks_lines() {
        assert_eq!(render_plain("a <b>\nc & d"), "a &lt;b&gt;<br>c &amp; d");
    }
}
