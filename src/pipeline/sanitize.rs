// Post text sanitization — Weibo HTML fragments to delivery-ready plain text.
//
// Post text arrives as a small HTML fragment: <br /> line breaks, <img alt>
// stickers, <a> links wrapping hashtags, mentions and the "全文" (show full
// text) marker. Everything here is a pure string transform. Malformed markup
// must never make it fail; tags that don't match a rule are simply stripped.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

/// Label of the link Weibo appends to truncated posts.
pub const FULL_TEXT_LABEL: &str = "全文";

/// Label of the lottery-details link attached to giveaway posts.
pub const PROMO_LINK_LABEL: &str = "抽奖详情";

/// Both phrases appear in the boilerplate of Weibo's lottery tool.
pub const LOTTERY_TOOL_MARKER: &str = "微博官方唯一抽奖工具";
pub const LOTTERY_FAIRNESS_MARKER: &str = "结果公正有效";

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid regex"));
static IMAGE_ALT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<img\s[^>]*?alt\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#).expect("valid regex")
});
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a(?:\s[^>]*)?>(.*?)</a\s*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z!][^>]*>").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(nbsp|lt|gt|amp|quot);").expect("valid regex"));
static TRAILING_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));
static BLANK_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Convert raw post markup into clean plain text.
///
/// Entity decoding can uncover markup (`&lt;br&gt;`), so the passes repeat
/// until the text stops changing. Every pass either shortens the text or
/// leaves it as is.
pub fn sanitize(raw: &str) -> String {
    let mut text = clean_pass(raw);
    loop {
        let next = clean_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn clean_pass(raw: &str) -> String {
    let text = LINE_BREAK_RE.replace_all(raw, "\n");
    let text = IMAGE_ALT_RE.replace_all(&text, |caps: &Captures| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map_or_else(String::new, |alt| alt.as_str().to_string())
    });
    let text = LINK_RE.replace_all(&text, |caps: &Captures| link_text(&caps[1]));
    let text = TAG_RE.replace_all(&text, "");
    let text = ENTITY_RE.replace_all(&text, |caps: &Captures| decode_entity(&caps[1]));
    let text = TRAILING_SPACE_RE.replace_all(&text, "\n");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Whether sanitized text is Weibo lottery-tool boilerplate.
pub fn is_lottery_spam(text: &str) -> bool {
    text.contains(LOTTERY_TOOL_MARKER) && text.contains(LOTTERY_FAIRNESS_MARKER)
}

/// Visible text of a link, or nothing if the link is noise.
fn link_text(inner: &str) -> String {
    let label = TAG_RE.replace_all(inner, "");
    let trimmed = label.trim();
    if trimmed == FULL_TEXT_LABEL || trimmed == PROMO_LINK_LABEL || is_hashtag(trimmed) {
        String::new()
    } else {
        label.into_owned()
    }
}

fn is_hashtag(label: &str) -> bool {
    label.chars().count() >= 2 && label.starts_with('#') && label.ends_with('#')
}

fn decode_entity(name: &str) -> &'static str {
    match name {
        "nbsp" => " ",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "quot" => "\"",
        // ENTITY_RE only captures the names above
        _ => "",
    }
}
