//! Inline markup enhancement for quiz text
//!
//! Category documents use a few lightweight tags that are expanded to HTML
//! before the content is cached:
//!
//! * `[img:url]` / `[img:url|caption]` - lazy-loaded image with optional caption
//! * `[arabic:...]` - right-to-left Arabic span
//! * `[frac:1/2]` and bare `1/2` - stacked fraction
//!
//! Untagged runs of Arabic-script characters are wrapped in the same
//! right-to-left span. Rules are applied outside-in: images first, so that
//! digits in a URL are never mistaken for a fraction.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::data::{CategoryPayload, Markup, QaPair, Topic};

/// Alt text for images without a caption
const DEFAULT_IMAGE_ALT: &str = "Illustration";

static IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[img:([^\]|]+)(?:\|([^\]]*))?\]").expect("Invalid IMAGE_RE regex")
});

static ARABIC_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[arabic:(.+?)\]").expect("Invalid ARABIC_TAG_RE regex"));

// ASCII digits only: `\d` would also match Arabic-Indic digits.
static FRACTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[frac:([0-9]+)/([0-9]+)\]|([0-9]+)\s*/\s*([0-9]+)")
        .expect("Invalid FRACTION_RE regex")
});

static ARABIC_RUN_RE: Lazy<Regex> = Lazy::new(|| {
    let script = r"\x{0600}-\x{06FF}\x{0750}-\x{077F}\x{08A0}-\x{08FF}\x{FB50}-\x{FDFF}\x{FE70}-\x{FEFF}";
    Regex::new(&format!(r"[{script}]+(?:[ \t]+[{script}]+)*")).expect("Invalid ARABIC_RUN_RE regex")
});

/// Expands all inline markup in `text`
///
/// Text with no tags, fractions or Arabic characters is returned unchanged.
/// Not idempotent: enhancing already-enhanced Arabic text wraps it again.
pub fn enhance(text: &str) -> String {
    substitute(text, &IMAGE_RE, image_markup, enhance_inline)
}

/// Enhances a markup field; non-string values pass through untouched
pub fn enhance_markup(markup: Markup) -> Markup {
    match markup {
        Markup::Text(text) => Markup::Text(enhance(&text)),
        raw => raw,
    }
}

/// Enhances every summary and question of a topic
pub fn enhance_topic(topic: Topic) -> Topic {
    Topic {
        summary: topic.summary.map(enhance_markup),
        questions: topic
            .questions
            .into_iter()
            .map(|pair| QaPair {
                q: enhance_markup(pair.q),
                a: enhance_markup(pair.a),
            })
            .collect(),
        ..topic
    }
}

/// Produces an enhanced copy of a freshly fetched payload
pub fn enhance_payload(payload: CategoryPayload) -> CategoryPayload {
    payload
        .into_iter()
        .map(|(category, topics)| {
            let topics = topics.into_iter().map(enhance_topic).collect();
            (category, topics)
        })
        .collect()
}

/// Replaces every match of `re` with `on_match`, passing the text between
/// matches through `on_gap`
fn substitute<M, G>(text: &str, re: &Regex, on_match: M, on_gap: G) -> String
where
    M: Fn(&Captures<'_>) -> String,
    G: Fn(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&on_gap(&text[last..whole.start()]));
        out.push_str(&on_match(&caps));
        last = whole.end();
    }
    out.push_str(&on_gap(&text[last..]));

    out
}

/// Rules for text outside image tags
fn enhance_inline(text: &str) -> String {
    substitute(
        text,
        &ARABIC_TAG_RE,
        |caps| rtl_span(&enhance_fractions(&caps[1])),
        enhance_plain,
    )
}

/// Rules for text outside any tag
fn enhance_plain(text: &str) -> String {
    substitute(text, &FRACTION_RE, fraction_markup, wrap_arabic_runs)
}

fn enhance_fractions(text: &str) -> String {
    substitute(text, &FRACTION_RE, fraction_markup, str::to_string)
}

fn wrap_arabic_runs(text: &str) -> String {
    ARABIC_RUN_RE
        .replace_all(text, |caps: &Captures<'_>| rtl_span(&caps[0]))
        .into_owned()
}

fn fraction_markup(caps: &Captures<'_>) -> String {
    let num = caps.get(1).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
    let den = caps.get(2).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
    format!(
        "<span class=\"vertical-fraction\"><span class=\"numerator\">{num}</span>\
         <span class=\"fraction-line\"></span><span class=\"denominator\">{den}</span></span>"
    )
}

fn rtl_span(inner: &str) -> String {
    format!("<span class=\"arabic-text\" dir=\"rtl\" lang=\"ar\">{inner}</span>")
}

fn image_markup(caps: &Captures<'_>) -> String {
    let url = caps[1].trim();
    let caption = caps
        .get(2)
        .map(|m| m.as_str().trim())
        .filter(|c| !c.is_empty());

    let alt = escape_attr(caption.unwrap_or(DEFAULT_IMAGE_ALT));
    let mut html = format!(
        "<div class=\"image-container\"><img src=\"{}\" alt=\"{}\" loading=\"lazy\">",
        escape_attr(url),
        alt
    );
    if let Some(caption) = caption {
        html.push_str(&format!(
            "<div class=\"image-caption\">{}</div>",
            enhance_inline(caption)
        ));
    }
    html.push_str("</div>");

    html
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
