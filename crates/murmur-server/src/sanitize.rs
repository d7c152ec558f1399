//! Turns chat message content into something worth speaking.

use murmur_types::{Mention, MentionKind};
use once_cell::sync::Lazy;
use regex::Regex;

static USER_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@!?(\d+)>").expect("user mention pattern"));
static ROLE_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<@&(\d+)>").expect("role mention pattern"));
static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<#(\d+)>").expect("channel mention pattern"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("markdown link pattern"));
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").expect("url pattern"));
static CUSTOM_EMOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<a?:([^:>]+):\d+>").expect("custom emote pattern"));
static AT_AFTER_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S)@").expect("at pattern"));
static AT_BEFORE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\S)").expect("at pattern"));
static PICTOGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{Extended_Pictographic}\u{FE0F}\u{200D}]").expect("pictograph pattern")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Cleans message content for speech.
///
/// Mentions are replaced by the names in `mentions` (unknown ones are
/// dropped), links and URLs are reduced to their text, custom emotes to their
/// names, `@` is spoken as "at" and emoji are removed. Returns `None` when
/// nothing speakable remains.
pub fn clean_text(content: &str, mentions: &[Mention]) -> Option<String> {
    let text = resolve_mentions(content, mentions);
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = URL.replace_all(&text, "");
    let text = CUSTOM_EMOTE.replace_all(&text, "$1");
    let text = AT_AFTER_WORD.replace_all(&text, "$1 at ");
    let text = AT_BEFORE_WORD.replace_all(&text, "at $1");
    let text = text.replace('@', "at");
    let text = PICTOGRAPH.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn resolve_mentions(content: &str, mentions: &[Mention]) -> String {
    let lookup = |kind: MentionKind, id: &str| -> Option<String> {
        let id: u64 = id.parse().ok()?;
        mentions
            .iter()
            .find(|m| m.kind == kind && m.id == id)
            .map(|m| match kind {
                MentionKind::Channel => format!("#{}", m.name),
                _ => m.name.clone(),
            })
    };

    let text = ROLE_MENTION.replace_all(content, |caps: &regex::Captures| {
        lookup(MentionKind::Role, &caps[1]).unwrap_or_default()
    });
    let text = USER_MENTION.replace_all(&text, |caps: &regex::Captures| {
        lookup(MentionKind::User, &caps[1]).unwrap_or_default()
    });
    let text = CHANNEL_MENTION.replace_all(&text, |caps: &regex::Captures| {
        lookup(MentionKind::Channel, &caps[1]).unwrap_or_default()
    });
    text.into_owned()
}
