//! Extracts a bilingual description from free-form model output.
//!
//! Models rarely follow the requested format exactly, so several layouts are
//! tried in a fixed order and the first one yielding both fields wins. Parsing
//! never fails: unstructured text degrades to [`UNPARSED_ZH`].

use std::sync::LazyLock;

use regex::Regex;

use crate::types::FrameDescription;

/// Chinese field returned when no layout matched.
pub const UNPARSED_ZH: &str =
    "无法解析中文描述。请检查LLM输出格式，确保包含 \"EN:\" 和 \"ZH:\" 标记。";

struct MarkerRule {
    en: Regex,
    zh: Regex,
}

fn rule(en: &str, zh: &str) -> MarkerRule {
    MarkerRule {
        en: Regex::new(en).expect("static regex"),
        zh: Regex::new(zh).expect("static regex"),
    }
}

static MARKER_RULES: LazyLock<[MarkerRule; 3]> = LazyLock::new(|| {
    [
        rule(r"(?s)EN:\s*(.+?)(?:ZH:|\z)", r"(?s)ZH:\s*(.+)"),
        rule(
            r"(?s)English:\s*(.+?)(?:Chinese:|中文:|\z)",
            r"(?s)(?:Chinese|中文):\s*(.+)",
        ),
        rule(r"(?is)en:\s*(.+?)(?:zh:|\z)", r"(?is)zh:\s*(.+)"),
    ]
});

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("static regex"));

pub fn parse_description(raw: &str) -> FrameDescription {
    for rule in MARKER_RULES.iter() {
        if let (Some(en), Some(zh)) = (capture(&rule.en, raw), capture(&rule.zh, raw)) {
            return FrameDescription { en, zh };
        }
    }

    let mut paragraphs = PARAGRAPH_BREAK
        .split(raw)
        .map(str::trim)
        .filter(|p| !p.is_empty());
    if let (Some(en), Some(zh)) = (paragraphs.next(), paragraphs.next()) {
        return FrameDescription {
            en: en.to_string(),
            zh: zh.to_string(),
        };
    }

    FrameDescription {
        en: raw.trim().to_string(),
        zh: UNPARSED_ZH.to_string(),
    }
}

/// True when the description came from the final fallback.
pub fn is_unparsed(description: &FrameDescription) -> bool {
    description.zh == UNPARSED_ZH
}

fn capture(re: &Regex, raw: &str) -> Option<String> {
    let text = re.captures(raw)?.get(1)?.as_str().trim();
    (!text.is_empty()).then(|| text.to_string())
}
