use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// A French-formatted number: "4 524,92", "4.524,92", "350", "3.125".
pub const AMOUNT_PATTERN: &str = r"[0-9]{1,3}(?:[ \x{00A0}\.,][0-9]{3})*(?:[\.,][0-9]+)?";

/// How far after a keyword an amount may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordWindow {
    /// 50 characters after the keyword.
    Strict,
    /// 300 characters from the keyword.
    Lenient,
}

impl KeywordWindow {
    fn chars(&self) -> usize {
        match self {
            KeywordWindow::Strict => 50,
            KeywordWindow::Lenient => 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Monthly,
    Annual,
}

/// Amounts followed by a euro marker.
pub fn currency_amount_regex() -> Regex {
    Regex::new(&format!(r"({})\s*(?:€|euros?)", AMOUNT_PATTERN)).expect("valid amount pattern")
}

/// Normalize a raw amount token.
///
/// The rightmost `.` or `,` is the decimal separator only when 1 or 2 digits
/// follow it; otherwise every separator groups thousands.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let v = raw.trim().replace('\u{00A0}', " ");

    let last_comma = v.rfind(',');
    let last_dot = v.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (None, None) => v.replace(' ', ""),
        _ => {
            let comma_is_rightmost = match (last_comma, last_dot) {
                (Some(comma), Some(dot)) => comma > dot,
                (Some(_), None) => true,
                _ => false,
            };
            let sep_pos = if comma_is_rightmost { last_comma } else { last_dot };
            let decimals = sep_pos.map(|pos| digits_after(&v, pos)).unwrap_or(0);

            if (1..=2).contains(&decimals) {
                if comma_is_rightmost {
                    v.replace([' ', '.'], "").replace(',', ".")
                } else {
                    v.replace([' ', ','], "")
                }
            } else {
                v.replace([' ', ',', '.'], "")
            }
        }
    };

    Decimal::from_str(&normalized).ok()
}

fn digits_after(s: &str, pos: usize) -> usize {
    s[pos + 1..].chars().take_while(|c| c.is_ascii_digit()).count()
}

/// Byte offset `chars` characters after `start`, clamped to the end of `text`.
pub fn offset_after_chars(text: &str, start: usize, chars: usize) -> usize {
    text[start..]
        .char_indices()
        .nth(chars)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len())
}

/// Byte offset `chars` characters before `end`, clamped to 0.
pub fn offset_before_chars(text: &str, end: usize, chars: usize) -> usize {
    if chars == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// `text[start..end]` widened by `before` and `after` characters.
pub fn context(text: &str, start: usize, end: usize, before: usize, after: usize) -> &str {
    let from = offset_before_chars(text, start, before);
    let to = offset_after_chars(text, end, after);
    &text[from..to]
}

/// First amount found shortly after any case-insensitive occurrence of `keyword`.
///
/// Returns the amount and the window it was found in.
pub fn amount_near_keyword<'a>(
    text: &'a str,
    keyword: &str,
    window: KeywordWindow,
    amount_regex: &Regex,
) -> Option<(Decimal, &'a str)> {
    let keyword_regex = Regex::new(&format!("(?i){}", regex::escape(keyword))).ok()?;

    for occurrence in keyword_regex.find_iter(text) {
        let end = match window {
            KeywordWindow::Strict => offset_after_chars(text, occurrence.end(), window.chars()),
            KeywordWindow::Lenient => offset_after_chars(text, occurrence.start(), window.chars()),
        };
        let snippet = &text[occurrence.start()..end.max(occurrence.end())];
        let after_keyword = &text[occurrence.end()..end.max(occurrence.end())];

        if let Some(amount) = amount_regex
            .captures(after_keyword)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_amount(m.as_str()))
        {
            return Some((amount, snippet));
        }
    }

    None
}

/// Whether a snippet talks about a monthly or an annual figure.
pub fn detect_period(snippet: &str) -> Option<Period> {
    let s = snippet.to_lowercase();
    if s.contains("par mois") || s.contains("/mois") || (s.contains("mois") && !s.contains("par an")) {
        return Some(Period::Monthly);
    }
    if s.contains("par an") || s.contains("/an") || s.contains("annuel") {
        return Some(Period::Annual);
    }
    None
}
