//! HTML formatters for amounts, numbers and times.
//!
//! Output is inserted into pages without further escaping. Amounts are
//! restricted to digits, an optional leading minus and one optional `.`;
//! class names and shortcuts are escaped here.

use chrono::DateTime;
use explorer_types::{Amount, ChainType};
use std::fmt::Write;

/// Escape text for an HTML body or a double-quoted attribute.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Percent-encode `s` for use as one URL path segment.
pub fn escape_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}

/// Group an integer from the right in threes. The leftmost group is bare,
/// the rest are wrapped in `class` spans.
fn push_separated_number_spans(out: &mut String, s: &str, class: &str) {
    let s = match s.strip_prefix('-') {
        Some(rest) => {
            out.push('-');
            rest
        }
        None => s,
    };
    let groups = s.len().saturating_sub(1) / 3;
    if groups == 0 {
        out.push_str(s);
        return;
    }
    let head = s.len() - groups * 3;
    out.push_str(&s[..head]);
    for i in (head..s.len()).step_by(3) {
        let _ = write!(out, r#"<span class="{}">{}</span>"#, class, &s[i..i + 3]);
    }
}

/// Fraction digits: the first two bare, then threes in `class` spans.
fn push_left_separated_number_spans(out: &mut String, s: &str, class: &str) {
    if s.len() <= 2 {
        out.push_str(s);
        return;
    }
    out.push_str(&s[..2]);
    for i in (2..s.len()).step_by(3) {
        let end = (i + 3).min(s.len());
        let _ = write!(out, r#"<span class="{}">{}</span>"#, class, &s[i..end]);
    }
}

fn push_amount_open(out: &mut String, class: &str, tx_date: &str) {
    out.push_str("<span");
    if !class.is_empty() {
        let _ = write!(out, r#" class="{}""#, escape_html(class));
    }
    if !tx_date.is_empty() {
        let _ = write!(out, r#" tm="{}""#, escape_html(tx_date));
    }
    out.push('>');
}

fn push_amount_close(out: &mut String, shortcut: &str) {
    if !shortcut.is_empty() {
        out.push(' ');
        out.push_str(&escape_html(shortcut));
    }
    out.push_str("</span>");
}

/// Render a decimal amount string with digit-group spans.
pub fn amount_span(class: &str, amount: &str, shortcut: &str, tx_date: &str) -> String {
    let mut out = String::with_capacity(amount.len() * 4 + 32);
    push_amount_open(&mut out, class, tx_date);
    match amount.split_once('.') {
        None => push_separated_number_spans(&mut out, amount, "nc"),
        Some((int, frac)) => {
            push_separated_number_spans(&mut out, int, "nc");
            out.push_str(r#".<span class="amt-dec">"#);
            push_left_separated_number_spans(&mut out, frac, "ns");
            out.push_str("</span>");
        }
    }
    push_amount_close(&mut out, shortcut);
    out
}

/// Like [`amount_span`] but always with exactly eight fraction digits,
/// padded or truncated. A literal `"0"` renders without decimals.
pub fn amount_span_bitcoin_type(class: &str, amount: &str, shortcut: &str, tx_date: &str) -> String {
    if amount == "0" {
        return amount_span(class, amount, shortcut, tx_date);
    }
    let (int, frac) = amount.split_once('.').unwrap_or((amount, ""));
    let mut decimals = String::with_capacity(frac.len() + 8);
    decimals.push_str(frac);
    decimals.push_str("00000000");
    let decimals = &decimals[..8];

    let mut out = String::with_capacity(amount.len() * 4 + 64);
    push_amount_open(&mut out, class, tx_date);
    push_separated_number_spans(&mut out, int, "nc");
    let _ = write!(
        out,
        r#".<span class="amt-dec">{}<span class="ns">{}</span><span class="ns">{}</span></span>"#,
        &decimals[..2],
        &decimals[2..5],
        &decimals[5..8]
    );
    push_amount_close(&mut out, shortcut);
    out
}

/// Amount in base units rendered the way the chain family displays it.
pub fn format_amount_span(
    amount: &Amount,
    decimals: u32,
    chain: ChainType,
    shortcut: &str,
    class: &str,
) -> String {
    let s = amount.to_decimal_string(decimals);
    match chain {
        ChainType::Utxo if decimals == 8 => amount_span_bitcoin_type(class, &s, shortcut, ""),
        _ => amount_span(class, &s, shortcut, ""),
    }
}

/// Decimal string of an optional amount; missing is `"0"`.
pub fn format_amount_with_decimals(amount: Option<&Amount>, decimals: u32) -> String {
    amount
        .map(|a| a.to_decimal_string(decimals))
        .unwrap_or_else(|| "0".to_string())
}

/// Integer with `ns` digit-group spans.
pub fn format_int64(i: i64) -> String {
    let mut out = String::new();
    push_separated_number_spans(&mut out, &i.to_string(), "ns");
    out
}

fn relative_time_unit(d: i64) -> String {
    let (n, unit) = if d < 60 {
        (d, "sec")
    } else if d < 3600 {
        (d / 60, "min")
    } else if d < 86_400 {
        (d / 3600, "hour")
    } else {
        (d / 86_400, "day")
    };
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// `d` seconds as "N unit(s)"; from one hour up the next smaller unit is
/// appended when non-zero.
pub fn relative_time(d: i64) -> String {
    let mut r = relative_time_unit(d);
    if d > 86_400 {
        let rest = d % 86_400;
        if rest >= 3600 {
            r.push(' ');
            r.push_str(&relative_time_unit(rest));
        }
    } else if d > 3600 {
        let rest = d % 3600;
        if rest >= 60 {
            r.push(' ');
            r.push_str(&relative_time_unit(rest));
        }
    }
    r
}

/// Unix time `t` relative to `now`. Unset times render empty, future times
/// as the absolute UTC timestamp.
pub fn time_span_at(t: i64, now: i64) -> String {
    if t <= 0 {
        return String::new();
    }
    let absolute = match DateTime::from_timestamp(t, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => return String::new(),
    };
    let d = now - t;
    if d < 0 {
        return absolute;
    }
    format!(r#"<span tt="{}">{} ago</span>"#, absolute, relative_time(d))
}

/// [`time_span_at`] against the wall clock.
pub fn time_span(t: i64) -> String {
    time_span_at(t, chrono::Utc::now().timestamp())
}
