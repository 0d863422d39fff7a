use std::borrow::Cow;

/// Separator placed between a product name and its variant labels.
const VARIANT_SEPARATOR: &str = " | ";

/// Finds the byte offset of the `>` closing the tag that starts at `s[0]`.
///
/// Quoted attribute values may contain `>` and are skipped over.
/// Returns `None` for an unterminated tag.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (idx, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(idx),
            _ => {}
        }
    }
    None
}

/// Removes markup tags from a string, keeping the text between them.
///
/// An unterminated `<` drops the remainder of the input, the same way the
/// storefront's own tag stripping behaves. Entities are left untouched.
///
/// Returns `Cow::Borrowed` when the input contains no `<`.
///
/// # Examples
///
/// ```
/// use shopfeed::util::strip_tags;
///
/// assert_eq!(strip_tags(r#"<a href="/c/shirts">Shirts</a>"#), "Shirts");
/// assert_eq!(strip_tags("plain"), "plain");
/// ```
pub fn strip_tags(s: &str) -> Cow<'_, str> {
    if !s.contains('<') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match tag_end(&rest[start..]) {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// True for an opening `<span ...>` tag (not `</span>`).
fn opens_inline_label(tag: &str) -> bool {
    let name = tag[1..].trim_start();
    let bytes = name.as_bytes();
    bytes.len() >= 4
        && bytes[..4].eq_ignore_ascii_case(b"span")
        && bytes
            .get(4)
            .map_or(true, |b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
}

fn push_separator(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.is_empty() || out.ends_with('|') {
        return;
    }
    out.push_str(VARIANT_SEPARATOR);
}

/// Turns a structured variant display name into a flat, readable title.
///
/// The catalog renders variation names as the parent name followed by one
/// `<span>` per variant label, e.g. `Shirt (#12)<span>Red</span><span>L</span>`.
/// Each opening span that follows visible text gets a `" | "` separator,
/// then every tag is stripped: `Shirt (#12) | Red | L`.
///
/// # Examples
///
/// ```
/// use shopfeed::util::normalize_variant_title;
///
/// assert_eq!(
///     normalize_variant_title("Shirt<span>Red</span><span>Large</span>"),
///     "Shirt | Red | Large"
/// );
/// ```
pub fn normalize_variant_title(formatted_name: &str) -> String {
    let mut out = String::with_capacity(formatted_name.len() + 8);
    let mut rest = formatted_name;
    let mut after_separator = false;

    while let Some(start) = rest.find('<') {
        let text = &rest[..start];
        out.push_str(if after_separator { text.trim_start() } else { text });
        if !text.trim().is_empty() {
            after_separator = false;
        }

        let Some(end) = tag_end(&rest[start..]) else {
            rest = "";
            break;
        };
        let tag = &rest[start..start + end + 1];
        if opens_inline_label(tag) {
            push_separator(&mut out);
            after_separator = true;
        }
        rest = &rest[start + end + 1..];
    }

    out.push_str(if after_separator { rest.trim_start() } else { rest });
    out.trim_end().to_string()
}

/// Formats a price as `<amount with two decimals> <CURRENCY>`.
///
/// Rounds half away from zero at the cent, so `0.125` becomes `0.13`.
/// Rounding works on the price's shortest decimal form rather than its
/// binary value, so `1.005` becomes `1.01` as a shopper would expect.
///
/// # Examples
///
/// ```
/// use shopfeed::util::format_price;
///
/// assert_eq!(format_price(9.5, "USD"), "9.50 USD");
/// assert_eq!(format_price(10.0, "BRL"), "10.00 BRL");
/// ```
pub fn format_price(price: f64, currency: &str) -> String {
    let cents = to_cents(price).round();
    format!("{:.2} {}", cents / 100.0, currency)
}

/// Scales `price` by 100 in decimal: `1.005` becomes exactly `100.5`,
/// where `1.005 * 100.0` would give `100.49999999999999`.
fn to_cents(price: f64) -> f64 {
    if !price.is_finite() {
        return price * 100.0;
    }
    // Display yields the shortest decimal that round-trips, never exponent form
    format!("{price}e2").parse().unwrap_or(price * 100.0)
}

/// Joins category names into the comma-separated breadcrumb used for
/// `g:product_type`, dropping any markup the names carry.
pub fn join_category_list(names: &[String]) -> String {
    strip_tags(&names.join(", ")).into_owned()
}

/// SEC-001: Strip characters that XML 1.0 does not allow in documents.
///
/// Catalog text is user-controlled and may carry C0 control characters or
/// the noncharacters U+FFFE/U+FFFF. Left in place they make the written feed
/// unparsable, so they are dropped before mapping.
///
/// Preserves: tab (0x09), newline (0x0A), carriage return (0x0D).
///
/// Returns `Cow::Borrowed` when nothing needs stripping (common case).
pub fn strip_xml_invalid_chars(s: &str) -> Cow<'_, str> {
    fn is_invalid(c: char) -> bool {
        matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
    }

    if !s.chars().any(is_invalid) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_invalid(c)).collect())
}
