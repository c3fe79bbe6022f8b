// ── OUI vendor lookup ──
//
// Maps the first three octets of a MAC to the registered company name.
// The table is a static data file; core only ever asks `vendor_for`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::model::MacAddress;

/// Black-box vendor lookup used by the name resolver.
pub trait VendorLookup: Send + Sync {
    fn vendor_for(&self, mac: &MacAddress) -> Option<String>;
}

/// In-memory OUI table loaded from a tab-delimited file.
///
/// Both the IEEE `oui.txt` `(base 16)` lines and Wireshark `manuf` lines
/// parse: the first token is the hex prefix, the last tab field the vendor.
#[derive(Debug, Default, Clone)]
pub struct OuiTable {
    by_prefix: HashMap<String, String>,
}

impl OuiTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk. A missing or unreadable file yields an empty table:
    /// names then fall back to the IP literal.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let table = Self::parse(&text);
                debug!(path = %path.display(), entries = table.len(), "loaded OUI table");
                table
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "OUI table unavailable, vendor names disabled");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Self {
        let by_prefix = text.lines().filter_map(parse_line).collect();
        Self { by_prefix }
    }

    pub fn insert(&mut self, prefix: &str, vendor: &str) {
        if let Some(key) = prefix_key(prefix) {
            self.by_prefix.insert(key, vendor.to_owned());
        }
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

impl VendorLookup for OuiTable {
    fn vendor_for(&self, mac: &MacAddress) -> Option<String> {
        self.by_prefix.get(&mac.oui()).cloned()
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') || !line.contains('\t') {
        return None;
    }
    let key = prefix_key(line.split_whitespace().next()?)?;
    let vendor = line.rsplit('\t').next()?.trim();
    if vendor.is_empty() {
        return None;
    }
    Some((key, vendor.to_owned()))
}

/// Six uppercase hex digits from a prefix token such as `00-1A-11`,
/// `00:1A:11`, or `001A11`.
fn prefix_key(token: &str) -> Option<String> {
    let hex: String = token
        .chars()
        .filter(|c| !matches!(c, '-' | ':' | '.'))
        .collect();
    if hex.len() < 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    hex.get(..6).map(str::to_ascii_uppercase)
}

/// Short brand token: the vendor string up to its first comma or space.
/// "Apple, Inc." becomes "Apple".
pub fn short_brand(vendor: &str) -> Option<&str> {
    let brand = vendor
        .trim()
        .split([',', ' '])
        .next()
        .unwrap_or_default()
        .trim();
    (!brand.is_empty()).then_some(brand)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const IEEE_SAMPLE: &str = "\
OUI/MA-L                                                    Organization
company_id                                                  Organization
                                                            Address

84-7B-EB   (hex)\t\tDell Inc.
847BEB     (base 16)\t\tDell Inc.
\t\t\t\tOne Dell Way
";

    const MANUF_SAMPLE: &str = "\
# Wireshark manuf
00:1A:11\tGoogle\tGoogle, Inc.
00:17:F2\tApple\tApple, Inc.
";

    #[test]
    fn parses_ieee_oui_lines() {
        let table = OuiTable::parse(IEEE_SAMPLE);
        let mac = MacAddress::parse("84:7b:eb:dd:ee:ff").unwrap();
        assert_eq!(table.vendor_for(&mac).as_deref(), Some("Dell Inc."));
    }

    #[test]
    fn parses_wireshark_manuf_lines() {
        let table = OuiTable::parse(MANUF_SAMPLE);
        assert_eq!(table.len(), 2);
        let mac = MacAddress::parse("00:17:f2:00:00:01").unwrap();
        assert_eq!(table.vendor_for(&mac).as_deref(), Some("Apple, Inc."));
    }

    #[test]
    fn unknown_prefix_is_none() {
        let table = OuiTable::parse(MANUF_SAMPLE);
        let mac = MacAddress::parse("02:00:00:00:00:01").unwrap();
        assert_eq!(table.vendor_for(&mac), None);
    }

    #[test]
    fn missing_file_gives_empty_table() {
        let table = OuiTable::load(Path::new("/nonexistent/oui.txt"));
        assert!(table.is_empty());
    }

    #[test]
    fn short_brand_truncates_at_comma_or_space() {
        assert_eq!(short_brand("Apple, Inc."), Some("Apple"));
        assert_eq!(short_brand("Dell Inc."), Some("Dell"));
        assert_eq!(short_brand("Raspberry"), Some("Raspberry"));
        assert_eq!(short_brand("   "), None);
    }
}
