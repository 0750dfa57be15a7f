//! Invoice number formatting.
//!
//! The counter itself lives in storage; this module only turns a sequence
//! value into the printed number.

use serde::{Deserialize, Serialize};

/// How sequence values are rendered as invoice numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceFormat {
    pub prefix: String,
    /// Minimum digit count, zero padded.
    pub width: usize,
}

impl Default for InvoiceFormat {
    fn default() -> Self {
        InvoiceFormat {
            prefix: "INV-".to_string(),
            width: 6,
        }
    }
}

impl InvoiceFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        InvoiceFormat {
            prefix: prefix.into(),
            width,
        }
    }

    /// ```rust
    /// use storekeep_core::InvoiceFormat;
    ///
    /// assert_eq!(InvoiceFormat::default().format(42), "INV-000042");
    /// ```
    pub fn format(&self, sequence: i64) -> String {
        format!("{}{:0width$}", self.prefix, sequence, width = self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_prefix_and_width() {
        let format = InvoiceFormat::new("S1-", 4);
        assert_eq!(format.format(7), "S1-0007");
    }

    #[test]
    fn test_overflowing_width_keeps_all_digits() {
        assert_eq!(InvoiceFormat::default().format(1_234_567), "INV-1234567");
    }
}
