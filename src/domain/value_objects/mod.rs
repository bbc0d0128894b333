//! Value Objects for the storefront

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self { sku.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Two-decimal rendering for receipts and summaries, e.g. `24.80 EUR`.
    pub fn display(&self) -> String {
        let rounded = self.amount.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        format!("{:.2} {}", rounded, self.currency)
    }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        self.0.checked_sub(other).map(Self)
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

/// VAT rate expressed as a percentage (24 means 24%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct TaxRate(Decimal);

impl TaxRate {
    /// Greek standard VAT.
    pub const STANDARD: TaxRate = TaxRate(Decimal::from_parts(24, 0, 0, false, 0));
    /// Greek reduced VAT.
    pub const REDUCED: TaxRate = TaxRate(Decimal::from_parts(13, 0, 0, false, 0));

    pub fn from_percent(percent: Decimal) -> Result<Self, TaxRateError> {
        if percent.is_sign_negative() && !percent.is_zero() { return Err(TaxRateError::Negative); }
        Ok(Self(percent))
    }
    pub fn percent(&self) -> Decimal { self.0 }
}

impl Default for TaxRate { fn default() -> Self { Self::STANDARD } }

impl TryFrom<Decimal> for TaxRate {
    type Error = TaxRateError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::from_percent(value) }
}

impl From<TaxRate> for Decimal {
    fn from(rate: TaxRate) -> Self { rate.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaxRateError {
    #[error("Tax rate cannot be negative")]
    Negative,
}

/// Storefront languages. Greek is the primary catalog language.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    El,
    En,
}

impl Locale {
    pub fn code(&self) -> &'static str {
        match self { Self::El => "el", Self::En => "en" }
    }
}

impl FromStr for Locale {
    type Err = UnknownLocale;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "el" | "el-gr" | "gr" => Ok(Self::El),
            "en" | "en-us" | "en-gb" => Ok(Self::En),
            other => Err(UnknownLocale(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown locale: {0}")]
pub struct UnknownLocale(pub String);

/// Text carried in both storefront languages. English is optional and falls
/// back to Greek when missing or blank.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub el: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
}

impl LocalizedText {
    pub fn new(el: impl Into<String>, en: Option<String>) -> Self { Self { el: el.into(), en } }
    pub fn greek(el: impl Into<String>) -> Self { Self::new(el, None) }

    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::En => self.en.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(&self.el),
            Locale::El => &self.el,
        }
    }

    pub fn is_empty(&self) -> bool { self.el.trim().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_sku() { let sku = Sku::new("box-40x30").unwrap(); assert_eq!(sku.as_str(), "BOX-40X30"); }
    #[test]
    fn test_sku_rejects_blank() { assert_eq!(Sku::new("   "), Err(SkuError::Empty)); }
    #[test]
    fn test_money_multiply() {
        let line = Money::new(Decimal::new(12345, 4), "EUR").multiply(3);
        assert_eq!(line.amount(), Decimal::new(37035, 4));
        assert_eq!(line.currency(), "EUR");
        assert_eq!(line.display(), "3.70 EUR");
    }
    #[test]
    fn test_money_display_rounds_half_up() {
        assert_eq!(Money::new(Decimal::new(24805, 3), "EUR").display(), "24.81 EUR");
        assert_eq!(Money::new(Decimal::new(248, 1), "EUR").display(), "24.80 EUR");
    }
    #[test]
    fn test_quantity_subtract() {
        assert_eq!(Quantity::new(5).subtract(2), Some(Quantity::new(3)));
        assert_eq!(Quantity::new(1).subtract(2), None);
    }
    #[test]
    fn test_tax_rate() {
        assert_eq!(TaxRate::STANDARD.percent(), Decimal::new(24, 0));
        assert_eq!(TaxRate::REDUCED.percent(), Decimal::new(13, 0));
        assert_eq!(TaxRate::from_percent(Decimal::new(-1, 0)), Err(TaxRateError::Negative));
        assert!(TaxRate::from_percent(Decimal::ZERO).is_ok());
    }
    #[test]
    fn test_localized_fallback() {
        let t = LocalizedText::new("Χαρτοκιβώτιο", Some(" ".into()));
        assert_eq!(t.get(Locale::En), "Χαρτοκιβώτιο");
        let t = LocalizedText::new("Χαρτοκιβώτιο", Some("Carton box".into()));
        assert_eq!(t.get(Locale::En), "Carton box");
        assert_eq!(t.get(Locale::El), "Χαρτοκιβώτιο");
    }
    #[test]
    fn test_locale_parse() {
        assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
        assert_eq!("el-GR".parse::<Locale>(), Ok(Locale::El));
        assert!("fr".parse::<Locale>().is_err());
    }
}
