//! Cart pricing
//!
//! Totals are a pure function of the current line items. Nothing here rounds:
//! rounding is applied only when a figure is rendered (see
//! [`CartTotals::rounded`]) so repeated recomputation never compounds error.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Whether a line is priced per individual unit or per bulk box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellMode {
    #[default]
    Unit,
    Box,
}

impl SellMode {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Unit => "unit", Self::Box => "box" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unit" => Some(Self::Unit),
            "box" => Some(Self::Box),
            _ => None,
        }
    }
}

/// Pricing inputs of a single cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub unit_price: Decimal,
    pub box_price: Option<Decimal>,
    pub quantity: u32,
    pub tax_rate_percent: Decimal,
    pub sell_mode: SellMode,
}

impl LineItem {
    pub fn unit(unit_price: Decimal, quantity: u32, tax_rate_percent: Decimal) -> Self {
        Self { unit_price, box_price: None, quantity, tax_rate_percent, sell_mode: SellMode::Unit }
    }

    pub fn boxed(unit_price: Decimal, box_price: Option<Decimal>, quantity: u32, tax_rate_percent: Decimal) -> Self {
        Self { unit_price, box_price, quantity, tax_rate_percent, sell_mode: SellMode::Box }
    }

    /// Box price when sold by the box and a box price exists, unit price otherwise.
    pub fn effective_price(&self) -> Decimal {
        match (self.sell_mode, self.box_price) {
            (SellMode::Box, Some(box_price)) => box_price,
            _ => self.unit_price,
        }
    }

    pub fn line_subtotal(&self) -> Decimal {
        self.effective_price() * Decimal::from(self.quantity)
    }

    pub fn tax_amount(&self) -> Decimal {
        self.line_subtotal() * self.tax_rate_percent / HUNDRED
    }
}

/// Cart-level figures derived from the line items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    /// Units across all lines, not the number of lines.
    pub item_count: u64,
}

impl CartTotals {
    /// Presentation copy rounded to cents. `item_count` is left untouched.
    pub fn rounded(&self) -> Self {
        let cents = |d: Decimal| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            subtotal: cents(self.subtotal),
            tax_amount: cents(self.tax_amount),
            total: cents(self.total),
            item_count: self.item_count,
        }
    }
}

/// Compute subtotal, VAT, grand total and unit count for a list of lines.
///
/// Total over any input: values are not validated, so out-of-range inputs
/// yield well-defined but meaningless figures.
pub fn compute_totals<'a, I>(items: I) -> CartTotals
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let (subtotal, tax_amount, item_count) = items.into_iter().fold(
        (Decimal::ZERO, Decimal::ZERO, 0u64),
        |(subtotal, tax, count), item| {
            (subtotal + item.line_subtotal(), tax + item.tax_amount(), count + u64::from(item.quantity))
        },
    );
    CartTotals { subtotal, tax_amount, total: subtotal + tax_amount, item_count }
}
