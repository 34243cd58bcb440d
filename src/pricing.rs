//! Order pricing engine for Wings POS.
//!
//! Owns the cart arithmetic the rest of the app builds on: Ala Carte lines
//! with per-line discounts, Unli Wings flat-rate groups (one base amount per
//! group regardless of how many flavor lines belong to it), and delivery
//! platform deductions applied to the order subtotal. Also implements the
//! edit reconciliation used when revising a persisted order: which lines were
//! added, changed, or removed, and how much extra payment the revision
//! requires.
//!
//! Everything here is pure; persistence and sync live in `orders`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Default commission rate withheld by delivery platforms, used when the
/// terminal has no per-platform override in `local_settings`.
pub const DEFAULT_PLATFORM_DEDUCTION_RATE: f64 = 0.25;

/// Totals are compared with a half-centavo tolerance so float noise from
/// repeated discount multiplication never flags a phantom payment.
const MONEY_EPSILON: f64 = 0.005;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Sales channel an order came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InStore,
    Grab,
    Foodpanda,
}

impl Channel {
    /// Delivery platforms withhold a commission; in-store orders do not.
    pub fn is_delivery_platform(&self) -> bool {
        matches!(self, Channel::Grab | Channel::Foodpanda)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InStore => "in_store",
            Channel::Grab => "grab",
            Channel::Foodpanda => "foodpanda",
        }
    }

    pub fn parse(value: &str) -> Option<Channel> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in_store" | "in-store" | "instore" | "store" | "dine-in" => Some(Channel::InStore),
            "grab" => Some(Channel::Grab),
            "foodpanda" | "food_panda" | "food-panda" => Some(Channel::Foodpanda),
            _ => None,
        }
    }
}

/// A single cart line.
///
/// `UnliWings` lines are flavor selections inside a flat-rate group: the
/// group's `base_amount` is charged once for the whole group, so individual
/// lines contribute nothing to the subtotal beyond their group membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
#[serde(rename_all_fields = "camelCase")]
pub enum LineItem {
    AlaCarte {
        item_id: String,
        name: String,
        unit_price: f64,
        quantity: i64,
        /// Fraction in [0, 1]; 0.2 means 20% off this line.
        #[serde(default)]
        discount_rate: f64,
    },
    UnliWings {
        item_id: String,
        name: String,
        group_no: u32,
        base_amount: f64,
        quantity: i64,
    },
}

impl LineItem {
    pub fn quantity(&self) -> i64 {
        match self {
            LineItem::AlaCarte { quantity, .. } | LineItem::UnliWings { quantity, .. } => *quantity,
        }
    }

    pub fn item_id(&self) -> &str {
        match self {
            LineItem::AlaCarte { item_id, .. } | LineItem::UnliWings { item_id, .. } => item_id,
        }
    }

    /// Identity used by edit reconciliation. Ala Carte lines are keyed by
    /// item; Unli Wings lines by (group, item) so the same flavor in two
    /// groups stays distinct.
    fn line_key(&self) -> (u64, String) {
        match self {
            LineItem::AlaCarte { item_id, .. } => (0, item_id.clone()),
            LineItem::UnliWings {
                group_no, item_id, ..
            } => (u64::from(*group_no) + 1, item_id.clone()),
        }
    }
}

/// A cart ready for pricing: channel, platform deduction rate, lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub channel: Channel,
    /// Fraction of the subtotal withheld by the platform. Zero for in-store.
    #[serde(default)]
    pub deduction_rate: f64,
    pub lines: Vec<LineItem>,
}

impl Cart {
    pub fn new(channel: Channel, deduction_rate: f64, lines: Vec<LineItem>) -> Cart {
        Cart {
            channel,
            deduction_rate,
            lines,
        }
    }

    /// Drop lines whose quantity fell to zero or below. Editing an order to
    /// quantity 0 is how the UI removes a line.
    pub fn normalized(mut self) -> Cart {
        self.lines.retain(|line| line.quantity() > 0);
        self
    }

    /// Validate and compute totals.
    pub fn totals(&self) -> Result<OrderTotals, PricingError> {
        compute_totals(self)
    }
}

/// Derived money amounts for an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    /// Discounted Ala Carte lines plus one base amount per Unli Wings group.
    pub subtotal: f64,
    /// Total value given away through per-line discounts.
    pub discount_total: f64,
    /// Platform commission, `subtotal * deduction_rate`.
    pub deduction_amount: f64,
    /// What the restaurant actually receives.
    pub net_total: f64,
}

/// Validation failures raised while pricing a cart.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    #[error("discount rate {rate} on '{item}' is outside 0..=1")]
    InvalidDiscount { item: String, rate: f64 },
    #[error("deduction rate {0} is outside 0..1")]
    InvalidDeduction(f64),
    #[error("negative unit price on '{0}'")]
    NegativePrice(String),
    #[error("unli wings group {group} has conflicting base amounts ({first} vs {second})")]
    GroupBaseMismatch { group: u32, first: f64, second: f64 },
    #[error("unli wings group {0} has a non-positive base amount")]
    InvalidGroupBase(u32),
}

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

fn compute_totals(cart: &Cart) -> Result<OrderTotals, PricingError> {
    if !(0.0..1.0).contains(&cart.deduction_rate) {
        return Err(PricingError::InvalidDeduction(cart.deduction_rate));
    }

    let mut subtotal = 0.0;
    let mut discount_total = 0.0;
    // group_no -> base amount, inserted once, checked on every member line
    let mut group_bases: BTreeMap<u32, f64> = BTreeMap::new();

    for line in &cart.lines {
        if line.quantity() <= 0 {
            continue;
        }
        match line {
            LineItem::AlaCarte {
                name,
                unit_price,
                quantity,
                discount_rate,
                ..
            } => {
                if *unit_price < 0.0 {
                    return Err(PricingError::NegativePrice(name.clone()));
                }
                if !(0.0..=1.0).contains(discount_rate) {
                    return Err(PricingError::InvalidDiscount {
                        item: name.clone(),
                        rate: *discount_rate,
                    });
                }
                let gross = unit_price * *quantity as f64;
                subtotal += gross * (1.0 - discount_rate);
                discount_total += gross * discount_rate;
            }
            LineItem::UnliWings {
                group_no,
                base_amount,
                ..
            } => {
                if *base_amount <= 0.0 {
                    return Err(PricingError::InvalidGroupBase(*group_no));
                }
                match group_bases.get(group_no) {
                    None => {
                        group_bases.insert(*group_no, *base_amount);
                    }
                    Some(existing) if (existing - base_amount).abs() > MONEY_EPSILON => {
                        return Err(PricingError::GroupBaseMismatch {
                            group: *group_no,
                            first: *existing,
                            second: *base_amount,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }

    // One base amount per group, however many flavor lines it holds.
    subtotal += group_bases.values().sum::<f64>();

    let deduction_amount = if cart.channel.is_delivery_platform() {
        subtotal * cart.deduction_rate
    } else {
        0.0
    };

    Ok(OrderTotals {
        subtotal,
        discount_total,
        deduction_amount,
        net_total: subtotal - deduction_amount,
    })
}

// ---------------------------------------------------------------------------
// Edit reconciliation
// ---------------------------------------------------------------------------

/// A line whose quantity changed between the persisted order and the revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChange {
    pub line: LineItem,
    pub previous_quantity: i64,
    pub new_quantity: i64,
}

/// Result of diffing a revised cart against a persisted order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub added: Vec<LineItem>,
    pub removed: Vec<LineItem>,
    pub changed: Vec<LineChange>,
    pub previous_total: f64,
    pub new_total: f64,
    /// Extra payment owed by the customer. Zero when the revised total is at
    /// or below the amount already recorded; downward edits never refund.
    pub additional_payment_due: f64,
}

impl Reconciliation {
    pub fn requires_payment(&self) -> bool {
        self.additional_payment_due > MONEY_EPSILON
    }

    pub fn has_line_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty() || !self.changed.is_empty()
    }
}

/// Diff a revised cart against the lines and recorded total of a persisted
/// order. The revised cart is normalized first, so lines edited to quantity
/// zero surface as removals.
pub fn reconcile(
    original_lines: &[LineItem],
    revised: Cart,
    recorded_total: f64,
) -> Result<Reconciliation, PricingError> {
    let revised = revised.normalized();
    let new_totals = revised.totals()?;

    let mut original_by_key: BTreeMap<(u64, String), &LineItem> = BTreeMap::new();
    for line in original_lines {
        if line.quantity() > 0 {
            original_by_key.insert(line.line_key(), line);
        }
    }

    let mut added = Vec::new();
    let mut changed = Vec::new();
    let mut seen = Vec::new();

    for line in &revised.lines {
        let key = line.line_key();
        match original_by_key.get(&key) {
            None => added.push(line.clone()),
            Some(original) => {
                seen.push(key.clone());
                if original.quantity() != line.quantity() {
                    changed.push(LineChange {
                        line: line.clone(),
                        previous_quantity: original.quantity(),
                        new_quantity: line.quantity(),
                    });
                }
            }
        }
    }

    let removed = original_by_key
        .iter()
        .filter(|(key, _)| !seen.contains(key))
        .map(|(_, line)| (*line).clone())
        .collect();

    let additional = new_totals.net_total - recorded_total;
    Ok(Reconciliation {
        added,
        removed,
        changed,
        previous_total: recorded_total,
        new_total: new_totals.net_total,
        additional_payment_due: if additional > MONEY_EPSILON {
            additional
        } else {
            0.0
        },
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wings(id: &str, group: u32, base: f64, qty: i64) -> LineItem {
        LineItem::UnliWings {
            item_id: id.to_string(),
            name: format!("Unli {id}"),
            group_no: group,
            base_amount: base,
            quantity: qty,
        }
    }

    fn ala(id: &str, price: f64, qty: i64, discount: f64) -> LineItem {
        LineItem::AlaCarte {
            item_id: id.to_string(),
            name: format!("Item {id}"),
            unit_price: price,
            quantity: qty,
            discount_rate: discount,
        }
    }

    fn in_store(lines: Vec<LineItem>) -> Cart {
        Cart::new(Channel::InStore, 0.0, lines)
    }

    #[test]
    fn test_discount_applies_per_line() {
        let totals = in_store(vec![ala("sisig", 120.0, 2, 0.2)]).totals().unwrap();
        // price * qty * (1 - pct)
        assert!((totals.subtotal - 120.0 * 2.0 * 0.8).abs() < 1e-9);
        assert!((totals.discount_total - 120.0 * 2.0 * 0.2).abs() < 1e-9);
        assert_eq!(totals.deduction_amount, 0.0);
    }

    #[test]
    fn test_unli_group_base_counted_once() {
        let totals = in_store(vec![
            wings("garlic", 1, 329.0, 2),
            wings("buffalo", 1, 329.0, 3),
            wings("soy", 1, 329.0, 1),
        ])
        .totals()
        .unwrap();
        assert!((totals.subtotal - 329.0).abs() < 1e-9);
    }

    #[test]
    fn test_separate_unli_groups_each_charge_base() {
        let totals = in_store(vec![
            wings("garlic", 1, 329.0, 2),
            wings("buffalo", 2, 329.0, 2),
        ])
        .totals()
        .unwrap();
        assert!((totals.subtotal - 658.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_base_mismatch_rejected() {
        let err = in_store(vec![wings("garlic", 1, 329.0, 2), wings("soy", 1, 349.0, 1)])
            .totals()
            .unwrap_err();
        assert_eq!(
            err,
            PricingError::GroupBaseMismatch {
                group: 1,
                first: 329.0,
                second: 349.0
            }
        );
    }

    #[test]
    fn test_platform_deduction_hits_subtotal_not_lines() {
        let cart = Cart::new(
            Channel::Grab,
            0.25,
            vec![ala("rice", 25.0, 4, 0.0), wings("garlic", 1, 329.0, 2)],
        );
        let totals = cart.totals().unwrap();
        let expected_subtotal = 25.0 * 4.0 + 329.0;
        assert!((totals.subtotal - expected_subtotal).abs() < 1e-9);
        assert!((totals.deduction_amount - expected_subtotal * 0.25).abs() < 1e-9);
        assert!((totals.net_total - expected_subtotal * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_in_store_ignores_deduction_amount() {
        let totals = in_store(vec![ala("rice", 25.0, 2, 0.0)]).totals().unwrap();
        assert_eq!(totals.deduction_amount, 0.0);
        assert!((totals.net_total - totals.subtotal).abs() < 1e-9);
    }

    #[test]
    fn test_zero_quantity_removed_by_normalize() {
        let cart = in_store(vec![ala("rice", 25.0, 0, 0.0), ala("sisig", 120.0, 1, 0.0)]);
        let cart = cart.normalized();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].item_id(), "sisig");
    }

    #[test]
    fn test_negative_quantity_contributes_nothing() {
        let totals = in_store(vec![ala("rice", 25.0, -3, 0.0), ala("sisig", 120.0, 1, 0.0)])
            .totals()
            .unwrap();
        assert!((totals.subtotal - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_discount_rejected() {
        let err = in_store(vec![ala("rice", 25.0, 1, 1.5)]).totals().unwrap_err();
        assert!(matches!(err, PricingError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_invalid_deduction_rejected() {
        let cart = Cart::new(Channel::Grab, 1.0, vec![ala("rice", 25.0, 1, 0.0)]);
        assert_eq!(cart.totals().unwrap_err(), PricingError::InvalidDeduction(1.0));
    }

    // -- reconciliation ------------------------------------------------------

    #[test]
    fn test_reconcile_added_line_requires_payment() {
        let original = vec![ala("sisig", 120.0, 1, 0.0)];
        let revised = in_store(vec![ala("sisig", 120.0, 1, 0.0), ala("rice", 25.0, 2, 0.0)]);
        let rec = reconcile(&original, revised, 120.0).unwrap();
        assert_eq!(rec.added.len(), 1);
        assert!(rec.removed.is_empty());
        assert!(rec.changed.is_empty());
        assert!((rec.additional_payment_due - 50.0).abs() < 1e-9);
        assert!(rec.requires_payment());
    }

    #[test]
    fn test_reconcile_quantity_change_detected() {
        let original = vec![ala("sisig", 120.0, 1, 0.0)];
        let revised = in_store(vec![ala("sisig", 120.0, 3, 0.0)]);
        let rec = reconcile(&original, revised, 120.0).unwrap();
        assert_eq!(rec.changed.len(), 1);
        assert_eq!(rec.changed[0].previous_quantity, 1);
        assert_eq!(rec.changed[0].new_quantity, 3);
        assert!((rec.additional_payment_due - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_reconcile_zero_quantity_becomes_removal() {
        let original = vec![ala("sisig", 120.0, 1, 0.0), ala("rice", 25.0, 2, 0.0)];
        let revised = in_store(vec![ala("sisig", 120.0, 1, 0.0), ala("rice", 25.0, 0, 0.0)]);
        let rec = reconcile(&original, revised, 170.0).unwrap();
        assert_eq!(rec.removed.len(), 1);
        assert_eq!(rec.removed[0].item_id(), "rice");
        // Total dropped, so no extra payment and no automatic refund.
        assert_eq!(rec.additional_payment_due, 0.0);
        assert!(!rec.requires_payment());
    }

    #[test]
    fn test_reconcile_no_payment_when_total_unchanged() {
        let original = vec![wings("garlic", 1, 329.0, 2)];
        // Swapping flavors inside the same group keeps the base amount.
        let revised = in_store(vec![wings("buffalo", 1, 329.0, 2)]);
        let rec = reconcile(&original, revised, 329.0).unwrap();
        assert_eq!(rec.added.len(), 1);
        assert_eq!(rec.removed.len(), 1);
        assert_eq!(rec.additional_payment_due, 0.0);
    }

    #[test]
    fn test_reconcile_payment_compares_against_recorded_total() {
        // Recorded total already includes a prior extra payment of 50, so a
        // revision landing at the same 379 owes nothing.
        let original = vec![wings("garlic", 1, 329.0, 2), ala("rice", 25.0, 2, 0.0)];
        let revised = in_store(vec![
            wings("garlic", 1, 329.0, 2),
            ala("rice", 25.0, 2, 0.0),
        ]);
        let rec = reconcile(&original, revised, 379.0).unwrap();
        assert_eq!(rec.additional_payment_due, 0.0);
        assert!(!rec.has_line_changes());
    }

    #[test]
    fn test_reconcile_same_flavor_distinct_groups() {
        let original = vec![wings("garlic", 1, 329.0, 2)];
        let revised = in_store(vec![wings("garlic", 1, 329.0, 2), wings("garlic", 2, 329.0, 4)]);
        let rec = reconcile(&original, revised, 329.0).unwrap();
        assert_eq!(rec.added.len(), 1);
        assert!((rec.additional_payment_due - 329.0).abs() < 1e-9);
    }
}
