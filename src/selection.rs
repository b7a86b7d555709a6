//! Input selection by address group.
//!
//! Outputs are grouped by owning address and whole groups are taken until
//! the running total covers the target. Groups are visited in ascending
//! order of group total (ties broken by address) and outputs inside a
//! group in ascending order of value (ties broken by id), so the same
//! output set always yields the same inputs in the same order.

use std::collections::BTreeMap;

use crate::error::{GatewayError, Result};
use crate::types::UnspentOutput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub chosen: Vec<UnspentOutput>,
    pub total_coins: u64,
    pub total_hours: u64,
}

struct Group {
    address: String,
    total: u64,
    outputs: Vec<UnspentOutput>,
}

fn group_by_address(outputs: Vec<UnspentOutput>) -> Result<Vec<Group>> {
    let mut by_address: BTreeMap<String, Vec<UnspentOutput>> = BTreeMap::new();
    for output in outputs.into_iter().filter(|o| o.coins > 0) {
        by_address.entry(output.address.clone()).or_default().push(output);
    }

    let mut groups = Vec::with_capacity(by_address.len());
    for (address, mut outputs) in by_address {
        outputs.sort_by(|a, b| a.coins.cmp(&b.coins).then_with(|| a.id.cmp(&b.id)));
        let total = outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.coins))
            .ok_or_else(|| GatewayError::malformed(format!("balance of {address} overflows")))?;
        groups.push(Group {
            address,
            total,
            outputs,
        });
    }
    groups.sort_by(|a, b| a.total.cmp(&b.total).then_with(|| a.address.cmp(&b.address)));
    Ok(groups)
}

/// Picks whole address groups until their value reaches `target`.
pub fn select(outputs: Vec<UnspentOutput>, target: u64) -> Result<Selection> {
    let groups = group_by_address(outputs)?;

    let mut selection = Selection {
        chosen: Vec::new(),
        total_coins: 0,
        total_hours: 0,
    };

    for group in groups {
        log::debug!(
            "{} の出力 {} 件を選択します (グループ合計 {})",
            group.address,
            group.outputs.len(),
            group.total
        );
        selection.total_coins = selection
            .total_coins
            .checked_add(group.total)
            .ok_or_else(|| GatewayError::malformed("selected balance overflows"))?;
        selection.total_hours = group
            .outputs
            .iter()
            .fold(selection.total_hours, |acc, o| acc.saturating_add(o.hours));
        selection.chosen.extend(group.outputs);

        if selection.total_coins >= target {
            return Ok(selection);
        }
    }

    Err(GatewayError::InsufficientFunds {
        available: selection.total_coins,
        required: target,
    })
}
