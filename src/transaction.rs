use crate::error::{GatewayError, Result};
use crate::hours::HourSplit;
use crate::types::{DraftOutput, SpendPlan, TransactionDraft};

/// Chain-specific rules for laying out the outputs of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    /// Emit the change output before the destination output.
    pub change_first: bool,
    /// Change strictly below this value is left to the fee instead of
    /// creating an output.
    pub dust_threshold: u64,
}

impl OutputLayout {
    pub const SKYCOIN: OutputLayout = OutputLayout {
        change_first: true,
        dust_threshold: 0,
    };

    // Bitcoin Coreのデフォルトダスト閾値 (P2PKH/P2WPKH出力に対して)
    pub const BITCOIN: OutputLayout = OutputLayout {
        change_first: false,
        dust_threshold: 546,
    };
}

/// Turns a spend plan into an unsigned draft.
///
/// One input is pushed per chosen output in plan order. The draft always
/// satisfies `inputs == outputs + fee`, where the fee absorbs any change
/// dropped as dust.
pub fn build_draft(
    plan: &SpendPlan,
    destination: &str,
    change_address: &str,
    hours: HourSplit,
    layout: OutputLayout,
) -> Result<TransactionDraft> {
    let required = plan.amount.saturating_add(plan.fee);
    if plan.total_coins < required {
        return Err(GatewayError::InsufficientFunds {
            available: plan.total_coins,
            required,
        });
    }

    // おつり (変更) の計算
    let change = plan.total_coins - required;
    let destination_output = DraftOutput {
        address: destination.to_string(),
        coins: plan.amount,
        hours: hours.destination,
    };

    let mut outputs = Vec::with_capacity(2);
    let mut effective_fee = plan.fee;
    if change > 0 && change >= layout.dust_threshold {
        log::debug!("おつり発生: {}, おつりアドレス: {}", change, change_address);
        let change_output = DraftOutput {
            address: change_address.to_string(),
            coins: change,
            hours: hours.change,
        };
        if layout.change_first {
            outputs.push(change_output);
            outputs.push(destination_output);
        } else {
            outputs.push(destination_output);
            outputs.push(change_output);
        }
    } else {
        if change > 0 {
            log::warn!(
                "おつり {} はダスト閾値 {} 未満のため手数料に含めます。",
                change,
                layout.dust_threshold
            );
            // この場合、手数料が実質的に fee + change となる
            effective_fee += change;
        }
        outputs.push(destination_output);
    }

    let draft = TransactionDraft {
        inputs: plan.chosen.clone(),
        outputs,
    };

    // 入力合計 == 出力合計 + 手数料 でなければならない
    let inputs = draft.input_coins();
    let outputs = draft.output_coins();
    if outputs.checked_add(effective_fee) != Some(inputs) {
        return Err(GatewayError::Unbalanced {
            inputs,
            outputs,
            fee: effective_fee,
        });
    }

    Ok(draft)
}
