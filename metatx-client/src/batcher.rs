//! Batch encoding for the multi-send executor.
//!
//! A batch is three parallel arrays (`targets`, `data`, `revertIfFail`) dispatched in one
//! delegatecall. Length agreement is enforced by the executor, not here.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use metatx_types::{BatchEntry, CallKind, MetaCall};

use crate::contracts::IMultiSend;
use crate::error::{MetaTxError, Result};

/// Encode `entries` into a single delegatecall to the multi-send executor at `multi_send`.
///
/// The executor forwards no native value and runs plain calls, so entries carrying value or
/// asking for delegatecall cannot be represented.
pub fn batch(multi_send: Address, entries: &[BatchEntry]) -> Result<MetaCall> {
    let mut targets = Vec::with_capacity(entries.len());
    let mut data = Vec::with_capacity(entries.len());
    let mut revert_if_fail = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter().enumerate() {
        if entry.value != U256::ZERO {
            return Err(MetaTxError::Encoding(format!(
                "batch entry {i} carries value; the batch executor cannot forward value"
            )));
        }
        if entry.kind != CallKind::Call {
            return Err(MetaTxError::Encoding(format!(
                "batch entry {i} requests delegatecall; batch entries are plain calls"
            )));
        }
        targets.push(entry.target);
        data.push(entry.data.clone());
        revert_if_fail.push(entry.revert_on_fail);
    }

    let calldata = IMultiSend::batchCall {
        targets,
        data,
        revertIfFail: revert_if_fail,
    }
    .abi_encode();

    Ok(MetaCall {
        target: multi_send,
        value: U256::ZERO,
        data: Bytes::from(calldata),
        kind: CallKind::DelegateCall,
    })
}

/// Decode batch calldata back into its ordered entries.
pub fn decode_batch(data: &[u8]) -> Result<Vec<BatchEntry>> {
    let call = IMultiSend::batchCall::abi_decode(data, true)?;
    if call.targets.len() != call.data.len() || call.targets.len() != call.revertIfFail.len() {
        return Err(MetaTxError::Encoding(format!(
            "batch arrays differ in length: {} targets, {} data, {} flags",
            call.targets.len(),
            call.data.len(),
            call.revertIfFail.len()
        )));
    }

    Ok(call
        .targets
        .into_iter()
        .zip(call.data)
        .zip(call.revertIfFail)
        .map(|((target, data), revert_on_fail)| BatchEntry::new(target, data, revert_on_fail))
        .collect())
}
