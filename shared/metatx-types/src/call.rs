use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// How the verifier executes the decoded call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

impl TryFrom<u8> for CallKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CallKind::Call),
            1 => Ok(CallKind::DelegateCall),
            _ => Err(()),
        }
    }
}

/// An unsigned call the signer wants the verifier to perform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaCall {
    pub target: Address,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub kind: CallKind,
}

impl MetaCall {
    /// Plain call with no native value attached.
    pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            target,
            value: U256::ZERO,
            data: data.into(),
            kind: CallKind::Call,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn delegate(mut self) -> Self {
        self.kind = CallKind::DelegateCall;
        self
    }
}

/// One sub-call of an atomically dispatched batch.
///
/// `revert_on_fail = true` aborts the whole batch when this entry fails; `false` swallows
/// the failure and continues with the next entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub target: Address,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default = "default_revert_on_fail")]
    pub revert_on_fail: bool,
    #[serde(default)]
    pub kind: CallKind,
}

fn default_revert_on_fail() -> bool {
    true
}

impl BatchEntry {
    pub fn new(target: Address, data: impl Into<Bytes>, revert_on_fail: bool) -> Self {
        Self {
            target,
            data: data.into(),
            value: U256::ZERO,
            revert_on_fail,
            kind: CallKind::Call,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_kind_from_u8() {
        assert_eq!(CallKind::try_from(0u8), Ok(CallKind::Call));
        assert_eq!(CallKind::try_from(1u8), Ok(CallKind::DelegateCall));
        assert!(CallKind::try_from(2u8).is_err());
        assert_eq!(CallKind::DelegateCall as u8, 1);
    }

    #[test]
    fn meta_call_builders() {
        let call = MetaCall::new(Address::repeat_byte(0x11), vec![0xde, 0xad])
            .with_value(U256::from(5u64))
            .delegate();
        assert_eq!(call.value, U256::from(5u64));
        assert_eq!(call.kind, CallKind::DelegateCall);
        assert_eq!(call.data.as_ref(), &[0xde, 0xad]);
    }
}
