// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::error::AppError;
use crate::domain::types::TxFormat;
use alloy::consensus::TxEnvelope;
use alloy::consensus::transaction::SignerRecoverable;
use alloy::eips::Decodable2718;
use alloy::primitives::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveredSender {
    pub address: Address,
    pub format: TxFormat,
}

pub fn decode_raw_transaction(raw: &[u8]) -> Result<TxEnvelope, AppError> {
    TxEnvelope::decode_2718(&mut &raw[..])
        .map_err(|e| AppError::Decode(format!("raw transaction decode failed: {e}")))
}

/// Recover the sending address from a signed transaction.
///
/// The envelope variant selects the signature scheme: legacy transactions go
/// through EIP-155 replay-protected recovery, typed transactions through
/// their own format-specific hash. The format is returned alongside the
/// address so callers never re-guess it downstream.
pub fn recover_sender(tx: &TxEnvelope) -> Result<RecoveredSender, AppError> {
    let format = match tx {
        TxEnvelope::Legacy(_) => TxFormat::Legacy,
        TxEnvelope::Eip2930(_) => TxFormat::Eip2930,
        TxEnvelope::Eip1559(_) => TxFormat::Eip1559,
        other => {
            return Err(AppError::Signature(format!(
                "unsupported transaction type {:?}",
                other.tx_type()
            )));
        }
    };

    let address = tx
        .recover_signer()
        .map_err(|e| AppError::Signature(e.to_string()))?;

    Ok(RecoveredSender { address, format })
}
