//! Version-independent accessors for `VersionedMessage`
//!
//! Legacy and V0 messages expose the same header and static key table
//! through different types; everything that inspects a compiled message
//! goes through these helpers.

use solana_sdk::{
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Keys embedded in the message (no lookup-table addresses)
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// The first `num_required_signatures` static keys, in signature order
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let header = get_message_header(message);
    let account_keys = get_static_account_keys(message);
    let num_signers = header.num_required_signatures as usize;

    &account_keys[..num_signers.min(account_keys.len())]
}

/// Whether the static key at `index` is writable according to the header
///
/// Layout: [signed writable | signed readonly | unsigned writable | unsigned readonly]
#[must_use]
pub fn is_static_key_writable(message: &VersionedMessage, index: usize) -> bool {
    let header = get_message_header(message);
    let num_keys = get_static_account_keys(message).len();
    let num_signed = header.num_required_signatures as usize;

    if index >= num_keys {
        return false;
    }

    if index < num_signed {
        index < num_signed.saturating_sub(header.num_readonly_signed_accounts as usize)
    } else {
        let num_unsigned = num_keys - num_signed;
        let writable_unsigned = num_unsigned.saturating_sub(header.num_readonly_unsigned_accounts as usize);
        index - num_signed < writable_unsigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        hash::Hash,
        instruction::{AccountMeta, Instruction},
        message::{v0::Message as MessageV0, Message},
        signature::Keypair,
        signer::Signer,
    };
    #[allow(deprecated)]
    use solana_sdk::system_instruction;

    #[test]
    fn test_legacy_and_v0_agree() {
        let payer = Keypair::new();
        let recipient = Pubkey::new_unique();
        let instruction = system_instruction::transfer(&payer.pubkey(), &recipient, 1000);

        let legacy = VersionedMessage::Legacy(Message::new(&[instruction.clone()], Some(&payer.pubkey())));
        let v0 = VersionedMessage::V0(
            MessageV0::try_compile(&payer.pubkey(), &[instruction], &[], Hash::default()).unwrap(),
        );

        for message in [&legacy, &v0] {
            assert_eq!(get_message_header(message).num_required_signatures, 1);
            assert_eq!(get_static_account_keys(message)[0], payer.pubkey());
            assert_eq!(get_required_signers(message), &[payer.pubkey()]);
        }
    }

    #[test]
    fn test_writability_from_header() {
        let payer = Pubkey::new_unique();
        let cosigner = Pubkey::new_unique();
        let writable = Pubkey::new_unique();
        let readonly = Pubkey::new_unique();
        let program = Pubkey::new_unique();

        let ix = Instruction::new_with_bytes(
            program,
            &[0],
            vec![
                AccountMeta::new_readonly(cosigner, true),
                AccountMeta::new(writable, false),
                AccountMeta::new_readonly(readonly, false),
            ],
        );
        let message = VersionedMessage::V0(MessageV0::try_compile(&payer, &[ix], &[], Hash::default()).unwrap());
        let keys = get_static_account_keys(&message).to_vec();

        let index_of = |key: &Pubkey| keys.iter().position(|k| k == key).unwrap();
        assert!(is_static_key_writable(&message, index_of(&payer)));
        assert!(!is_static_key_writable(&message, index_of(&cosigner)));
        assert!(is_static_key_writable(&message, index_of(&writable)));
        assert!(!is_static_key_writable(&message, index_of(&readonly)));
        assert!(!is_static_key_writable(&message, index_of(&program)));
        assert!(!is_static_key_writable(&message, keys.len()));
    }
}
