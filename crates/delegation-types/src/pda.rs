use solana_sdk::{hash::Hash, pubkey::Pubkey};

use crate::ids::delegation_program;

pub const COMMIT_RECORD_SEEDS_PREFIX: &[u8] = b"commit-state-record";

/// Address of the immutable record written for commitment `seq` of one delegation cycle
pub fn commit_record_pda_from_delegated_account(
    delegated_account: &Pubkey,
    delegation_id: &Hash,
    seq: u64,
) -> Pubkey {
    Pubkey::find_program_address(
        &[
            COMMIT_RECORD_SEEDS_PREFIX,
            delegated_account.as_ref(),
            delegation_id.as_ref(),
            &seq.to_le_bytes(),
        ],
        &delegation_program::id(),
    )
    .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_records_differ_per_seq() {
        let account = Pubkey::new_unique();
        let cycle = Hash::new_unique();
        let first = commit_record_pda_from_delegated_account(&account, &cycle, 1);
        let second = commit_record_pda_from_delegated_account(&account, &cycle, 2);
        assert_ne!(first, second);
        assert_eq!(first, commit_record_pda_from_delegated_account(&account, &cycle, 1));
    }

    #[test]
    fn test_commit_records_differ_per_cycle() {
        let account = Pubkey::new_unique();
        assert_ne!(
            commit_record_pda_from_delegated_account(&account, &Hash::new_unique(), 1),
            commit_record_pda_from_delegated_account(&account, &Hash::new_unique(), 1)
        );
    }
}
