//! Well-known program identities

/// The delegation program. Owner-of-record of every delegated account.
pub mod delegation_program {
    solana_sdk::declare_id!("DELeGGvXpWV2fqJUhqcF5ZSYMS4JTLjteaAMARRSaeSh");
}
