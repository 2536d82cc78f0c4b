//! Counter Program Processor

use borsh::BorshDeserialize;
use delegation_types::Invocation;
use solana_sdk::pubkey::Pubkey;

use crate::{error::CounterError, instruction::CounterInstruction, state::Counter};

/// Process instruction
pub fn process(program_id: &Pubkey, invocation: Invocation<'_>) -> Result<(), CounterError> {
    let instruction = CounterInstruction::try_from_slice(invocation.instruction)
        .map_err(|_| CounterError::InvalidInstructionData)?;

    match instruction {
        CounterInstruction::Initialize => process_initialize(program_id, invocation),
        CounterInstruction::Increment => update_counter(invocation, |count| count.checked_add(1)),
        CounterInstruction::Decrement => update_counter(invocation, |count| count.checked_sub(1)),
        CounterInstruction::IncrementBy { amount } => {
            if amount == 0 {
                return Err(CounterError::InvalidAmount);
            }
            update_counter(invocation, |count| count.checked_add(amount))
        }
    }
}

/// Create the signer's counter
fn process_initialize(program_id: &Pubkey, invocation: Invocation<'_>) -> Result<(), CounterError> {
    if invocation.data.is_some() {
        return Err(CounterError::AlreadyInitialized);
    }

    let (counter_pda, _bump) = Counter::derive_pda(&invocation.signer, program_id);
    if counter_pda != invocation.account {
        return Err(CounterError::InvalidAddress);
    }

    *invocation.data = Some(Counter::default().to_bytes());

    tracing::trace!("Counter {} initialized with value 0", invocation.account);

    Ok(())
}

fn update_counter(
    invocation: Invocation<'_>,
    apply: impl FnOnce(u64) -> Option<u64>,
) -> Result<(), CounterError> {
    let data = invocation.data.as_mut().ok_or(CounterError::NotInitialized)?;

    let mut counter = Counter::from_bytes(data)?;
    counter.count = apply(counter.count).ok_or(CounterError::Overflow)?;
    *data = counter.to_bytes();

    tracing::trace!("Count updated to {}", counter.count);

    Ok(())
}
