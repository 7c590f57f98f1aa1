// Periodically-settled raffle
// Players enter with a fixed fee, a keeper closes the round once the interval
// has passed, and the randomness coordinator's callback pays one winner the pool.

pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod instruction;
pub mod processor;
pub mod state;
pub mod utils;

#[cfg(not(feature = "no-entrypoint"))]
mod entrypoint;

use solana_program::{account_info::AccountInfo, entrypoint::ProgramResult, pubkey::Pubkey};

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    processor::Processor::process(program_id, accounts, instruction_data)
}
