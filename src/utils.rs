use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program::{invoke, invoke_signed},
    pubkey::Pubkey,
    rent::Rent,
    system_instruction,
    sysvar::Sysvar,
};

use crate::error::RaffleError;

pub const RAFFLE_SEED: &[u8] = b"raffle";
pub const COORDINATOR_SEED: &[u8] = b"vrf_coordinator";

/// Find the program derived address of the raffle
pub fn find_raffle_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[RAFFLE_SEED], program_id)
}

/// Find the program derived address of the randomness coordinator
pub fn find_coordinator_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[COORDINATOR_SEED], program_id)
}

/// Create a rent-exempt account of `space` bytes at a program derived address
pub fn create_pda_account<'a>(
    payer: &AccountInfo<'a>,
    target: &AccountInfo<'a>,
    system_program: &AccountInfo<'a>,
    space: usize,
    signer_seeds: &[&[u8]],
    program_id: &Pubkey,
) -> ProgramResult {
    let rent = Rent::get()?;
    invoke_signed(
        &system_instruction::create_account(
            payer.key,
            target.key,
            rent.minimum_balance(space),
            space as u64,
            program_id,
        ),
        &[payer.clone(), target.clone(), system_program.clone()],
        &[signer_seeds],
    )
}

/// Move lamports from a signer to any account through the system program
pub fn transfer_lamports<'a>(
    from: &AccountInfo<'a>,
    to: &AccountInfo<'a>,
    system_program: &AccountInfo<'a>,
    amount: u64,
) -> ProgramResult {
    invoke(
        &system_instruction::transfer(from.key, to.key, amount),
        &[from.clone(), to.clone(), system_program.clone()],
    )
}

/// Pay `amount` out of a program-owned account to `recipient`.
///
/// The payer keeps its rent-exempt reserve; `recipient` must be the expected
/// key and writable.
pub fn pay_out(
    payer: &AccountInfo,
    recipient: &AccountInfo,
    expected: &Pubkey,
    amount: u64,
) -> Result<(), RaffleError> {
    if recipient.key != expected {
        msg!("Recipient {} does not match winner {}", recipient.key, expected);
        return Err(RaffleError::TransferFailed);
    }
    if !recipient.is_writable {
        msg!("Recipient {} is not writable", recipient.key);
        return Err(RaffleError::TransferFailed);
    }

    let rent = Rent::get().map_err(|_| RaffleError::TransferFailed)?;
    let spendable = payer
        .lamports()
        .saturating_sub(rent.minimum_balance(payer.data_len()));
    if spendable < amount {
        msg!("Insufficient lamports: spendable {}, needed {}", spendable, amount);
        return Err(RaffleError::TransferFailed);
    }
    let payer_balance = payer.lamports() - amount;
    let recipient_balance = recipient
        .lamports()
        .checked_add(amount)
        .ok_or(RaffleError::TransferFailed)?;

    **payer
        .try_borrow_mut_lamports()
        .map_err(|_| RaffleError::TransferFailed)? = payer_balance;
    **recipient
        .try_borrow_mut_lamports()
        .map_err(|_| RaffleError::TransferFailed)? = recipient_balance;
    Ok(())
}
