use arrayref::array_ref;
use solana_program::{
    clock::UnixTimestamp,
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};
use std::{convert::TryFrom, mem::size_of};

use crate::{error::RaffleError, gateway::RandomWord};

/// Most words an override can carry, the count is packed in one byte
pub const MAX_OVERRIDE_WORDS: usize = u8::MAX as usize;

#[derive(Clone, Debug, PartialEq)]
pub enum RaffleInstruction {
    /// Create the randomness coordinator
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The oracle authority, pays for the account
    /// 1. `[writable]` The coordinator account (PDA)
    /// 2. `[]` The system program
    InitializeCoordinator {
        /// Flat lamport fee charged per fulfillment
        base_fee: u64,
        /// Lamports charged per delivered word
        fee_per_word: u64,
    },

    /// Open a new subscription owned by the signer
    ///
    /// Accounts expected:
    /// 0. `[signer]` The subscription owner
    /// 1. `[writable]` The coordinator account
    CreateSubscription,

    /// Move lamports into a subscription balance
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The funder
    /// 1. `[writable]` The coordinator account
    /// 2. `[]` The system program
    FundSubscription { subscription_id: u64, amount: u64 },

    /// Allow `consumer` to request randomness against a subscription
    ///
    /// Accounts expected:
    /// 0. `[signer]` The subscription owner
    /// 1. `[writable]` The coordinator account
    AddConsumer { subscription_id: u64, consumer: Pubkey },

    /// Create the raffle with its immutable configuration
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The raffle authority, pays for the account
    /// 1. `[writable]` The raffle account (PDA)
    /// 2. `[]` The coordinator account
    /// 3. `[]` The system program
    InitializeRaffle {
        /// Minimum entry payment in lamports
        entrance_fee: u64,
        /// Minimum seconds between settlements
        interval: UnixTimestamp,
        key_hash: [u8; 32],
        subscription_id: u64,
        callback_gas_limit: u32,
    },

    /// Enter the current round
    ///
    /// Accounts expected:
    /// 0. `[signer, writable]` The player, pays `payment`
    /// 1. `[writable]` The raffle account
    /// 2. `[]` The system program
    EnterRaffle { payment: u64 },

    /// Report whether upkeep is needed through the return data (one byte)
    ///
    /// Accounts expected:
    /// 0. `[]` The raffle account
    CheckUpkeep,

    /// Close the round and request randomness (anyone may call)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The keeper
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The coordinator account
    PerformUpkeep,

    /// Deliver the coordinator's words for a pending request
    ///
    /// Accounts expected:
    /// 0. `[signer]` The coordinator's oracle authority
    /// 1. `[writable]` The coordinator account
    /// 2. `[writable]` The consumer raffle account
    /// 3. `[writable]` The winner
    ///
    /// The coordinator consumes the request before the raffle sees it, so an id
    /// that is not pending fails with `NonexistentRequest`, not the raffle's
    /// `UnrecognizedRequest`, which stays as a second check behind it.
    FulfillRandomWords { request_id: u64 },

    /// Same as `FulfillRandomWords` with caller-chosen words, at most
    /// `MAX_OVERRIDE_WORDS`
    FulfillRandomWordsWithOverride {
        request_id: u64,
        words: Vec<RandomWord>,
    },

    /// Abandon the pending request of a stuck round (raffle authority only)
    ///
    /// Accounts expected:
    /// 0. `[signer]` The raffle authority
    /// 1. `[writable]` The raffle account
    /// 2. `[writable]` The coordinator account
    ForceReset,
}

impl RaffleInstruction {
    /// Unpacks a byte buffer into a RaffleInstruction
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        let (tag, rest) = input.split_first().ok_or(RaffleError::InvalidInstruction)?;

        Ok(match tag {
            0 => {
                let (base_fee, rest) = Self::unpack_u64(rest)?;
                let (fee_per_word, _) = Self::unpack_u64(rest)?;
                Self::InitializeCoordinator {
                    base_fee,
                    fee_per_word,
                }
            }
            1 => Self::CreateSubscription,
            2 => {
                let (subscription_id, rest) = Self::unpack_u64(rest)?;
                let (amount, _) = Self::unpack_u64(rest)?;
                Self::FundSubscription {
                    subscription_id,
                    amount,
                }
            }
            3 => {
                let (subscription_id, rest) = Self::unpack_u64(rest)?;
                let (consumer, _) = Self::unpack_bytes32(rest)?;
                Self::AddConsumer {
                    subscription_id,
                    consumer: Pubkey::new_from_array(consumer),
                }
            }
            4 => {
                let (entrance_fee, rest) = Self::unpack_u64(rest)?;
                let (interval, rest) = Self::unpack_u64(rest)?;
                let (key_hash, rest) = Self::unpack_bytes32(rest)?;
                let (subscription_id, rest) = Self::unpack_u64(rest)?;
                let (callback_gas_limit, _) = Self::unpack_u32(rest)?;
                Self::InitializeRaffle {
                    entrance_fee,
                    interval: interval as UnixTimestamp,
                    key_hash,
                    subscription_id,
                    callback_gas_limit,
                }
            }
            5 => {
                let (payment, _) = Self::unpack_u64(rest)?;
                Self::EnterRaffle { payment }
            }
            6 => Self::CheckUpkeep,
            7 => Self::PerformUpkeep,
            8 => {
                let (request_id, _) = Self::unpack_u64(rest)?;
                Self::FulfillRandomWords { request_id }
            }
            9 => {
                let (request_id, rest) = Self::unpack_u64(rest)?;
                let (count, mut rest) = rest.split_first().ok_or(RaffleError::InvalidInstruction)?;
                let mut words = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    let (word, next) = Self::unpack_bytes32(rest)?;
                    words.push(word);
                    rest = next;
                }
                Self::FulfillRandomWordsWithOverride { request_id, words }
            }
            10 => Self::ForceReset,
            _ => return Err(RaffleError::InvalidInstruction.into()),
        })
    }

    /// Packs a RaffleInstruction into a byte buffer
    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(size_of::<Self>());
        match self {
            Self::InitializeCoordinator {
                base_fee,
                fee_per_word,
            } => {
                buf.push(0);
                buf.extend_from_slice(&base_fee.to_le_bytes());
                buf.extend_from_slice(&fee_per_word.to_le_bytes());
            }
            Self::CreateSubscription => buf.push(1),
            Self::FundSubscription {
                subscription_id,
                amount,
            } => {
                buf.push(2);
                buf.extend_from_slice(&subscription_id.to_le_bytes());
                buf.extend_from_slice(&amount.to_le_bytes());
            }
            Self::AddConsumer {
                subscription_id,
                consumer,
            } => {
                buf.push(3);
                buf.extend_from_slice(&subscription_id.to_le_bytes());
                buf.extend_from_slice(consumer.as_ref());
            }
            Self::InitializeRaffle {
                entrance_fee,
                interval,
                key_hash,
                subscription_id,
                callback_gas_limit,
            } => {
                buf.push(4);
                buf.extend_from_slice(&entrance_fee.to_le_bytes());
                buf.extend_from_slice(&interval.to_le_bytes());
                buf.extend_from_slice(key_hash);
                buf.extend_from_slice(&subscription_id.to_le_bytes());
                buf.extend_from_slice(&callback_gas_limit.to_le_bytes());
            }
            Self::EnterRaffle { payment } => {
                buf.push(5);
                buf.extend_from_slice(&payment.to_le_bytes());
            }
            Self::CheckUpkeep => buf.push(6),
            Self::PerformUpkeep => buf.push(7),
            Self::FulfillRandomWords { request_id } => {
                buf.push(8);
                buf.extend_from_slice(&request_id.to_le_bytes());
            }
            Self::FulfillRandomWordsWithOverride { request_id, words } => {
                buf.push(9);
                buf.extend_from_slice(&request_id.to_le_bytes());
                let count = u8::try_from(words.len()).unwrap_or(u8::MAX);
                buf.push(count);
                for word in words.iter().take(count as usize) {
                    buf.extend_from_slice(word);
                }
            }
            Self::ForceReset => buf.push(10),
        }
        buf
    }

    fn unpack_u64(input: &[u8]) -> Result<(u64, &[u8]), ProgramError> {
        if input.len() < 8 {
            return Err(RaffleError::InvalidInstruction.into());
        }
        Ok((u64::from_le_bytes(*array_ref![input, 0, 8]), &input[8..]))
    }

    fn unpack_u32(input: &[u8]) -> Result<(u32, &[u8]), ProgramError> {
        if input.len() < 4 {
            return Err(RaffleError::InvalidInstruction.into());
        }
        Ok((u32::from_le_bytes(*array_ref![input, 0, 4]), &input[4..]))
    }

    fn unpack_bytes32(input: &[u8]) -> Result<([u8; 32], &[u8]), ProgramError> {
        if input.len() < 32 {
            return Err(RaffleError::InvalidInstruction.into());
        }
        Ok((*array_ref![input, 0, 32], &input[32..]))
    }
}

/// Create initialize_coordinator instruction
pub fn initialize_coordinator(
    program_id: &Pubkey,
    authority: &Pubkey,
    coordinator: &Pubkey,
    base_fee: u64,
    fee_per_word: u64,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(*coordinator, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::InitializeCoordinator {
            base_fee,
            fee_per_word,
        }
        .pack(),
    }
}

/// Create create_subscription instruction
pub fn create_subscription(program_id: &Pubkey, owner: &Pubkey, coordinator: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(*coordinator, false),
        ],
        data: RaffleInstruction::CreateSubscription.pack(),
    }
}

/// Create fund_subscription instruction
pub fn fund_subscription(
    program_id: &Pubkey,
    funder: &Pubkey,
    coordinator: &Pubkey,
    subscription_id: u64,
    amount: u64,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*funder, true),
            AccountMeta::new(*coordinator, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::FundSubscription {
            subscription_id,
            amount,
        }
        .pack(),
    }
}

/// Create add_consumer instruction
pub fn add_consumer(
    program_id: &Pubkey,
    owner: &Pubkey,
    coordinator: &Pubkey,
    subscription_id: u64,
    consumer: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*owner, true),
            AccountMeta::new(*coordinator, false),
        ],
        data: RaffleInstruction::AddConsumer {
            subscription_id,
            consumer: *consumer,
        }
        .pack(),
    }
}

/// Create initialize_raffle instruction
#[allow(clippy::too_many_arguments)]
pub fn initialize_raffle(
    program_id: &Pubkey,
    authority: &Pubkey,
    raffle: &Pubkey,
    coordinator: &Pubkey,
    entrance_fee: u64,
    interval: UnixTimestamp,
    key_hash: [u8; 32],
    subscription_id: u64,
    callback_gas_limit: u32,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(*raffle, false),
            AccountMeta::new_readonly(*coordinator, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::InitializeRaffle {
            entrance_fee,
            interval,
            key_hash,
            subscription_id,
            callback_gas_limit,
        }
        .pack(),
    }
}

/// Create enter_raffle instruction
pub fn enter_raffle(program_id: &Pubkey, player: &Pubkey, raffle: &Pubkey, payment: u64) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*player, true),
            AccountMeta::new(*raffle, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: RaffleInstruction::EnterRaffle { payment }.pack(),
    }
}

/// Create check_upkeep instruction
pub fn check_upkeep(program_id: &Pubkey, raffle: &Pubkey) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new_readonly(*raffle, false)],
        data: RaffleInstruction::CheckUpkeep.pack(),
    }
}

/// Create perform_upkeep instruction
pub fn perform_upkeep(
    program_id: &Pubkey,
    keeper: &Pubkey,
    raffle: &Pubkey,
    coordinator: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*keeper, true),
            AccountMeta::new(*raffle, false),
            AccountMeta::new(*coordinator, false),
        ],
        data: RaffleInstruction::PerformUpkeep.pack(),
    }
}

/// Create fulfill_random_words instruction
pub fn fulfill_random_words(
    program_id: &Pubkey,
    oracle: &Pubkey,
    coordinator: &Pubkey,
    raffle: &Pubkey,
    winner: &Pubkey,
    request_id: u64,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: fulfill_accounts(oracle, coordinator, raffle, winner),
        data: RaffleInstruction::FulfillRandomWords { request_id }.pack(),
    }
}

/// Create fulfill_random_words_with_override instruction
pub fn fulfill_random_words_with_override(
    program_id: &Pubkey,
    oracle: &Pubkey,
    coordinator: &Pubkey,
    raffle: &Pubkey,
    winner: &Pubkey,
    request_id: u64,
    words: Vec<RandomWord>,
) -> Result<Instruction, ProgramError> {
    if words.len() > MAX_OVERRIDE_WORDS {
        return Err(RaffleError::InvalidInstruction.into());
    }
    Ok(Instruction {
        program_id: *program_id,
        accounts: fulfill_accounts(oracle, coordinator, raffle, winner),
        data: RaffleInstruction::FulfillRandomWordsWithOverride { request_id, words }.pack(),
    })
}

fn fulfill_accounts(
    oracle: &Pubkey,
    coordinator: &Pubkey,
    raffle: &Pubkey,
    winner: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new_readonly(*oracle, true),
        AccountMeta::new(*coordinator, false),
        AccountMeta::new(*raffle, false),
        AccountMeta::new(*winner, false),
    ]
}

/// Create force_reset instruction
pub fn force_reset(
    program_id: &Pubkey,
    authority: &Pubkey,
    raffle: &Pubkey,
    coordinator: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(*raffle, false),
            AccountMeta::new(*coordinator, false),
        ],
        data: RaffleInstruction::ForceReset.pack(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_initialize_raffle() {
        let instruction = RaffleInstruction::InitializeRaffle {
            entrance_fee: 10_000_000,
            interval: 30,
            key_hash: [4u8; 32],
            subscription_id: 1,
            callback_gas_limit: 500_000,
        };
        let packed = instruction.pack();
        assert_eq!(packed.len(), 1 + 8 + 8 + 32 + 8 + 4);
        assert_eq!(RaffleInstruction::unpack(&packed).unwrap(), instruction);
    }

    #[test]
    fn test_unpack_override_words() {
        let instruction = RaffleInstruction::FulfillRandomWordsWithOverride {
            request_id: 3,
            words: vec![[1u8; 32], [2u8; 32]],
        };
        let packed = instruction.pack();
        assert_eq!(RaffleInstruction::unpack(&packed).unwrap(), instruction);

        // word count says two but only one word follows
        let invalid: ProgramError = RaffleError::InvalidInstruction.into();
        assert_eq!(
            RaffleInstruction::unpack(&packed[..packed.len() - 32]),
            Err(invalid)
        );
    }

    #[test]
    fn test_override_word_limit() {
        let program_id = Pubkey::new_unique();
        let key = Pubkey::new_unique();

        let words = vec![[9u8; 32]; MAX_OVERRIDE_WORDS];
        let ix = fulfill_random_words_with_override(&program_id, &key, &key, &key, &key, 1, words)
            .unwrap();
        assert_eq!(ix.data.len(), 1 + 8 + 1 + 32 * MAX_OVERRIDE_WORDS);
        match RaffleInstruction::unpack(&ix.data).unwrap() {
            RaffleInstruction::FulfillRandomWordsWithOverride { words, .. } => {
                assert_eq!(words.len(), MAX_OVERRIDE_WORDS)
            }
            other => panic!("unexpected instruction {:?}", other),
        }

        let invalid: ProgramError = RaffleError::InvalidInstruction.into();
        let words = vec![[9u8; 32]; MAX_OVERRIDE_WORDS + 1];
        assert_eq!(
            fulfill_random_words_with_override(&program_id, &key, &key, &key, &key, 1, words),
            Err(invalid)
        );

        // packing never writes more words than its count byte announces
        let packed = RaffleInstruction::FulfillRandomWordsWithOverride {
            request_id: 1,
            words: vec![[9u8; 32]; MAX_OVERRIDE_WORDS + 1],
        }
        .pack();
        assert_eq!(packed[9] as usize, MAX_OVERRIDE_WORDS);
        assert_eq!(packed.len(), 1 + 8 + 1 + 32 * MAX_OVERRIDE_WORDS);
    }

    #[test]
    fn test_unpack_rejects_bad_input() {
        let invalid: ProgramError = RaffleError::InvalidInstruction.into();
        assert_eq!(RaffleInstruction::unpack(&[]), Err(invalid.clone()));
        assert_eq!(RaffleInstruction::unpack(&[11]), Err(invalid.clone()));
        assert_eq!(RaffleInstruction::unpack(&[5, 1, 2, 3]), Err(invalid));
    }
}
