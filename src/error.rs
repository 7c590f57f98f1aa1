use solana_program::{decode_error::DecodeError, program_error::ProgramError};
use thiserror::Error;

/// Errors that may be returned by the raffle program
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RaffleError {
    /// Invalid instruction data passed
    #[error("Invalid instruction data")]
    InvalidInstruction,

    #[error("Account already initialized")]
    AlreadyInitialized,

    #[error("Account not initialized")]
    NotInitialized,

    /// Zero entrance fee or negative interval
    #[error("Invalid raffle configuration")]
    InvalidConfig,

    /// Payment below the entrance fee
    #[error("Not enough lamports to enter the raffle")]
    InsufficientPayment,

    /// Entries are only accepted while the round is open
    #[error("Raffle round is not open")]
    RoundNotOpen,

    #[error("Raffle round is full")]
    RoundFull,

    /// Upkeep conditions do not hold; carries the diagnostic tuple
    #[error("Upkeep not needed (balance: {balance}, players: {players}, state: {state})")]
    UpkeepNotNeeded { balance: u64, players: u32, state: u8 },

    /// Fulfillment for a request id that is not the pending one
    #[error("Unrecognized randomness request")]
    UnrecognizedRequest,

    /// The prize could not be delivered to the winner
    #[error("Transfer to winner failed")]
    TransferFailed,

    #[error("Player index out of range")]
    IndexOutOfRange,

    #[error("Signer is not the required authority")]
    NotAuthority,

    #[error("Coordinator account does not match the raffle configuration")]
    InvalidCoordinator,

    #[error("Invalid subscription")]
    InvalidSubscription,

    #[error("Consumer is not registered for this subscription")]
    InvalidConsumer,

    #[error("Too many subscriptions")]
    TooManySubscriptions,

    #[error("Too many consumers")]
    TooManyConsumers,

    #[error("Too many pending randomness requests")]
    TooManyPendingRequests,

    #[error("Subscription balance too low")]
    InsufficientSubscriptionBalance,

    /// The coordinator never issued this request, or it was already fulfilled
    #[error("Nonexistent randomness request")]
    NonexistentRequest,

    #[error("Invalid random words")]
    InvalidRandomWords,

    #[error("Raffle round is not calculating")]
    RoundNotCalculating,

    #[error("Arithmetic overflow")]
    Overflow,
}

impl RaffleError {
    /// Stable numeric code surfaced as `ProgramError::Custom`
    pub fn code(&self) -> u32 {
        match self {
            RaffleError::InvalidInstruction => 0,
            RaffleError::AlreadyInitialized => 1,
            RaffleError::NotInitialized => 2,
            RaffleError::InvalidConfig => 3,
            RaffleError::InsufficientPayment => 4,
            RaffleError::RoundNotOpen => 5,
            RaffleError::RoundFull => 6,
            RaffleError::UpkeepNotNeeded { .. } => 7,
            RaffleError::UnrecognizedRequest => 8,
            RaffleError::TransferFailed => 9,
            RaffleError::IndexOutOfRange => 10,
            RaffleError::NotAuthority => 11,
            RaffleError::InvalidCoordinator => 12,
            RaffleError::InvalidSubscription => 13,
            RaffleError::InvalidConsumer => 14,
            RaffleError::TooManySubscriptions => 15,
            RaffleError::TooManyConsumers => 16,
            RaffleError::TooManyPendingRequests => 17,
            RaffleError::InsufficientSubscriptionBalance => 18,
            RaffleError::NonexistentRequest => 19,
            RaffleError::InvalidRandomWords => 20,
            RaffleError::RoundNotCalculating => 21,
            RaffleError::Overflow => 22,
        }
    }
}

impl From<RaffleError> for ProgramError {
    fn from(e: RaffleError) -> Self {
        ProgramError::Custom(e.code())
    }
}

impl<T> DecodeError<T> for RaffleError {
    fn type_of() -> &'static str {
        "Raffle Error"
    }
}
